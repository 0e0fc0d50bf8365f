pub mod config;
pub mod error;

#[cfg(feature = "test-util")]
pub mod register;

pub use config::VenConfig;
pub use error::ConfigError;

#[cfg(feature = "test-util")]
pub use register::RegisterSink;
