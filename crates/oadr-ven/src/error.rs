use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid profile {0:?}, expected \"2.0a\" or \"2.0b\"")]
    InvalidProfile(String),
}
