//! Transport adapters: turn a received `distributeEvent` payload into a
//! call to `oadr_handler::EventHandler::handle_payload` and return the
//! reply to the VTN, abstracted from the HTTP-poll/XMPP-push specifics
//! either transport is built on.

mod error;
mod http;
mod xmpp;

pub use error::TransportError;
pub use http::{load_tls_config, HttpPollTransport, HttpPollTransportConfig, TlsConfig, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
pub use xmpp::{XmppPushTransport, XmppStopHandle};
