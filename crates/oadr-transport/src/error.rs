use thiserror::Error;

/// Shared transport error taxonomy - every network failure, timeout or
/// TLS error funnels through one of these so the poll/xmpp loops can log
/// a specific cause and continue at the next interval rather than abort.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("xmpp error: {0}")]
    Xmpp(String),

    #[error(transparent)]
    Xml(#[from] oadr_xml::XmlError),

    #[error(transparent)]
    Handler(#[from] oadr_handler::HandlerError),

    #[error("invalid vtn base uri: {0}")]
    InvalidUri(#[from] url::ParseError),
}
