use thiserror::Error;

/// Every per-event failure mode gets its own variant so the control loop
/// can log a specific cause and move on to the next event instead of
/// collapsing everything into one `except Exception`.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("stored event is not valid utf-8")]
    InvalidEncoding,

    #[error("failed to parse stored event xml: {0}")]
    Xml(#[from] oadr_xml::XmlError),

    #[error("required field `{0}` missing from stored event")]
    MissingField(&'static str),

    #[error("malformed duration in stored event: {0}")]
    Duration(#[from] oadr_schedule::ScheduleError),

    #[error(transparent)]
    Store(#[from] oadr_store::StoreError),
}
