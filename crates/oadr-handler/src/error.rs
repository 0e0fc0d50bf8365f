use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Xml(#[from] oadr_xml::XmlError),

    #[error("xml serialization error: {0}")]
    Write(#[from] quick_xml::Error),

    #[error(transparent)]
    Store(#[from] oadr_store::StoreError),

    #[error(transparent)]
    Schedule(#[from] oadr_schedule::ScheduleError),

    #[error("required field `{0}` missing from payload")]
    MissingField(&'static str),
}
