use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to event store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("event store query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("event store migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("stored event payload is not valid utf-8")]
    InvalidEncoding,
}
