use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("database connection failed: {0}")]
    Connect(String),

    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}
