use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("Config: {0}")]
    Config(#[from] cartlink_core::config::ConfigError),

    #[error("Commerce: {0}")]
    Commerce(#[from] cartlink_core::commerce::CommerceError),

    #[error("Token: {0}")]
    Token(#[from] cartlink_core::token::TokenError),

    #[error("Database: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Store: {0}")]
    Store(#[from] cartlink_core::store::StoreError),

    #[error("Json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}
