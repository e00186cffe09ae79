/// Core error type for the panel bot.
///
/// Panel failures are split so operators can tell a provider-side refusal
/// (`Panel`, carrying the panel's own `msg`) from a network problem
/// (`Transport`) or a rejected session (`Auth`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("panel transport error: {0}")]
    Transport(String),

    #[error("panel authentication failed: {0}")]
    Auth(String),

    #[error("panel error: {0}")]
    Panel(String),

    #[error("panel payload could not be decoded: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Error::Database(format!("migration failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
