use crate::session::SessionError;

/// Run-level failures. Record-level failures never reach this type; they are
/// folded into an `IssueResult` and written to the store.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Database(sqlx::Error),
    Migration(sqlx::migrate::MigrateError),
    Io(std::io::Error),
    Export(csv::Error),
    Login(String),
    Session(SessionError),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration Error: {msg}"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
            AppError::Migration(err) => write!(f, "Migration Error: {err}"),
            AppError::Io(err) => write!(f, "I/O Error: {err}"),
            AppError::Export(err) => write!(f, "Export Error: {err}"),
            AppError::Login(msg) => write!(f, "Login Failed: {msg}"),
            AppError::Session(err) => write!(f, "Session Error: {err}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Migration(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Export(err)
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Session(err)
    }
}
