use std::fmt;

#[derive(Debug)]
pub enum SyncError {
    Io(std::io::Error),
    Db(usage_db::DbError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Io(err) => write!(f, "io error: {err}"),
            SyncError::Db(err) => write!(f, "database error: {err}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io(err) => Some(err),
            SyncError::Db(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err)
    }
}

impl From<usage_db::DbError> for SyncError {
    fn from(err: usage_db::DbError) -> Self {
        SyncError::Db(err)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
