//! Bootstrap/config-time failures. Manual `Display`/`Error`, no `thiserror` —
//! matches how this codebase family reports startup errors.

use std::fmt;

#[derive(Debug)]
pub enum RouterError {
    Config(String),
    Io(std::io::Error),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::Config(msg) => write!(f, "configuration error: {}", msg),
            RouterError::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouterError::Config(_) => None,
            RouterError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RouterError {
    fn from(err: std::io::Error) -> Self {
        RouterError::Io(err)
    }
}
