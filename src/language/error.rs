use std::{fmt, io, path::Path};

/// Failure to read a procedure document off disk, before any parsing
/// happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingError<'i> {
    pub problem: String,
    pub details: String,
    pub filename: &'i Path,
}

impl<'i> LoadingError<'i> {
    pub fn from_io(error: io::Error, filename: &'i Path) -> LoadingError<'i> {
        match error.kind() {
            io::ErrorKind::NotFound => LoadingError {
                problem: "File not found".to_string(),
                details: String::new(),
                filename,
            },
            kind => LoadingError {
                problem: "Failed reading".to_string(),
                details: kind.to_string(),
                filename,
            },
        }
    }
}

impl<'i> fmt::Display for LoadingError<'i> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.problem, self.details)
    }
}
