use crate::command_name::CommandNameViolation;
use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A predicate over filesystem or call state did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AssertionFailure {}

/// Extension for turning a failed check into a test panic.
pub trait OrPanic<T> {
    fn or_panic(self) -> T;
}

impl<T, E: fmt::Display> OrPanic<T> for std::result::Result<T, E> {
    #[track_caller]
    fn or_panic(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("command `{name}` is already mocked at {}", path.display())]
    AlreadyMocked { name: String, path: PathBuf },

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid command name `{name}`: {violation}")]
    InvalidCommandName {
        name: String,
        violation: CommandNameViolation,
    },

    #[error(
        "could not locate the testpath-stub interpreter; searched: {}",
        searched.join(", ")
    )]
    InterpreterNotFound { searched: Vec<String> },

    #[error("malformed invocation record #{index} in {}: {source}", path.display())]
    MalformedRecord {
        path: PathBuf,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("mock for `{name}` is not in a state that allows this operation")]
    Inactive { name: String },

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
}

impl Error {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn is_already_mocked(&self) -> bool {
        matches!(self, Self::AlreadyMocked { .. })
    }

    pub fn as_assertion(&self) -> Option<&AssertionFailure> {
        match self {
            Self::Assertion(failure) => Some(failure),
            _ => None,
        }
    }
}
