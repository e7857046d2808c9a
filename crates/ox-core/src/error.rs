//! Error types for oxidized-sync

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Synchronization primitive kind, used to label errors and log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Counting semaphore
    Semaphore,
    /// Mutual exclusion lock
    Mutex,
    /// Condition variable
    Cond,
}

impl Primitive {
    /// Get the primitive name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Semaphore => "semaphore",
            Self::Mutex => "mutex",
            Self::Cond => "condition variable",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of an OS synchronization call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The OS refused to create the primitive; no instance exists.
    #[error("failed to initialize {primitive}: {}", os_message(.code))]
    Initialization { primitive: Primitive, code: i32 },

    /// A wait/post/lock/unlock/signal/broadcast call did not succeed.
    #[error("{primitive} {op} failed: {}", os_message(.code))]
    Operation {
        primitive: Primitive,
        op: &'static str,
        code: i32,
    },
}

impl SyncError {
    /// Create an initialization error from an OS error code
    pub fn init(primitive: Primitive, code: i32) -> Self {
        Self::Initialization { primitive, code }
    }

    /// Create an operation error from an OS error code
    pub fn op(primitive: Primitive, op: &'static str, code: i32) -> Self {
        Self::Operation { primitive, op, code }
    }

    /// Primitive the failing call belonged to
    pub fn primitive(&self) -> Primitive {
        match self {
            Self::Initialization { primitive, .. } | Self::Operation { primitive, .. } => {
                *primitive
            }
        }
    }

    /// Raw OS error code reported by the failing call
    pub fn code(&self) -> i32 {
        match self {
            Self::Initialization { code, .. } | Self::Operation { code, .. } => *code,
        }
    }

    /// Check whether this error came from a constructor
    pub fn is_initialization(&self) -> bool {
        matches!(self, Self::Initialization { .. })
    }
}

fn os_message(code: &i32) -> String {
    io::Error::from_raw_os_error(*code).to_string()
}

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}
