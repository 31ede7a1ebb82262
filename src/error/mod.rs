//! Error taxonomy for the conversion and ballistic stages.
//!
//! Every failure a vehicle can hit maps onto one [`ErrorKind`], which fixes the
//! process exit code and the severity used to pick the run's final status.

use crate::parser::ParseError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed source syntax (blk text or blkx JSON).
    #[error("parse error in {file}: {source}")]
    Parse {
        file: PathBuf,
        #[source]
        source: ParseError,
    },

    /// A cross-file join failed (vehicle -> weapon file, Data -> table).
    #[error("unresolved reference '{id}' from {file}")]
    MissingReference { id: String, file: PathBuf },

    /// A required field was absent while building the data model.
    #[error("schema error in {file}: field '{field}' {detail}")]
    Schema {
        file: PathBuf,
        field: String,
        detail: String,
    },

    /// A projectile has no usable penetration law or flight parameters.
    #[error("cannot compute projectile '{projectile}': {detail}")]
    Computation { projectile: String, detail: String },

    /// The cache manifest could not be read or written.
    #[error("cache manifest {path}: {detail}")]
    CacheIo { path: PathBuf, detail: String },

    /// An output file could not be written.
    #[error("cannot write {path}: {source}")]
    EmitIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input file or directory could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse { .. } => ErrorKind::Parse,
            Error::MissingReference { .. } => ErrorKind::MissingReference,
            Error::Schema { .. } => ErrorKind::Schema,
            Error::Computation { .. } => ErrorKind::Computation,
            Error::CacheIo { .. } => ErrorKind::CacheIo,
            Error::EmitIo { .. } => ErrorKind::EmitIo,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// The offending file, field or identifier, for one-line reports.
    pub fn subject(&self) -> String {
        match self {
            Error::Parse { file, .. } => file.display().to_string(),
            Error::MissingReference { id, .. } => id.clone(),
            Error::Schema { field, .. } => field.clone(),
            Error::Computation { projectile, .. } => projectile.clone(),
            Error::CacheIo { path, .. } | Error::EmitIo { path, .. } | Error::Io { path, .. } => {
                path.display().to_string()
            }
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn emit(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::EmitIo {
            path: path.into(),
            source,
        }
    }

    pub fn schema(file: impl Into<PathBuf>, field: &str, detail: impl Into<String>) -> Self {
        Error::Schema {
            file: file.into(),
            field: field.to_string(),
            detail: detail.into(),
        }
    }

    pub fn computation(projectile: &str, detail: impl Into<String>) -> Self {
        Error::Computation {
            projectile: projectile.to_string(),
            detail: detail.into(),
        }
    }
}

/// Field-less mirror of [`Error`] used in reports and for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Parse,
    MissingReference,
    Schema,
    Computation,
    CacheIo,
    EmitIo,
    Io,
}

/// Exit code for a strict run that only produced warnings.
pub const EXIT_STRICT_WARNINGS: i32 = 1;

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Computation => 10,
            ErrorKind::CacheIo => 11,
            ErrorKind::MissingReference => 12,
            ErrorKind::Schema => 13,
            ErrorKind::Parse => 14,
            ErrorKind::Io => 15,
            ErrorKind::EmitIo => 16,
        }
    }

    /// Higher is more severe. The run exit code follows the most severe kind seen.
    pub fn severity(self) -> u8 {
        match self {
            ErrorKind::Computation => 1,
            ErrorKind::CacheIo => 2,
            ErrorKind::MissingReference => 3,
            ErrorKind::Schema => 4,
            ErrorKind::Parse => 5,
            ErrorKind::Io => 6,
            ErrorKind::EmitIo => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::MissingReference => "MissingReferenceError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Computation => "ComputationError",
            ErrorKind::CacheIo => "CacheIOError",
            ErrorKind::EmitIo => "EmitIOError",
            ErrorKind::Io => "IOError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
