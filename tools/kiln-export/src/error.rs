//! Compile error taxonomy
//!
//! Every error carries the path of the offending asset. The batch driver
//! reports per-asset failures and continues with the remaining assets; the
//! explicit kinds let it (and tests) tell malformed content apart from
//! tooling and I/O failures.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// The source content violates a constraint of the target format
    /// (missing animations, too many bones, unresolvable material, ...)
    #[error("{}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    /// An external stage failed: importer, tangent generator or track codec
    #[error("{}: {reason}", path.display())]
    ExternalTool { path: PathBuf, reason: String },

    /// File system failure
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn external(path: &Path, reason: impl Into<String>) -> Self {
        Self::ExternalTool {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
