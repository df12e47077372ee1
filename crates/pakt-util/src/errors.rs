use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all pakt operations.
#[derive(Debug, Error, Diagnostic)]
pub enum PaktError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed project manifest (`pakt.toml`).
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your pakt.toml for syntax errors"))]
    Manifest { message: String },

    /// A package metadata file could not be read or understood.
    #[error("Metadata error: {message}")]
    Metadata { message: String },

    /// A version constraint string could not be parsed.
    #[error("Invalid constraint '{constraint}': {reason}")]
    #[diagnostic(help("Use forms like `^1.2`, `>=1.0 <2.0`, `1.4.*` or `1.0 || 2.0`"))]
    InvalidConstraint { constraint: String, reason: String },

    /// Dependency resolution found no consistent set of versions.
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// The install plan could not be built (e.g. a dependency cycle).
    #[error("Planning failed: {message}")]
    Plan { message: String },

    /// An installer handler could not be registered or failed to run.
    #[error("Installer error: {message}")]
    Installer { message: String },

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type PaktResult<T> = miette::Result<T>;
