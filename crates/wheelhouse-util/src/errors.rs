use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all wheelhouse operations.
#[derive(Debug, Error, Diagnostic)]
pub enum WheelhouseError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed closure configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check the closure configuration file for typos and missing keys"))]
    Config { message: String },

    /// A requirement string could not be parsed into name + constraint.
    #[error("Invalid requirement `{requirement}`: {reason}")]
    #[diagnostic(help("Requirements follow PEP 508, e.g. `requests[socks]>=2.28,<3; python_version >= \"3.8\"`"))]
    InvalidRequirement { requirement: String, reason: String },

    /// No candidate satisfies the intersected constraints of a package on a target.
    #[error("No version of `{package}` satisfies `{constraint}` on {target} (required by: {})", .sources.join("; "))]
    UnsatisfiableConstraint {
        package: String,
        target: String,
        constraint: String,
        sources: Vec<String>,
    },

    /// The package index was unreachable or returned malformed metadata.
    #[error("Lookup of `{package}` failed: {message}")]
    CandidateLookup { package: String, message: String },

    /// Network request or download failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type WheelhouseResult<T> = miette::Result<T>;
