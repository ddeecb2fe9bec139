//! Build Errors
//!
//! Every failure in the engine flows through a single error enum so the
//! driver has one channel to log and map to an exit code. Variants carry
//! owned strings (not live io errors) and the enum is `Clone`, because the
//! scheduler memoizes a failure per output and re-raises it for every
//! producer waiting on that output.

use thiserror::Error;

use crate::expr::EvalError;

/// Unified error type for rule parsing, instantiation, and building.
#[derive(Debug, Clone, Error)]
pub enum ProduceError {
    /// Rule-file syntax error with its source location.
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// Bad configuration: illegal regex, unknown rule type, reassigned
    /// `target`, misplaced globals section, malformed word list.
    #[error("{0}")]
    Config(String),

    /// No rule head matches the target and no such file exists.
    #[error("no rule to produce '{0}'")]
    NoRule(String),

    /// A target transitively depends on itself (or on a target that
    /// declares it as an output).
    #[error("cyclic dependency: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// An embedded `%{...}` expression failed outside of a recoverable
    /// context.
    #[error("in expression '{expr}': {source}")]
    Expr { expr: String, source: EvalError },

    /// A recipe exited with a nonzero status.
    #[error("recipe for '{target}' failed with exit status {code}")]
    RecipeFailed { target: String, code: i32 },

    /// A depfile could not be read after being brought up to date.
    #[error("cannot read depfile '{path}': {message}")]
    Depfile { path: String, message: String },

    /// Filesystem trouble outside of recipe execution.
    #[error("{path}: {message}")]
    Io { path: String, message: String },

    /// The user interrupted the build.
    #[error("interrupted")]
    Interrupted,

    /// A scheduler-internal invariant broke (task join failure and the
    /// like). Should not be reachable from well-formed input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProduceError {
    /// Build an `Io` variant from a path and a `std::io::Error`.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        ProduceError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProduceError>;
