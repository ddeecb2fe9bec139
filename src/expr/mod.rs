//! Embedded Expression Language
//!
//! Rule files interpolate `%{...}` holes whose contents are expressions
//! evaluated against a per-target variable environment. The engine only
//! talks to the sublanguage through the `Evaluator` trait; the concrete
//! `ExprEvaluator` implements a small language (literals, arithmetic,
//! comparisons, subscripts, tuples, builtin functions) in the shape of a
//! lexer, a recursive-descent parser, and a tree-walking evaluator.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod types;

pub use eval::ExprEvaluator;
pub use types::{Env, EvalError, Value};

/// Pluggable expression evaluation.
///
/// The interpolator requires that `EvalError::Syntax` is distinguishable
/// from the semantic kinds: trial evaluation probes successive candidate
/// closing braces and treats only a non-syntax result as terminating.
pub trait Evaluator: Send + Sync {
    /// Evaluate one expression against an environment.
    fn evaluate(&self, expr: &str, env: &Env) -> Result<Value, EvalError>;

    /// Execute a prelude code block, binding any names it defines into
    /// the environment. Used once at startup for user-defined helpers.
    fn run_prelude(&self, code: &str, env: &mut Env) -> Result<(), EvalError>;
}
