//! Rules
//!
//! Everything between the rule file's text and an instantiated rule:
//! the file tokenizer, the `%{...}` interpolator, compiled head
//! patterns, and per-target instantiation.

pub mod instantiate;
pub mod interpolate;
pub mod pattern;
pub mod rulefile;

use indexmap::IndexMap;

use crate::errors::Result;
use crate::expr::{Env, Evaluator, Value};
use crate::rules::interpolate::{interpolate as expand, InterpolateOpts};
use crate::rules::pattern::Pattern;
use crate::rules::rulefile::RawRule;
use crate::words;

pub use instantiate::{attr_deps, instantiate};
pub use rulefile::{parse_rulefile, RuleFile};

/// What kind of thing a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A filesystem path; freshness comes from its mtime.
    File,
    /// A symbolic name; always out of date.
    Task,
}

/// A compiled, uninstantiated rule: the head pattern plus the ordered
/// attribute-value pairs as written. Order matters because later values
/// may reference earlier ones.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub line: usize,
    pub attrs: Vec<(String, String)>,
}

/// All rules of a file, in file order. Matching tries them first to
/// last; the first head that matches (and whose `cond` holds) wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile every raw rule's head against the globals.
    pub fn compile(
        raw: &[RawRule],
        globals: &Env,
        evaluator: &dyn Evaluator,
    ) -> Result<RuleSet> {
        let mut rules = Vec::with_capacity(raw.len());
        for r in raw {
            rules.push(Rule {
                pattern: Pattern::compile(&r.head, globals, evaluator)?,
                line: r.line,
                attrs: r.attrs.clone(),
            });
        }
        Ok(RuleSet { rules })
    }
}

/// An instantiated rule: every attribute interpolated for one concrete
/// target. Attribute names keep their dotted prefixes; declaration
/// order is preserved.
#[derive(Debug, Clone)]
pub struct IRule {
    pub target: String,
    pub kind: TargetKind,
    pub attrs: IndexMap<String, String>,
}

impl IRule {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn recipe(&self) -> Option<&str> {
        self.attr("recipe")
    }

    /// Interpreter for the recipe.
    pub fn shell(&self) -> &str {
        self.attr("shell").unwrap_or("bash")
    }

    pub fn depfile(&self) -> Option<&str> {
        self.attr("depfile")
    }

    /// Additional files the recipe produces besides the target itself.
    pub fn outputs(&self) -> Result<Vec<String>> {
        match self.attr("outputs") {
            Some(list) => words::split_quoted(list),
            None => Ok(Vec::new()),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == TargetKind::File
    }
}

/// Fold the globals section into an environment.
///
/// Two passes around the prelude: the first tolerates unknown names and
/// preserves `%%` (a value may reference a name the prelude defines, or
/// be re-scanned as a pattern later); then the `prelude` global — raw
/// code, exempt from interpolation — runs; the second pass interpolates
/// every value strictly against the completed environment.
pub fn fold_globals(
    pairs: &[(String, String)],
    evaluator: &dyn Evaluator,
) -> Result<Env> {
    let mut env = Env::new();

    let first = InterpolateOpts {
        ignore_undefined: true,
        keep_escaped: true,
    };
    for (name, raw) in pairs {
        if name == "prelude" {
            continue;
        }
        let value = expand(raw, &env, evaluator, first)?;
        env.set(name.clone(), Value::Str(value));
    }

    if let Some((_, code)) = pairs.iter().find(|(name, _)| name == "prelude") {
        evaluator
            .run_prelude(code, &mut env)
            .map_err(|source| crate::errors::ProduceError::Expr {
                expr: "prelude".to_string(),
                source,
            })?;
    }

    for (name, raw) in pairs {
        if name == "prelude" {
            continue;
        }
        let value = expand(raw, &env, evaluator, InterpolateOpts::default())?;
        env.set(name.clone(), Value::Str(value));
    }

    Ok(env)
}
