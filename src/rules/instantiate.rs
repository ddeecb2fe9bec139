//! Rule Instantiation
//!
//! Given a target name, find the first rule whose head matches and
//! build the instantiated rule: every attribute interpolated in
//! declaration order against an environment that grows as it goes.
//! Targets that match no rule but exist on disk become ingredients.

use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::{ProduceError, Result};
use crate::expr::{Env, Evaluator, Value};
use crate::rules::interpolate::{interpolate, InterpolateOpts};
use crate::rules::{IRule, Rule, RuleSet, TargetKind};
use crate::words;

/// Instantiate the first matching rule for `target`.
///
/// A rule whose interpolated `cond` is falsey is skipped and the search
/// falls through to the next matching rule. If nothing matches and the
/// target names an existing file, a dependency-less ingredient rule is
/// synthesized.
pub fn instantiate(
    target: &str,
    rules: &RuleSet,
    globals: &Env,
    evaluator: &dyn Evaluator,
) -> Result<IRule> {
    for rule in &rules.rules {
        let captures = match rule.pattern.matches(target) {
            Some(captures) => captures,
            None => continue,
        };
        match instantiate_rule(target, rule, captures, globals, evaluator)? {
            Some(irule) => return Ok(irule),
            None => {
                debug!(target, head = %rule.pattern.head, "rule skipped: cond is false");
                continue;
            }
        }
    }

    if Path::new(target).exists() {
        debug!(target, "no rule matched; using existing file as ingredient");
        return Ok(IRule {
            target: target.to_string(),
            kind: TargetKind::File,
            attrs: IndexMap::new(),
        });
    }

    Err(ProduceError::NoRule(target.to_string()))
}

/// Build the irule for one matched rule, or `None` when its `cond`
/// evaluates falsey.
fn instantiate_rule(
    target: &str,
    rule: &Rule,
    captures: std::collections::HashMap<String, String>,
    globals: &Env,
    evaluator: &dyn Evaluator,
) -> Result<Option<IRule>> {
    let mut env = globals.clone();
    for (name, value) in captures {
        env.set(name, Value::Str(value));
    }
    env.set("target", Value::Str(target.to_string()));

    let mut attrs: IndexMap<String, String> = IndexMap::new();
    for (name, raw) in &rule.attrs {
        let local = name.rsplit('.').next().unwrap_or(name);
        if local == "target" {
            return Err(ProduceError::Config(format!(
                "rule '{}' (line {}) may not assign 'target'",
                rule.pattern.head, rule.line
            )));
        }
        let value = interpolate(raw, &env, evaluator, InterpolateOpts::default())?;
        attrs.insert(name.clone(), value.clone());
        env.set(local.to_string(), Value::Str(value));
    }

    if let Some(cond) = attrs.get("cond") {
        let value = evaluator
            .evaluate(cond, &Env::new())
            .map_err(|source| ProduceError::Expr {
                expr: cond.clone(),
                source,
            })?;
        if !value.is_truthy() {
            return Ok(None);
        }
    }

    let kind = match attrs.get("type").map(String::as_str) {
        None | Some("file") => TargetKind::File,
        Some("task") => TargetKind::Task,
        Some(other) => {
            return Err(ProduceError::Config(format!(
                "unknown type '{}' for target '{}'",
                other, target
            )))
        }
    };

    Ok(Some(IRule {
        target: target.to_string(),
        kind,
        attrs,
    }))
}

/// Direct dependencies declared by the irule's attributes: every
/// `dep.*` value in declaration order, then the words of `deps`. The
/// depfile contribution is handled by the graph, which must bring the
/// depfile up to date before reading it.
pub fn attr_deps(irule: &IRule) -> Result<Vec<String>> {
    let mut deps = Vec::new();
    for (name, value) in &irule.attrs {
        if name == "dep" || name.starts_with("dep.") {
            deps.push(value.clone());
        }
    }
    if let Some(list) = irule.attr("deps") {
        deps.extend(words::split_quoted(list)?);
    }
    Ok(deps)
}
