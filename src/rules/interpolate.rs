//! Template Interpolation
//!
//! Resolves `%{...}` holes and `%%` escapes in a template string against
//! a variable environment. Because a hole's expression may itself contain
//! `}` (inside a string literal or a subscript), the closing brace is
//! found by trial evaluation: each candidate `}` is probed in turn and
//! the first one whose contents evaluate to something other than a
//! syntax error ends the hole.

use crate::errors::{ProduceError, Result};
use crate::expr::{Env, EvalError, Evaluator};

/// Interpolation modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolateOpts {
    /// Reinsert `%{...}` verbatim when its expression hits an unknown
    /// name, instead of failing. Used for pattern heads and the first
    /// globals-folding pass.
    pub ignore_undefined: bool,
    /// Preserve `%%` as-is instead of collapsing it to `%`. Used when
    /// the result will be scanned again as a pattern.
    pub keep_escaped: bool,
}

/// Expand a template against an environment.
pub fn interpolate(
    template: &str,
    env: &Env,
    evaluator: &dyn Evaluator,
    opts: InterpolateOpts,
) -> Result<String> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('%') => {
                out.push_str(if opts.keep_escaped { "%%" } else { "%" });
                i += 2;
            }
            Some('{') => {
                i = expand_hole(&chars, i + 2, env, evaluator, opts, &mut out)?;
            }
            _ => {
                return Err(ProduceError::Config(format!(
                    "stray '%' in template '{}'",
                    template
                )))
            }
        }
    }

    Ok(out)
}

/// Expand one hole whose contents start at `start` (just past `%{`).
/// Returns the index of the first character after the consumed hole.
fn expand_hole(
    chars: &[char],
    start: usize,
    env: &Env,
    evaluator: &dyn Evaluator,
    opts: InterpolateOpts,
    out: &mut String,
) -> Result<usize> {
    let mut j = start;
    while j < chars.len() {
        if chars[j] != '}' {
            j += 1;
            continue;
        }
        let inner: String = chars[start..j].iter().collect();
        // Parenthesized so a bare comma-separated tuple is accepted.
        match evaluator.evaluate(&format!("({})", inner), env) {
            Ok(value) => {
                // Value::Display renders lists as shell-quoted words.
                out.push_str(&value.to_string());
                return Ok(j + 1);
            }
            Err(EvalError::Syntax(_)) => {
                // The candidate brace was inside the expression; keep
                // scanning for the real one.
                j += 1;
            }
            Err(EvalError::Name(_)) if opts.ignore_undefined => {
                out.push_str("%{");
                out.push_str(&inner);
                out.push('}');
                return Ok(j + 1);
            }
            Err(source) => {
                return Err(ProduceError::Expr {
                    expr: inner,
                    source,
                })
            }
        }
    }
    let rest: String = chars[start..].iter().collect();
    Err(ProduceError::Expr {
        expr: rest,
        source: EvalError::Syntax("unparseable expression".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ExprEvaluator, Value};

    fn env_with(pairs: &[(&str, Value)]) -> Env {
        let mut env = Env::new();
        for (k, v) in pairs {
            env.set(*k, v.clone());
        }
        env
    }

    fn expand(template: &str, env: &Env) -> Result<String> {
        interpolate(template, env, &ExprEvaluator::new(), InterpolateOpts::default())
    }

    #[test]
    fn test_identity_without_percent() {
        let env = Env::new();
        assert_eq!(expand("plain text, no holes", &env).unwrap(), "plain text, no holes");
    }

    #[test]
    fn test_percent_escape() {
        let env = Env::new();
        assert_eq!(expand("100%% done", &env).unwrap(), "100% done");
    }

    #[test]
    fn test_keep_escaped_preserves_escapes() {
        let env = Env::new();
        let opts = InterpolateOpts {
            keep_escaped: true,
            ..Default::default()
        };
        let result = interpolate("100%% done", &env, &ExprEvaluator::new(), opts).unwrap();
        assert_eq!(result, "100%% done");
    }

    #[test]
    fn test_simple_hole() {
        let env = env_with(&[("name", Value::Str("world".to_string()))]);
        assert_eq!(expand("hello %{name}!", &env).unwrap(), "hello world!");
    }

    #[test]
    fn test_expression_hole() {
        let env = env_with(&[("n", Value::Str("3".to_string()))]);
        assert_eq!(expand("next is %{n + 1}", &env).unwrap(), "next is 4");
    }

    #[test]
    fn test_brace_inside_string_literal() {
        // The first candidate '}' sits inside the string literal; trial
        // evaluation must skip past it.
        let env = Env::new();
        assert_eq!(expand("x%{'a}b'}y", &env).unwrap(), "xa}by");
    }

    #[test]
    fn test_list_value_is_quoted_and_joined() {
        let env = env_with(&[(
            "files",
            Value::List(vec![
                Value::Str("a.txt".to_string()),
                Value::Str("b c.txt".to_string()),
            ]),
        )]);
        assert_eq!(expand("cat %{files}", &env).unwrap(), "cat a.txt 'b c.txt'");
    }

    #[test]
    fn test_tuple_hole() {
        let env = env_with(&[("a", Value::Str("x".to_string()))]);
        assert_eq!(expand("%{a, 'y'}", &env).unwrap(), "x y");
    }

    #[test]
    fn test_undefined_name_fails_by_default() {
        let env = Env::new();
        assert!(matches!(
            expand("%{nope}", &env),
            Err(ProduceError::Expr { .. })
        ));
    }

    #[test]
    fn test_ignore_undefined_reinserts_hole() {
        let env = env_with(&[("known", Value::Str("K".to_string()))]);
        let opts = InterpolateOpts {
            ignore_undefined: true,
            ..Default::default()
        };
        let result =
            interpolate("%{known}-%{unknown}", &env, &ExprEvaluator::new(), opts).unwrap();
        assert_eq!(result, "K-%{unknown}");
    }

    #[test]
    fn test_stray_percent_is_fatal() {
        let env = Env::new();
        assert!(expand("50% off", &env).is_err());
    }

    #[test]
    fn test_unparseable_hole() {
        let env = Env::new();
        let err = expand("%{'open", &env).unwrap_err();
        assert!(err.to_string().contains("unparseable expression"));
    }

    #[test]
    fn test_semantic_error_is_fatal_even_when_ignoring_undefined() {
        let env = env_with(&[("n", Value::Num(1.0))]);
        let opts = InterpolateOpts {
            ignore_undefined: true,
            ..Default::default()
        };
        assert!(interpolate("%{n / 0}", &env, &ExprEvaluator::new(), opts).is_err());
    }
}
