//! Rule-Head Patterns
//!
//! A rule head is either a slash-delimited raw regular expression or a
//! template with `%{name}` holes. Template heads are first expanded
//! against the globals (tolerating unknown names, preserving `%%`), then
//! every surviving hole becomes a named capture group and everything
//! else is matched literally. Both forms are anchored to the full
//! target name.

use std::collections::HashMap;

use regex_lite::Regex;

use crate::errors::{ProduceError, Result};
use crate::expr::{Env, Evaluator};
use crate::rules::interpolate::{interpolate, InterpolateOpts};

/// A compiled rule head.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The head text as written in the rule file.
    pub head: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a rule head against the globals environment.
    pub fn compile(head: &str, globals: &Env, evaluator: &dyn Evaluator) -> Result<Pattern> {
        let source = if is_raw_regex(head) {
            head[1..head.len() - 1].to_string()
        } else {
            template_to_regex(head, globals, evaluator)?
        };
        let anchored = format!("^(?:{})$", source);
        let regex = Regex::new(&anchored).map_err(|e| {
            ProduceError::Config(format!("invalid regex in rule head '{}': {}", head, e))
        })?;
        Ok(Pattern {
            head: head.to_string(),
            regex,
        })
    }

    /// Match a target name. On success, returns the named captures with
    /// non-participating groups defaulted to the empty string.
    pub fn matches(&self, target: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(target)?;
        let mut vars = HashMap::new();
        for name in self.regex.capture_names().flatten() {
            let value = caps
                .name(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            vars.insert(name.to_string(), value);
        }
        Some(vars)
    }
}

fn is_raw_regex(head: &str) -> bool {
    head.len() >= 2 && head.starts_with('/') && head.ends_with('/')
}

fn is_valid_hole_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Translate an expanded template head into regex source: `%{name}` →
/// named capture group, `%%` → literal `%`, anything else escaped.
fn template_to_regex(head: &str, globals: &Env, evaluator: &dyn Evaluator) -> Result<String> {
    let opts = InterpolateOpts {
        ignore_undefined: true,
        keep_escaped: true,
    };
    let expanded = interpolate(head, globals, evaluator, opts)?;

    let chars: Vec<char> = expanded.chars().collect();
    let mut source = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            push_escaped(&mut source, chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('%') => {
                source.push('%');
                i += 2;
            }
            Some('{') => {
                let start = i + 2;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|off| start + off)
                    .ok_or_else(|| {
                        ProduceError::Config(format!("unclosed hole in rule head '{}'", head))
                    })?;
                let name: String = chars[start..end].iter().collect();
                if !is_valid_hole_name(&name) {
                    return Err(ProduceError::Config(format!(
                        "pattern hole '%{{{}}}' in rule head '{}' is not a plain name",
                        name, head
                    )));
                }
                source.push_str(&format!("(?<{}>.*)", name));
                i = end + 1;
            }
            _ => {
                return Err(ProduceError::Config(format!(
                    "stray '%' in rule head '{}'",
                    head
                )))
            }
        }
    }
    Ok(source)
}

fn push_escaped(out: &mut String, c: char) {
    if matches!(
        c,
        '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
    ) {
        out.push('\\');
    }
    out.push(c);
}
