//! Word Splitting and Quoting
//!
//! Shell-style helpers used wherever a rule attribute holds a list of
//! paths: `deps`, `outputs`, and the `default` global are split with
//! `split_quoted`, and list values interpolated into recipes are joined
//! back with `join_quoted`.

use crate::errors::{ProduceError, Result};

/// Split a string into whitespace-separated words, honoring single
/// quotes, double quotes, and backslash escapes.
///
/// Single quotes preserve everything up to the closing quote. Inside
/// double quotes a backslash escapes `"`, `\`, `$` and `` ` `` and is
/// kept literally before anything else. Outside quotes a backslash
/// escapes the next character.
pub fn split_quoted(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(input)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(e @ ('"' | '\\' | '$' | '`')) => current.push(e),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(unterminated(input)),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(input)),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => {
                        return Err(ProduceError::Config(format!(
                            "trailing backslash in '{}'",
                            input
                        )))
                    }
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn unterminated(input: &str) -> ProduceError {
    ProduceError::Config(format!("unterminated quote in '{}'", input))
}

/// Characters that never need quoting when handed to a shell.
fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-' | '~')
}

/// Quote a single word for safe reuse as shell input.
///
/// Plain words pass through untouched; anything else is wrapped in single
/// quotes, with embedded single quotes spliced as `'\''`.
pub fn quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_safe_char) {
        return value.to_string();
    }
    let mut result = String::from("'");
    for c in value.chars() {
        if c == '\'' {
            result.push_str("'\\''");
        } else {
            result.push(c);
        }
    }
    result.push('\'');
    result
}

/// Quote each word and join with single spaces.
pub fn join_quoted<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| quote(s.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_whitespace() {
        assert_eq!(
            split_quoted("a b  c\td").unwrap(),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn test_split_empty_input() {
        assert_eq!(split_quoted("").unwrap(), Vec::<String>::new());
        assert_eq!(split_quoted("   ").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_split_single_quotes() {
        assert_eq!(
            split_quoted("'a b' c").unwrap(),
            vec!["a b", "c"]
        );
    }

    #[test]
    fn test_split_double_quotes_with_escape() {
        assert_eq!(
            split_quoted(r#""a \"b\" c" d"#).unwrap(),
            vec![r#"a "b" c"#, "d"]
        );
    }

    #[test]
    fn test_split_backslash_outside_quotes() {
        assert_eq!(split_quoted(r"a\ b c").unwrap(), vec!["a b", "c"]);
    }

    #[test]
    fn test_split_adjacent_quoted_parts_form_one_word() {
        assert_eq!(split_quoted("'a'\"b\"c").unwrap(), vec!["abc"]);
    }

    #[test]
    fn test_split_empty_quoted_word_is_kept() {
        assert_eq!(split_quoted("'' b").unwrap(), vec!["", "b"]);
    }

    #[test]
    fn test_split_unterminated_quote_errors() {
        assert!(split_quoted("'abc").is_err());
        assert!(split_quoted("\"abc").is_err());
    }

    #[test]
    fn test_quote_plain_word_untouched() {
        assert_eq!(quote("a/b-c.d"), "a/b-c.d");
    }

    #[test]
    fn test_quote_empty_string() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_word_with_space() {
        assert_eq!(quote("a b"), "'a b'");
    }

    #[test]
    fn test_quote_word_with_single_quote() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_join_quoted() {
        assert_eq!(
            join_quoted(["plain", "two words"]),
            "plain 'two words'"
        );
    }

    #[test]
    fn test_split_round_trips_join() {
        let words = vec!["a".to_string(), "b c".to_string(), "d'e".to_string()];
        assert_eq!(split_quoted(&join_quoted(&words)).unwrap(), words);
    }
}
