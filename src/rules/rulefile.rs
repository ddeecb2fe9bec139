//! Rule-File Tokenizer
//!
//! Turns the text of a rule file into the leading globals section plus a
//! list of raw rules: (head, ordered attribute-value pairs). Handles
//! comments, attribute continuation lines, and blank lines inside
//! values, reporting syntax errors with line numbers.

use lazy_static::lazy_static;
use regex_lite::Regex;

use crate::errors::{ProduceError, Result};

lazy_static! {
    static ref SECTION_RE: Regex = Regex::new(r"^\[(.*)\]\s*$").unwrap();
    static ref ATTR_RE: Regex = Regex::new(r"^(\S+?)\s*=\s*(.*)$").unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"^\s*#").unwrap();
}

/// One `[head]` section with its attribute-value pairs in file order.
#[derive(Debug, Clone)]
pub struct RawRule {
    pub head: String,
    /// Line number of the section header, for error reporting.
    pub line: usize,
    pub attrs: Vec<(String, String)>,
}

/// A parsed rule file: the globals from the leading unnamed section,
/// plus every rule section in order.
#[derive(Debug, Clone, Default)]
pub struct RuleFile {
    pub globals: Vec<(String, String)>,
    pub rules: Vec<RawRule>,
}

struct FileParser<'a> {
    file: &'a str,
    out: RuleFile,
    current: Option<RawRule>,
    seen_sections: usize,
    /// Continuation indent for the attribute currently being extended,
    /// fixed by its first continuation line.
    indent: Option<String>,
    /// Blank lines seen since the last content line; they only count if
    /// another continuation follows.
    pending_blanks: usize,
}

impl<'a> FileParser<'a> {
    fn new(file: &'a str) -> Self {
        Self {
            file,
            out: RuleFile::default(),
            current: None,
            seen_sections: 0,
            indent: None,
            pending_blanks: 0,
        }
    }

    fn err(&self, line: usize, message: impl Into<String>) -> ProduceError {
        ProduceError::Parse {
            file: self.file.to_string(),
            line,
            message: message.into(),
        }
    }

    fn flush_section(&mut self) {
        if let Some(section) = self.current.take() {
            if section.head.is_empty() {
                self.out.globals = section.attrs;
            } else {
                self.out.rules.push(section);
            }
        }
    }

    /// Is there an attribute value open for continuation?
    fn in_value(&self) -> bool {
        self.current
            .as_ref()
            .map(|s| !s.attrs.is_empty())
            .unwrap_or(false)
    }

    fn extend_value(&mut self, line: &str) {
        let stripped = match &self.indent {
            None => {
                let body = line.trim_start_matches([' ', '\t']);
                let indent = line[..line.len() - body.len()].to_string();
                self.indent = Some(indent);
                body
            }
            Some(indent) => strip_indent(line, indent),
        };
        if let Some(section) = self.current.as_mut() {
            if let Some((_, value)) = section.attrs.last_mut() {
                for _ in 0..self.pending_blanks {
                    value.push('\n');
                }
                value.push('\n');
                value.push_str(stripped);
            }
        }
        self.pending_blanks = 0;
    }

    fn parse(mut self, text: &str) -> Result<RuleFile> {
        for (index, line) in text.lines().enumerate() {
            let lineno = index + 1;

            if let Some(caps) = SECTION_RE.captures(line) {
                let head = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
                if head.is_empty() && self.seen_sections > 0 {
                    return Err(
                        self.err(lineno, "globals section must be the first section")
                    );
                }
                self.flush_section();
                self.current = Some(RawRule {
                    head,
                    line: lineno,
                    attrs: Vec::new(),
                });
                self.seen_sections += 1;
                self.indent = None;
                self.pending_blanks = 0;
                continue;
            }

            if line.trim().is_empty() {
                if self.in_value() {
                    self.pending_blanks += 1;
                }
                continue;
            }

            // An indented line extends the open value; this outranks the
            // comment rule so shell comments inside recipes survive.
            if line.starts_with([' ', '\t']) && self.in_value() {
                self.extend_value(line);
                continue;
            }

            if COMMENT_RE.is_match(line) {
                continue;
            }

            if let Some(caps) = ATTR_RE.captures(line) {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
                let value = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
                match self.current.as_mut() {
                    Some(section) => section.attrs.push((name, value)),
                    None => {
                        return Err(self.err(lineno, "attribute outside of a section"));
                    }
                }
                self.indent = None;
                self.pending_blanks = 0;
                continue;
            }

            return Err(self.err(lineno, format!("cannot parse line '{}'", line.trim_end())));
        }

        self.flush_section();
        Ok(self.out)
    }
}

/// Strip as much of `indent` as the line actually starts with.
fn strip_indent<'l>(line: &'l str, indent: &str) -> &'l str {
    let mut rest = line;
    for c in indent.chars() {
        match rest.strip_prefix(c) {
            Some(r) => rest = r,
            None => break,
        }
    }
    rest
}

/// Parse rule-file text. `file` is only used in error messages.
pub fn parse_rulefile(file: &str, text: &str) -> Result<RuleFile> {
    FileParser::new(file).parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<RuleFile> {
        parse_rulefile("test.ini", text)
    }

    #[test]
    fn test_single_rule() {
        let rf = parse("[out]\nrecipe = echo hi > out\n").unwrap();
        assert!(rf.globals.is_empty());
        assert_eq!(rf.rules.len(), 1);
        assert_eq!(rf.rules[0].head, "out");
        assert_eq!(
            rf.rules[0].attrs,
            vec![("recipe".to_string(), "echo hi > out".to_string())]
        );
    }

    #[test]
    fn test_globals_section() {
        let rf = parse("[]\ncc = gcc\nflags = -O2\n\n[out]\nrecipe = true\n").unwrap();
        assert_eq!(
            rf.globals,
            vec![
                ("cc".to_string(), "gcc".to_string()),
                ("flags".to_string(), "-O2".to_string())
            ]
        );
        assert_eq!(rf.rules.len(), 1);
    }

    #[test]
    fn test_globals_not_first_is_error() {
        let err = parse("[out]\nrecipe = true\n[]\nx = 1\n").unwrap_err();
        assert!(err.to_string().contains("first section"));
    }

    #[test]
    fn test_attribute_before_any_section_is_error() {
        assert!(parse("x = 1\n[out]\n").is_err());
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let rf = parse("# header\n\n[out]\n# note\nrecipe = true\n").unwrap();
        assert_eq!(rf.rules[0].attrs.len(), 1);
    }

    #[test]
    fn test_continuation_strips_first_line_indent() {
        let rf = parse("[out]\nrecipe =\n    echo one\n    echo two\n").unwrap();
        assert_eq!(rf.rules[0].attrs[0].1, "\necho one\necho two");
    }

    #[test]
    fn test_continuation_with_deeper_indent_keeps_extra() {
        let rf = parse("[out]\nrecipe =\n  if true; then\n    echo deep\n  fi\n").unwrap();
        assert_eq!(rf.rules[0].attrs[0].1, "\nif true; then\n  echo deep\nfi");
    }

    #[test]
    fn test_blank_line_inside_value_contributes_separator() {
        let rf = parse("[out]\nrecipe =\n    echo one\n\n    echo two\n").unwrap();
        assert_eq!(rf.rules[0].attrs[0].1, "\necho one\n\necho two");
    }

    #[test]
    fn test_trailing_blank_lines_do_not_extend_value() {
        let rf = parse("[out]\nrecipe =\n    echo one\n\n\n[two]\nrecipe = true\n").unwrap();
        assert_eq!(rf.rules[0].attrs[0].1, "\necho one");
    }

    #[test]
    fn test_indented_shell_comment_stays_in_recipe() {
        let rf = parse("[out]\nrecipe =\n    # inline note\n    echo hi\n").unwrap();
        assert_eq!(rf.rules[0].attrs[0].1, "\n# inline note\necho hi");
    }

    #[test]
    fn test_value_on_same_line_then_continuation() {
        let rf = parse("[out]\ndeps = a b\n    c d\n").unwrap();
        assert_eq!(rf.rules[0].attrs[0].1, "a b\nc d");
    }

    #[test]
    fn test_dotted_attribute_names() {
        let rf = parse("[a]\ndep.main = b\ndep.extra = c\n").unwrap();
        assert_eq!(
            rf.rules[0].attrs,
            vec![
                ("dep.main".to_string(), "b".to_string()),
                ("dep.extra".to_string(), "c".to_string())
            ]
        );
    }

    #[test]
    fn test_unparseable_line_reports_number() {
        let err = parse("[out]\nrecipe = true\n!!!\n").unwrap_err();
        assert_eq!(err.to_string(), "test.ini:3: cannot parse line '!!!'");
    }

    #[test]
    fn test_multiple_rules_keep_order() {
        let rf = parse("[a]\nrecipe = one\n[b]\nrecipe = two\n").unwrap();
        let heads: Vec<&str> = rf.rules.iter().map(|r| r.head.as_str()).collect();
        assert_eq!(heads, vec!["a", "b"]);
    }
}
