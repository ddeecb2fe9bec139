//! Expression Lexer
//!
//! Tokenizes an expression string into a stream of tokens ending with Eof.

use super::types::{EvalError, Token, TokenType};

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> char {
        if self.pos + offset < self.chars.len() {
            self.chars[self.pos + offset]
        } else {
            '\0'
        }
    }

    fn advance(&mut self) -> char {
        let ch = self.peek(0);
        if self.pos < self.chars.len() {
            self.pos += 1;
        }
        ch
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn make(&self, token_type: TokenType, value: impl Into<String>, pos: usize) -> Token {
        Token {
            token_type,
            value: value.into(),
            pos,
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        while self.peek(0).is_ascii_digit() {
            self.advance();
        }
        if self.peek(0) == '.' && self.peek(1).is_ascii_digit() {
            self.advance();
            while self.peek(0).is_ascii_digit() {
                self.advance();
            }
        }
        if (self.peek(0) == 'e' || self.peek(0) == 'E')
            && (self.peek(1).is_ascii_digit()
                || ((self.peek(1) == '+' || self.peek(1) == '-') && self.peek(2).is_ascii_digit()))
        {
            self.advance();
            if self.peek(0) == '+' || self.peek(0) == '-' {
                self.advance();
            }
            while self.peek(0).is_ascii_digit() {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.make(TokenType::Number, text, start)
    }

    fn read_string(&mut self, delim: char) -> Result<Token, EvalError> {
        let start = self.pos;
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(EvalError::Syntax(format!(
                    "unterminated string starting at position {}",
                    start
                )));
            }
            let ch = self.advance();
            if ch == delim {
                break;
            }
            if ch == '\\' {
                let esc = self.advance();
                match esc {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '\0' => {
                        return Err(EvalError::Syntax(
                            "unterminated escape in string".to_string(),
                        ))
                    }
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            } else {
                value.push(ch);
            }
        }
        Ok(self.make(TokenType::Str, value, start))
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while self.peek(0).is_ascii_alphanumeric() || self.peek(0) == '_' {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let token_type = match text.as_str() {
            "True" | "true" => TokenType::True,
            "False" | "false" => TokenType::False,
            _ => TokenType::Ident,
        };
        self.make(token_type, text, start)
    }
}

/// Tokenize an expression string.
pub fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();

    while !lexer.is_at_end() {
        let pos = lexer.pos;
        let ch = lexer.peek(0);
        match ch {
            c if c.is_whitespace() => {
                lexer.advance();
            }
            c if c.is_ascii_digit() => tokens.push(lexer.read_number()),
            '\'' | '"' => tokens.push(lexer.read_string(ch)?),
            c if c.is_ascii_alphabetic() || c == '_' => tokens.push(lexer.read_ident()),
            '+' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Plus, "+", pos));
            }
            '-' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Minus, "-", pos));
            }
            '*' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Star, "*", pos));
            }
            '/' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Slash, "/", pos));
            }
            '%' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Percent, "%", pos));
            }
            '=' => {
                lexer.advance();
                if lexer.peek(0) == '=' {
                    lexer.advance();
                    tokens.push(lexer.make(TokenType::EqEq, "==", pos));
                } else {
                    return Err(EvalError::Syntax(format!(
                        "unexpected '=' at position {}",
                        pos
                    )));
                }
            }
            '!' => {
                lexer.advance();
                if lexer.peek(0) == '=' {
                    lexer.advance();
                    tokens.push(lexer.make(TokenType::Ne, "!=", pos));
                } else {
                    tokens.push(lexer.make(TokenType::Not, "!", pos));
                }
            }
            '<' => {
                lexer.advance();
                if lexer.peek(0) == '=' {
                    lexer.advance();
                    tokens.push(lexer.make(TokenType::Le, "<=", pos));
                } else {
                    tokens.push(lexer.make(TokenType::Lt, "<", pos));
                }
            }
            '>' => {
                lexer.advance();
                if lexer.peek(0) == '=' {
                    lexer.advance();
                    tokens.push(lexer.make(TokenType::Ge, ">=", pos));
                } else {
                    tokens.push(lexer.make(TokenType::Gt, ">", pos));
                }
            }
            '&' => {
                lexer.advance();
                if lexer.peek(0) == '&' {
                    lexer.advance();
                    tokens.push(lexer.make(TokenType::AndAnd, "&&", pos));
                } else {
                    return Err(EvalError::Syntax(format!(
                        "unexpected '&' at position {}",
                        pos
                    )));
                }
            }
            '|' => {
                lexer.advance();
                if lexer.peek(0) == '|' {
                    lexer.advance();
                    tokens.push(lexer.make(TokenType::OrOr, "||", pos));
                } else {
                    return Err(EvalError::Syntax(format!(
                        "unexpected '|' at position {}",
                        pos
                    )));
                }
            }
            '?' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Question, "?", pos));
            }
            ':' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Colon, ":", pos));
            }
            ',' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::Comma, ",", pos));
            }
            '(' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::LParen, "(", pos));
            }
            ')' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::RParen, ")", pos));
            }
            '[' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::LBracket, "[", pos));
            }
            ']' => {
                lexer.advance();
                tokens.push(lexer.make(TokenType::RBracket, "]", pos));
            }
            other => {
                return Err(EvalError::Syntax(format!(
                    "unexpected character '{}' at position {}",
                    other, pos
                )))
            }
        }
    }

    tokens.push(Token {
        token_type: TokenType::Eof,
        value: String::new(),
        pos: lexer.pos,
    });
    Ok(tokens)
}
