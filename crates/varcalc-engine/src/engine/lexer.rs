use crate::error::{FormulaError, Result};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Num(f64),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Question,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Eof,
}

pub(crate) struct Lexer<'a> {
    src: &'a str,
    i: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, i: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.i..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.i..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.i += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.i += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }

    /// Returns the next token and the byte offset it starts at.
    pub(crate) fn next_token(&mut self) -> Result<(Token, usize)> {
        self.skip_ws();
        let start = self.i;
        let Some(c) = self.bump() else {
            return Ok((Token::Eof, start));
        };
        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            ':' => Token::Colon,
            '?' => Token::Question,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' => {
                if !self.eat('=') {
                    return Err(FormulaError::parse(start, "expected '==' but found '='"));
                }
                if self.eat('=') {
                    Token::StrictEq
                } else {
                    Token::EqEq
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::StrictNotEq
                    } else {
                        Token::NotEq
                    }
                } else {
                    Token::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else if self.eat('>') {
                    Token::NotEq
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '&' => {
                if !self.eat('&') {
                    return Err(FormulaError::parse(start, "expected '&&'"));
                }
                Token::AndAnd
            }
            '|' => {
                if !self.eat('|') {
                    return Err(FormulaError::parse(start, "expected '||'"));
                }
                Token::OrOr
            }
            '"' | '\'' => Token::Str(self.string(c, start)?),
            c if c.is_ascii_digit() => self.number(start)?,
            '.' if self.peek().is_some_and(|d| d.is_ascii_digit()) => self.number(start)?,
            c if c.is_ascii_alphabetic() || c == '_' => {
                while let Some(n) = self.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        self.i += 1;
                    } else {
                        break;
                    }
                }
                Token::Ident(self.src[start..self.i].to_string())
            }
            other => {
                return Err(FormulaError::parse(
                    start,
                    format!("unexpected character '{}'", other),
                ));
            }
        };
        Ok((token, start))
    }

    fn number(&mut self, start: usize) -> Result<Token> {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.i += 1;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.i += digit_at;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.i += 1;
                }
            }
        }
        let text = &self.src[start..self.i];
        text.parse::<f64>()
            .map(Token::Num)
            .map_err(|_| FormulaError::parse(start, format!("invalid number '{}'", text)))
    }

    fn string(&mut self, quote: char, start: usize) -> Result<String> {
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(FormulaError::parse(start, "unterminated string literal"));
            };
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(escaped) = self.bump() else {
                return Err(FormulaError::parse(start, "unterminated string literal"));
            };
            match escaped {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => {
                    let hex_end = self.i + 4;
                    let code = self
                        .src
                        .get(self.i..hex_end)
                        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                        .and_then(char::from_u32)
                        .ok_or_else(|| FormulaError::parse(self.i, "invalid unicode escape"))?;
                    self.i = hex_end;
                    out.push(code);
                }
                other => out.push(other),
            }
        }
    }
}
