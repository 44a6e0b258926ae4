//! Recursive-descent parser for the formula expression language.
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, equality, relational,
//! additive, multiplicative, unary, primary. A single trailing `;` is
//! accepted so function bodies can be written statement-style.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{Lexer, Token};
use crate::error::{FormulaError, Result};
use crate::value::Value;

/// Parse `src` into an expression tree.
pub fn parse_expression(src: &str) -> Result<Expr> {
    Parser::new(src)?.parse()
}

struct Parser<'a> {
    lex: Lexer<'a>,
    look: Token,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self> {
        let mut lex = Lexer::new(src);
        let (look, pos) = lex.next_token()?;
        Ok(Self { lex, look, pos })
    }

    fn bump(&mut self) -> Result<Token> {
        let (next, pos) = self.lex.next_token()?;
        self.pos = pos;
        Ok(std::mem::replace(&mut self.look, next))
    }

    fn expect(&mut self, t: &Token, what: &str) -> Result<()> {
        if std::mem::discriminant(&self.look) == std::mem::discriminant(t) {
            self.bump()?;
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> FormulaError {
        let found = match &self.look {
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        };
        FormulaError::parse(self.pos, format!("expected {}, found {}", what, found))
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.conditional()?;
        if self.look == Token::Semicolon {
            self.bump()?;
        }
        if self.look != Token::Eof {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expr)
    }

    fn conditional(&mut self) -> Result<Expr> {
        let cond = self.or_expr()?;
        if self.look != Token::Question {
            return Ok(cond);
        }
        self.bump()?;
        let then_e = self.conditional()?;
        self.expect(&Token::Colon, "':'")?;
        let else_e = self.conditional()?;
        Ok(Expr::Conditional(
            Box::new(cond),
            Box::new(then_e),
            Box::new(else_e),
        ))
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut node = self.and_expr()?;
        while self.look == Token::OrOr {
            self.bump()?;
            let rhs = self.and_expr()?;
            node = Expr::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut node = self.equality()?;
        while self.look == Token::AndAnd {
            self.bump()?;
            let rhs = self.equality()?;
            node = Expr::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut node = next(self)?;
        while let Some(op) = ops
            .iter()
            .find(|(tok, _)| *tok == self.look)
            .map(|(_, op)| *op)
        {
            self.bump()?;
            let rhs = next(self)?;
            node = Expr::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Token::EqEq, BinaryOp::Eq),
                (Token::NotEq, BinaryOp::Ne),
                (Token::StrictEq, BinaryOp::StrictEq),
                (Token::StrictNotEq, BinaryOp::StrictNe),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.look {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.bump()?;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.look.clone() {
            Token::Num(n) => {
                self.bump()?;
                Ok(Expr::Literal(Value::Number(n)))
            }
            Token::Str(s) => {
                self.bump()?;
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::Ident(name) => {
                self.bump()?;
                if self.look == Token::LParen {
                    self.bump()?;
                    let args = self.list(&Token::RParen, "')'")?;
                    return Ok(Expr::Call { name, args });
                }
                Ok(match name.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" | "undefined" => Expr::Literal(Value::Null),
                    "NaN" => Expr::Literal(Value::Number(f64::NAN)),
                    "Infinity" => Expr::Literal(Value::Number(f64::INFINITY)),
                    _ => Expr::Ident(name),
                })
            }
            Token::LParen => {
                self.bump()?;
                let e = self.conditional()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(e)
            }
            Token::LBracket => {
                self.bump()?;
                Ok(Expr::Array(self.list(&Token::RBracket, "']'")?))
            }
            Token::LBrace => {
                self.bump()?;
                self.object()
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    /// Comma-separated expressions up to `close`; the opening token has
    /// already been consumed.
    fn list(&mut self, close: &Token, what: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.look == *close {
            self.bump()?;
            return Ok(items);
        }
        loop {
            items.push(self.conditional()?);
            if self.look == Token::Comma {
                self.bump()?;
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }

    fn object(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        if self.look == Token::RBrace {
            self.bump()?;
            return Ok(Expr::Object(entries));
        }
        loop {
            let key = match self.bump()? {
                Token::Str(s) | Token::Ident(s) => s,
                Token::Num(n) => Value::Number(n).to_text(),
                _ => {
                    return Err(FormulaError::parse(self.pos, "expected an object key"));
                }
            };
            self.expect(&Token::Colon, "':'")?;
            entries.push((key, self.conditional()?));
            if self.look == Token::Comma {
                self.bump()?;
                continue;
            }
            self.expect(&Token::RBrace, "'}'")?;
            return Ok(Expr::Object(entries));
        }
    }
}
