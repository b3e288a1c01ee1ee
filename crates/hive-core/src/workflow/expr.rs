//! Restricted expression grammar for `condition` steps (spec §4.5, §9
//! Design Notes: "do not embed a general-purpose interpreter; parse to
//! an AST and evaluate").
//!
//! Grammar (lowest to highest precedence):
//!   or     := and ("||" and)*
//!   and    := cmp ("&&" cmp)*
//!   cmp    := add (("==" | "!=" | "<" | "<=" | ">" | ">=") add)?
//!   add    := mul (("+" | "-") mul)*
//!   mul    := unary (("*" | "/") unary)*
//!   unary  := "!" unary | "-" unary | primary
//!   primary:= number | string | "true" | "false" | path | "(" or ")"
//!   path   := ident ("." ident)*

use std::collections::HashMap;

use serde_json::Value;

use crate::{CoreError, Result};

#[derive(Debug, Clone)]
enum Token {
    Number(f64),
    String(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Eof,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                s.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err(CoreError::ExpressionParseError("unterminated string literal".into()));
            }
            i += 1;
            tokens.push(Token::String(s));
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n: f64 = text
                .parse()
                .map_err(|_| CoreError::ExpressionParseError(format!("invalid number literal '{text}'")))?;
            tokens.push(Token::Number(n));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident(text));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let op = match two.as_str() {
                "==" | "!=" | "<=" | ">=" | "&&" | "||" => {
                    i += 2;
                    match two.as_str() {
                        "==" => "==",
                        "!=" => "!=",
                        "<=" => "<=",
                        ">=" => ">=",
                        "&&" => "&&",
                        "||" => "||",
                        _ => unreachable!(),
                    }
                }
                _ => {
                    let one = c;
                    i += 1;
                    match one {
                        '<' => "<",
                        '>' => ">",
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        '!' => "!",
                        other => {
                            return Err(CoreError::ExpressionParseError(format!(
                                "unexpected character '{other}'"
                            )))
                        }
                    }
                }
            };
            tokens.push(Token::Op(op));
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

/// A parsed condition expression, ready to `eval` repeatedly against
/// different context bags without re-parsing.
#[derive(Debug, Clone)]
pub struct Expr(ExprNode);

#[derive(Debug, Clone)]
enum ExprNode {
    Number(f64),
    String(String),
    Bool(bool),
    Path(String),
    Not(Box<ExprNode>),
    Neg(Box<ExprNode>),
    BinOp(&'static str, Box<ExprNode>, Box<ExprNode>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        match self.advance() {
            Token::Op(o) if o == op => Ok(()),
            other => Err(CoreError::ExpressionParseError(format!(
                "expected '{op}', found {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<ExprNode> {
        let mut left = self.parse_and()?;
        while let Token::Op("||") = self.peek() {
            self.advance();
            let right = self.parse_and()?;
            left = ExprNode::BinOp("||", Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprNode> {
        let mut left = self.parse_cmp()?;
        while let Token::Op("&&") = self.peek() {
            self.advance();
            let right = self.parse_cmp()?;
            left = ExprNode::BinOp("&&", Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<ExprNode> {
        let left = self.parse_add()?;
        if let Token::Op(op @ ("==" | "!=" | "<" | "<=" | ">" | ">=")) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_add()?;
            return Ok(ExprNode::BinOp(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<ExprNode> {
        let mut left = self.parse_mul()?;
        loop {
            match self.peek() {
                Token::Op(op @ ("+" | "-")) => {
                    let op = *op;
                    self.advance();
                    let right = self.parse_mul()?;
                    left = ExprNode::BinOp(op, Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<ExprNode> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Token::Op(op @ ("*" | "/")) => {
                    let op = *op;
                    self.advance();
                    let right = self.parse_unary()?;
                    left = ExprNode::BinOp(op, Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExprNode> {
        match self.peek() {
            Token::Op("!") => {
                self.advance();
                Ok(ExprNode::Not(Box::new(self.parse_unary()?)))
            }
            Token::Op("-") => {
                self.advance();
                Ok(ExprNode::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExprNode> {
        match self.advance() {
            Token::Number(n) => Ok(ExprNode::Number(n)),
            Token::String(s) => Ok(ExprNode::String(s)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(ExprNode::Bool(true)),
                "false" => Ok(ExprNode::Bool(false)),
                _ => Ok(ExprNode::Path(name)),
            },
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect_op_rparen()?;
                Ok(inner)
            }
            other => Err(CoreError::ExpressionParseError(format!(
                "unexpected token {other:?}"
            ))),
        }
    }

    fn expect_op_rparen(&mut self) -> Result<()> {
        match self.advance() {
            Token::RParen => Ok(()),
            other => Err(CoreError::ExpressionParseError(format!(
                "expected ')', found {other:?}"
            ))),
        }
    }
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let node = parser.parse_or()?;
        match parser.peek() {
            Token::Eof => Ok(Expr(node)),
            other => Err(CoreError::ExpressionParseError(format!(
                "unexpected trailing token {other:?}"
            ))),
        }
    }

    pub fn eval(&self, context: &HashMap<String, Value>) -> Result<Value> {
        eval_node(&self.0, context)
    }

    /// Convenience for condition steps: evaluates and coerces to bool
    /// using the same truthiness rule as [`truthy`].
    pub fn eval_bool(&self, context: &HashMap<String, Value>) -> Result<bool> {
        Ok(truthy(&self.eval(context)?))
    }
}

fn lookup_path(path: &str, context: &HashMap<String, Value>) -> Value {
    let mut parts = path.split('.');
    let Some(root) = parts.next() else {
        return Value::Null;
    };
    let mut current = context.get(root).cloned().unwrap_or(Value::Null);
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_number(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| CoreError::ExpressionParseError(format!("expected a number, found {value}")))
}

fn eval_node(node: &ExprNode, context: &HashMap<String, Value>) -> Result<Value> {
    match node {
        ExprNode::Number(n) => Ok(Value::from(*n)),
        ExprNode::String(s) => Ok(Value::String(s.clone())),
        ExprNode::Bool(b) => Ok(Value::Bool(*b)),
        ExprNode::Path(p) => Ok(lookup_path(p, context)),
        ExprNode::Not(inner) => Ok(Value::Bool(!truthy(&eval_node(inner, context)?))),
        ExprNode::Neg(inner) => Ok(Value::from(-as_number(&eval_node(inner, context)?)?)),
        ExprNode::BinOp(op, left, right) => {
            let l = eval_node(left, context)?;
            match *op {
                "&&" => {
                    if !truthy(&l) {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(truthy(&eval_node(right, context)?)))
                }
                "||" => {
                    if truthy(&l) {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(truthy(&eval_node(right, context)?)))
                }
                "==" => Ok(Value::Bool(l == eval_node(right, context)?)),
                "!=" => Ok(Value::Bool(l != eval_node(right, context)?)),
                "<" | "<=" | ">" | ">=" => {
                    let r = eval_node(right, context)?;
                    let (a, b) = (as_number(&l)?, as_number(&r)?);
                    let result = match *op {
                        "<" => a < b,
                        "<=" => a <= b,
                        ">" => a > b,
                        ">=" => a >= b,
                        _ => unreachable!(),
                    };
                    Ok(Value::Bool(result))
                }
                "+" | "-" | "*" | "/" => {
                    let r = eval_node(right, context)?;
                    let (a, b) = (as_number(&l)?, as_number(&r)?);
                    let result = match *op {
                        "+" => a + b,
                        "-" => a - b,
                        "*" => a * b,
                        "/" => a / b,
                        _ => unreachable!(),
                    };
                    Ok(Value::from(result))
                }
                other => Err(CoreError::ExpressionParseError(format!("unknown operator '{other}'"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> HashMap<String, Value> {
        let mut c = HashMap::new();
        c.insert("amount".to_string(), json!(150));
        c.insert(
            "customer".to_string(),
            json!({"tier": "gold", "active": true}),
        );
        c
    }

    #[test]
    fn evaluates_comparisons_and_boolean_combinators() {
        let expr = Expr::parse("amount > 100 && customer.tier == \"gold\"").unwrap();
        assert!(expr.eval_bool(&ctx()).unwrap());

        let expr = Expr::parse("amount < 100 || !customer.active").unwrap();
        assert!(!expr.eval_bool(&ctx()).unwrap());
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let expr = Expr::parse("2 + 3 * 4").unwrap();
        assert_eq!(expr.eval(&HashMap::new()).unwrap(), json!(14.0));
    }

    #[test]
    fn missing_path_is_null_and_falsy() {
        let expr = Expr::parse("missing_field").unwrap();
        assert!(!expr.eval_bool(&ctx()).unwrap());
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(Expr::parse("amount >").is_err());
        assert!(Expr::parse("(amount + 1").is_err());
    }
}
