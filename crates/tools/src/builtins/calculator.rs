//! Safe arithmetic evaluator. Expressions are parsed into an AST that
//! permits only numeric literals, parentheses, unary signs, the binary
//! operators `+ - * / **`, and the functions `abs` and `round`. Anything
//! else is rejected.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::pricing::format_idr;
use crate::{Tool, ToolArgs, arg_str};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform calculations for taxes, fees, deadlines, or other numerical computations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate (e.g., '1000000 * 0.25')",
                },
                "calculation_type": {
                    "type": "string",
                    "enum": ["tax", "fee", "deadline", "general"],
                    "description": "Type of calculation",
                },
            },
            "required": ["expression"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let expression = arg_str(args, "expression")
            .ok_or_else(|| anyhow::anyhow!("missing 'expression' argument"))?;
        let calculation_type = arg_str(args, "calculation_type").unwrap_or("general");

        let result = evaluate(expression)?;
        Ok(match calculation_type {
            "tax" => format!("Tax calculation: {}", format_idr(result.round().max(0.0) as u64)),
            "fee" => format!("Fee: {}", format_idr(result.round().max(0.0) as u64)),
            _ => format!("Result: {}", format_number(result)),
        })
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate a whitelisted arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        anyhow::bail!("unexpected trailing input in expression");
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            ' ' | '\t' | '\n' | '\r' | '_' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Power);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| anyhow::anyhow!("invalid number literal: {literal}"))?;
                tokens.push(Token::Number(number));
            }
            'a'..='z' | 'A'..='Z' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => anyhow::bail!("invalid character in expression: '{other}'"),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => anyhow::bail!("expected {expected:?}, found {other:?}"),
        }
    }

    fn parse_expr(&mut self) -> Result<f64> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    value += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.next();
                    value -= self.parse_term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_term(&mut self) -> Result<f64> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    value *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.next();
                    let divisor = self.parse_unary()?;
                    if divisor == 0.0 {
                        anyhow::bail!("division by zero");
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.next();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // Exponentiation is right-associative and binds the exponent through
    // unary signs: `-2**2` is `-(2**2)`, `2**-1` is `0.5`.
    fn parse_power(&mut self) -> Result<f64> {
        let base = self.parse_primary()?;
        if self.peek() == Some(&Token::Power) {
            self.next();
            let exponent = self.parse_unary()?;
            let value = base.powf(exponent);
            if !value.is_finite() {
                anyhow::bail!("expression overflow");
            }
            return Ok(value);
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => self.parse_function(&name),
            other => anyhow::bail!("invalid expression near {other:?}"),
        }
    }

    fn parse_function(&mut self, name: &str) -> Result<f64> {
        if name != "abs" && name != "round" {
            anyhow::bail!("function not allowed: {name}");
        }
        self.expect(Token::LParen)?;
        let first = self.parse_expr()?;
        let mut digits: Option<f64> = None;
        if self.peek() == Some(&Token::Comma) {
            self.next();
            digits = Some(self.parse_expr()?);
        }
        self.expect(Token::RParen)?;

        Ok(match name {
            "abs" => first.abs(),
            _ => match digits {
                Some(digits) => {
                    let factor = 10f64.powi(digits as i32);
                    (first * factor).round() / factor
                }
                None => first.round(),
            },
        })
    }
}
