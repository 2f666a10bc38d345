//! Calculator tool: arithmetic on a single expression.
//!
//! Accepts symbols (`2 + 3 * 4`, `2^10`, `(1.5 + 2) / 7`) and the spoken
//! operators a voice transcript produces (`12 times 7`, `10 divided by 4`).
//! Numbers must be written as digits.

use async_trait::async_trait;
use daisy_core::error::ToolError;
use daisy_core::tool::Tool;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "Calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression with + - * / ^ % and parentheses."
    }

    fn argument_format(&self) -> &str {
        "<arithmetic expression, e.g. (3 + 4) * 2>"
    }

    fn examples(&self) -> &[&str] {
        &[
            "what is 12 times 7",
            "calculate 15 percent of 80",
            "add 3 and 4",
            "how much is 1024 divided by 8",
            "what's 2 to the power of 10",
            "compute (5 + 3) * 2",
        ]
    }

    async fn execute(&self, argument: &str, cancel: &CancellationToken) -> Result<String, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled(self.name().into()));
        }

        let expr = argument.trim();
        if expr.is_empty() {
            return Err(ToolError::InvalidArguments("empty expression".into()));
        }

        debug!(expression = %expr, "Evaluating");
        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason,
        })?;

        Ok(format!("{expr} = {}", format_number(value)))
    }
}

/// Print whole numbers without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{value:.10}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    LParen,
    RParen,
}

/// Evaluate an expression to a finite number.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = lex(&normalize(expr))?;
    if tokens.is_empty() {
        return Err("empty expression".into());
    }

    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let value = parser.expression(0)?;
    if let Some(tok) = parser.tokens.get(parser.pos) {
        return Err(format!("unexpected {tok:?} at position {}", parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".into());
    }
    Ok(value)
}

/// Rewrite spoken operators into symbols.
fn normalize(expr: &str) -> String {
    const WORDS: &[(&str, &str)] = &[
        ("to the power of", "^"),
        ("divided by", "/"),
        ("multiplied by", "*"),
        ("percent of", "% *"),
        ("times", "*"),
        ("plus", "+"),
        ("minus", "-"),
        ("mod", "%"),
        ("x", "*"),
    ];

    let lowered = expr.to_lowercase().replace(['×', '·'], "*").replace('÷', "/");
    let mut out = format!(" {lowered} ");
    for (word, symbol) in WORDS {
        out = out.replace(&format!(" {word} "), &format!(" {symbol} "));
    }
    out
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() || c == ',' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else if d == ',' {
                        // Thousands separator
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| format!("bad number '{literal}'"))?;
                tokens.push(Token::Num(n));
            }
            '+' | '-' | '*' | '/' | '^' | '%' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

/// Precedence-climbing parser.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

/// (left binding power, right binding power); `^` is right-associative.
fn binding_power(op: char) -> Option<(u8, u8)> {
    match op {
        '+' | '-' => Some((1, 2)),
        '*' | '/' | '%' => Some((3, 4)),
        '^' => Some((6, 5)),
        _ => None,
    }
}

impl Parser<'_> {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).copied();
        self.pos += 1;
        tok
    }

    fn expression(&mut self, min_bp: u8) -> Result<f64, String> {
        let mut lhs = self.operand()?;

        loop {
            let op = match self.tokens.get(self.pos) {
                Some(Token::Op(op)) => *op,
                _ => break,
            };

            // A trailing percent sign: "15 %" means 0.15
            if op == '%' && !self.starts_operand(self.pos + 1) {
                self.pos += 1;
                lhs /= 100.0;
                continue;
            }

            let Some((l_bp, r_bp)) = binding_power(op) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(r_bp)?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn starts_operand(&self, idx: usize) -> bool {
        matches!(
            self.tokens.get(idx),
            Some(Token::Num(_) | Token::LParen | Token::Op('-') | Token::Op('+'))
        )
    }

    fn operand(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Op('-')) => Ok(-self.expression(5)?),
            Some(Token::Op('+')) => self.expression(5),
            Some(Token::LParen) => {
                let value = self.expression(0)?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("missing closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("unexpected {tok:?}")),
            None => Err("expression ends too early".into()),
        }
    }
}

fn apply(op: char, lhs: f64, rhs: f64) -> Result<f64, String> {
    match op {
        '+' => Ok(lhs + rhs),
        '-' => Ok(lhs - rhs),
        '*' => Ok(lhs * rhs),
        '/' if rhs == 0.0 => Err("division by zero".into()),
        '/' => Ok(lhs / rhs),
        '%' if rhs == 0.0 => Err("modulo by zero".into()),
        '%' => Ok(lhs % rhs),
        '^' => Ok(lhs.powf(rhs)),
        _ => Err(format!("unknown operator '{op}'")),
    }
}
