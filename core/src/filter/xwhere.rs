//! Parser for the textual `where` grammar.
//!
//! ```text
//! (col,op,value)~and(col,op,value)~or((col,op,value)~ornot(col,op,value))
//! ~not(col,op,value)
//! ```
//!
//! Connectors are `and`, `or`, `not` (and-not), `andnot` and `ornot`. As in
//! SQL, AND binds tighter than OR. Comparison operators: `eq`, `not`/`neq`,
//! `lt`, `gt`, `le`, `ge`, `like`, `nlike`, `in`, `nin`, `is`, `isnot`, `btw`,
//! `nbtw`.

use super::{ColumnRef, CompareOp, Comparison, FilterExpr, MAX_DEPTH, Operand};
use crate::error::{BaseModelError, Result};
use crate::value::Value;
use regex::Regex;
use std::sync::LazyLock;

static LEAF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(([\w ]+),(\w+),(.*)\)$").expect("leaf pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    And,
    Or,
    AndNot,
    OrNot,
}

/// Parses a `where` string. Empty input yields `None`.
pub fn parse_where(input: &str) -> Result<Option<FilterExpr>> {
    let input = input.trim();
    if input.is_empty() || input == "~not" {
        return Ok(None);
    }
    let mut parser = Parser {
        src: input,
        pos: 0,
        depth: 0,
    };
    let expr = parser.sequence(false)?;
    if parser.pos != input.len() {
        return Err(syntax_error(&input[parser.pos..]));
    }
    Ok(Some(expr))
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    /// Parses `term (~conn term)*` until end of input or, when `nested`, the
    /// closing paren of the enclosing group.
    fn sequence(&mut self, nested: bool) -> Result<FilterExpr> {
        let mut items: Vec<(Connector, FilterExpr)> = Vec::new();
        loop {
            let connector = if self.peek() == Some(b'~') {
                self.connector()?
            } else if items.is_empty() {
                Connector::And
            } else {
                return Err(syntax_error(self.rest()));
            };
            let term = self.term()?;
            items.push((connector, term));

            match self.peek() {
                None if nested => return Err(closing_error(self.src)),
                None => break,
                Some(b')') if nested => break,
                Some(b'~') => continue,
                Some(_) => return Err(syntax_error(self.rest())),
            }
        }
        Ok(fold(items))
    }

    fn connector(&mut self) -> Result<Connector> {
        let rest = &self.rest()[1..];
        let word_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let word = &rest[..word_len];
        let connector = match word {
            "and" => Connector::And,
            "or" => Connector::Or,
            "not" | "andnot" => Connector::AndNot,
            "ornot" => Connector::OrNot,
            _ => {
                return Err(BaseModelError::query(format!(
                    "{word} : Invalid operation."
                )));
            }
        };
        self.pos += 1 + word_len;
        Ok(connector)
    }

    fn term(&mut self) -> Result<FilterExpr> {
        if self.peek() != Some(b'(') {
            return Err(syntax_error(self.rest()));
        }
        match self.src.as_bytes().get(self.pos + 1) {
            Some(b'(') | Some(b'~') => {
                if self.depth == MAX_DEPTH {
                    return Err(BaseModelError::query("where clause nested too deeply"));
                }
                self.depth += 1;
                self.pos += 1;
                let inner = self.sequence(true)?;
                // sequence(true) stops on the group's ')'
                self.pos += 1;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.leaf(),
        }
    }

    /// A leaf ends at the first `)` followed by end of input, `)` or `~`, so
    /// values may contain parentheses.
    fn leaf(&mut self) -> Result<FilterExpr> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let end = (1..bytes.len())
            .find(|&i| {
                bytes[i] == b')' && matches!(bytes.get(i + 1), None | Some(b')') | Some(b'~'))
            })
            .ok_or_else(|| closing_error(rest))?;
        let text = &rest[..=end];
        self.pos += end + 1;
        parse_leaf(text)
    }
}

fn parse_leaf(text: &str) -> Result<FilterExpr> {
    let caps = LEAF.captures(text).ok_or_else(|| syntax_error(text))?;
    let column = caps[1].trim().to_string();
    let op = &caps[2];
    let raw = &caps[3];

    let (op, operand) = match op {
        "eq" => (CompareOp::Eq, Operand::Value(scalar(raw, true))),
        "not" | "neq" | "ne" => (CompareOp::Ne, Operand::Value(scalar(raw, false))),
        "lt" => (CompareOp::Lt, Operand::Value(scalar(raw, false))),
        "gt" => (CompareOp::Gt, Operand::Value(scalar(raw, false))),
        "le" => (CompareOp::Le, Operand::Value(scalar(raw, false))),
        "ge" => (CompareOp::Ge, Operand::Value(scalar(raw, false))),
        "like" => (CompareOp::Like, Operand::Value(Value::from(raw))),
        "nlike" => (CompareOp::NotLike, Operand::Value(Value::from(raw))),
        "in" => (CompareOp::In, Operand::List(list(raw))),
        "nin" => (CompareOp::NotIn, Operand::List(list(raw))),
        "is" | "isnot" => {
            if raw != "null" {
                return Err(BaseModelError::query(format!(
                    "{raw} : not a valid value since 'is' & 'isnot' only supports value null"
                )));
            }
            let op = if op == "is" {
                CompareOp::IsNull
            } else {
                CompareOp::IsNotNull
            };
            (op, Operand::None)
        }
        "btw" | "nbtw" => {
            let mut values = list(raw);
            if values.len() != 2 {
                let hint = if values.len() > 2 {
                    " Between accepts only 2 values"
                } else {
                    " Between requires 2 values"
                };
                return Err(BaseModelError::query(format!(
                    "{raw} : not a valid value.{hint}"
                )));
            }
            let hi = values.pop().unwrap_or_default();
            let lo = values.pop().unwrap_or_default();
            let op = if op == "btw" {
                CompareOp::Between
            } else {
                CompareOp::NotBetween
            };
            (op, Operand::Range(lo, hi))
        }
        other => {
            return Err(BaseModelError::query(format!(
                "{other} : Invalid comparison operator"
            )));
        }
    };

    Ok(FilterExpr::Comparison(Comparison {
        column: ColumnRef::new(column),
        op,
        operand,
    }))
}

fn scalar(raw: &str, booleans: bool) -> Value {
    match raw {
        "true" if booleans => Value::Bool(true),
        "false" if booleans => Value::Bool(false),
        _ => Value::from(raw),
    }
}

fn list(raw: &str) -> Vec<Value> {
    raw.split(',').map(Value::from).collect()
}

/// AND binds tighter than OR: split the run into OR-separated AND groups.
fn fold(items: Vec<(Connector, FilterExpr)>) -> FilterExpr {
    let mut ors: Vec<FilterExpr> = Vec::new();
    let mut ands: Vec<FilterExpr> = Vec::new();

    for (index, (connector, expr)) in items.into_iter().enumerate() {
        match connector {
            Connector::And => ands.push(expr),
            Connector::AndNot => ands.push(FilterExpr::Not(Box::new(expr))),
            Connector::Or | Connector::OrNot => {
                if index > 0 {
                    ors.push(collapse(std::mem::take(&mut ands), FilterExpr::And));
                }
                if connector == Connector::OrNot {
                    ands.push(FilterExpr::Not(Box::new(expr)));
                } else {
                    ands.push(expr);
                }
            }
        }
    }
    ors.push(collapse(ands, FilterExpr::And));
    collapse(ors, FilterExpr::Or)
}

fn collapse(mut items: Vec<FilterExpr>, wrap: fn(Vec<FilterExpr>) -> FilterExpr) -> FilterExpr {
    if items.len() == 1 {
        items.pop().unwrap_or_else(|| wrap(Vec::new()))
    } else {
        wrap(items)
    }
}

fn syntax_error(text: &str) -> BaseModelError {
    BaseModelError::query(format!("{text} : not a valid syntax"))
}

fn closing_error(text: &str) -> BaseModelError {
    let head: String = text.chars().take(10).collect();
    BaseModelError::query(format!("{head} : Closing bracket not found"))
}
