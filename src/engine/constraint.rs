//! Linear parameter constraints.
//!
//! A constraint string is a linear inequality over parameter names, e.g.
//! `"sugar + 2*yeast <= 30"`, `"temp >= 0.5 * time"` or the order constraint
//! `"low <= high"`. It is normalized to `Σ cᵢ·xᵢ ≤ b`.
//!
//! Parameter names are matched longest-first, so names containing characters
//! such as `/` or `-` work as long as they are spelled exactly as configured.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::ParamMap;

/// Slack allowed when checking a point against a constraint.
const TOLERANCE: f64 = 1e-9;

/// A parsed constraint `Σ coefficients[name] · name ≤ bound`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraint {
    source: String,
    coefficients: BTreeMap<String, f64>,
    bound: f64,
}

impl LinearConstraint {
    /// Parse `text` against the known parameter names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConstraint`] for anything that is not a single
    /// linear `<=`/`>=` inequality over known parameters.
    pub fn parse(text: &str, names: &[&str]) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidConstraint {
            constraint: text.to_string(),
            reason,
        };

        let tokens = tokenize(text, names).map_err(invalid)?;
        let ops: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t, Token::Le | Token::Ge))
            .map(|(i, _)| i)
            .collect();
        let &[split] = ops.as_slice() else {
            return Err(invalid(
                "expected exactly one '<=' or '>=' comparison".to_string(),
            ));
        };

        let lhs = parse_side(&tokens[..split]).map_err(invalid)?;
        let rhs = parse_side(&tokens[split + 1..]).map_err(invalid)?;
        let sign = if tokens[split] == Token::Le { 1.0 } else { -1.0 };

        let mut coefficients = lhs.coefficients;
        for (name, c) in rhs.coefficients {
            *coefficients.entry(name).or_insert(0.0) -= c;
        }
        for c in coefficients.values_mut() {
            *c *= sign;
        }
        coefficients.retain(|_, c| *c != 0.0);
        if coefficients.is_empty() {
            return Err(invalid("constraint references no parameter".to_string()));
        }

        Ok(Self {
            source: text.to_string(),
            coefficients,
            bound: sign * (rhs.constant - lhs.constant),
        })
    }

    /// The constraint as configured.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `params` satisfies the inequality. Parameters absent from
    /// `params` count as zero.
    #[must_use]
    pub fn is_satisfied(&self, params: &ParamMap) -> bool {
        let lhs: f64 = self
            .coefficients
            .iter()
            .map(|(name, c)| c * params.get(name).copied().unwrap_or(0.0))
            .sum();
        lhs <= self.bound + TOLERANCE * self.bound.abs().max(1.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    Le,
    Ge,
}

fn tokenize(text: &str, names: &[&str]) -> core::result::Result<Vec<Token>, String> {
    let mut by_length: Vec<&str> = names.to_vec();
    by_length.sort_by_key(|n| core::cmp::Reverse(n.len()));

    let mut tokens = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        let Some(c) = rest.chars().next() else {
            break;
        };

        if let Some(name) = by_length.iter().find(|n| !n.is_empty() && rest.starts_with(**n)) {
            tokens.push(Token::Name((*name).to_string()));
            rest = &rest[name.len()..];
            continue;
        }

        let (token, len) = match c {
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '<' if rest.starts_with("<=") => (Token::Le, 2),
            '>' if rest.starts_with(">=") => (Token::Ge, 2),
            '0'..='9' | '.' => {
                let len = number_len(rest);
                let value = rest[..len]
                    .parse::<f64>()
                    .map_err(|_| format!("malformed number '{}'", &rest[..len]))?;
                (Token::Number(value), len)
            }
            _ => {
                let word: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
                return Err(format!("unknown parameter or symbol '{word}'"));
            }
        };
        tokens.push(token);
        rest = &rest[len..];
    }
    Ok(tokens)
}

/// Length of the numeric literal at the start of `text`.
fn number_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

#[derive(Default)]
struct Side {
    coefficients: BTreeMap<String, f64>,
    constant: f64,
}

/// `side := [sign] term (sign term)*`, `term := factor ('*' factor)*` with at
/// most one parameter name per term.
fn parse_side(tokens: &[Token]) -> core::result::Result<Side, String> {
    if tokens.is_empty() {
        return Err("empty side of inequality".to_string());
    }

    let mut side = Side::default();
    let mut i = 0;
    let mut first = true;
    while i < tokens.len() {
        let mut sign = 1.0;
        match tokens[i] {
            Token::Plus => i += 1,
            Token::Minus => {
                sign = -1.0;
                i += 1;
            }
            _ if first => {}
            _ => return Err("expected '+' or '-' between terms".to_string()),
        }
        first = false;

        let mut coefficient = sign;
        let mut name: Option<String> = None;
        loop {
            match tokens.get(i) {
                Some(Token::Number(v)) => coefficient *= v,
                Some(Token::Name(n)) => {
                    if name.is_some() {
                        return Err(format!("non-linear term involving '{n}'"));
                    }
                    name = Some(n.clone());
                }
                _ => return Err("expected a number or parameter name".to_string()),
            }
            i += 1;
            if tokens.get(i) == Some(&Token::Star) {
                i += 1;
            } else {
                break;
            }
        }

        match name {
            Some(n) => *side.coefficients.entry(n).or_insert(0.0) += coefficient,
            None => side.constant += coefficient,
        }
    }
    Ok(side)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: &[&str] = &["x", "y", "x_long", "g/L"];

    fn params(pairs: &[(&str, f64)]) -> ParamMap {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn parses_sum_constraint() {
        let c = LinearConstraint::parse("x + 2*y <= 10", NAMES).unwrap();
        assert!(c.is_satisfied(&params(&[("x", 4.0), ("y", 3.0)])));
        assert!(!c.is_satisfied(&params(&[("x", 5.0), ("y", 3.0)])));
    }

    #[test]
    fn parses_order_constraint() {
        let c = LinearConstraint::parse("x <= y", NAMES).unwrap();
        assert!(c.is_satisfied(&params(&[("x", 1.0), ("y", 2.0)])));
        assert!(!c.is_satisfied(&params(&[("x", 3.0), ("y", 2.0)])));
    }

    #[test]
    fn greater_equal_flips() {
        let c = LinearConstraint::parse("0.5 * x - y >= -1", NAMES).unwrap();
        assert!(c.is_satisfied(&params(&[("x", 2.0), ("y", 2.0)])));
        assert!(!c.is_satisfied(&params(&[("x", 0.0), ("y", 2.0)])));
    }

    #[test]
    fn longest_name_wins() {
        let c = LinearConstraint::parse("x_long + g/L <= 1e1", NAMES).unwrap();
        assert!(c.is_satisfied(&params(&[("x_long", 5.0), ("g/L", 5.0), ("x", 100.0)])));
    }

    #[test]
    fn boundary_is_feasible() {
        let c = LinearConstraint::parse("x + y <= 0.3", NAMES).unwrap();
        assert!(c.is_satisfied(&params(&[("x", 0.1), ("y", 0.2)])));
    }

    #[test]
    fn rejects_unknown_parameter() {
        let err = LinearConstraint::parse("z <= 1", NAMES).unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint { .. }));
    }

    #[test]
    fn rejects_non_linear_and_malformed() {
        for text in ["x * y <= 1", "x <= 1 <= 2", "x + <= 1", "3 <= 4", "x < 1", "x 2 <= 1"] {
            assert!(
                LinearConstraint::parse(text, NAMES).is_err(),
                "'{text}' should be rejected"
            );
        }
    }
}
