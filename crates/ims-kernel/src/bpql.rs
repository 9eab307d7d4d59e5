// SPDX-License-Identifier: Apache-2.0
//! BPQL: the tiny condition language evaluated against a [`Record`].
//!
//! Textual BPQL is tokenized and parsed with a hand-written recursive-descent
//! parser rather than a single regex, which breaks on nested quoted values
//! (see design notes).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KernelError;
use crate::path::{self, Record};
use crate::regex_fix;

/// A literal value or a tagged regex pattern compared against a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Atom {
    /// A plain string literal, compared case-insensitively.
    Literal {
        /// The literal text.
        value: String,
    },
    /// A "broken-regex"-flagged pattern: autofixed before every compile.
    Regex {
        /// The pattern text, pre-autofix.
        pattern: String,
    },
    /// A strict pattern: compiled as-is, with one autofix fallback attempt.
    FormalRegex {
        /// The pattern text.
        pattern: String,
    },
}

impl Atom {
    /// Build an atom the way BPQL text does: literals containing `*` become
    /// `Regex`, everything else stays `Literal`.
    fn from_text(raw: &str) -> Self {
        if raw.contains('*') {
            Atom::Regex {
                pattern: raw.to_string(),
            }
        } else {
            Atom::Literal {
                value: raw.to_string(),
            }
        }
    }
}

/// The condition AST: a purely tagged variant, precedence made explicit via
/// parentheses (the original's operator-keyed map ambiguously allowed mixed
/// AND/OR at one level; this design fixes that).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Condition {
    /// `field = value`
    #[serde(rename = "=")]
    Eq {
        /// Dotted field path.
        field: String,
        /// Right-hand atom.
        value: Atom,
    },
    /// `field != value`
    #[serde(rename = "!=")]
    Ne {
        /// Dotted field path.
        field: String,
        /// Right-hand atom.
        value: Atom,
    },
    /// `field IN [values]`
    #[serde(rename = "IN")]
    In {
        /// Dotted field path.
        field: String,
        /// Candidate atoms.
        value: Vec<Atom>,
    },
    /// `field NOT IN [values]`
    #[serde(rename = "NOT IN")]
    NotIn {
        /// Dotted field path.
        field: String,
        /// Candidate atoms.
        value: Vec<Atom>,
    },
    /// Conjunction of children, short-circuiting in order.
    #[serde(rename = "AND")]
    And {
        /// Sub-conditions.
        children: Vec<Condition>,
    },
    /// Disjunction of children, short-circuiting in order.
    #[serde(rename = "OR")]
    Or {
        /// Sub-conditions.
        children: Vec<Condition>,
    },
}

/// Evaluate `condition` against `record`; `None` (the null condition)
/// always evaluates to `true`.
pub fn evaluate(condition: Option<&Condition>, record: &Record, prefix: &str) -> bool {
    let Some(condition) = condition else {
        return true;
    };
    match condition {
        Condition::Eq { field, value } => {
            let path = path::make_path(prefix, field);
            let left = path::get(record, &path);
            if left.is_null() {
                return false;
            }
            atom_matches(left, value)
        }
        Condition::Ne { field, value } => {
            let path = path::make_path(prefix, field);
            let left = path::get(record, &path);
            if left.is_null() {
                return true;
            }
            !atom_matches(left, value)
        }
        Condition::In { field, value } => {
            let path = path::make_path(prefix, field);
            let left = path::get(record, &path);
            if left.is_null() {
                return false;
            }
            value.iter().any(|atom| atom_matches(left, atom))
        }
        Condition::NotIn { field, value } => {
            let path = path::make_path(prefix, field);
            let left = path::get(record, &path);
            if left.is_null() {
                return true;
            }
            !value.iter().any(|atom| atom_matches(left, atom))
        }
        Condition::And { children } => children
            .iter()
            .all(|c| evaluate(Some(c), record, prefix)),
        Condition::Or { children } => children
            .iter()
            .any(|c| evaluate(Some(c), record, prefix)),
    }
}

fn atom_matches(left: &Value, atom: &Atom) -> bool {
    let left_str = path::stringify(left);
    match atom {
        Atom::Literal { value } => left_str.eq_ignore_ascii_case(value),
        Atom::Regex { pattern } => match regex_fix::compile_broken_ci(pattern) {
            Ok(re) => re.is_match(&left_str),
            Err(err) => {
                tracing::warn!(%pattern, error = %err, "invalid regex atom, treating as no match");
                false
            }
        },
        Atom::FormalRegex { pattern } => match regex_fix::compile_formal(pattern) {
            Ok(re) => re.is_match(&left_str),
            Err(err) => {
                tracing::warn!(%pattern, error = %err, "invalid formal-regex atom, treating as no match");
                false
            }
        },
    }
}

// ---- text parser -----------------------------------------------------

#[derive(Debug, Clone)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Leaf(Condition),
}

/// Parse textual BPQL into a [`Condition`]. `None` is not representable in
/// text form; an empty/blank string is rejected as a parse error.
pub fn parse(text: &str) -> Result<Condition, KernelError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(KernelError::ParseError("empty condition".to_string()));
    }
    let mut pos = 0;
    let cond = parse_or(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(KernelError::ParseError(format!(
            "unexpected trailing tokens at position {pos}"
        )));
    }
    Ok(cond)
}

fn parse_or(tokens: &[Token], pos: &mut usize) -> Result<Condition, KernelError> {
    let mut children = vec![parse_and(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::Or)) {
        *pos += 1;
        children.push(parse_and(tokens, pos)?);
    }
    Ok(if children.len() == 1 {
        children.remove(0)
    } else {
        Condition::Or { children }
    })
}

fn parse_and(tokens: &[Token], pos: &mut usize) -> Result<Condition, KernelError> {
    let mut children = vec![parse_atom(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::And)) {
        *pos += 1;
        children.push(parse_atom(tokens, pos)?);
    }
    Ok(if children.len() == 1 {
        children.remove(0)
    } else {
        Condition::And { children }
    })
}

fn parse_atom(tokens: &[Token], pos: &mut usize) -> Result<Condition, KernelError> {
    match tokens.get(*pos) {
        Some(Token::LParen) => {
            *pos += 1;
            let cond = parse_or(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    Ok(cond)
                }
                _ => Err(KernelError::ParseError("expected closing paren".to_string())),
            }
        }
        Some(Token::Leaf(cond)) => {
            *pos += 1;
            Ok(cond.clone())
        }
        _ => Err(KernelError::ParseError("expected condition or '('".to_string())),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, KernelError> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            _ => {
                if let Some(rest) = starts_with_word(&chars, i, "AND") {
                    tokens.push(Token::And);
                    i = rest;
                } else if let Some(rest) = starts_with_word(&chars, i, "OR") {
                    tokens.push(Token::Or);
                    i = rest;
                } else {
                    let (leaf, rest) = parse_leaf(&chars, i)?;
                    tokens.push(Token::Leaf(leaf));
                    i = rest;
                }
            }
        }
    }
    Ok(tokens)
}

/// Returns the index just past `word` if `chars[i..]` starts with `word` as
/// a standalone token (followed by whitespace, `(`, or end of input).
fn starts_with_word(chars: &[char], i: usize, word: &str) -> Option<usize> {
    let wlen = word.chars().count();
    if chars[i..].iter().take(wlen).collect::<String>() != word {
        return None;
    }
    let after = i + wlen;
    match chars.get(after) {
        None => Some(after),
        Some(c) if c.is_whitespace() || *c == '(' || *c == ')' => Some(after),
        _ => None,
    }
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn read_word(chars: &[char], mut i: usize) -> (String, usize) {
    let start = i;
    while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '(' && chars[i] != ')' {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

fn parse_leaf(chars: &[char], i: usize) -> Result<(Condition, usize), KernelError> {
    let i = skip_ws(chars, i);
    let (field, i) = read_word(chars, i);
    if field.is_empty() {
        return Err(KernelError::ParseError("expected field name".to_string()));
    }
    let i = skip_ws(chars, i);
    let (mut op, mut i) = read_word(chars, i);
    if op.eq_ignore_ascii_case("NOT") {
        i = skip_ws(chars, i);
        let (next, rest) = read_word(chars, i);
        if !next.eq_ignore_ascii_case("IN") {
            return Err(KernelError::UnsupportedOperator(format!("NOT {next}")));
        }
        op = "NOT IN".to_string();
        i = rest;
    }
    i = skip_ws(chars, i);
    let (value_tokens, i) = read_value(chars, i)?;

    let cond = match op.as_str() {
        "=" => Condition::Eq {
            field,
            value: value_tokens.into_single()?,
        },
        "!=" => Condition::Ne {
            field,
            value: value_tokens.into_single()?,
        },
        "IN" => Condition::In {
            field,
            value: value_tokens.into_list(),
        },
        "NOT IN" => Condition::NotIn {
            field,
            value: value_tokens.into_list(),
        },
        other => return Err(KernelError::UnsupportedOperator(other.to_string())),
    };
    Ok((cond, i))
}

enum RawValue {
    Single(Atom),
    List(Vec<Atom>),
}

impl RawValue {
    fn into_single(self) -> Result<Atom, KernelError> {
        match self {
            RawValue::Single(a) => Ok(a),
            RawValue::List(_) => Err(KernelError::ParseError(
                "expected a single value, found a list".to_string(),
            )),
        }
    }

    fn into_list(self) -> Vec<Atom> {
        match self {
            RawValue::List(list) => list,
            RawValue::Single(a) => vec![a],
        }
    }
}

fn read_value(chars: &[char], i: usize) -> Result<(RawValue, usize), KernelError> {
    match chars.get(i) {
        Some('[') => {
            let (items, rest) = read_bracket_list(chars, i)?;
            Ok((RawValue::List(items), rest))
        }
        Some('"') => {
            let (s, rest) = read_quoted(chars, i)?;
            Ok((RawValue::Single(Atom::from_text(&s)), rest))
        }
        Some('/') => {
            let (s, rest) = read_slash_regex(chars, i)?;
            Ok((
                RawValue::Single(Atom::Regex { pattern: s }),
                rest,
            ))
        }
        _ => Err(KernelError::ParseError(
            "expected a value: quoted string, /regex/, or [list]".to_string(),
        )),
    }
}

fn read_quoted(chars: &[char], i: usize) -> Result<(String, usize), KernelError> {
    debug_assert_eq!(chars[i], '"');
    let mut j = i + 1;
    let mut out = String::new();
    while j < chars.len() && chars[j] != '"' {
        if chars[j] == '\\' && j + 1 < chars.len() {
            j += 1;
        }
        out.push(chars[j]);
        j += 1;
    }
    if j >= chars.len() {
        return Err(KernelError::ParseError("unterminated quoted string".to_string()));
    }
    Ok((out, j + 1))
}

fn read_slash_regex(chars: &[char], i: usize) -> Result<(String, usize), KernelError> {
    debug_assert_eq!(chars[i], '/');
    let mut j = i + 1;
    let start = j;
    while j < chars.len() && chars[j] != '/' {
        j += 1;
    }
    if j >= chars.len() {
        return Err(KernelError::ParseError("unterminated /regex/".to_string()));
    }
    Ok((chars[start..j].iter().collect(), j + 1))
}

fn read_bracket_list(chars: &[char], i: usize) -> Result<(Vec<Atom>, usize), KernelError> {
    debug_assert_eq!(chars[i], '[');
    let mut j = i + 1;
    let start = j;
    let mut depth = 1;
    while j < chars.len() && depth > 0 {
        match chars[j] {
            '[' => depth += 1,
            ']' => depth -= 1,
            _ => {}
        }
        if depth > 0 {
            j += 1;
        }
    }
    if depth != 0 {
        return Err(KernelError::ParseError("unterminated bracket list".to_string()));
    }
    let inner: String = chars[start..j].iter().collect();
    let items = split_top_level(&inner, ',')
        .into_iter()
        .map(|raw| {
            let trimmed = raw.trim();
            let stripped = trimmed
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(trimmed);
            Atom::from_text(stripped)
        })
        .collect();
    Ok((items, j + 1))
}

fn split_top_level(s: &str, sep: char) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    s.split(sep).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_condition_is_always_true() {
        assert!(evaluate(None, &json!({}), ""));
    }

    #[test]
    fn missing_field_polarity() {
        let record = json!({});
        let eq = Condition::Eq {
            field: "x".to_string(),
            value: Atom::Literal { value: "y".to_string() },
        };
        let ne = Condition::Ne {
            field: "x".to_string(),
            value: Atom::Literal { value: "y".to_string() },
        };
        let inn = Condition::In {
            field: "x".to_string(),
            value: vec![Atom::Literal { value: "y".to_string() }],
        };
        let nin = Condition::NotIn {
            field: "x".to_string(),
            value: vec![Atom::Literal { value: "y".to_string() }],
        };
        assert!(!evaluate(Some(&eq), &record, ""));
        assert!(evaluate(Some(&ne), &record, ""));
        assert!(!evaluate(Some(&inn), &record, ""));
        assert!(evaluate(Some(&nin), &record, ""));
    }

    #[test]
    fn parses_and_or_with_parens() {
        // (svc = "web*" AND env IN ["prod","stg"])
        let cond = parse(r#"(svc = "web*" AND env IN ["prod","stg"])"#).unwrap();
        let record = json!({"svc": "website", "env": "prod"});
        assert!(evaluate(Some(&cond), &record, ""));

        let record2 = json!({"svc": "website", "env": "dev"});
        assert!(!evaluate(Some(&cond), &record2, ""));
    }

    #[test]
    fn equality_is_case_insensitive_on_literals() {
        let cond = parse(r#"level = "ERROR""#).unwrap();
        assert!(evaluate(Some(&cond), &json!({"level": "error"}), ""));
    }

    #[test]
    fn slash_regex_atom() {
        let cond = parse(r"host = /^db-\d+$/").unwrap();
        assert!(evaluate(Some(&cond), &json!({"host": "db-42"}), ""));
        assert!(!evaluate(Some(&cond), &json!({"host": "web-42"}), ""));
    }

    #[test]
    fn unsupported_operator_errors() {
        let err = parse("x ~~ \"y\"").unwrap_err();
        assert!(matches!(err, KernelError::UnsupportedOperator(_) | KernelError::ParseError(_)));
    }

    #[test]
    fn and_short_circuits_over_or_within_parens() {
        let cond = parse(r#"a = "1" OR (b = "2" AND c = "3")"#).unwrap();
        assert!(evaluate(Some(&cond), &json!({"a": "1"}), ""));
        assert!(evaluate(Some(&cond), &json!({"b": "2", "c": "3"}), ""));
        assert!(!evaluate(Some(&cond), &json!({"b": "2"}), ""));
    }
}
