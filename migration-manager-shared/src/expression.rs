//! The include-expression language used by batches.
//!
//! A batch's `include_expression` is a boolean predicate over a fixed set of
//! instance attributes, for example
//!
//! ```text
//! os == "Ubuntu" && (path startsWith "/prod/" || name matches "^web-[0-9]+$")
//! ```
//!
//! Expressions are parsed once (unknown attributes, syntax errors and invalid
//! regular expressions are reported at parse time) and evaluated per instance.
use std::fmt;

use regex::Regex;
use thiserror::Error;

use crate::types::Instance;

/// Attribute names an expression may reference.
pub const ATTRIBUTES: &[&str] = &[
    "name",
    "path",
    "os",
    "os_version",
    "architecture",
    "source",
    "annotation",
    "hardware_version",
    "guest_tools_version",
    "cpus",
    "memory",
    "legacy_bios",
    "secure_boot",
    "tpm",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("Syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unknown attribute {0:?}")]
    UnknownAttribute(String),

    #[error("Invalid regular expression {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Type error: {0}")]
    Type(String),
}

impl ExpressionError {
    fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// A value produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The attribute view of one instance an expression is evaluated against.
pub struct InstanceAttributes<'a> {
    instance: &'a Instance,
    source_name: &'a str,
}

impl<'a> InstanceAttributes<'a> {
    pub fn new(instance: &'a Instance, source_name: &'a str) -> Self {
        Self {
            instance,
            source_name,
        }
    }

    fn get(&self, attribute: &str) -> Option<Value> {
        let i = self.instance;
        let value = match attribute {
            "name" => Value::Str(i.name().to_string()),
            "path" => Value::Str(i.inventory_path.clone()),
            "os" => Value::Str(i.os.clone()),
            "os_version" => Value::Str(i.os_version.clone()),
            "architecture" => Value::Str(i.architecture.clone()),
            "source" => Value::Str(self.source_name.to_string()),
            "annotation" => Value::Str(i.annotation.clone()),
            "hardware_version" => Value::Str(i.hardware_version.clone()),
            "guest_tools_version" => Value::Int(i.guest_tools_version),
            "cpus" => Value::Int(i.effective_cpus()),
            "memory" => Value::Int(i.effective_memory_in_bytes()),
            "legacy_bios" => Value::Bool(i.use_legacy_bios),
            "secure_boot" => Value::Bool(i.secure_boot_enabled),
            "tpm" => Value::Bool(i.tpm_present),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Attribute(String),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare(CompareOp, Box<Node>, Box<Node>),
    Matches(Box<Node>, Regex),
}

/// Deepest allowed nesting of parentheses and negations.
pub const MAX_NESTING: usize = 64;

/// Longest allowed expression, in tokens. Bounds the depth of operator chains.
pub const MAX_TOKENS: usize = 1024;

/// A parsed include expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = lex(source)?;
        if let Some((offset, _)) = tokens.get(MAX_TOKENS) {
            return Err(ExpressionError::syntax(
                *offset,
                format!("expression is longer than {MAX_TOKENS} tokens"),
            ));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
        };
        let root = parser.parse_or()?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::syntax(
                *offset,
                format!("unexpected {token} after end of expression"),
            ));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression; the result must be a boolean.
    pub fn evaluate(&self, attributes: &InstanceAttributes<'_>) -> Result<bool, ExpressionError> {
        match eval(&self.root, attributes)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::Type(format!(
                "expression evaluates to {} {other}, expected a boolean",
                other.type_name()
            ))),
        }
    }

    /// Convenience for `evaluate` with a fresh attribute view.
    pub fn matches(&self, instance: &Instance, source_name: &str) -> Result<bool, ExpressionError> {
        self.evaluate(&InstanceAttributes::new(instance, source_name))
    }
}

fn eval(node: &Node, attributes: &InstanceAttributes<'_>) -> Result<Value, ExpressionError> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Attribute(name) => attributes
            .get(name)
            .ok_or_else(|| ExpressionError::UnknownAttribute(name.clone())),
        Node::Not(inner) => Ok(Value::Bool(!eval_bool(inner, attributes)?)),
        Node::And(lhs, rhs) => {
            Ok(Value::Bool(eval_bool(lhs, attributes)? && eval_bool(rhs, attributes)?))
        }
        Node::Or(lhs, rhs) => {
            Ok(Value::Bool(eval_bool(lhs, attributes)? || eval_bool(rhs, attributes)?))
        }
        Node::Compare(op, lhs, rhs) => {
            let lhs = eval(lhs, attributes)?;
            let rhs = eval(rhs, attributes)?;
            compare(*op, &lhs, &rhs).map(Value::Bool)
        }
        Node::Matches(lhs, regex) => match eval(lhs, attributes)? {
            Value::Str(s) => Ok(Value::Bool(regex.is_match(&s))),
            other => Err(ExpressionError::Type(format!(
                "matches needs a string, got {}",
                other.type_name()
            ))),
        },
    }
}

fn eval_bool(node: &Node, attributes: &InstanceAttributes<'_>) -> Result<bool, ExpressionError> {
    match eval(node, attributes)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExpressionError::Type(format!(
            "expected a boolean, got {} {other}",
            other.type_name()
        ))),
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, ExpressionError> {
    use CompareOp::*;

    match (op, lhs, rhs) {
        (Eq, a, b) if a.type_name() == b.type_name() => Ok(a == b),
        (Ne, a, b) if a.type_name() == b.type_name() => Ok(a != b),
        (Lt, Value::Int(a), Value::Int(b)) => Ok(a < b),
        (Le, Value::Int(a), Value::Int(b)) => Ok(a <= b),
        (Gt, Value::Int(a), Value::Int(b)) => Ok(a > b),
        (Ge, Value::Int(a), Value::Int(b)) => Ok(a >= b),
        (Lt, Value::Str(a), Value::Str(b)) => Ok(a < b),
        (Le, Value::Str(a), Value::Str(b)) => Ok(a <= b),
        (Gt, Value::Str(a), Value::Str(b)) => Ok(a > b),
        (Ge, Value::Str(a), Value::Str(b)) => Ok(a >= b),
        (Contains, Value::Str(a), Value::Str(b)) => Ok(a.contains(b.as_str())),
        (StartsWith, Value::Str(a), Value::Str(b)) => Ok(a.starts_with(b.as_str())),
        (EndsWith, Value::Str(a), Value::Str(b)) => Ok(a.ends_with(b.as_str())),
        (op, a, b) => Err(ExpressionError::Type(format!(
            "cannot apply {op:?} to {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Compare(CompareOp),
    Matches,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier {s:?}"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::Int(i) => write!(f, "integer {i}"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Not => f.write_str("'!'"),
            Token::Compare(op) => write!(f, "operator {op:?}"),
            Token::Matches => f.write_str("'matches'"),
        }
    }
}

fn lex(source: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '&' | '|' | '=' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == ch => match ch {
                        '&' => Token::And,
                        '|' => Token::Or,
                        _ => Token::Compare(CompareOp::Eq),
                    },
                    _ => {
                        return Err(ExpressionError::syntax(
                            offset,
                            format!("expected '{ch}{ch}'"),
                        ))
                    }
                }
            }
            '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = matches!(chars.peek(), Some((_, '=')));
                if followed_by_eq {
                    chars.next();
                }
                match (ch, followed_by_eq) {
                    ('!', false) => Token::Not,
                    ('!', true) => Token::Compare(CompareOp::Ne),
                    ('<', false) => Token::Compare(CompareOp::Lt),
                    ('<', true) => Token::Compare(CompareOp::Le),
                    ('>', false) => Token::Compare(CompareOp::Gt),
                    _ => Token::Compare(CompareOp::Ge),
                }
            }
            '"' | '\'' => {
                chars.next();
                Token::Str(lex_string(&mut chars, ch, offset)?)
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    literal.push(d);
                    chars.next();
                }
                let value = literal.parse::<i64>().map_err(|_| {
                    ExpressionError::syntax(offset, format!("invalid integer {literal:?}"))
                })?;
                Token::Int(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, w)) = chars.peek() {
                    if !(w.is_ascii_alphanumeric() || w == '_') {
                        break;
                    }
                    word.push(w);
                    chars.next();
                }
                keyword(word)
            }
            other => {
                return Err(ExpressionError::syntax(
                    offset,
                    format!("unexpected character {other:?}"),
                ))
            }
        };

        tokens.push((offset, token));
    }

    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, ExpressionError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some((_, c)) if c == quote => return Ok(out),
            Some((pos, '\\')) => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, c @ ('\\' | '"' | '\''))) => out.push(c),
                Some((_, c)) => {
                    return Err(ExpressionError::syntax(
                        pos,
                        format!("unknown escape sequence \\{c}"),
                    ))
                }
                None => break,
            },
            Some((_, c)) => out.push(c),
            None => break,
        }
    }
    Err(ExpressionError::syntax(start, "unterminated string literal"))
}

fn keyword(word: String) -> Token {
    match word.as_str() {
        "true" => Token::True,
        "false" => Token::False,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "contains" => Token::Compare(CompareOp::Contains),
        "startsWith" => Token::Compare(CompareOp::StartsWith),
        "endsWith" => Token::Compare(CompareOp::EndsWith),
        "matches" => Token::Matches,
        _ => Token::Ident(word),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn descend(&mut self, offset: usize) -> Result<(), ExpressionError> {
        if self.depth >= MAX_NESTING {
            return Err(ExpressionError::syntax(
                offset,
                format!("expression is nested deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.parse_unary()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.descend(self.offset())?;
            self.next();
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, ExpressionError> {
        let lhs = self.parse_primary()?;

        match self.peek() {
            Some(Token::Compare(op)) => {
                let op = *op;
                self.next();
                let rhs = self.parse_primary()?;
                Ok(Node::Compare(op, Box::new(lhs), Box::new(rhs)))
            }
            Some(Token::Matches) => {
                self.next();
                let offset = self.offset();
                match self.next() {
                    Some(Token::Str(pattern)) => {
                        let regex = Regex::new(&pattern).map_err(|e| {
                            ExpressionError::InvalidRegex {
                                pattern: pattern.clone(),
                                message: e.to_string(),
                            }
                        })?;
                        Ok(Node::Matches(Box::new(lhs), regex))
                    }
                    _ => Err(ExpressionError::syntax(
                        offset,
                        "matches expects a string literal pattern",
                    )),
                }
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::True) => Ok(Node::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Node::Literal(Value::Bool(false))),
            Some(Token::Str(s)) => Ok(Node::Literal(Value::Str(s))),
            Some(Token::Int(i)) => Ok(Node::Literal(Value::Int(i))),
            Some(Token::Ident(name)) => {
                if !ATTRIBUTES.contains(&name.as_str()) {
                    return Err(ExpressionError::UnknownAttribute(name));
                }
                Ok(Node::Attribute(name))
            }
            Some(Token::LParen) => {
                self.descend(offset)?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                let close = self.offset();
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExpressionError::syntax(close, "expected ')'")),
                }
            }
            Some(token) => Err(ExpressionError::syntax(
                offset,
                format!("unexpected {token}"),
            )),
            None => Err(ExpressionError::syntax(offset, "unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstanceCpuInfo, InstanceMemoryInfo, MigrationStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn instance(path: &str, os: &str) -> Instance {
        Instance {
            uuid: Uuid::new_v4(),
            inventory_path: path.to_string(),
            annotation: "owner: team-a".to_string(),
            migration_status: MigrationStatus::NotAssignedBatch,
            migration_status_string: String::new(),
            last_update_from_source: Utc::now(),
            source_id: 1,
            target_id: None,
            batch_id: None,
            guest_tools_version: 12,
            architecture: "x86_64".to_string(),
            hardware_version: "vmx-19".to_string(),
            os: os.to_string(),
            os_version: "24.04".to_string(),
            devices: vec![],
            disks: vec![],
            nics: vec![],
            snapshots: vec![],
            cpu: InstanceCpuInfo {
                number_cpus: 4,
                cpu_affinity: vec![],
                number_of_cores_per_socket: 2,
            },
            memory: InstanceMemoryInfo {
                memory_in_bytes: 8 * 1024 * 1024 * 1024,
                memory_reservation_in_bytes: 0,
            },
            use_legacy_bios: false,
            secure_boot_enabled: true,
            tpm_present: false,
            needs_disk_import: false,
            secret_token: Uuid::new_v4(),
            overrides: None,
        }
    }

    fn eval(expr: &str, i: &Instance) -> Result<bool, ExpressionError> {
        Expression::parse(expr)?.matches(i, "vcenter-01")
    }

    #[test]
    fn test_literals() {
        let i = instance("/dc/vm/web-01", "Ubuntu");
        assert!(eval("true", &i).unwrap());
        assert!(!eval("false", &i).unwrap());
        assert!(eval("!false", &i).unwrap());
    }

    #[test]
    fn test_string_comparisons() {
        let i = instance("/prod/vm/web-01", "Ubuntu");
        assert!(eval(r#"os == "Ubuntu""#, &i).unwrap());
        assert!(eval("os != 'Windows'", &i).unwrap());
        assert!(eval(r#"path startsWith "/prod/""#, &i).unwrap());
        assert!(eval(r#"name endsWith "-01""#, &i).unwrap());
        assert!(eval(r#"annotation contains "team-a""#, &i).unwrap());
        assert!(eval(r#"source == "vcenter-01""#, &i).unwrap());
    }

    #[test]
    fn test_numeric_and_boolean_attributes() {
        let i = instance("/dc/vm/db", "Debian");
        assert!(eval("cpus >= 4 && cpus < 8", &i).unwrap());
        assert!(eval("memory > 1024", &i).unwrap());
        assert!(eval("secure_boot and not tpm", &i).unwrap());
        assert!(eval("guest_tools_version == 12", &i).unwrap());
    }

    #[test]
    fn test_precedence_and_grouping() {
        let i = instance("/dc/vm/db", "Debian");
        // && binds tighter than ||
        assert!(eval(r#"os == "Debian" || os == "Ubuntu" && cpus > 100"#, &i).unwrap());
        assert!(!eval(r#"(os == "Debian" || os == "Ubuntu") && cpus > 100"#, &i).unwrap());
    }

    #[test]
    fn test_matches() {
        let i = instance("/dc/vm/web-17", "Ubuntu");
        assert!(eval(r#"name matches "^web-[0-9]+$""#, &i).unwrap());
        assert!(!eval(r#"name matches "^db-""#, &i).unwrap());

        let err = Expression::parse(r#"name matches "([""#).unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidRegex { .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Expression::parse("os =="),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("(true"),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("true true"),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("colour == 'red'"),
            Err(ExpressionError::UnknownAttribute(name)) if name == "colour"
        ));
        assert!(matches!(
            Expression::parse("os = 'x'"),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("'unterminated"),
            Err(ExpressionError::Syntax { .. })
        ));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let nested = |depth: usize| format!("{}true{}", "(".repeat(depth), ")".repeat(depth));
        assert!(Expression::parse(&nested(MAX_NESTING)).is_ok());
        assert!(matches!(
            Expression::parse(&nested(MAX_NESTING + 1)),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse(&nested(200_000)),
            Err(ExpressionError::Syntax { .. })
        ));

        let negated = |depth: usize| format!("{}true", "!".repeat(depth));
        assert!(Expression::parse(&negated(MAX_NESTING)).is_ok());
        assert!(matches!(
            Expression::parse(&negated(MAX_NESTING + 1)),
            Err(ExpressionError::Syntax { .. })
        ));
    }

    #[test]
    fn test_long_operator_chains_are_rejected() {
        let chain = |terms: usize| vec!["true"; terms].join(" && ");
        assert!(Expression::parse(&chain(100)).is_ok());
        assert!(matches!(
            Expression::parse(&chain(200_000)),
            Err(ExpressionError::Syntax { .. })
        ));
    }

    #[test]
    fn test_type_errors_surface_at_evaluation() {
        let i = instance("/dc/vm/a", "Ubuntu");
        assert!(matches!(eval("os > 3", &i), Err(ExpressionError::Type(_))));
        assert!(matches!(eval("os", &i), Err(ExpressionError::Type(_))));
        assert!(matches!(eval("cpus && true", &i), Err(ExpressionError::Type(_))));
    }

    #[test]
    fn test_overrides_feed_effective_cpus() {
        let mut i = instance("/dc/vm/a", "Ubuntu");
        let mut overrides = crate::types::Overrides::new(i.uuid);
        overrides.number_cpus = 16;
        i.overrides = Some(overrides);
        assert!(eval("cpus == 16", &i).unwrap());
    }
}
