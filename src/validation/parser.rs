//! Validation expression parsing
//!
//! `path operator expected`, e.g. `$.code=0`, `$.data.id:exists`,
//! `$.status:in[ACTIVE, PENDING]`.

use std::fmt;
use std::str::FromStr;

use crate::errors::{FlowpulseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Regex,
    Exists,
    NotExists,
    Null,
    NotNull,
    Empty,
    NotEmpty,
    In,
    NotIn,
    Contains,
    NotContains,
}

/// How an operator consumes the text after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Binary,
    Unary,
    List,
}

/// Operator tokens recognised inside an expression, in match priority.
/// At any one position the first entry that matches wins, so longer
/// spellings come before their prefixes.
const TOKENS: &[(&str, Operator, Arity)] = &[
    ("!=", Operator::Ne, Arity::Binary),
    (">=", Operator::Gte, Arity::Binary),
    ("<=", Operator::Lte, Arity::Binary),
    ("~=", Operator::Regex, Arity::Binary),
    (">", Operator::Gt, Arity::Binary),
    ("<", Operator::Lt, Arity::Binary),
    ("=", Operator::Eq, Arity::Binary),
    (":exists", Operator::Exists, Arity::Unary),
    (":exist", Operator::Exists, Arity::Unary),
    (":notExists", Operator::NotExists, Arity::Unary),
    (":notExist", Operator::NotExists, Arity::Unary),
    (":null", Operator::Null, Arity::Unary),
    (":notNull", Operator::NotNull, Arity::Unary),
    (":empty", Operator::Empty, Arity::Unary),
    (":notEmpty", Operator::NotEmpty, Arity::Unary),
    (":in", Operator::In, Arity::List),
    (":notIn", Operator::NotIn, Arity::List),
];

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Regex => "~=",
            Operator::Exists => ":exists",
            Operator::NotExists => ":notExist",
            Operator::Null => ":null",
            Operator::NotNull => ":notNull",
            Operator::Empty => ":empty",
            Operator::NotEmpty => ":notEmpty",
            Operator::In => ":in",
            Operator::NotIn => ":notIn",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
        }
    }

    /// Operators that take no expected value
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::Exists
                | Operator::NotExists
                | Operator::Null
                | Operator::NotNull
                | Operator::Empty
                | Operator::NotEmpty
        )
    }

    /// Operators that are satisfied by a path that is not in the response
    pub fn accepts_missing(&self) -> bool {
        matches!(self, Operator::Null | Operator::NotExists)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = FlowpulseError;

    /// Accepts symbols and their word aliases, case-insensitively
    fn from_str(s: &str) -> Result<Self> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Operator::Eq,
            "!=" | "<>" | "ne" => Operator::Ne,
            ">" | "gt" => Operator::Gt,
            ">=" | "gte" => Operator::Gte,
            "<" | "lt" => Operator::Lt,
            "<=" | "lte" => Operator::Lte,
            "~=" | "regex" | "matches" => Operator::Regex,
            ":exist" | ":exists" => Operator::Exists,
            ":notexist" | ":notexists" => Operator::NotExists,
            ":null" => Operator::Null,
            ":notnull" => Operator::NotNull,
            ":empty" => Operator::Empty,
            ":notempty" => Operator::NotEmpty,
            ":in" => Operator::In,
            ":notin" => Operator::NotIn,
            "contains" => Operator::Contains,
            "notcontains" => Operator::NotContains,
            other => {
                return Err(FlowpulseError::Parse(format!("Unsupported operator: {}", other)))
            }
        };
        Ok(op)
    }
}

/// Right-hand side of a validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    None,
    Value(String),
    List(Vec<String>),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::None => Ok(()),
            Expected::Value(v) => f.write_str(v),
            Expected::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Parse `[a, b, c]` (brackets optional) into trimmed, unquoted elements
pub fn parse_list(raw: &str) -> Vec<String> {
    let inner = raw.trim();
    let inner = inner.strip_prefix('[').unwrap_or(inner);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            strip_quotes(item).to_string()
        })
        .collect()
}

fn strip_quotes(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// A parsed validation expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub path: String,
    pub operator: Operator,
    pub expected: Expected,
}

impl Validation {
    pub fn new(path: impl Into<String>, operator: Operator, expected: Expected) -> Self {
        Self {
            path: path.into(),
            operator,
            expected,
        }
    }

    /// Parse a single validation string.
    ///
    /// Positions are scanned left to right; at each position the operator
    /// table is tried in priority order. Operator characters inside `[...]`
    /// belong to the path (JSONPath filters and slices) and are skipped.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let mut depth = 0usize;

        for (pos, ch) in expression.char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                _ => {}
            }
            if depth > 0 {
                continue;
            }

            let rest = &expression[pos..];
            let Some((token, operator, arity)) = match_token(rest) else {
                continue;
            };

            let path = expression[..pos].trim();
            if path.is_empty() {
                return Err(FlowpulseError::Parse(format!(
                    "Validation has no path: {}",
                    expression
                )));
            }
            let tail = rest[token.len()..].trim();
            let expected = match arity {
                Arity::Binary => Expected::Value(tail.to_string()),
                Arity::List => Expected::List(parse_list(tail)),
                Arity::Unary => {
                    if !tail.is_empty() {
                        return Err(FlowpulseError::Parse(format!(
                            "Operator {} takes no value, found '{}'",
                            operator, tail
                        )));
                    }
                    Expected::None
                }
            };
            return Ok(Self::new(path, operator, expected));
        }

        Err(FlowpulseError::Parse(format!(
            "Cannot parse validation expression: {}",
            expression
        )))
    }
}

fn match_token(rest: &str) -> Option<(&'static str, Operator, Arity)> {
    TOKENS.iter().copied().find(|(token, _, _)| {
        if token.starts_with(':') {
            rest.get(..token.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(token))
        } else {
            rest.starts_with(token)
        }
    })
}

impl FromStr for Validation {
    type Err = FlowpulseError;

    fn from_str(s: &str) -> Result<Self> {
        Validation::parse(s)
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.path, self.operator, self.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Validation {
        Validation::parse(s).unwrap()
    }

    #[test]
    fn test_parse_equals() {
        let v = parse("$.code=0");
        assert_eq!(v.path, "$.code");
        assert_eq!(v.operator, Operator::Eq);
        assert_eq!(v.expected, Expected::Value("0".into()));
    }

    #[test]
    fn test_two_char_operators_win() {
        assert_eq!(parse("$.n>=5").operator, Operator::Gte);
        assert_eq!(parse("$.n<=5").operator, Operator::Lte);
        assert_eq!(parse("$.n!=5").operator, Operator::Ne);
        assert_eq!(parse("$.s~=^a.*$").operator, Operator::Regex);
        assert_eq!(parse("$.n>5").expected, Expected::Value("5".into()));
    }

    #[test]
    fn test_first_operator_splits() {
        // the value may contain operator characters
        let v = parse("$.expr=a>=b");
        assert_eq!(v.operator, Operator::Eq);
        assert_eq!(v.expected, Expected::Value("a>=b".into()));
    }

    #[test]
    fn test_parse_in_list() {
        let v = parse("$.id:in[1,2,3]");
        assert_eq!(v.operator, Operator::In);
        assert_eq!(v.expected, Expected::List(vec!["1".into(), "2".into(), "3".into()]));

        let v = parse("$.state:notIn[ 'A' , B ]");
        assert_eq!(v.operator, Operator::NotIn);
        assert_eq!(v.expected, Expected::List(vec!["A".into(), "B".into()]));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(parse("$.a:exist").operator, Operator::Exists);
        assert_eq!(parse("$.a:exists").operator, Operator::Exists);
        assert_eq!(parse("$.a:null").operator, Operator::Null);
        assert_eq!(parse("$.a:notNull").operator, Operator::NotNull);
        assert_eq!(parse("$.a:notnull").operator, Operator::NotNull);
        assert_eq!(parse("$.a:empty").operator, Operator::Empty);
        assert_eq!(parse("$.a:notEmpty").operator, Operator::NotEmpty);
        assert_eq!(parse("$.a:notExist").operator, Operator::NotExists);
        assert_eq!(parse("$.a:exists").expected, Expected::None);
        assert!(Validation::parse("$.a:null extra").is_err());
    }

    #[test]
    fn test_filter_brackets_are_part_of_path() {
        let v = parse("$.items[?(@.price>10)].name=apple");
        assert_eq!(v.path, "$.items[?(@.price>10)].name");
        assert_eq!(v.operator, Operator::Eq);
        assert_eq!(v.expected, Expected::Value("apple".into()));

        let v = parse("$.list[0:2]:notEmpty");
        assert_eq!(v.path, "$.list[0:2]");
        assert_eq!(v.operator, Operator::NotEmpty);
    }

    #[test]
    fn test_errors() {
        assert!(Validation::parse("=5").is_err());
        assert!(Validation::parse("  :exists").is_err());
        assert!(Validation::parse("$.no.operator").is_err());
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("ne".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("GTE".parse::<Operator>().unwrap(), Operator::Gte);
        assert_eq!("matches".parse::<Operator>().unwrap(), Operator::Regex);
        assert_eq!("notContains".parse::<Operator>().unwrap(), Operator::NotContains);
        assert!("between".parse::<Operator>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for s in ["$.code=0", "$.id:in[1, 2]", "$.a:notNull", "$.n>=10.5"] {
            assert_eq!(parse(s).to_string(), s);
        }
    }
}
