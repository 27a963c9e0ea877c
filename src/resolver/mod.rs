//! Variable and function resolution for request templates
//!
//! A template is split into tokens in one left-to-right pass:
//! - `${name}` - replaced from the shared data pool, left verbatim if absent
//! - `__name(a,b)` - replaced by calling a registered function
//! - everything else is literal text
//!
//! Rendering never re-scans its own output, so values that happen to look
//! like placeholders are emitted as-is.

pub mod crypto;
pub mod functions;

use tracing::{debug, warn};

use crate::errors::{FlowpulseError, Result};
use crate::store::SharedDataPool;
pub use functions::{FunctionRegistry, TemplateFn};

/// A piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Literal(&'a str),
    /// `${name}`; `raw` is the full placeholder text
    Variable { name: &'a str, raw: &'a str },
    /// `__name(args)`; `args` is the text between the parentheses
    Function { name: &'a str, args: &'a str, raw: &'a str },
}

/// Split a template into literal, variable and function tokens
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let matched = match bytes[i] {
            b'$' => scan_variable(input, i),
            b'_' => scan_function(input, i),
            _ => None,
        };

        match matched {
            Some((token, end)) => {
                if literal_start < i {
                    tokens.push(Token::Literal(&input[literal_start..i]));
                }
                tokens.push(token);
                i = end;
                literal_start = end;
            }
            None => i += 1,
        }
    }

    if literal_start < bytes.len() {
        tokens.push(Token::Literal(&input[literal_start..]));
    }
    tokens
}

/// `${name}` starting at `start`; name is one or more chars other than `}`
fn scan_variable(input: &str, start: usize) -> Option<(Token<'_>, usize)> {
    let rest = input[start..].strip_prefix("${")?;
    let close = rest.find('}')?;
    if close == 0 {
        return None;
    }
    let end = start + 2 + close + 1;
    Some((
        Token::Variable {
            name: &rest[..close],
            raw: &input[start..end],
        },
        end,
    ))
}

/// `__name(args)` starting at `start`; name is ASCII letters, args stop at the first `)`
fn scan_function(input: &str, start: usize) -> Option<(Token<'_>, usize)> {
    let rest = input[start..].strip_prefix("__")?;
    let name_len = rest.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
    if name_len == 0 {
        return None;
    }
    let after_name = rest[name_len..].strip_prefix('(')?;
    let close = after_name.find(')')?;
    let end = start + 2 + name_len + 1 + close + 1;
    Some((
        Token::Function {
            name: &rest[..name_len],
            args: &after_name[..close],
            raw: &input[start..end],
        },
        end,
    ))
}

/// Split a function argument list on commas. An empty list has no arguments.
pub fn split_args(args: &str) -> Vec<&str> {
    if args.is_empty() {
        Vec::new()
    } else {
        args.split(',').collect()
    }
}

/// Renders templates against a shared data pool
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    functions: FunctionRegistry,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Resolve every placeholder and function call in `template`.
    ///
    /// Unknown variables and unknown functions are emitted verbatim. A
    /// function that rejects its arguments fails the whole resolution.
    pub fn resolve(&self, template: &str, pool: &SharedDataPool) -> Result<String> {
        let tokens = tokenize(template);
        let mut out = String::with_capacity(template.len());

        for token in tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Variable { name, raw } => match pool.get(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        debug!(variable = %name, "Unresolved variable left in place");
                        out.push_str(raw);
                    }
                },
                Token::Function { name, args, raw } => {
                    let arg_list = split_args(args);
                    match self.functions.call(name, &arg_list) {
                        Some(Ok(value)) => out.push_str(&value),
                        Some(Err(FlowpulseError::Argument(msg))) => {
                            return Err(FlowpulseError::Argument(format!("__{}: {}", name, msg)));
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            warn!(function = %name, "Unknown template function, left unexpanded");
                            out.push_str(raw);
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Resolve an optional template
    pub fn resolve_opt(&self, template: Option<&str>, pool: &SharedDataPool) -> Result<Option<String>> {
        template.map(|t| self.resolve(t, pool)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> SharedDataPool {
        SharedDataPool::from_map([("userId", "42"), ("token", "abc")])
    }

    #[test]
    fn test_tokenize_kinds() {
        let tokens = tokenize("/users/${userId}?t=__md5(x)");
        assert_eq!(
            tokens,
            vec![
                Token::Literal("/users/"),
                Token::Variable { name: "userId", raw: "${userId}" },
                Token::Literal("?t="),
                Token::Function { name: "md5", args: "x", raw: "__md5(x)" },
            ]
        );
    }

    #[test]
    fn test_tokenize_incomplete_forms_are_literal() {
        assert_eq!(tokenize("${}"), vec![Token::Literal("${}")]);
        assert_eq!(tokenize("cost $5 ${open"), vec![Token::Literal("cost $5 ${open")]);
        assert_eq!(tokenize("__nope no parens"), vec![Token::Literal("__nope no parens")]);
        assert_eq!(tokenize("__1(x)"), vec![Token::Literal("__1(x)")]);
        assert_eq!(tokenize("__f(unclosed"), vec![Token::Literal("__f(unclosed")]);
    }

    #[test]
    fn test_tokenize_extra_underscore() {
        let tokens = tokenize("___uuid()");
        assert_eq!(
            tokens,
            vec![
                Token::Literal("_"),
                Token::Function { name: "uuid", args: "", raw: "__uuid()" },
            ]
        );
    }

    #[test]
    fn test_tokenize_non_ascii_literals() {
        let tokens = tokenize("名前=${name}✓");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::Literal("名前="));
        assert_eq!(tokens[2], Token::Literal("✓"));
    }

    #[test]
    fn test_split_args() {
        assert!(split_args("").is_empty());
        assert_eq!(split_args("a"), vec!["a"]);
        assert_eq!(split_args("a, b"), vec!["a", " b"]);
    }

    #[test]
    fn test_plain_template_unchanged() {
        let resolver = Resolver::new();
        for t in ["", "plain text", "{\"a\":1}", "$ and _ alone", "/path/with_underscores"] {
            assert_eq!(resolver.resolve(t, &pool()).unwrap(), t);
        }
    }

    #[test]
    fn test_variables() {
        let resolver = Resolver::new();
        assert_eq!(
            resolver.resolve("/users/${userId}/orders?token=${token}", &pool()).unwrap(),
            "/users/42/orders?token=abc"
        );
        assert_eq!(resolver.resolve("${missing}-${userId}", &pool()).unwrap(), "${missing}-42");
    }

    #[test]
    fn test_known_function_is_expanded() {
        let resolver = Resolver::new();
        let out = resolver.resolve("sig=__md5(hello)", &pool()).unwrap();
        assert_eq!(out, "sig=5d41402abc4b2a76b9719d911017c592");
        assert!(!out.contains("__md5("));

        let id = resolver.resolve("__uuid()", &pool()).unwrap();
        assert!(!id.contains("__uuid("));
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn test_unknown_function_left_verbatim() {
        let resolver = Resolver::new();
        assert_eq!(
            resolver.resolve("x=__doesNotExist(1,2)&id=${userId}", &pool()).unwrap(),
            "x=__doesNotExist(1,2)&id=42"
        );
    }

    #[test]
    fn test_argument_error_names_function() {
        let resolver = Resolver::new();
        match resolver.resolve("__randomInt(5)", &pool()) {
            Err(FlowpulseError::Argument(msg)) => assert!(msg.contains("randomInt"), "{}", msg),
            other => panic!("expected argument error, got {:?}", other),
        }
    }

    #[test]
    fn test_output_not_rescanned() {
        let mut resolver = Resolver::new();
        resolver
            .functions_mut()
            .register("echo", |args: &[&str]| Ok(args.join(",")));
        let pool = SharedDataPool::from_map([("a", "${b}"), ("b", "never")]);

        // function output containing placeholder syntax stays as-is
        let b64 = crypto::base64_encode("${b}");
        assert_eq!(
            resolver.resolve(&format!("__base64({},decode)", b64), &pool).unwrap(),
            "${b}"
        );
        // variable values are not expanded again
        assert_eq!(resolver.resolve("${a}", &pool).unwrap(), "${b}");
        // function arguments are passed through literally
        assert_eq!(resolver.resolve("__echo(${b},x)", &pool).unwrap(), "${b},x");
    }

    #[test]
    fn test_resolve_opt() {
        let resolver = Resolver::new();
        assert_eq!(resolver.resolve_opt(None, &pool()).unwrap(), None);
        assert_eq!(
            resolver.resolve_opt(Some("${token}"), &pool()).unwrap().as_deref(),
            Some("abc")
        );
    }
}
