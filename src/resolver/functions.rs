//! Template function registry
//!
//! Built-in functions invoked from templates as `__name(arg1,arg2)`:
//! - `__random(len[,onlyNumber])` - random alphanumeric string (default 6)
//! - `__randomInt(min,max)` - random integer in the inclusive range
//! - `__randomStrArr(arrLen,strLen,onlyNumber)` - JSON array of random strings
//! - `__uuid()` - random UUID v4
//! - `__date([format[,offsetDays]])` - local date/time, Java or strftime patterns
//! - `__timestamp([ms|s])` - Unix timestamp, milliseconds by default
//! - `__base64(text[,encode|decode])`
//! - `__aes(text,key[,encrypt|decrypt])`
//! - `__rsa(text,key[,encrypt|decrypt|sign])`
//! - `__sha(text[,256|512])`
//! - `__md5(text[,upper])`
//! - `__hmac(text,key[,256|512])`
//!
//! Further functions can be registered at runtime.

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, TimeDelta};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::crypto;
use crate::errors::{FlowpulseError, Result};

/// A template function: takes the comma-split arguments, returns the expansion
pub type TemplateFn = Arc<dyn Fn(&[&str]) -> Result<String> + Send + Sync>;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest string `__random` and `__randomStrArr` will generate
pub const MAX_RANDOM_LEN: usize = 4096;
/// Most elements `__randomStrArr` will generate
pub const MAX_RANDOM_ARRAY_LEN: usize = 1024;

#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, TemplateFn>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    /// Registry with no functions at all
    pub fn empty() -> Self {
        Self { functions: HashMap::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("random", random);
        registry.register("randomInt", random_int);
        registry.register("randomStrArr", random_str_arr);
        registry.register("uuid", |_: &[&str]| Ok(Uuid::new_v4().to_string()));
        registry.register("date", date);
        registry.register("timestamp", timestamp);
        registry.register("base64", base64);
        registry.register("aes", aes);
        registry.register("rsa", rsa);
        registry.register("sha", sha);
        registry.register("md5", md5);
        registry.register("hmac", hmac);
        registry
    }

    /// Register (or replace) a function
    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&[&str]) -> Result<String> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(func));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Invoke `name`. Returns `None` for unknown functions.
    pub fn call(&self, name: &str, args: &[&str]) -> Option<Result<String>> {
        self.functions.get(name).map(|f| f(args))
    }
}

fn require_args(func: &str, args: &[&str], min: usize) -> Result<()> {
    if args.len() < min {
        return Err(FlowpulseError::Argument(format!(
            "{} expects at least {} argument(s), got {}",
            func,
            min,
            args.len()
        )));
    }
    Ok(())
}

/// Optional argument, `None` when absent or blank
fn opt_arg<'a>(args: &[&'a str], idx: usize) -> Option<&'a str> {
    args.get(idx).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_num<T: std::str::FromStr>(func: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        FlowpulseError::Argument(format!("{}: '{}' is not a valid number", func, value))
    })
}

/// A length argument, rejected above `max`
fn parse_len(func: &str, value: &str, max: usize) -> Result<usize> {
    let len: usize = parse_num(func, value)?;
    if len > max {
        return Err(FlowpulseError::Argument(format!(
            "{}: length {} exceeds the limit of {}",
            func, len, max
        )));
    }
    Ok(len)
}

fn parse_flag(value: Option<&str>) -> bool {
    value.map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Generate a random alphanumeric (or digit-only) string
pub fn generate_random_string(len: usize, only_number: bool) -> String {
    let mut rng = rand::rng();
    if only_number {
        (0..len)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect()
    } else {
        use rand::distr::Alphanumeric;
        rng.sample_iter(&Alphanumeric).take(len).map(char::from).collect()
    }
}

fn random(args: &[&str]) -> Result<String> {
    let len = match opt_arg(args, 0) {
        Some(v) => parse_len("random", v, MAX_RANDOM_LEN)?,
        None => 6,
    };
    Ok(generate_random_string(len, parse_flag(opt_arg(args, 1))))
}

fn random_int(args: &[&str]) -> Result<String> {
    require_args("randomInt", args, 2)?;
    let min: i64 = parse_num("randomInt", args[0])?;
    let max: i64 = parse_num("randomInt", args[1])?;
    if min > max {
        return Err(FlowpulseError::Argument(format!(
            "randomInt: min {} is greater than max {}",
            min, max
        )));
    }
    Ok(rand::rng().random_range(min..=max).to_string())
}

fn random_str_arr(args: &[&str]) -> Result<String> {
    let arr_len = match opt_arg(args, 0) {
        Some(v) => parse_len("randomStrArr", v, MAX_RANDOM_ARRAY_LEN)?,
        None => 1,
    };
    let str_len = match opt_arg(args, 1) {
        Some(v) => parse_len("randomStrArr", v, MAX_RANDOM_LEN)?,
        None => 6,
    };
    let only_number = parse_flag(opt_arg(args, 2));
    let items: Vec<String> = (0..arr_len)
        .map(|_| generate_random_string(str_len, only_number))
        .collect();
    Ok(serde_json::to_string(&items)?)
}

/// Translate Java-style date patterns (`yyyy-MM-dd HH:mm:ss.SSS`) to strftime.
/// Patterns that already contain `%` are taken as strftime.
fn to_strftime(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }
    const TOKENS: &[(&str, &str)] = &[
        ("yyyy", "%Y"),
        ("SSS", "%3f"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (java, strf) in TOKENS {
            if let Some(tail) = rest.strip_prefix(java) {
                out.push_str(strf);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

fn date(args: &[&str]) -> Result<String> {
    let format = opt_arg(args, 0)
        .map(to_strftime)
        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
    let items: Vec<Item<'_>> = StrftimeItems::new(&format).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(FlowpulseError::Argument(format!(
            "date: invalid format '{}'",
            format
        )));
    }

    let mut now = Local::now();
    if let Some(offset) = opt_arg(args, 1) {
        let days: i64 = parse_num("date", offset)?;
        let delta = TimeDelta::try_days(days)
            .ok_or_else(|| FlowpulseError::Argument(format!("date: offset {} out of range", days)))?;
        now += delta;
    }
    Ok(now.format_with_items(items.into_iter()).to_string())
}

fn timestamp(args: &[&str]) -> Result<String> {
    let now = chrono::Utc::now();
    match opt_arg(args, 0) {
        Some("s") => Ok(now.timestamp().to_string()),
        Some("ms") | None => Ok(now.timestamp_millis().to_string()),
        Some(other) => Err(FlowpulseError::Argument(format!(
            "timestamp: unknown unit '{}', expected ms or s",
            other
        ))),
    }
}

fn mode<'a>(args: &[&'a str], idx: usize, default: &'a str) -> String {
    opt_arg(args, idx).unwrap_or(default).to_ascii_lowercase()
}

fn base64(args: &[&str]) -> Result<String> {
    require_args("base64", args, 1)?;
    if mode(args, 1, "encode") == "decode" {
        crypto::base64_decode(args[0])
    } else {
        Ok(crypto::base64_encode(args[0]))
    }
}

fn aes(args: &[&str]) -> Result<String> {
    require_args("aes", args, 2)?;
    if mode(args, 2, "encrypt") == "decrypt" {
        crypto::aes_decrypt(args[0], args[1])
    } else {
        Ok(crypto::aes_encrypt(args[0], args[1]))
    }
}

fn rsa(args: &[&str]) -> Result<String> {
    require_args("rsa", args, 2)?;
    match mode(args, 2, "encrypt").as_str() {
        "decrypt" => crypto::rsa_decrypt(args[0], args[1]),
        "sign" => crypto::rsa_sign(args[0], args[1]),
        _ => crypto::rsa_encrypt(args[0], args[1]),
    }
}

fn sha(args: &[&str]) -> Result<String> {
    require_args("sha", args, 1)?;
    match opt_arg(args, 1) {
        Some("512") => Ok(crypto::sha512_hex(args[0])),
        _ => Ok(crypto::sha256_hex(args[0])),
    }
}

fn md5(args: &[&str]) -> Result<String> {
    require_args("md5", args, 1)?;
    let digest = crypto::md5_hex(args[0]);
    if mode(args, 1, "lower") == "upper" {
        Ok(digest.to_uppercase())
    } else {
        Ok(digest)
    }
}

fn hmac(args: &[&str]) -> Result<String> {
    require_args("hmac", args, 2)?;
    let bits = match opt_arg(args, 2) {
        Some(v) => parse_num::<u16>("hmac", v)?,
        None => 256,
    };
    crypto::hmac_hex(args[0], args[1], bits)
}
