//! Pattern-to-regex compilation.
//!
//! Translates route/topic patterns into anchored regexes. The grammar:
//!
//! | token | meaning | translation |
//! |---|---|---|
//! | `:name` | named parameter, one segment | `[^/]+` |
//! | `${name}` | templated parameter, one segment | `[^/]+` or a literal substitution |
//! | `+` | exactly one wildcard segment | `[^/]+` |
//! | `*` | word wildcard within a segment | `\w+` |
//! | `**` | any number of characters | `.{0,}` |
//! | `/#` (suffix) | optional trailing sub-path | `(/.{0,})?` |
//! | `.` | literal dot | `\.` |
//!
//! Translation is segment-wise: the trailing `/#` is peeled off first, then
//! each `/`-separated segment is translated independently, so a wildcard
//! inserted for one token can never be re-interpreted as another token.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RoutingError;

/// Combined detection regex covering every dynamic token in the grammar.
static PATTERN_TOKENS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r":\w+|\$\{\w+\}|[+*#]").expect("pattern-token regex is statically valid")
});

/// Named/templated parameter tokens, used for substitution and expansion.
static PARAM_TOKENS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r":(\w+)|\$\{(\w+)\}").expect("param-token regex is statically valid")
});

/// A declared parameter value: one concrete value, or a list of values that
/// expands a pattern into multiple concrete variants (used to pre-enumerate
/// subscribable topics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Single concrete value
    One(String),
    /// List of concrete values; registration expands over the cartesian
    /// product
    Many(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::One(v.to_string())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(vs: Vec<String>) -> Self {
        ParamValue::Many(vs)
    }
}

/// True if the route contains any dynamic token.
#[must_use]
pub fn is_pattern(route: &str) -> bool {
    PATTERN_TOKENS.is_match(route)
}

/// Substitute named/templated tokens that have concrete values.
///
/// Tokens without a declared value are left in place for the regex
/// translation. A `Many` value multiplies the variant list; multiple `Many`
/// parameters expand over the cartesian product.
#[must_use]
pub fn expand_params(pattern: &str, params: &HashMap<String, ParamValue>) -> Vec<String> {
    let mut variants = vec![String::new()];
    let mut last = 0;

    for caps in PARAM_TOKENS.captures_iter(pattern) {
        #[allow(clippy::expect_used)]
        let token = caps.get(0).expect("capture group 0 always present");
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();

        let literal = &pattern[last..token.start()];
        for v in &mut variants {
            v.push_str(literal);
        }

        match params.get(name) {
            Some(ParamValue::One(value)) => {
                for v in &mut variants {
                    v.push_str(value);
                }
            }
            Some(ParamValue::Many(values)) => {
                let mut expanded = Vec::with_capacity(variants.len() * values.len());
                for prefix in &variants {
                    for value in values {
                        let mut v = prefix.clone();
                        v.push_str(value);
                        expanded.push(v);
                    }
                }
                variants = expanded;
            }
            None => {
                for v in &mut variants {
                    v.push_str(token.as_str());
                }
            }
        }
        last = token.end();
    }

    let tail = &pattern[last..];
    for v in &mut variants {
        v.push_str(tail);
    }
    variants
}

/// Compile a dynamic pattern into an anchored regex.
pub fn compile(pattern: &str) -> Result<Regex, RoutingError> {
    let translated = translate(pattern);
    Regex::new(&translated).map_err(|e| RoutingError::BadRequest {
        reason: format!("pattern '{}' does not compile: {}", pattern, e),
    })
}

/// Translate a pattern into anchored regex source.
#[must_use]
pub fn translate(pattern: &str) -> String {
    // Peel the optional-tail marker off before splitting into segments.
    let (body, optional_tail) = match pattern.strip_suffix("/#") {
        Some(rest) => (rest, true),
        None => (pattern, false),
    };

    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut first = true;
    for segment in body.split('/') {
        if !first {
            out.push('/');
        }
        first = false;
        translate_segment(segment, &mut out);
    }
    if optional_tail {
        out.push_str("(/.{0,})?");
    }
    out.push('$');
    out
}

fn translate_segment(segment: &str, out: &mut String) {
    let mut rest = segment;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**") {
            out.push_str(".{0,}");
            rest = after;
            continue;
        }
        if let Some(m) = PARAM_TOKENS.find(rest) {
            if m.start() == 0 {
                out.push_str("[^/]+");
                rest = &rest[m.end()..];
                continue;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            push_literal(c, out);
        }
        rest = chars.as_str();
    }
}

fn push_literal(c: char, out: &mut String) {
    match c {
        '+' => out.push_str("[^/]+"),
        '*' => out.push_str(r"\w+"),
        '.' => out.push_str(r"\."),
        '#' => out.push('#'),
        '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '?' | '\\' => {
            out.push('\\');
            out.push(c);
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_routes_are_not_patterns() {
        assert!(!is_pattern("device/init"));
        assert!(!is_pattern("/a/b/c"));
        assert!(is_pattern("device/:id/used"));
        assert!(is_pattern("device/${id}"));
        assert!(is_pattern("a/+/c"));
        assert!(is_pattern("a/*"));
        assert!(is_pattern("a/#"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let re = compile("a/+/c").unwrap();
        assert!(re.is_match("a/b/c"));
        assert!(!re.is_match("a/b/b/c"));
        assert!(!re.is_match("a/c"));
    }

    #[test]
    fn test_optional_tail() {
        let re = compile("a/#").unwrap();
        assert!(re.is_match("a"));
        assert!(re.is_match("a/b"));
        assert!(re.is_match("a/b/c"));
        assert!(!re.is_match("ab"));
    }

    #[test]
    fn test_named_parameter_is_one_segment() {
        let re = compile("device/:id/used").unwrap();
        assert!(re.is_match("device/42/used"));
        assert!(!re.is_match("device/used"));
        assert!(!re.is_match("device/4/2/used"));
    }

    #[test]
    fn test_word_wildcard_stays_within_word() {
        let re = compile("sensor/*-reading").unwrap();
        assert!(re.is_match("sensor/temp-reading"));
        assert!(!re.is_match("sensor/te mp-reading"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let re = compile("log/**").unwrap();
        assert!(re.is_match("log/a"));
        assert!(re.is_match("log/a/b/c"));
        assert!(re.is_match("log/"));
    }

    #[test]
    fn test_dot_is_literal() {
        let re = compile("host/node.local/:metric").unwrap();
        assert!(re.is_match("host/node.local/load"));
        assert!(!re.is_match("host/nodeXlocal/load"));
    }

    #[test]
    fn test_expand_single_value() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), ParamValue::from("42"));
        assert_eq!(
            expand_params("device/:id/used", &params),
            vec!["device/42/used".to_string()]
        );
    }

    #[test]
    fn test_expand_list_value_produces_variants() {
        let mut params = HashMap::new();
        params.insert(
            "id".to_string(),
            ParamValue::Many(vec!["1".to_string(), "2".to_string()]),
        );
        assert_eq!(
            expand_params("device/${id}/state", &params),
            vec!["device/1/state".to_string(), "device/2/state".to_string()]
        );
    }

    #[test]
    fn test_expand_leaves_undeclared_tokens() {
        let params = HashMap::new();
        assert_eq!(
            expand_params("device/:id/used", &params),
            vec!["device/:id/used".to_string()]
        );
    }

    #[test]
    fn test_expand_cartesian_product() {
        let mut params = HashMap::new();
        params.insert(
            "a".to_string(),
            ParamValue::Many(vec!["x".to_string(), "y".to_string()]),
        );
        params.insert("b".to_string(), ParamValue::from("z"));
        let variants = expand_params(":a/:b", &params);
        assert_eq!(variants, vec!["x/z".to_string(), "y/z".to_string()]);
    }
}
