//! Register protocol parser.
//!
//! Responses are flat sequences of alternating key and value tokens. The
//! controller separates them with `;`, and echoed assignments use `=`, so
//! both of these carry the same two pairs:
//!
//! ```text
//! R1[10]=0;R1[31]=-1226;
//! R1[10];0;R1[31];-1226;;
//! ```
//!
//! Keys in the canonical register array (`R1[n]`) are reduced to their
//! index; every other key is kept verbatim.

use std::fmt;

/// Register-array name whose bracketed keys are reduced to an index.
pub const REGISTER_ARRAY: &str = "R1";

/// Key of a [`RegisterPair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterKey {
    /// `R1[n]`.
    Index(u32),
    /// Any other token, as received.
    Name(String),
}

impl fmt::Display for RegisterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterKey::Index(n) => write!(f, "{n}"),
            RegisterKey::Name(s) => f.write_str(s),
        }
    }
}

/// Value of a [`RegisterPair`].
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValue {
    Number(f64),
    /// Anything that is not a finite number, including the empty string.
    Text(String),
}

impl RegisterValue {
    /// Parse a value token. Empty and non-finite tokens stay text.
    pub fn parse(token: &str) -> Self {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return RegisterValue::Text(token.to_string());
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => RegisterValue::Number(v),
            _ => RegisterValue::Text(token.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RegisterValue::Number(v) => Some(*v),
            RegisterValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RegisterValue::Text(s) => Some(s),
            RegisterValue::Number(_) => None,
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Number(v) => write!(f, "{v}"),
            RegisterValue::Text(s) => f.write_str(s),
        }
    }
}

/// One `(key, value)` pair from a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterPair {
    pub key: RegisterKey,
    pub value: RegisterValue,
}

/// Parse `R1[<digits>]` into its index.
fn register_index(token: &str) -> Option<u32> {
    token
        .strip_prefix(REGISTER_ARRAY)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))?
        .parse()
        .ok()
}

fn parse_key(token: &str) -> RegisterKey {
    match register_index(token) {
        Some(n) => RegisterKey::Index(n),
        None => RegisterKey::Name(token.to_string()),
    }
}

/// Split a response into ordered key/value pairs.
///
/// Empty tokens are dropped before pairing, and a trailing key without a
/// value is dropped silently.
///
/// # Examples
///
/// ```
/// use gimbal_link::registers::{parse_pairs, RegisterKey, RegisterValue};
///
/// let pairs = parse_pairs("R1[10]=0;R1[31]=-1226;");
/// assert_eq!(pairs[1].key, RegisterKey::Index(31));
/// assert_eq!(pairs[1].value, RegisterValue::Number(-1226.0));
/// ```
pub fn parse_pairs(text: &str) -> Vec<RegisterPair> {
    let tokens: Vec<&str> = text
        .trim()
        .split([';', '='])
        .filter(|t| !t.is_empty())
        .collect();

    tokens
        .chunks_exact(2)
        .map(|kv| RegisterPair {
            key: parse_key(kv[0].trim()),
            value: RegisterValue::parse(kv[1]),
        })
        .collect()
}

/// Every bracketed integer in a command, in order.
///
/// ```
/// use gimbal_link::registers::extract_keys;
///
/// assert_eq!(extract_keys("R1[2];R1[14];R1[3]"), vec!["2", "14", "3"]);
/// ```
pub fn extract_keys(command: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = command;

    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        let inner = &after[..close];
        if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
            keys.push(inner.to_string());
        }
        rest = &after[close + 1..];
    }

    keys
}

/// Value of the first pair whose key's string form equals `key`.
pub fn get_value<'a>(pairs: &'a [RegisterPair], key: &str) -> Option<&'a RegisterValue> {
    pairs
        .iter()
        .find(|p| p.key.to_string() == key)
        .map(|p| &p.value)
}

/// Value of the first `R1[index]` pair.
pub fn get_register(pairs: &[RegisterPair], index: u32) -> Option<&RegisterValue> {
    pairs
        .iter()
        .find(|p| p.key == RegisterKey::Index(index))
        .map(|p| &p.value)
}

/// Whether `pairs` answers every register `command` asked about.
pub fn response_matches(command: &str, pairs: &[RegisterPair]) -> bool {
    let wanted = extract_keys(command);
    if wanted.is_empty() {
        return !pairs.is_empty();
    }
    wanted
        .iter()
        .filter_map(|k| k.parse::<u32>().ok())
        .all(|index| get_register(pairs, index).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: u32, v: f64) -> RegisterPair {
        RegisterPair {
            key: RegisterKey::Index(n),
            value: RegisterValue::Number(v),
        }
    }

    // -----------------------------------------------------------------------
    // parse_pairs
    // -----------------------------------------------------------------------

    #[test]
    fn parse_assignment_form() {
        assert_eq!(
            parse_pairs("R1[10]=0;R1[31]=-1226;"),
            vec![idx(10, 0.0), idx(31, -1226.0)]
        );
    }

    #[test]
    fn parse_alternating_form_with_end_marker() {
        assert_eq!(
            parse_pairs("R1[10];0;R1[31];-1226;;"),
            vec![idx(10, 0.0), idx(31, -1226.0)]
        );
    }

    #[test]
    fn parse_empty_input() {
        assert!(parse_pairs("").is_empty());
        assert!(parse_pairs(";;").is_empty());
    }

    #[test]
    fn parse_named_key_text_value() {
        let pairs = parse_pairs("foo=bar;");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key, RegisterKey::Name("foo".into()));
        assert_eq!(pairs[0].value, RegisterValue::Text("bar".into()));
    }

    #[test]
    fn parse_drops_dangling_key() {
        let pairs = parse_pairs("R1[1];5;R1[2];");
        assert_eq!(pairs, vec![idx(1, 5.0)]);
    }

    #[test]
    fn parse_keeps_order_and_duplicates() {
        let pairs = parse_pairs("R1[3];1;R1[3];2;");
        assert_eq!(pairs, vec![idx(3, 1.0), idx(3, 2.0)]);
        assert_eq!(get_register(&pairs, 3), Some(&RegisterValue::Number(1.0)));
    }

    #[test]
    fn parse_other_array_stays_named() {
        let pairs = parse_pairs("R2[4];7;");
        assert_eq!(pairs[0].key, RegisterKey::Name("R2[4]".into()));
    }

    #[test]
    fn parse_non_numeric_index_stays_named() {
        let pairs = parse_pairs("R1[x];7;");
        assert_eq!(pairs[0].key, RegisterKey::Name("R1[x]".into()));
    }

    #[test]
    fn parse_fractional_and_exponent_values() {
        let pairs = parse_pairs("gain;0.125;limit;1e3;");
        assert_eq!(pairs[0].value, RegisterValue::Number(0.125));
        assert_eq!(pairs[1].value, RegisterValue::Number(1000.0));
    }

    #[test]
    fn parse_trims_line_endings() {
        assert_eq!(parse_pairs("R1[5];42;;\r\n"), vec![idx(5, 42.0)]);
    }

    // -----------------------------------------------------------------------
    // RegisterValue
    // -----------------------------------------------------------------------

    #[test]
    fn empty_value_stays_text() {
        assert_eq!(RegisterValue::parse(""), RegisterValue::Text(String::new()));
    }

    #[test]
    fn non_finite_value_stays_text() {
        assert_eq!(RegisterValue::parse("NaN"), RegisterValue::Text("NaN".into()));
        assert_eq!(RegisterValue::parse("inf"), RegisterValue::Text("inf".into()));
    }

    #[test]
    fn value_accessors() {
        assert_eq!(RegisterValue::Number(2.5).as_f64(), Some(2.5));
        assert_eq!(RegisterValue::Text("x".into()).as_f64(), None);
        assert_eq!(RegisterValue::Text("x".into()).as_str(), Some("x"));
    }

    // -----------------------------------------------------------------------
    // extract_keys / get_value / response_matches
    // -----------------------------------------------------------------------

    #[test]
    fn extract_keys_in_order() {
        assert_eq!(extract_keys("R1[10]=0;R1[31]"), vec!["10", "31"]);
    }

    #[test]
    fn extract_keys_skips_non_numeric() {
        assert_eq!(extract_keys("R1[a];R1[7]"), vec!["7"]);
        assert!(extract_keys("MODE=1").is_empty());
    }

    #[test]
    fn extract_keys_unclosed_bracket() {
        assert_eq!(extract_keys("R1[4];R1[5"), vec!["4"]);
    }

    #[test]
    fn get_value_by_name() {
        let pairs = parse_pairs("foo=bar;");
        assert_eq!(
            get_value(&pairs, "foo"),
            Some(&RegisterValue::Text("bar".into()))
        );
    }

    #[test]
    fn get_value_by_index_string() {
        let pairs = parse_pairs("R1[31];-1226;");
        assert_eq!(
            get_value(&pairs, "31"),
            Some(&RegisterValue::Number(-1226.0))
        );
        assert_eq!(get_value(&pairs, "32"), None);
    }

    #[test]
    fn response_matches_requested_registers() {
        let pairs = parse_pairs("R1[2];5;R1[3];6;;");
        assert!(response_matches("R1[2];R1[3]", &pairs));
        assert!(!response_matches("R1[2];R1[4]", &pairs));
    }

    #[test]
    fn response_matches_without_indices_needs_any_pair() {
        assert!(response_matches("MODE", &parse_pairs("MODE;1;;")));
        assert!(!response_matches("MODE", &[]));
    }
}
