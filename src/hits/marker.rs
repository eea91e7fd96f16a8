//! MarkerCodec: rule provenance carried in a style `content` value
//!
//! Injected rules look like `.banner { display: none !important; content: 'adguard2;example.org##.banner' }`.
//! The computed `content` of an affected element therefore carries the filter id
//! and the rule text. Anything else found in `content` is foreign and ignored.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::config::CONTENT_ATTR_PREFIX;
use crate::hits::record::{RuleKey, RULE_FILTER_SEPARATOR};

const IMPORTANT: &str = "!important";

/// Decoded provenance of a style directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMarker {
    pub filter_id: i64,
    pub rule_text: String,
}

impl ContentMarker {
    pub fn rule_key(&self) -> RuleKey {
        RuleKey::new(self.filter_id, &self.rule_text)
    }
}

// =============================================================================
// MarkerCodec
// =============================================================================

#[derive(Debug, Clone)]
pub struct MarkerCodec {
    prefix: String,
}

impl Default for MarkerCodec {
    fn default() -> Self {
        Self::new(CONTENT_ATTR_PREFIX)
    }
}

impl MarkerCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Decode a computed `content` value. `None` for anything that is not ours.
    pub fn decode(&self, raw: &str) -> Option<ContentMarker> {
        if raw.is_empty() || !raw.contains(self.prefix.as_str()) {
            return None;
        }

        let decoded = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
        let unquoted = remove_quotes(&decoded);
        let rest = unquoted.strip_prefix(self.prefix.as_str())?;
        let (filter_id, rule_text) = rest.split_once(RULE_FILTER_SEPARATOR)?;

        Some(ContentMarker {
            filter_id: parse_leading_int(filter_id)?,
            rule_text: rule_text.to_string(),
        })
    }

    /// Decode a rule-authored value that may end with `!important`
    pub fn decode_extended(&self, raw: &str) -> Option<ContentMarker> {
        match raw.trim_end().strip_suffix(IMPORTANT) {
            Some(value) => self.decode(value.trim()),
            None => self.decode(raw),
        }
    }

    /// Canonical unquoted marker for a rule
    pub fn encode(&self, filter_id: i64, rule_text: &str) -> String {
        format!("{}{}{}{}", self.prefix, filter_id, RULE_FILTER_SEPARATOR, rule_text)
    }
}

/// Strip one matching pair of surrounding `"` or `'`
fn remove_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() > 1 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// `parseInt(value, 10)`: leading whitespace, optional sign, then digits up to
/// the first non-digit. `None` where JS would produce `NaN`.
fn parse_leading_int(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> MarkerCodec {
        MarkerCodec::default()
    }

    fn marker(filter_id: i64, rule_text: &str) -> Option<ContentMarker> {
        Some(ContentMarker {
            filter_id,
            rule_text: rule_text.to_string(),
        })
    }

    #[test]
    fn test_decode_plain() {
        assert_eq!(codec().decode("adguard1;example.org##.banner"), marker(1, "example.org##.banner"));
    }

    #[test]
    fn test_decode_quoted() {
        assert_eq!(codec().decode("\"adguard2;##.ad\""), marker(2, "##.ad"));
        assert_eq!(codec().decode("'adguard14;##div[id^=\"ad\"]'"), marker(14, "##div[id^=\"ad\"]"));
    }

    #[test]
    fn test_decode_mismatched_quotes_kept() {
        assert_eq!(codec().decode("\"adguard2;##.ad'"), None);
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        for (filter_id, rule_text) in [
            (0, "##.banner"),
            (1, "example.org##div.ad > span"),
            (1000, "example.org#$#.ad { display: none !important; }"),
            (7, "##[class*=\"sponsor\"]"),
        ] {
            let encoded = codec.encode(filter_id, rule_text);
            assert_eq!(codec.decode(&encoded), marker(filter_id, rule_text));
            assert_eq!(codec.decode(&format!("\"{}\"", encoded)), marker(filter_id, rule_text));
            assert_eq!(codec.decode(&format!("'{}'", encoded)), marker(filter_id, rule_text));
            assert_eq!(
                codec.decode_extended(&format!("'{}' !important", encoded)),
                marker(filter_id, rule_text)
            );
        }
    }

    #[test]
    fn test_missing_separator_is_none() {
        assert_eq!(codec().decode("adguard12"), None);
        assert_eq!(codec().decode("\"adguard12 ##.ad\""), None);
    }

    #[test]
    fn test_missing_prefix_is_none() {
        assert_eq!(codec().decode(""), None);
        assert_eq!(codec().decode("none"), None);
        assert_eq!(codec().decode("\"1;##.ad\""), None);
        assert_eq!(codec().decode("\"\\201C\""), None);
    }

    #[test]
    fn test_prefix_not_leading_is_none() {
        assert_eq!(codec().decode("\"by adguard1;##.ad\""), None);
    }

    #[test]
    fn test_filter_id_leading_integer() {
        assert_eq!(codec().decode("adguard12abc;##.ad"), marker(12, "##.ad"));
        assert_eq!(codec().decode("adguard-1;##.ad"), marker(-1, "##.ad"));
        assert_eq!(codec().decode("adguard;##.ad"), None);
        assert_eq!(codec().decode("adguardx;##.ad"), None);
    }

    #[test]
    fn test_rule_text_keeps_later_separators() {
        assert_eq!(
            codec().decode("adguard3;##.a;b"),
            marker(3, "##.a;b")
        );
    }

    #[test]
    fn test_uri_encoded_value() {
        assert_eq!(
            codec().decode("\"adguard5%3Bexample.org%23%23.ad\""),
            marker(5, "example.org##.ad")
        );
    }

    #[test]
    fn test_malformed_escape_used_verbatim() {
        assert_eq!(codec().decode("adguard5;##.w%zz"), marker(5, "##.w%zz"));
    }

    #[test]
    fn test_extended_without_important() {
        assert_eq!(codec().decode_extended("'adguard4;##.ad'"), marker(4, "##.ad"));
    }

    #[test]
    fn test_extended_only_trailing_important_stripped() {
        assert_eq!(
            codec().decode_extended("'adguard4;#$#.ad { color: red !important }'!important  "),
            marker(4, "#$#.ad { color: red !important }")
        );
    }

    #[test]
    fn test_custom_prefix() {
        let codec = MarkerCodec::new("hits");
        assert_eq!(codec.prefix(), "hits");
        assert_eq!(MarkerCodec::default().prefix(), "adguard");
        assert_eq!(codec.decode("\"hits9;##.x\""), marker(9, "##.x"));
        assert_eq!(codec.decode("\"adguard9;##.x\""), None);
    }

    #[test]
    fn test_rule_key() {
        let m = codec().decode("adguard1;##.ad").unwrap();
        assert_eq!(m.rule_key().as_str(), "1;##.ad");
    }
}
