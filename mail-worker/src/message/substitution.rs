//! Placeholder substitution and recipient re-encoding for header values.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::recipients::format_named;

const ADDRESS: &str = r"[\w.+\-]+@[\w\-]+(?:\.[\w\-]+)+";

/// An RFC 2047 encoded word, as produced by `encode_mime_header`.
const ENCODED_WORD: &str = r"=\?[\w\-]+\?[BbQq]\?[^?\s]*\?=";

fn recipient_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?:(?P<name>{ENCODED_WORD}(?:\s+{ENCODED_WORD})*|\b\w[\w .'\-]*?)\s+)?<(?P<email>{ADDRESS})>|(?P<bare>{ADDRESS})"
        ))
        .expect("valid regex")
    })
}

/// Replace every occurrence of each param name in `text` with its value.
///
/// At each position the longest matching name wins and replaced text is
/// never scanned again, so a value containing another param's name is
/// emitted as-is. Empty names are ignored.
pub fn substitute(text: &str, params: &BTreeMap<String, String>) -> String {
    let mut names: Vec<(&str, &str)> = params
        .iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();

    if names.is_empty() {
        return text.to_string();
    }

    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    'scan: while !rest.is_empty() {
        for (name, value) in &names {
            if let Some(tail) = rest.strip_prefix(name) {
                out.push_str(value);
                rest = tail;
                continue 'scan;
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

/// Rebuild a header value from the recipients found in it.
///
/// Each `Name <email>` match becomes `"<encoded-name> <email>"`, each bare
/// address passes through, and matches are joined with `", "`. Names that
/// are already encoded words are kept as they are. A value with no
/// recognizable address is returned unchanged.
pub fn reencode_recipients(value: &str) -> String {
    let recipients: Vec<String> = recipient_re()
        .captures_iter(value)
        .filter_map(|caps| {
            if let Some(email) = caps.name("email") {
                Some(match caps.name("name") {
                    Some(name) => format_named(name.as_str(), email.as_str()),
                    None => email.as_str().to_string(),
                })
            } else {
                caps.name("bare").map(|bare| bare.as_str().to_string())
            }
        })
        .collect();

    if recipients.is_empty() {
        value.to_string()
    } else {
        recipients.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::recipients::encode_mime_header;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_all_occurrences() {
        let p = params(&[("{name}", "World")]);
        assert_eq!(substitute("Hello {name}, bye {name}", &p), "Hello World, bye World");
    }

    #[test]
    fn test_substitute_prefers_longest_name() {
        let p = params(&[(":user", "U"), (":username", "bob")]);
        assert_eq!(substitute(":username/:user", &p), "bob/U");
    }

    #[test]
    fn test_substitute_does_not_rescan_values() {
        let p = params(&[("{a}", "{b}"), ("{b}", "B")]);
        assert_eq!(substitute("{a}{b}", &p), "{b}B");
    }

    #[test]
    fn test_substitute_without_params_or_with_empty_name() {
        assert_eq!(substitute("unchanged", &BTreeMap::new()), "unchanged");
        let p = params(&[("", "x")]);
        assert_eq!(substitute("abc", &p), "abc");
    }

    #[test]
    fn test_substitute_multibyte_text() {
        let p = params(&[("%n", "Zoë")]);
        assert_eq!(substitute("Café %n ☕", &p), "Café Zoë ☕");
    }

    #[test]
    fn test_reencode_named_ascii() {
        assert_eq!(
            reencode_recipients("Jane Doe <jane@x.com>"),
            "Jane Doe <jane@x.com>"
        );
    }

    #[test]
    fn test_reencode_named_non_ascii() {
        assert_eq!(
            reencode_recipients("Zoë Doe <zoe@x.com>"),
            format!("{} <zoe@x.com>", encode_mime_header("Zoë Doe"))
        );
    }

    #[test]
    fn test_reencode_mixed_list() {
        assert_eq!(
            reencode_recipients("Alice <a@x.com>,b@x.com;  <c@mail.x.org>"),
            "Alice <a@x.com>, b@x.com, c@mail.x.org"
        );
    }

    #[test]
    fn test_reencode_keeps_dotted_addresses_whole() {
        assert_eq!(
            reencode_recipients("first.last+tag@mail.example.org"),
            "first.last+tag@mail.example.org"
        );
    }

    #[test]
    fn test_reencode_is_stable_on_its_own_output() {
        let once = reencode_recipients("Zoë Doe <zoe@x.com>, Ann <a@x.com>");
        assert_eq!(reencode_recipients(&once), once);

        let long = format!("{} <l@x.com>", "é".repeat(40));
        let once = reencode_recipients(&long);
        assert_eq!(reencode_recipients(&once), once);
    }

    #[test]
    fn test_reencode_without_address_is_unchanged() {
        assert_eq!(reencode_recipients("Welcome aboard!"), "Welcome aboard!");
    }
}
