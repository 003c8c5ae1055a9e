//! Source content fingerprints.
//!
//! Every machine-translated row stores the fingerprint of the default-language
//! fields it was produced from. A later run compares it with the current
//! source to tell "up to date" from "source changed".

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::models::TranslatableFields;

static HORIZONTAL_WHITESPACE: OnceLock<Regex> = OnceLock::new();

fn horizontal_whitespace() -> &'static Regex {
    HORIZONTAL_WHITESPACE.get_or_init(|| Regex::new(r"[^\S\n]+").expect("whitespace pattern is valid"))
}

/// Collapse spaces and tabs within each line and drop trailing ones. Line
/// breaks are kept: they carry Markdown and HTML structure.
fn normalize(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| horizontal_whitespace().replace_all(line.trim_end(), " "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase hex SHA-256 over the normalized fields.
pub fn fingerprint(fields: &TranslatableFields) -> String {
    let parts: [(&str, Option<&str>); 5] = [
        ("title", Some(fields.title.as_str())),
        ("content", Some(fields.content.as_str())),
        ("excerpt", fields.excerpt.as_deref()),
        ("meta_title", fields.meta_title.as_deref()),
        ("meta_description", fields.meta_description.as_deref()),
    ];

    let mut hasher = Sha256::new();
    for (tag, value) in parts {
        hasher.update(tag.as_bytes());
        hasher.update([0u8]);
        match value {
            Some(text) => {
                let normalized = normalize(text);
                hasher.update((normalized.len() as u64).to_le_bytes());
                hasher.update(normalized.as_bytes());
            }
            // absent and empty are distinct states
            None => hasher.update([0xffu8]),
        }
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint(&TranslatableFields::new("Hello", "World"));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_stable() {
        let fields = TranslatableFields::new("Hello", "World").with_excerpt("Short");
        assert_eq!(fingerprint(&fields), fingerprint(&fields.clone()));
    }

    #[test]
    fn test_fingerprint_ignores_horizontal_whitespace() {
        let a = TranslatableFields::new("Hello  world", "Line one\nline two\n");
        let b = TranslatableFields::new(" Hello world ", "Line \t one   \r\nline two");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_detects_line_structure_change() {
        let list = TranslatableFields::new("T", "- a\n- b");
        let joined = TranslatableFields::new("T", "- a - b");
        let paragraphs = TranslatableFields::new("T", "- a\n\n- b");
        assert_ne!(fingerprint(&list), fingerprint(&joined));
        assert_ne!(fingerprint(&list), fingerprint(&paragraphs));
    }

    #[test]
    fn test_fingerprint_detects_content_change() {
        let a = TranslatableFields::new("Hello", "World");
        let b = TranslatableFields::new("Hello", "World!");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_detects_text_moving_between_fields() {
        let a = TranslatableFields::new("AB", "");
        let b = TranslatableFields::new("A", "B");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_distinguishes_missing_and_empty_excerpt() {
        let a = TranslatableFields::new("T", "C");
        let b = TranslatableFields::new("T", "C").with_excerpt("");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
