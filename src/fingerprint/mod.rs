/*!
 * Query Fingerprinting
 * Groups statements that differ only in literal values under one stable hash
 *
 * Pipeline: lower-case -> mask literals -> collapse whitespace -> SHA-256 -> truncate
 */

use crate::core::limits::{EMPTY_FINGERPRINT, FINGERPRINT_HEX_LEN};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

struct Masks {
    national: Regex,
    quoted: Regex,
    guid: Regex,
    hex: Regex,
    numeric: Regex,
    whitespace: Regex,
}

fn masks() -> &'static Masks {
    static MASKS: OnceLock<Masks> = OnceLock::new();
    MASKS.get_or_init(|| Masks {
        national: compile(r"\bn'(?:[^']|'')*'"),
        quoted: compile(r"'(?:[^']|'')*'"),
        guid: compile(
            r"\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
        ),
        hex: compile(r"\b0x[0-9a-f]+\b"),
        numeric: compile(r"\b\d+(?:\.\d+)?(?:e[+-]?\d+)?\b"),
        whitespace: compile(r"\s+"),
    })
}

// Patterns are literals above; a failure here is a programming error caught by tests
fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => panic!("invalid built-in fingerprint pattern {pattern}: {e}"),
    }
}

/// Normalize query text so literal-only differences disappear
///
/// String passes run before the numeric pass so digits inside literals are
/// already masked; every masking pass runs before whitespace collapsing.
pub fn normalize_query(text: &str) -> String {
    let masks = masks();
    let lowered = text.to_lowercase();

    let masked = masks.national.replace_all(&lowered, "n'?'");
    let masked = masks.quoted.replace_all(&masked, "'?'");
    let masked = masks.guid.replace_all(&masked, "?guid");
    let masked = masks.hex.replace_all(&masked, "0x?");
    let masked = masks.numeric.replace_all(&masked, "?");
    let collapsed = masks.whitespace.replace_all(&masked, " ");

    collapsed.trim().to_string()
}

/// Stable short hash of the normalized query text
///
/// Empty or whitespace-only input maps to [`EMPTY_FINGERPRINT`] without hashing.
pub fn fingerprint(text: &str) -> String {
    if text.trim().is_empty() {
        return EMPTY_FINGERPRINT.to_string();
    }

    let normalized = normalize_query(text);
    let digest = Sha256::digest(normalized.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_HEX_LEN);
    encoded
}
