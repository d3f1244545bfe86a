//! Record name rules and the name → storage key transform.

use regex::Regex;

pub const MAX_NAME_LEN: usize = 256;

/// Longest storage key, in bytes, leaving room for an extension within common file name limits.
pub const MAX_KEY_BYTES: usize = 200;

const FORBIDDEN_CHARS: &str = "<>:\"/\\|?*";

lazy_static::lazy_static! {
    static ref KEY_SEPARATORS: Regex = Regex::new(r"[^\p{L}\p{N}._()]+").unwrap();
}

fn is_forbidden(c: char) -> bool {
    c.is_control() || FORBIDDEN_CHARS.contains(c)
}

/// A valid name is non-blank, at most [`MAX_NAME_LEN`] characters and free of
/// path-hostile or control characters.
pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name.chars().count() <= MAX_NAME_LEN
        && !name.chars().any(is_forbidden)
}

/// Lowercase, hyphenated form of a name used for file names.
///
/// Distinct names can share a key ("Chat A" / "chat a"); the store refuses to
/// keep two live records with the same key.
pub fn storage_key(name: &str) -> String {
    let lower = name.to_lowercase();
    let hyphenated = KEY_SEPARATORS.replace_all(&lower, "-");
    let key = hyphenated.trim_matches(|c| c == '-' || c == '.');
    if key.is_empty() {
        return "record".to_string();
    }
    if key.len() <= MAX_KEY_BYTES {
        return key.to_string();
    }

    // Long keys keep a readable prefix plus a digest of the whole key.
    let digest = format!("{:016x}", fnv1a(key.as_bytes()));
    let mut cut = MAX_KEY_BYTES - digest.len() - 1;
    while !key.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}-{}", key[..cut].trim_end_matches(['-', '.']), digest)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Turns an arbitrary hint into a valid base name, falling back when nothing usable is left.
pub fn clean_hint(hint: &str, fallback: &str) -> String {
    let stripped: String = hint.chars().filter(|c| !is_forbidden(*c)).collect();
    let trimmed = truncate_chars(stripped.trim(), MAX_NAME_LEN);
    if trimmed.trim().is_empty() {
        fallback.to_string()
    } else {
        trimmed.trim_end().to_string()
    }
}

/// `"{base} ({n})"`, shortening `base` so the result stays within [`MAX_NAME_LEN`].
pub fn with_suffix(base: &str, n: usize) -> String {
    let suffix = format!(" ({})", n);
    let room = MAX_NAME_LEN.saturating_sub(suffix.chars().count());
    format!("{}{}", truncate_chars(base, room).trim_end(), suffix)
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
