//! Canonical identifiers for journey states and case fields.
//!
//! State keys follow the grammar `[a-z0-9_-]{0,48}`. Field keys are stricter and drop
//! the hyphen: `[a-z0-9_]`.

pub const MAX_STATE_KEY_LEN: usize = 48;

/// Turns a free-text state label into a state key.
///
/// Trims, lower-cases, collapses whitespace runs into a single `_`, strips anything
/// outside `[a-z0-9_-]` and truncates to [`MAX_STATE_KEY_LEN`]. An empty result means
/// the label must be rejected.
pub fn canonicalize(raw: &str) -> String {
    let mut key = collapse_and_filter(raw, |ch| {
        ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-'
    });
    // Only ASCII survives the filter, so byte truncation is char-safe.
    key.truncate(MAX_STATE_KEY_LEN);
    key
}

/// Normalizes a required case field key to `[a-z0-9_]`.
pub fn canonicalize_field_key(raw: &str) -> String {
    collapse_and_filter(raw, |ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

/// Canonicalizes, drops empties and deduplicates in first-seen order.
pub fn normalize_field_keys<I, S>(raw_keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keys: Vec<String> = Vec::new();
    for raw in raw_keys {
        let key = canonicalize_field_key(raw.as_ref());
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

pub fn is_canonical_state_key(key: &str) -> bool {
    !key.is_empty() && canonicalize(key) == key
}

fn collapse_and_filter(raw: &str, keep: impl Fn(char) -> bool) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut output = String::with_capacity(lowered.len());
    let mut in_whitespace = false;

    for ch in lowered.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                output.push('_');
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;
        if keep(ch) {
            output.push(ch);
        }
    }

    output
}
