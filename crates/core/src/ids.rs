//! Deterministic kebab-case identifier normalization (spec §4.1, C1).
//!
//! Grounded in `querymt_agent`'s name-to-id derivation helpers: lowercase,
//! collapse runs of non-alphanumeric characters into a single `-`, strip
//! leading/trailing `-`. Unicode letters are lowercased via `char::to_lowercase`
//! rather than ASCII-only folding, matching the spec's "unicode letters
//! lowercased" wording.

/// Normalize `name` into a stable kebab-case identifier (spec §4.1).
pub fn to_kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_dash = false;

    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Whether `name` collides with `existing` under kebab-case normalization
/// (spec §8 scenario 1: `"World A"`, `"world a"`, `" World A "` all collide).
pub fn kebab_collides(name: &str, existing: &str) -> bool {
    to_kebab_case(name) == to_kebab_case(existing)
}
