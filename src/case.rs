//! Case conversion for association names flattened onto record attributes.

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "codingLanguageTags" -> "coding_language_tags", "user" -> "user"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
