//! Tag name validation and deterministic tag-id derivation.

use crate::defaults::MAX_TAG_NAME_LEN;

/// Validate a tag name.
///
/// Rules:
/// - Length between 1-100 characters
/// - Allowed characters: alphanumeric, spaces, hyphens (-), underscores (_),
///   forward slashes (/)
/// - Must contain at least one alphanumeric character, so the derived id is
///   never empty
///
/// Returns Ok(()) if valid, Err with message if invalid.
pub fn validate_tag_name(name: &str) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("Tag name cannot be empty".to_string());
    }
    if name.len() > MAX_TAG_NAME_LEN {
        return Err(format!(
            "Tag name must be {} characters or less",
            MAX_TAG_NAME_LEN
        ));
    }

    let invalid_chars: Vec<char> = name
        .chars()
        .filter(|c| !c.is_alphanumeric() && *c != ' ' && *c != '-' && *c != '_' && *c != '/')
        .collect();

    if !invalid_chars.is_empty() {
        let chars_display: String = invalid_chars
            .iter()
            .take(5)
            .map(|c| format!("'{}'", c))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!(
            "Tag contains invalid characters: {}. Only alphanumeric characters, spaces, hyphens, underscores, and forward slashes are allowed",
            chars_display
        ));
    }

    if !name.chars().any(|c| c.is_alphanumeric()) {
        return Err("Tag name must contain at least one letter or digit".to_string());
    }

    Ok(())
}

/// Derive a tag id from its name.
///
/// Lowercases, replaces every run of non-alphanumeric characters with a
/// single hyphen, and trims hyphens from both ends. Deterministic: the same
/// name always yields the same id, so re-creating a tag resolves to the
/// existing document.
pub fn tag_id_from_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen

    for c in name.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_simple() {
        assert_eq!(tag_id_from_name("Rust"), "rust");
    }

    #[test]
    fn test_slug_spaces_and_case() {
        assert_eq!(tag_id_from_name("Machine Learning"), "machine-learning");
    }

    #[test]
    fn test_slug_collapses_separators() {
        assert_eq!(tag_id_from_name("web  /  dev"), "web-dev");
    }

    #[test]
    fn test_slug_trims_edges() {
        assert_eq!(tag_id_from_name("  -rust- "), "rust");
    }

    #[test]
    fn test_slug_deterministic() {
        assert_eq!(
            tag_id_from_name("Deep Work"),
            tag_id_from_name("Deep Work")
        );
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(validate_tag_name("").is_err());
        assert!(validate_tag_name("   ").is_err());
    }

    #[test]
    fn test_validate_rejects_too_long() {
        let name = "a".repeat(MAX_TAG_NAME_LEN + 1);
        assert!(validate_tag_name(&name).is_err());
    }

    #[test]
    fn test_validate_rejects_special_chars() {
        let err = validate_tag_name("rust!").unwrap_err();
        assert!(err.contains("'!'"));
    }

    #[test]
    fn test_validate_rejects_separator_only() {
        assert!(validate_tag_name("---").is_err());
    }

    #[test]
    fn test_validate_accepts_typical_names() {
        assert!(validate_tag_name("rust").is_ok());
        assert!(validate_tag_name("Machine Learning").is_ok());
        assert!(validate_tag_name("web/dev").is_ok());
        assert!(validate_tag_name("to_read").is_ok());
    }
}
