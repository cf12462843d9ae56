//! Title and filename sanitation.

use crate::error::{Error, Result};

/// Sanitize a display title into a filesystem-safe path component.
///
/// Account and list titles come straight from the API and may contain
/// anything. Path traversal and null bytes are rejected outright; characters
/// invalid on Windows filesystems are replaced so a mirror directory remains
/// portable across machines.
pub fn sanitize_title(title: &str) -> Result<String> {
    if title.contains("..") {
        return Err(Error::InvalidFilename(format!(
            "Path traversal detected: '{}'",
            title
        )));
    }
    if title.contains('\0') {
        return Err(Error::InvalidFilename(format!(
            "Null bytes not allowed: '{}'",
            title
        )));
    }

    let sanitized: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Trailing dots and spaces are dropped silently by Windows.
    let sanitized = sanitized.trim_end_matches([' ', '.']).to_string();

    if sanitized.trim().is_empty() {
        return Err(Error::InvalidFilename(
            "Title cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title_valid() {
        assert_eq!(sanitize_title("NASA(@nasa)").unwrap(), "NASA(@nasa)");
        assert_eq!(sanitize_title("a:b*c?d").unwrap(), "a_b_c_d");
        assert_eq!(sanitize_title("path/to\\name").unwrap(), "path_to_name");
    }

    #[test]
    fn test_sanitize_title_trims_windows_droppable_suffix() {
        assert_eq!(sanitize_title("name. . ").unwrap(), "name");
    }

    #[test]
    fn test_sanitize_title_path_traversal() {
        assert!(sanitize_title("../etc/passwd").is_err());
        assert!(sanitize_title("foo/../bar").is_err());
    }

    #[test]
    fn test_sanitize_title_null_bytes() {
        assert!(sanitize_title("file\0name").is_err());
    }

    #[test]
    fn test_sanitize_title_empty() {
        assert!(sanitize_title("").is_err());
        assert!(sanitize_title("   ").is_err());
        assert!(sanitize_title(" . ").is_err());
    }
}
