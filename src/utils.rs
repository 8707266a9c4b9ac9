//! Utility functions for file naming and path manipulation

use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Get a path that does not exist yet, adding ` (n)` before the extension
///
/// # Examples
///
/// ```
/// use media_dl::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/media-dl-doc/lighthouse.jpg");
/// let unique = get_unique_path(path).unwrap();
/// // If lighthouse.jpg exists, returns "lighthouse (1).jpg"
/// // If that exists too, returns "lighthouse (2).jpg", etc.
/// # assert_eq!(unique, path);
/// ```
pub fn get_unique_path(path: &Path) -> std::io::Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let invalid = |reason: &str| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{}: {}", path.display(), reason),
        )
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("cannot extract file stem"))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path
        .parent()
        .ok_or_else(|| invalid("cannot extract parent directory"))?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!(
            "{}: no unique filename after {} attempts",
            path.display(),
            MAX_RENAME_ATTEMPTS
        ),
    ))
}

/// Reduce `text` to `[A-Za-z0-9._-]`, at most `max_len` characters
///
/// Runs of other characters collapse into a single `_`. Leading and trailing
/// separators are trimmed; an empty result becomes `"untitled"`.
///
/// ```
/// use media_dl::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("Lighthouse at dusk!", 40), "Lighthouse_at_dusk");
/// assert_eq!(sanitize_component("../../etc", 40), "etc");
/// ```
#[must_use]
pub fn sanitize_component(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_len));
    let mut pending_sep = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
        if out.len() >= max_len {
            break;
        }
    }

    out.truncate(max_len);
    let trimmed = out.trim_matches(|c| matches!(c, '.' | '_' | '-'));
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `path` names an in-progress download (`.{name}.{random}.part`)
pub fn is_partial_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".part"))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_unique_path_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pexels_sea-0a1b2c3d4e.jpg");
        assert_eq!(get_unique_path(&path).unwrap(), path);
    }

    #[test]
    fn test_get_unique_path_with_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sea.jpg");
        fs::write(&path, "original").unwrap();

        let unique = get_unique_path(&path).unwrap();
        assert_eq!(unique, temp_dir.path().join("sea (1).jpg"));

        fs::write(&unique, "first rename").unwrap();
        let unique2 = get_unique_path(&path).unwrap();
        assert_eq!(unique2, temp_dir.path().join("sea (2).jpg"));
    }

    #[test]
    fn test_get_unique_path_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip");
        fs::write(&path, "original").unwrap();

        assert_eq!(
            get_unique_path(&path).unwrap(),
            temp_dir.path().join("clip (1)")
        );
    }

    #[test]
    fn test_get_unique_path_multiple_dots() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("coverr_waves.at.dusk-0123456789.mp4");
        fs::write(&path, "original").unwrap();

        let unique = get_unique_path(&path).unwrap();
        assert_eq!(
            unique,
            temp_dir
                .path()
                .join("coverr_waves.at.dusk-0123456789 (1).mp4")
        );
    }

    #[test]
    fn test_sanitize_collapses_and_trims() {
        assert_eq!(sanitize_component("  red   door  ", 40), "red_door");
        assert_eq!(sanitize_component("café crème", 40), "caf_cr_me");
        assert_eq!(sanitize_component("***", 40), "untitled");
        assert_eq!(sanitize_component("", 40), "untitled");
        assert_eq!(sanitize_component("a/b\\c", 40), "a_b_c");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_component(&long, 60).len(), 60);
        assert_eq!(sanitize_component("abc def", 4), "abc");
    }

    #[test]
    fn test_is_partial_file() {
        assert!(is_partial_file(Path::new("/out/.sea.jpg.k3j2.part")));
        assert!(!is_partial_file(Path::new("/out/sea.jpg")));
        assert!(!is_partial_file(Path::new("/out/.hidden")));
    }
}
