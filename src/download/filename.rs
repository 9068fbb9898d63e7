//! Destination file naming derived from the source URL.

use std::path::{Component, Path};

use url::Url;

/// Name used when the URL has no usable last path segment.
pub const FALLBACK_FILENAME: &str = "download.bin";

/// Returns a filesystem-safe file name for `url`: its last path segment,
/// or [`FALLBACK_FILENAME`] when there is none.
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return FALLBACK_FILENAME.to_string();
    };

    if let Some(mut segments) = parsed.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let sanitized = sanitize_filename(last);
        if !sanitized.trim_matches('_').is_empty() {
            return sanitized;
        }
    }

    FALLBACK_FILENAME.to_string()
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url_uses_last_path_segment() {
        assert_eq!(
            filename_from_url("https://example.com/isos/debian-12.iso"),
            "debian-12.iso"
        );
        assert_eq!(
            filename_from_url("https://example.com/a/report.pdf?token=abc"),
            "report.pdf"
        );
    }

    #[test]
    fn test_filename_from_url_falls_back_without_segment() {
        assert_eq!(filename_from_url("https://example.com/"), FALLBACK_FILENAME);
        assert_eq!(filename_from_url("https://example.com"), FALLBACK_FILENAME);
        assert_eq!(filename_from_url("https://example.com/dir/"), FALLBACK_FILENAME);
        assert_eq!(filename_from_url("not a url"), FALLBACK_FILENAME);
    }

    #[test]
    fn test_filename_from_url_rejects_dot_segments() {
        assert_eq!(filename_from_url("https://example.com/a/.."), FALLBACK_FILENAME);
    }

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file\\name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file:name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("a*b?c\"d<e>f|g"), "a_b_c_d_e_f_g");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("."), "_");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("normal-file_name.pdf"), "normal-file_name.pdf");
        assert_eq!(sanitize_filename("日本語.txt"), "日本語.txt");
    }
}
