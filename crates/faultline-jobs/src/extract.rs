//! Source extraction: raw bytes to normalized text.
//!
//! Two normalizations live here with different jobs:
//! - [`hash_normalize`] is the stable form fed to the content hash, so the
//!   same document fetched with different line endings or trailing
//!   whitespace dedups to one fingerprint.
//! - [`extract_text`] is the structural form fed to chunking, preserving
//!   headings and table rows as markers the chunker keys on.

use faultline_core::{Error, Result};

/// Normalize raw bytes for fingerprinting.
///
/// Lossy UTF-8 decode, CRLF → LF, trailing whitespace stripped per line,
/// leading/trailing blank lines removed.
pub fn hash_normalize(raw: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(text.len());
    for line in text.replace("\r\n", "\n").replace('\r', "\n").lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.trim().as_bytes().to_vec()
}

/// Normalize raw bytes to text for chunking, preserving structure.
///
/// Headings (`#`-prefixed or underlined) and table rows (`|`-prefixed)
/// pass through untouched; control characters are stripped; runs of blank
/// lines collapse to one separator.
pub fn extract_text(raw: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(raw);
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;
    let raw_lines: Vec<&str> = unified.lines().collect();

    for (i, line) in raw_lines.iter().enumerate() {
        let cleaned: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let trimmed = cleaned.trim_end();

        if trimmed.trim().is_empty() {
            if !previous_blank {
                lines.push(String::new());
                previous_blank = true;
            }
            continue;
        }

        // Setext-style underlines become markdown headings on the line above.
        if is_underline(trimmed) && i > 0 && !raw_lines[i - 1].trim().is_empty() {
            if let Some(last) = lines.last_mut() {
                if !last.starts_with('#') && !last.starts_with('|') {
                    *last = format!("# {}", last.trim());
                }
            }
            continue;
        }

        lines.push(trimmed.to_string());
        previous_blank = false;
    }

    let normalized = lines.join("\n").trim().to_string();
    if normalized.is_empty() {
        return Err(Error::Validation("source produced no text".into()));
    }
    Ok(normalized)
}

fn is_underline(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3
        && (t.chars().all(|c| c == '=') || t.chars().all(|c| c == '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_normalize_line_endings() {
        let a = hash_normalize(b"motor overload\r\nfault codes\r\n");
        let b = hash_normalize(b"motor overload\nfault codes");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_normalize_trailing_whitespace() {
        let a = hash_normalize(b"motor overload   \nfault codes\t\n\n\n");
        let b = hash_normalize(b"motor overload\nfault codes");
        assert_eq!(a, b);
    }

    #[test]
    fn test_extract_preserves_headings() {
        let text = extract_text(b"# Overload faults\n\nReset the relay.\n").unwrap();
        assert!(text.starts_with("# Overload faults"));
    }

    #[test]
    fn test_extract_promotes_setext_headings() {
        let text = extract_text(b"Overload faults\n===============\n\nReset the relay.").unwrap();
        assert!(text.starts_with("# Overload faults"));
        assert!(text.contains("Reset the relay."));
    }

    #[test]
    fn test_extract_preserves_table_rows() {
        let src = b"| code | meaning |\n| ---- | ------- |\n| E01 | overload |\n";
        let text = extract_text(src).unwrap();
        assert!(text.contains("| E01 | overload |"));
    }

    #[test]
    fn test_extract_collapses_blank_runs() {
        let text = extract_text(b"first\n\n\n\n\nsecond").unwrap();
        assert_eq!(text, "first\n\nsecond");
    }

    #[test]
    fn test_extract_strips_control_chars() {
        let text = extract_text(b"reset\x07 the\x00 relay").unwrap();
        assert_eq!(text, "reset the relay");
    }

    #[test]
    fn test_extract_empty_source_is_validation_error() {
        let err = extract_text(b"   \n\n  ").unwrap_err();
        assert_eq!(err.class(), faultline_core::ErrorClass::Validation);
    }
}
