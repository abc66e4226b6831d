use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

/// Next local version after a naming conflict.
///
/// The final dot-separated segment is incremented when it is all digits;
/// otherwise a new `1` segment is appended. Surrounding whitespace is ignored.
///
/// ```
/// use modship::version::bump;
///
/// assert_eq!(bump("1.2.3"), "1.2.4");
/// assert_eq!(bump("1.2"), "1.3");
/// assert_eq!(bump("1.2.x"), "1.2.x.1");
/// ```
pub fn bump(version: &str) -> String {
    let mut parts: Vec<String> = version.trim().split('.').map(str::to_string).collect();
    let last = parts.last().map(String::as_str).unwrap_or_default();

    if is_numeric_segment(last) {
        let next = increment_decimal(last);
        if let Some(slot) = parts.last_mut() {
            *slot = next;
        }
    } else {
        parts.push("1".to_string());
    }

    parts.join(".")
}

fn is_numeric_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Add one to a string of decimal digits without an integer bound. Leading
/// zeros are dropped the way integer formatting would drop them.
fn increment_decimal(digits: &str) -> String {
    let significant = digits.trim_start_matches('0');
    let mut bytes: Vec<u8> = significant.bytes().collect();

    let mut carry = true;
    for b in bytes.iter_mut().rev() {
        if !carry {
            break;
        }
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            carry = false;
        }
    }
    if carry {
        bytes.insert(0, b'1');
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// The version as sent to the platforms: leading `v`s removed.
pub fn release_version(version: &str) -> &str {
    version.trim_start_matches('v')
}

/// Read a version file, trimming surrounding whitespace.
pub fn read_version_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read version file {}", path.display()))?;
    let version = raw.trim();
    if version.is_empty() {
        bail!("version file {} is empty", path.display());
    }
    Ok(version.to_string())
}

/// Overwrite a version file with `version` and a trailing newline.
pub fn write_version_file(path: &Path, version: &str) -> Result<()> {
    fs::write(path, format!("{version}\n"))
        .with_context(|| format!("failed to write version file {}", path.display()))
}
