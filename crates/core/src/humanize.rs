//! Human-readable size parsing for announce lines.

/// Parse an announced size string ("1.2 GB", "450MiB", "714 MB") into bytes.
///
/// Returns `None` for anything that does not look like a size; announce
/// formats vary and an unparsable size never fails a release.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let split = s.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (num_str, unit) = s.split_at(split);
    let num: f64 = num_str.trim().parse().ok()?;

    let multiplier: u64 = match unit.trim().to_uppercase().as_str() {
        "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024_u64.pow(4),
        _ => return None,
    };

    Some((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_units() {
        assert_eq!(parse_size("1KB"), Some(1024));
        assert_eq!(parse_size("5 MB"), Some(5 * 1024 * 1024));
        assert_eq!(parse_size("2GiB"), Some(2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn test_parse_fractional() {
        assert_eq!(parse_size("1.5 KB"), Some(1536));
        assert_eq!(parse_size("0.5GB"), Some(512 * 1024 * 1024));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("unknown"), None);
        assert_eq!(parse_size("12 parsecs"), None);
        // A bare number has no unit to anchor it.
        assert_eq!(parse_size("1024"), None);
    }
}
