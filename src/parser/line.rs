//! `key=value` line primitive

/// Split a console line into `(key, value)`.
///
/// The key is one or more ASCII word characters, the value is everything
/// after the first `=` including embedded whitespace. Lines that do not have
/// this shape return `None`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value() {
        assert_eq!(parse_line("JobId=12"), Some(("JobId", "12")));
        assert_eq!(parse_line("Name=Backup Job 1"), Some(("Name", "Backup Job 1")));
        assert_eq!(parse_line("Empty="), Some(("Empty", "")));
        assert_eq!(parse_line("Expr=a=b"), Some(("Expr", "a=b")));
    }

    #[test]
    fn test_not_key_value() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("running:"), None);
        assert_eq!(parse_line("=value"), None);
        assert_eq!(parse_line("bad key=value"), None);
        assert_eq!(parse_line(" JobId=1"), None);
    }
}
