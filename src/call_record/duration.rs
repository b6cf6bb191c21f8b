//! Parsing of switch-formatted durations.

/// Parse `HH:MM:SS`, `MM:SS` or plain seconds into a number of seconds.
///
/// Each component is trimmed, so space-padded columns such as `" 0:05"` are
/// accepted. Returns `None` for blank, malformed or overflowing input.
pub fn parse_seconds(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut total: u32 = 0;
    let mut count = 0;
    for part in trimmed.split(':') {
        count += 1;
        if count > 3 {
            return None;
        }
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u32 = part.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("42", Some(42))]
    #[case("01:05", Some(65))]
    #[case("00:00:07", Some(7))]
    #[case("01:02:03", Some(3723))]
    #[case(" 0:05", Some(5))]
    #[case("00:00:00", Some(0))]
    #[case("", None)]
    #[case("   ", None)]
    #[case("1:2:3:4", None)]
    #[case("ab:cd", None)]
    #[case("-5", None)]
    #[case("12::30", None)]
    fn parses_switch_durations(#[case] input: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_seconds(input), expected);
    }

    #[test]
    fn rejects_overflowing_values() {
        assert_eq!(parse_seconds("99999999999"), None);
    }
}
