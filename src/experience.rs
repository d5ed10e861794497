use regex::Regex;
use std::num::IntErrorKind;
use std::sync::LazyLock;

// Tried in order; the first pattern that matches wins.
static EXPERIENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "3-5 years of experience" -> lower bound
        r"(?i)(\d+)\s*-\s*\d+\s*(?:years?|yrs?)\s*(?:of\s+)?(?:experience|exp)",
        r"(?i)(?:minimum|at least|min)\s*(\d+)\s*(?:years?|yrs?)",
        r"(?i)(\d+)\+?\s*(?:years?|yrs?)\s*(?:of\s+)?(?:experience|exp)",
        r"(?i)(\d+)\s*(?:years?|yrs?)\s*(?:of\s+)?(?:professional|relevant|hands-on|industry)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Required years of experience stated in `text`, if any.
pub fn extract_experience_years(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }

    EXPERIENCE_PATTERNS.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_years(m.as_str()))
    })
}

/// Oversized digit runs saturate so they still read as "too many years".
fn parse_years(digits: &str) -> Option<u32> {
    match digits.parse::<u32>() {
        Ok(years) => Some(years),
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => Some(u32::MAX),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(EXPERIENCE_PATTERNS.len(), 4);
    }

    #[test]
    fn test_plus_years() {
        assert_eq!(extract_experience_years("5+ years of experience"), Some(5));
    }

    #[test]
    fn test_years_experience() {
        assert_eq!(extract_experience_years("3 years experience in Python"), Some(3));
    }

    #[test]
    fn test_range_takes_lower_bound() {
        assert_eq!(extract_experience_years("3-5 years of experience"), Some(3));
        assert_eq!(extract_experience_years("3 - 5 yrs exp"), Some(3));
    }

    #[test]
    fn test_minimum_and_at_least() {
        assert_eq!(extract_experience_years("minimum 7 years"), Some(7));
        assert_eq!(extract_experience_years("At least 4 years of experience"), Some(4));
        assert_eq!(extract_experience_years("min 2 yrs"), Some(2));
    }

    #[test]
    fn test_minimum_beats_general_pattern() {
        let text = "10+ years of experience preferred, at least 6 years required";
        assert_eq!(extract_experience_years(text), Some(6));
    }

    #[test]
    fn test_qualified_experience() {
        assert_eq!(
            extract_experience_years("10 years of professional experience"),
            Some(10)
        );
        assert_eq!(extract_experience_years("4 years hands-on work"), Some(4));
    }

    #[test]
    fn test_case_insensitive_and_abbreviation() {
        assert_eq!(extract_experience_years("5+ YRS EXPERIENCE"), Some(5));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(extract_experience_years("Great job opportunity"), None);
        assert_eq!(extract_experience_years("Founded 12 years ago"), None);
    }

    #[test]
    fn test_oversized_number_saturates() {
        assert_eq!(
            extract_experience_years("99999999999 years of experience"),
            Some(u32::MAX)
        );
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(extract_experience_years(""), None);
    }
}
