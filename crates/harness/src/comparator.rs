//! Exact-match verdicts
//!
//! The only normalization is trimming leading and trailing whitespace. Case,
//! internal whitespace, line breaks and Unicode composition must all match.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Result of comparing one expected/actual pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub verdict: Verdict,

    /// Char index of the first divergence after trimming
    pub first_difference: Option<usize>,
}

impl Comparison {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

pub fn compare(expected: &str, actual: &str) -> Comparison {
    let expected = expected.trim();
    let actual = actual.trim();

    if expected == actual {
        return Comparison {
            verdict: Verdict::Pass,
            first_difference: None,
        };
    }

    let mut e = expected.chars();
    let mut a = actual.chars();
    let mut index = 0;
    loop {
        match (e.next(), a.next()) {
            (Some(x), Some(y)) if x == y => index += 1,
            _ => break,
        }
    }

    Comparison {
        verdict: Verdict::Fail,
        first_difference: Some(index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("ඉස්සරහට එන්න", "ඉස්සරහට එන්න" ; "identical")]
    #[test_case("ඉස්සරහට එන්න", "  ඉස්සරහට එන්න\n" ; "surrounding whitespace")]
    #[test_case(" මම ඊයේ ", "මම ඊයේ" ; "expected padded")]
    fn test_passes(expected: &str, actual: &str) {
        assert_eq!(compare(expected, actual).verdict, Verdict::Pass);
    }

    #[test_case("ඔයාට මේක\nහරියට කරන්න පුලුවන්නම් කියන්න", "ඔයාට මේක හරියට කරන්න පුලුවන්නම් කියන්න" ; "line break normalized away")]
    #[test_case("අපි  දැන්", "අපි දැන්" ; "internal spaces collapsed")]
    #[test_case("Delivery", "delivery" ; "case folded")]
    #[test_case("මචං මොකක්ද අර තියෙන්නෙ?", "මචං මොකක්ද අර තියෙන්නෙ" ; "missing punctuation")]
    #[test_case("\u{0DC1}\u{0DCA}\u{200D}\u{0DBB}", "\u{0DC1}\u{0DCA}\u{0DBB}" ; "zero width joiner dropped")]
    fn test_fails(expected: &str, actual: &str) {
        assert_eq!(compare(expected, actual).verdict, Verdict::Fail);
    }

    #[test]
    fn test_first_difference_points_at_divergence() {
        let comparison = compare("abc\ndef", "abc def");
        assert_eq!(comparison.first_difference, Some(3));

        let comparison = compare("abc", "abcd");
        assert_eq!(comparison.first_difference, Some(3));
        assert!(!comparison.passed());
    }
}
