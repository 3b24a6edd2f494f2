use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static CONFIRM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\s,;:!.-]*\b(?:confirm|confirmed|force)\b[\s.!]*$").unwrap()
});

static SHORTCUTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bw/\s*", "with "),
        (r"(?i)\bobj\b", "object"),
        (r"(?i)\bdel\b", "delete"),
        (r"(?i)\brot\b", "rotate"),
        (r"(?i)\bsub\b", "subdivide"),
        (r"(?i)\bmat\b", "material"),
        (r"(?i)\b(?:pos|loc)\b", "location"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Command text after lexical normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCommand {
    /// Collapsed text with shortcuts expanded, original case kept.
    pub cased: String,
    /// Case-folded form used for classification.
    pub folded: String,
    /// A trailing confirmation token was present.
    pub confirmed: bool,
}

/// Collapses whitespace, expands shortcuts and strips a trailing
/// confirmation token.
#[must_use]
pub fn normalize(text: &str) -> NormalizedCommand {
    let collapsed = WHITESPACE_RE.replace_all(text.trim(), " ").into_owned();
    let confirmed = CONFIRM_RE.is_match(&collapsed);
    let stripped = if confirmed {
        CONFIRM_RE.replace(&collapsed, "").into_owned()
    } else {
        collapsed
    };
    let cased = SHORTCUTS
        .iter()
        .fold(stripped, |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
        .trim()
        .to_string();
    let folded = cased.to_lowercase();
    NormalizedCommand {
        cased,
        folded,
        confirmed,
    }
}

/// Whitespace tokens with surrounding punctuation removed.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace().map(|token| {
        token.trim_matches(|c: char| matches!(c, ',' | ';' | '!' | '?' | '"' | '\'' | '(' | ')'))
    })
}

/// Parses a number captured by one of the slot patterns.
#[must_use]
pub fn number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

/// Spelled-out small numbers.
#[must_use]
pub fn word_number(raw: &str) -> Option<f64> {
    let value = match raw {
        "one" | "a" | "an" | "single" => 1.0,
        "two" | "pair" | "couple" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        "dozen" => 12.0,
        _ => return number(raw),
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_folds() {
        let cmd = normalize("  Create   a\tRed  CUBE ");
        assert_eq!(cmd.cased, "Create a Red CUBE");
        assert_eq!(cmd.folded, "create a red cube");
        assert!(!cmd.confirmed);
    }

    #[test]
    fn expands_shortcuts() {
        let cmd = normalize("add cube w/ mat gold then rot 45");
        assert_eq!(cmd.folded, "add cube with material gold then rotate 45");
        assert_eq!(normalize("set loc 1,2,3").folded, "set location 1,2,3");
        assert_eq!(normalize("submit").folded, "submit");
    }

    #[test]
    fn strips_trailing_confirmation() {
        let cmd = normalize("delete the cube, confirmed");
        assert!(cmd.confirmed);
        assert_eq!(cmd.folded, "delete the cube");
        assert!(normalize("delete everything --force").confirmed);
        assert!(!normalize("force field on the cube please").confirmed);
    }

    #[test]
    fn tokens_trim_punctuation() {
        let found: Vec<_> = tokens("paint \"Cube.001\", red!").collect();
        assert_eq!(found, vec!["paint", "Cube.001", "red"]);
    }
}
