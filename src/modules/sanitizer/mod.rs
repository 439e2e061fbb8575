//! Turns free text into a filesystem-safe filename stem.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{2010}-\u{2015}]").expect("invalid dash regex"));
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("invalid punctuation regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));
static HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("invalid hyphen regex"));

/// Which character classes may survive sanitizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizePolicy {
    pub allow_accents: bool,
    /// Hyphens and underscores are kept even when this is false.
    pub allow_punctuation: bool,
    /// When false, whitespace runs become a single hyphen.
    pub allow_spaces: bool,
    pub allow_uppercase: bool,
    pub require_ascii: bool,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            allow_accents: true,
            allow_punctuation: true,
            allow_spaces: true,
            allow_uppercase: true,
            require_ascii: false,
        }
    }
}

impl SanitizePolicy {
    pub fn with_spaces(mut self, allow: bool) -> Self {
        self.allow_spaces = allow;
        self
    }

    pub fn with_punctuation(mut self, allow: bool) -> Self {
        self.allow_punctuation = allow;
        self
    }

    pub fn with_uppercase(mut self, allow: bool) -> Self {
        self.allow_uppercase = allow;
        self
    }

    pub fn with_accents(mut self, allow: bool) -> Self {
        self.allow_accents = allow;
        self
    }

    pub fn with_ascii_only(mut self, required: bool) -> Self {
        self.require_ascii = required;
        self
    }
}

/// Sanitize `text` under `policy`.
///
/// Total and idempotent: the result never starts or ends with a hyphen and
/// never contains two hyphens in a row. Input with nothing usable yields an
/// empty string.
pub fn sanitize(text: &str, policy: &SanitizePolicy) -> String {
    let mut text = text.trim().to_string();

    // Case folding goes first so it cannot interact with combining marks.
    if !policy.allow_uppercase {
        text = text.to_lowercase();
    }

    text = if policy.allow_accents && !policy.require_ascii {
        text.nfc().collect()
    } else {
        text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
    };

    // Compatibility decomposition can yield capitals (`ℍ` → `H`).
    if !policy.allow_uppercase {
        text = text.to_lowercase();
    }

    if policy.require_ascii {
        text.retain(|c| c.is_ascii());
    }

    if !policy.allow_punctuation {
        text = DASHES.replace_all(&text, "-").into_owned();
        text = PUNCTUATION.replace_all(&text, "").into_owned();
        text = WHITESPACE.replace_all(&text, " ").into_owned();
    }

    if !policy.allow_spaces {
        text = WHITESPACE.replace_all(&text, "-").into_owned();
    }

    text = HYPHENS.replace_all(&text, "-").into_owned();
    text.trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> SanitizePolicy {
        SanitizePolicy::default()
            .with_spaces(false)
            .with_punctuation(false)
            .with_uppercase(false)
    }

    fn all_policies() -> Vec<SanitizePolicy> {
        let mut policies = Vec::new();
        for bits in 0u8..32 {
            policies.push(SanitizePolicy {
                allow_accents: bits & 1 != 0,
                allow_punctuation: bits & 2 != 0,
                allow_spaces: bits & 4 != 0,
                allow_uppercase: bits & 8 != 0,
                require_ascii: bits & 16 != 0,
            });
        }
        policies
    }

    const AWKWARD_INPUTS: &[&str] = &[
        "Hello,  World!!!",
        "Café & Résumé",
        "  -- leading and trailing --  ",
        "- - a - - b - -",
        "Hello—World",
        "a---b___c",
        "Ünïcödé  Straße ½",
        "日本の 桜 — 春",
        "!!!",
        "",
        "   ",
        "x\t\ny",
        "İstanbul at dusk",
        "tab -\t- separated",
        "ℍotel 𝐀rt",
    ];

    #[test]
    fn defaults_keep_text_as_is() {
        let policy = SanitizePolicy::default();
        assert_eq!(sanitize("Hello, World!", &policy), "Hello, World!");
        assert_eq!(sanitize("Hello__World", &policy), "Hello__World");
        assert_eq!(sanitize("  padded  ", &policy), "padded");
    }

    #[test]
    fn punctuation_removal_keeps_hyphens_and_underscores() {
        let policy = SanitizePolicy::default().with_punctuation(false);
        assert_eq!(sanitize("Hello, World!", &policy), "Hello World");
        assert_eq!(sanitize("Hello—World", &policy), "Hello-World");
        assert_eq!(sanitize("Hello_World", &policy), "Hello_World");
    }

    #[test]
    fn strict_policy_produces_slug() {
        assert_eq!(sanitize("Hello,  World!!!", &strict()), "hello-world");
        assert_eq!(sanitize("Café & Résumé", &strict().with_accents(false)), "cafe-resume");
    }

    #[test]
    fn accents_survive_when_allowed() {
        assert_eq!(sanitize("Cafe\u{301}", &SanitizePolicy::default()), "Café");
        assert_eq!(sanitize("Café", &SanitizePolicy::default().with_accents(false)), "Cafe");
    }

    #[test]
    fn ascii_only_drops_other_scripts() {
        let policy = SanitizePolicy::default().with_ascii_only(true);
        assert_eq!(sanitize("Crème brûlée 日本", &policy), "Creme brulee");
    }

    #[test]
    fn compatibility_capitals_are_folded() {
        let policy = strict().with_accents(false);
        assert_eq!(sanitize("ℍotel 𝐀rt", &policy), "hotel-art");
    }

    #[test]
    fn degenerate_input_is_empty() {
        assert_eq!(sanitize("!!!", &strict()), "");
        assert_eq!(sanitize("---", &SanitizePolicy::default()), "");
        assert_eq!(sanitize("", &SanitizePolicy::default()), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for policy in all_policies() {
            for input in AWKWARD_INPUTS {
                let once = sanitize(input, &policy);
                assert_eq!(sanitize(&once, &policy), once, "input {input:?} policy {policy:?}");
            }
        }
    }

    #[test]
    fn output_has_no_stray_hyphens() {
        for policy in all_policies() {
            for input in AWKWARD_INPUTS {
                let out = sanitize(input, &policy);
                assert!(!out.starts_with('-'), "{out:?}");
                assert!(!out.ends_with('-'), "{out:?}");
                assert!(!out.contains("--"), "{out:?}");
            }
        }
    }
}
