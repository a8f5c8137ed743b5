//! Placeholder names and token scanning
//!
//! Templates mark substitution points with the literal `{{name}}` syntax.
//! Whitespace inside the braces is tolerated (`{{ authors }}`); a token with an
//! empty name (`{{}}`, `{{ }}`) is not a placeholder.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("valid placeholder regex"));

/// Built-in placeholders recognised by the value mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    /// Running header: first author short name + "et al."
    HeaderName,
    /// Research type / main subject label
    ResearchType,
    /// Manuscript title
    ResearchTitle,
    /// Author line with affiliation markers
    Authors,
    /// Numbered affiliation list
    Affiliation,
    /// Date the manuscript was received
    DateReceived,
    /// Date the manuscript was accepted
    DateAccepted,
    /// Corresponding author e-mail
    Email,
    /// Generated citation line
    Citation,
    /// Structured abstract
    Abstract,
    /// Keyword line
    Keywords,
    /// Introduction section
    Intro,
    /// Aim of work section
    Aim,
    /// Patients and methods section
    Methods,
    /// Results section
    Results,
    /// Structural: tables
    Tables,
    /// Structural: figures
    Figures,
    /// Discussion section
    Discussion,
    /// References section
    References,
}

impl Placeholder {
    /// All built-in placeholders in template order
    pub const ALL: [Self; 19] = [
        Self::HeaderName,
        Self::ResearchType,
        Self::ResearchTitle,
        Self::Authors,
        Self::Affiliation,
        Self::DateReceived,
        Self::DateAccepted,
        Self::Email,
        Self::Citation,
        Self::Abstract,
        Self::Keywords,
        Self::Intro,
        Self::Aim,
        Self::Methods,
        Self::Results,
        Self::Tables,
        Self::Figures,
        Self::Discussion,
        Self::References,
    ];

    /// Name used inside the token braces
    #[inline]
    #[must_use = "returns the placeholder name"]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HeaderName => "header_name",
            Self::ResearchType => "research_type",
            Self::ResearchTitle => "research_title",
            Self::Authors => "authors",
            Self::Affiliation => "affiliation",
            Self::DateReceived => "date_received",
            Self::DateAccepted => "date_accepted",
            Self::Email => "email",
            Self::Citation => "citation",
            Self::Abstract => "abstract",
            Self::Keywords => "keywords",
            Self::Intro => "intro",
            Self::Aim => "aim",
            Self::Methods => "methods",
            Self::Results => "results",
            Self::Tables => "tables",
            Self::Figures => "figures",
            Self::Discussion => "discussion",
            Self::References => "references",
        }
    }

    /// Look up a built-in placeholder by name
    #[must_use = "returns the matching placeholder, if any"]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Full token text, e.g. `{{authors}}`
    #[inline]
    #[must_use = "returns the token text"]
    pub fn token(self) -> String {
        format!("{{{{{}}}}}", self.name())
    }

    /// Placeholders replaced by inserted document structure rather than text
    #[inline]
    #[must_use = "checks whether the placeholder is structural"]
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::Tables | Self::Figures)
    }

    /// Placeholders that correspond to a payload field; the others are derived
    #[inline]
    #[must_use = "checks whether the payload carries this field"]
    pub const fn is_payload_field(self) -> bool {
        !matches!(self, Self::HeaderName | Self::Citation)
    }
}

impl std::fmt::Display for Placeholder {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{{{}}}}}", self.name())
    }
}

/// A placeholder-shaped token found in text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenMatch {
    /// Byte range of the whole token, braces included
    pub range: Range<usize>,
    /// Trimmed name between the braces
    pub name: String,
}

impl TokenMatch {
    /// The token as written in the source text
    #[inline]
    #[must_use = "returns the token text"]
    pub fn raw<'a>(&self, text: &'a str) -> &'a str {
        &text[self.range.clone()]
    }
}

/// Find all non-empty placeholder tokens in `text`, left to right
#[must_use = "returns the tokens found in the text"]
pub fn find_tokens(text: &str) -> Vec<TokenMatch> {
    if !text.contains("{{") {
        return Vec::new();
    }
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().trim();
            (!name.is_empty()).then(|| TokenMatch {
                range: whole.range(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Whether `text` contains at least one placeholder token
#[inline]
#[must_use = "checks for placeholder tokens"]
pub fn contains_token(text: &str) -> bool {
    !find_tokens(text).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for p in Placeholder::ALL {
            assert_eq!(Placeholder::from_name(p.name()), Some(p));
        }
        assert_eq!(Placeholder::from_name("title"), None);
    }

    #[test]
    fn test_token_format() {
        assert_eq!(Placeholder::Authors.token(), "{{authors}}");
        assert_eq!(Placeholder::Tables.to_string(), "{{tables}}");
    }

    #[test]
    fn test_structural() {
        assert!(Placeholder::Tables.is_structural());
        assert!(Placeholder::Figures.is_structural());
        assert!(!Placeholder::Abstract.is_structural());
    }

    #[test]
    fn test_find_tokens() {
        let text = "Received {{date_received}}; accepted {{ date_accepted }}.";
        let tokens = find_tokens(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].name, "date_received");
        assert_eq!(tokens[0].raw(text), "{{date_received}}");
        assert_eq!(tokens[1].name, "date_accepted");
        assert_eq!(tokens[1].raw(text), "{{ date_accepted }}");
    }

    #[test]
    fn test_empty_tokens_ignored() {
        assert!(find_tokens("{{}} and {{   }}").is_empty());
        assert!(!contains_token("plain { braces }"));
    }

    #[test]
    fn test_unknown_names_still_found() {
        let tokens = find_tokens("{{volume}}");
        assert_eq!(tokens[0].name, "volume");
    }
}
