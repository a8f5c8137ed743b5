//! Text normalisation applied to payload values before insertion
//!
//! These are pure string functions; the value mapper decides which rules apply
//! to which placeholder.

use crate::style::{RunStyle, StyledRun};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;

/// Words kept lower-case in titles (except as the first word)
pub const MINOR_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "nor", "but", "for", "so", "yet", "as", "at", "by", "in",
    "of", "on", "to", "up", "via", "with", "without", "from", "between", "among", "over",
    "under", "after", "before", "during", "into", "onto", "per", "versus", "vs", "than",
    "like", "near",
];

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid percent regex"));
static EQUALS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*=\s*").expect("valid equals regex"));
static PLUS_MINUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*±\s*").expect("valid plus-minus regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));
static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("valid reference regex"));
static ET_AL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:(\S+)(\s+))?\b(et al)\b").expect("valid et al regex"));

/// Capitalise one word, keeping acronyms such as `DNA` or `COVID-19`
#[must_use = "returns the capitalised word"]
pub fn capitalize_word(word: &str) -> String {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return word.to_string();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Title-case a phrase: minor words lower-case, everything else capitalised
#[must_use = "returns the title-cased text"]
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && MINOR_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize_word(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Manuscript title: comma-separated parts title-cased, periods dropped,
/// percentages and symbol spacing normalised
#[must_use = "returns the formatted title"]
pub fn format_title(title: &str) -> String {
    let joined = title
        .split(',')
        .map(|part| title_case(&part.replace('.', "")))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    normalize_symbol_spacing(&format_percentages(&joined))
}

/// Render a date; ISO `YYYY-MM-DD` input is formatted with `format`, anything
/// else has its `-`-separated parts reversed
#[must_use = "returns the formatted date"]
pub fn format_date(input: &str, format: &str) -> String {
    let input = input.trim();
    if input.is_empty() {
        return String::new();
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let mut out = String::new();
        if write!(out, "{}", date.format(format)).is_ok() {
            return out;
        }
        log::warn!("Invalid date format '{format}', falling back to reversed parts");
    }
    input.split('-').rev().collect::<Vec<_>>().join("-")
}

/// Keyword line without its label: `Heart Failure; Troponin;`
#[must_use = "returns the formatted keywords"]
pub fn format_keywords(input: &str) -> String {
    let keywords: Vec<String> = input
        .split([',', ';'])
        .map(|k| {
            k.replace('.', "")
                .split_whitespace()
                .map(capitalize_word)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return String::new();
    }
    format!("{};", keywords.join("; "))
}

/// `Main Subject: [<type>]`
#[must_use = "returns the research type label"]
pub fn format_research_type(research_type: &str) -> String {
    format!("Main Subject: [{}]", research_type.trim())
}

/// Author name in reading order; `Last, First` becomes `First Last`
#[must_use = "returns the display name"]
pub fn author_display_name(name: &str) -> String {
    let name = match name.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() => format!("{} {}", first.trim(), last.trim()),
        _ => name.replace(',', " "),
    };
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short author form used in headers and citations: `Last FM`
#[must_use = "returns the short author name"]
pub fn author_short_name(name: &str) -> String {
    let display = author_display_name(name);
    let parts: Vec<&str> = display.split_whitespace().collect();
    let Some((last, given)) = parts.split_last() else {
        return String::new();
    };
    let initials: String = given
        .iter()
        .filter_map(|n| n.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    let last = capitalize_word(last);
    if initials.is_empty() {
        last
    } else {
        format!("{last} {initials}")
    }
}

/// Citation text without its label: `Smith J, Doe A. Title. <suffix>`
#[must_use = "returns the citation text"]
pub fn format_citation(short_names: &[String], title: &str, suffix: &str) -> String {
    let mut out = short_names.join(", ");
    if !out.is_empty() {
        out.push_str(". ");
    }
    if !title.is_empty() {
        out.push_str(title);
        out.push_str(". ");
    }
    out.push_str(suffix);
    out
}

/// One abstract section: header up to and including the first `:`, then body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractSection {
    /// Section header, e.g. `Background:`
    pub header: String,
    /// Section body, trimmed
    pub body: String,
}

/// Split an abstract into sections, one per non-empty line
#[must_use = "returns the abstract sections"]
pub fn abstract_sections(text: &str) -> Vec<AbstractSection> {
    content_lines(&text.replace('\t', ""))
        .into_iter()
        .map(|line| match line.find(':') {
            Some(idx) => AbstractSection {
                header: line[..=idx].to_string(),
                body: line[idx + 1..].trim().to_string(),
            },
            None => AbstractSection {
                header: line,
                body: String::new(),
            },
        })
        .collect()
}

/// Trimmed non-empty lines
#[must_use = "returns the content lines"]
pub fn content_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Round brackets become square brackets
#[must_use = "returns the converted text"]
pub fn convert_brackets(text: &str) -> String {
    text.replace('(', "[").replace(')', "]")
}

/// Integer percentages gain one decimal: `10%` becomes `10.0%`
#[must_use = "returns the converted text"]
pub fn format_percentages(text: &str) -> String {
    PERCENT_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let number = &caps[1];
            let after_dot = caps
                .get(0)
                .is_some_and(|m| text[..m.start()].ends_with('.'));
            if after_dot || number.contains('.') {
                format!("{number}%")
            } else {
                format!("{number}.0%")
            }
        })
        .into_owned()
}

/// Exactly one space around `=` and `±`, runs of whitespace collapsed
#[must_use = "returns the normalised text"]
pub fn normalize_symbol_spacing(text: &str) -> String {
    collapse_symbol_spacing(text).trim().to_string()
}

fn collapse_symbol_spacing(text: &str) -> String {
    let text = EQUALS_RE.replace_all(text, " = ");
    let text = PLUS_MINUS_RE.replace_all(&text, " ± ");
    WHITESPACE_RE.replace_all(&text, " ").into_owned()
}

/// Brackets, percentages and symbol spacing
#[must_use = "returns the normalised text"]
pub fn apply_text_rules(text: &str) -> String {
    normalize_symbol_spacing(&format_percentages(&convert_brackets(text)))
}

/// Text rules over a sequence of styled runs; whitespace is collapsed across
/// run boundaries and trimmed at both ends
#[must_use = "returns the normalised runs"]
pub fn apply_text_rules_to_runs(runs: &[StyledRun]) -> Vec<StyledRun> {
    let mut out: Vec<StyledRun> = Vec::new();
    for run in runs {
        let mut text = collapse_symbol_spacing(&format_percentages(&convert_brackets(&run.text)));
        let prev_space = out.last().map_or(true, |r| r.text.ends_with(' '));
        if prev_space {
            text = text.trim_start().to_string();
        }
        if !text.is_empty() {
            out.push(StyledRun::new(text, run.style.clone()));
        }
    }
    if let Some(last) = out.last_mut() {
        let trimmed = last.text.trim_end().len();
        last.text.truncate(trimmed);
    }
    out.retain(|r| !r.text.is_empty());
    out
}

/// Text rules plus emphasis: bracketed reference numbers become bold
/// superscript, and in `<Name> et al` the name is bold and `et al` bold italic
#[must_use = "returns the styled runs"]
pub fn rich_runs(text: &str) -> Vec<StyledRun> {
    let text = apply_text_rules(text);
    let mut runs = Vec::new();
    let mut pos = 0;
    for m in REFERENCE_RE.find_iter(&text) {
        push_et_al_runs(&mut runs, &text[pos..m.start()]);
        runs.push(StyledRun::new(m.as_str(), RunStyle::bold().superscript()));
        pos = m.end();
    }
    push_et_al_runs(&mut runs, &text[pos..]);
    runs
}

fn push_et_al_runs(runs: &mut Vec<StyledRun>, segment: &str) {
    let mut pos = 0;
    for caps in ET_AL_RE.captures_iter(segment) {
        let Some(whole) = caps.get(0) else { continue };
        push_plain(runs, &segment[pos..whole.start()]);
        if let (Some(name), Some(space)) = (caps.get(1), caps.get(2)) {
            runs.push(StyledRun::bold(name.as_str()));
            push_plain(runs, space.as_str());
        }
        let et_al = RunStyle {
            bold: true,
            italic: true,
            ..RunStyle::default()
        };
        runs.push(StyledRun::new("et al", et_al));
        pos = whole.end();
    }
    push_plain(runs, &segment[pos..]);
}

fn push_plain(runs: &mut Vec<StyledRun>, text: &str) {
    if text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.style.is_plain() => last.text.push_str(text),
        _ => runs.push(StyledRun::plain(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::runs_text;
    use proptest::prelude::*;

    #[test]
    fn test_title_case() {
        assert_eq!(
            format_title("the role of DNA in heart failure. a review"),
            "The Role of DNA in Heart Failure a Review"
        );
        assert_eq!(
            format_title("outcomes after surgery, a cohort study"),
            "Outcomes after Surgery, A Cohort Study"
        );
    }

    #[test]
    fn test_title_percentages_and_symbols() {
        assert_eq!(format_title("response in 45% of cases (n=20)"), "Response in 45.0% of Cases (n = 20)");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2025-03-07", "%d-%m-%Y"), "07-03-2025");
        assert_eq!(format_date("2025-03-07", "%B %-d, %Y"), "March 7, 2025");
        assert_eq!(format_date("March-2025", "%d-%m-%Y"), "2025-March");
        assert_eq!(format_date("  ", "%d-%m-%Y"), "");
    }

    #[test]
    fn test_format_keywords() {
        assert_eq!(format_keywords("heart failure, troponin;  BNP."), "Heart Failure; Troponin; BNP;");
        assert_eq!(format_keywords(" , ; "), "");
    }

    #[test]
    fn test_author_names() {
        assert_eq!(author_display_name("Smith, John Paul"), "John Paul Smith");
        assert_eq!(author_display_name("  Ahmed   Ali "), "Ahmed Ali");
        assert_eq!(author_short_name("john paul smith"), "Smith JP");
        assert_eq!(author_short_name("Smith, Anna"), "Smith A");
        assert_eq!(author_short_name("Plato"), "Plato");
        assert_eq!(author_short_name(""), "");
    }

    #[test]
    fn test_citation() {
        let shorts = vec!["Smith J".to_string(), "Doe A".to_string()];
        assert_eq!(
            format_citation(&shorts, "A Study", "IJMA 2025; XX-XX [Article in Press]."),
            "Smith J, Doe A. A Study. IJMA 2025; XX-XX [Article in Press]."
        );
    }

    #[test]
    fn test_abstract_sections() {
        let sections = abstract_sections("Background: why\n\n\tMethods:how: and more\nConclusion");
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].header, "Background:");
        assert_eq!(sections[0].body, "why");
        assert_eq!(sections[1].body, "how: and more");
        assert_eq!(sections[2].header, "Conclusion");
        assert!(sections[2].body.is_empty());
    }

    #[test]
    fn test_percentages() {
        assert_eq!(format_percentages("10% and 12.5% and 3 %"), "10.0% and 12.5% and 3 %");
        assert_eq!(format_percentages("ratio .5%"), "ratio .5%");
    }

    #[test]
    fn test_symbol_spacing() {
        assert_eq!(normalize_symbol_spacing("x=1  ±0.2"), "x = 1 ± 0.2");
    }

    #[test]
    fn test_rules_across_runs() {
        let runs = vec![
            StyledRun::plain(" mean "),
            StyledRun::bold(" 5% "),
            StyledRun::plain("(n=3) "),
        ];
        let out = apply_text_rules_to_runs(&runs);
        assert_eq!(runs_text(&out), "mean 5.0% [n = 3]");
        assert!(out[1].style.bold);
    }

    #[test]
    fn test_rich_runs_references() {
        let runs = rich_runs("as shown (1) before");
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].text, "as shown ");
        assert_eq!(runs[1].text, "[1]");
        assert!(runs[1].style.superscript && runs[1].style.bold);
        assert_eq!(runs[2].text, " before");
    }

    #[test]
    fn test_rich_runs_et_al() {
        let runs = rich_runs("Smith et al. reported");
        assert_eq!(runs[0], StyledRun::bold("Smith"));
        assert_eq!(runs[1], StyledRun::plain(" "));
        assert!(runs[2].style.bold && runs[2].style.italic);
        assert_eq!(runs[2].text, "et al");
        assert_eq!(runs[3].text, ". reported");
    }

    #[test]
    fn test_rich_runs_standalone_et_al() {
        let runs = rich_runs("et al reported");
        assert_eq!(runs[0].text, "et al");
        assert!(runs[0].style.italic);
    }

    proptest! {
        #[test]
        fn prop_symbol_spacing_idempotent(s in "[a-z0-9 =±]{0,40}") {
            let once = normalize_symbol_spacing(&s);
            prop_assert_eq!(normalize_symbol_spacing(&once), once);
        }

        #[test]
        fn prop_percentages_idempotent(s in "[0-9. %a-z]{0,40}") {
            let once = format_percentages(&s);
            prop_assert_eq!(format_percentages(&once), once);
        }

        #[test]
        fn prop_title_has_no_periods(s in "[A-Za-z., ]{0,60}") {
            prop_assert!(!format_title(&s).contains('.'));
        }

        #[test]
        fn prop_rich_runs_keep_text(s in "[a-zA-Z0-9() ]{0,60}") {
            prop_assert_eq!(runs_text(&rich_runs(&s)), apply_text_rules(&s));
        }
    }
}
