//! Value mapper: request fields to ready-to-insert placeholder values

use crate::affiliation::normalize_affiliation;
use crate::config::GeneratorConfig;
use crate::error::{ManudocError, Result};
use crate::formatting::{
    abstract_sections, apply_text_rules, author_display_name, author_short_name, content_lines,
    format_citation, format_date, format_keywords, format_percentages, format_research_type,
    format_title, normalize_symbol_spacing, rich_runs, title_case,
};
use crate::payload::{FigureFragment, ManuscriptRequest, TableFragment};
use crate::placeholder::Placeholder;
use crate::style::{Alignment, Indent, ParagraphFormat, RunStyle, StyledRun};
use std::collections::BTreeMap;

const HEADER_COLOR: &str = "1F3864";
const MARKER_COLOR: &str = "FF0000";
const KEYWORD_LABEL_COLOR: &str = "2F5496";

/// A paragraph produced by a block value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockParagraph {
    /// Runs in order
    pub runs: Vec<StyledRun>,
    /// Formatting overlaid on the template paragraph's properties
    pub format: ParagraphFormat,
}

impl BlockParagraph {
    /// Paragraph from runs and a format
    #[inline]
    #[must_use = "creates a block paragraph"]
    pub fn new(runs: Vec<StyledRun>, format: ParagraphFormat) -> Self {
        Self { runs, format }
    }
}

/// Value substituted for one placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderValue {
    /// Runs substituted inside the token's run
    Inline(Vec<StyledRun>),
    /// Paragraphs replacing the token's paragraph span
    Block(Vec<BlockParagraph>),
    /// Tables, inserted by the table merge unit
    Tables(Vec<TableFragment>),
    /// Figures, inserted by the figure merge unit
    Figures(Vec<FigureFragment>),
}

impl PlaceholderValue {
    /// Empty inline value
    #[inline]
    #[must_use = "creates an empty value"]
    pub const fn empty() -> Self {
        Self::Inline(Vec::new())
    }

    /// Inline plain text; empty text gives an empty value
    #[must_use = "creates an inline value"]
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Self::empty()
        } else {
            Self::Inline(vec![StyledRun::plain(text)])
        }
    }

    /// Whether nothing would be inserted
    #[must_use = "checks whether the value is empty"]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Inline(runs) => runs.iter().all(|r| r.text.is_empty()),
            Self::Block(paragraphs) => paragraphs.is_empty(),
            Self::Tables(tables) => tables.iter().all(TableFragment::is_empty),
            Self::Figures(figures) => figures.is_empty(),
        }
    }
}

/// Complete placeholder name to value mapping for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    values: BTreeMap<String, PlaceholderValue>,
}

impl PlaceholderMap {
    /// Empty map
    #[inline]
    #[must_use = "creates an empty map"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a placeholder
    pub fn insert(&mut self, name: impl Into<String>, value: PlaceholderValue) {
        self.values.insert(name.into(), value);
    }

    /// Value of a placeholder
    #[inline]
    #[must_use = "returns the mapped value"]
    pub fn get(&self, name: &str) -> Option<&PlaceholderValue> {
        self.values.get(name)
    }

    /// Whether a placeholder has a value
    #[inline]
    #[must_use = "checks whether the placeholder is mapped"]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Mapped placeholder names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of mapped placeholders
    #[inline]
    #[must_use = "returns the number of mapped placeholders"]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map is empty
    #[inline]
    #[must_use = "checks whether the map is empty"]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds a [`PlaceholderMap`] from a request
#[derive(Debug, Clone, Copy)]
pub struct ValueMapper<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> ValueMapper<'a> {
    /// Mapper using the given configuration
    #[inline]
    #[must_use = "creates a value mapper"]
    pub const fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    /// Map every known and configured placeholder
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for the first required field that is absent or blank.
    pub fn map(&self, request: &ManuscriptRequest) -> Result<PlaceholderMap> {
        for field in &self.config.required_fields {
            if request.is_blank(field) {
                return Err(ManudocError::MissingField(field.clone()));
            }
        }

        let title = format_title(&request.research_title);
        let authors: Vec<&String> = request.authors.iter().filter(|a| !a.trim().is_empty()).collect();
        let short_names: Vec<String> = authors.iter().map(|a| author_short_name(a)).collect();

        let mut map = PlaceholderMap::new();
        for placeholder in Placeholder::ALL {
            let value = match placeholder {
                Placeholder::HeaderName => self.header_name(short_names.first()),
                Placeholder::ResearchType => research_type(&request.research_type),
                Placeholder::ResearchTitle => labelled(None, &title, RunStyle::bold()),
                Placeholder::Authors => self.authors(&authors, &request.affiliation),
                Placeholder::Affiliation => self.affiliations(&request.affiliation),
                Placeholder::DateReceived => {
                    PlaceholderValue::text(format_date(&request.date_received, &self.config.date_format))
                }
                Placeholder::DateAccepted => {
                    PlaceholderValue::text(format_date(&request.date_accepted, &self.config.date_format))
                }
                Placeholder::Email => labelled(
                    Some(("Email: ", RunStyle::bold())),
                    request.email.trim(),
                    RunStyle::plain(),
                ),
                Placeholder::Citation => self.citation(&short_names, &title),
                Placeholder::Abstract => abstract_value(&request.abstract_text),
                Placeholder::Keywords => labelled(
                    Some(("Keywords: ", RunStyle::bold().with_color(KEYWORD_LABEL_COLOR))),
                    &format_keywords(&request.keywords),
                    RunStyle::plain(),
                ),
                Placeholder::Intro => section(&request.intro, SectionKind::Rich),
                Placeholder::Aim => section(&request.aim, SectionKind::Rich),
                Placeholder::Methods => section(&request.methods, SectionKind::Rich),
                Placeholder::Results => section(&request.results, SectionKind::Plain),
                Placeholder::Discussion => section(&request.discussion, SectionKind::Rich),
                Placeholder::References => section(&request.references, SectionKind::References),
                Placeholder::Tables => PlaceholderValue::Tables(
                    request.tables.iter().filter(|t| !t.is_empty()).cloned().collect(),
                ),
                Placeholder::Figures => PlaceholderValue::Figures(request.figures.clone()),
            };
            map.insert(placeholder.name(), value);
        }

        for field in &self.config.extra_fields {
            let text = request.extra_text(field).unwrap_or_default();
            map.insert(field.as_str(), PlaceholderValue::text(text.trim()));
        }

        log::debug!("Mapped {} placeholders", map.len());
        Ok(map)
    }

    fn header_name(&self, first_short: Option<&String>) -> PlaceholderValue {
        let Some(short) = first_short else {
            return PlaceholderValue::empty();
        };
        let name_style = RunStyle::bold().with_color(HEADER_COLOR);
        let mut runs = vec![StyledRun::new(format!("{short}, "), name_style.clone())];
        if !self.config.header_suffix.is_empty() {
            let suffix_style = RunStyle {
                italic: true,
                ..name_style
            };
            runs.push(StyledRun::new(self.config.header_suffix.clone(), suffix_style));
        }
        PlaceholderValue::Inline(runs)
    }

    fn citation(&self, short_names: &[String], title: &str) -> PlaceholderValue {
        if short_names.is_empty() && title.is_empty() {
            return PlaceholderValue::empty();
        }
        labelled(
            Some(("Citation: ", RunStyle::bold().with_color(MARKER_COLOR))),
            &format_citation(short_names, title, &self.config.citation_suffix),
            RunStyle::plain(),
        )
    }

    fn format_affiliation(&self, affiliation: &str) -> Option<String> {
        if self.config.normalize_affiliations {
            if let Some(normalized) = normalize_affiliation(affiliation) {
                return Some(normalized);
            }
        }
        let cased = title_case(&affiliation.replace('.', " "));
        (!cased.is_empty()).then(|| format!("{cased}."))
    }

    fn distinct_affiliations(&self, affiliations: &[String]) -> Vec<String> {
        let mut distinct: Vec<String> = Vec::new();
        for aff in affiliations.iter().filter_map(|a| self.format_affiliation(a)) {
            if !distinct.contains(&aff) {
                distinct.push(aff);
            }
        }
        distinct
    }

    fn affiliations(&self, affiliations: &[String]) -> PlaceholderValue {
        let distinct = self.distinct_affiliations(affiliations);
        let numbered = distinct.len() > 1;
        let marker_style = RunStyle::plain().with_color(MARKER_COLOR).superscript();
        let format = ParagraphFormat::default().aligned(Alignment::Left);
        let paragraphs = distinct
            .into_iter()
            .enumerate()
            .map(|(i, aff)| {
                let mut runs = Vec::new();
                if numbered {
                    runs.push(StyledRun::new((i + 1).to_string(), marker_style.clone()));
                    runs.push(StyledRun::plain(" "));
                }
                runs.push(StyledRun::plain(aff));
                BlockParagraph::new(runs, format.clone())
            })
            .collect();
        PlaceholderValue::Block(paragraphs)
    }

    fn authors(&self, authors: &[&String], affiliations: &[String]) -> PlaceholderValue {
        let formatted: Vec<Option<String>> = affiliations.iter().map(|a| self.format_affiliation(a)).collect();
        let distinct = self.distinct_affiliations(affiliations);
        let single = distinct.len() <= 1;

        let marker_style = RunStyle::bold().with_color(MARKER_COLOR).superscript();
        let mut runs = Vec::new();
        for (i, author) in authors.iter().enumerate() {
            let number = formatted
                .get(i)
                .and_then(Option::as_ref)
                .and_then(|aff| distinct.iter().position(|d| d == aff))
                .map(|idx| idx + 1);
            let marker = match (i, single, number) {
                (0, true, _) => "*".to_string(),
                (0, false, Some(n)) => format!("*{n}"),
                (0, false, None) => "*".to_string(),
                (_, false, Some(n)) => n.to_string(),
                _ => String::new(),
            };
            if !marker.is_empty() {
                runs.push(StyledRun::new(marker, marker_style.clone()));
            }
            let lead = if i == 0 { "" } else { " " };
            runs.push(StyledRun::bold(format!("{lead}{}", author_display_name(author))));
            runs.push(StyledRun::bold(self.config.author_separator.clone()));
        }
        PlaceholderValue::Inline(runs)
    }
}

fn labelled(label: Option<(&str, RunStyle)>, text: &str, style: RunStyle) -> PlaceholderValue {
    if text.is_empty() {
        return PlaceholderValue::empty();
    }
    let mut runs = Vec::new();
    if let Some((label, label_style)) = label {
        runs.push(StyledRun::new(label, label_style));
    }
    runs.push(StyledRun::new(text, style));
    PlaceholderValue::Inline(runs)
}

fn research_type(value: &str) -> PlaceholderValue {
    PlaceholderValue::Inline(vec![StyledRun::new(
        format_research_type(value),
        RunStyle::plain().with_color(MARKER_COLOR),
    )])
}

fn abstract_value(text: &str) -> PlaceholderValue {
    let format = ParagraphFormat::default()
        .aligned(Alignment::Justify)
        .indented(Indent::Hanging)
        .spaced(0, 6);
    let paragraphs = abstract_sections(text)
        .into_iter()
        .map(|section| {
            let mut runs = vec![StyledRun::bold(section.header)];
            let body = normalize_symbol_spacing(&format_percentages(&section.body));
            if !body.is_empty() {
                runs.push(StyledRun::plain(format!(" {body}")));
            }
            BlockParagraph::new(runs, format.clone())
        })
        .collect();
    PlaceholderValue::Block(paragraphs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    /// Text rules plus reference superscripts and "et al" emphasis
    Rich,
    /// Text rules only
    Plain,
    /// Text rules, hanging indent
    References,
}

fn section(text: &str, kind: SectionKind) -> PlaceholderValue {
    let justified = ParagraphFormat::default().aligned(Alignment::Justify);
    let paragraphs = content_lines(text)
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let runs = match kind {
                SectionKind::Rich => rich_runs(&line),
                SectionKind::Plain | SectionKind::References => {
                    vec![StyledRun::plain(apply_text_rules(&line))]
                }
            };
            let indent = match kind {
                SectionKind::References => Indent::Hanging,
                _ if i > 0 => Indent::FirstLine,
                _ => Indent::Inherit,
            };
            BlockParagraph::new(runs, justified.clone().indented(indent))
        })
        .collect();
    PlaceholderValue::Block(paragraphs)
}
