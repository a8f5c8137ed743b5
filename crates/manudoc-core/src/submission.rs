//! Submission page extraction
//!
//! The journal's submission system shows each manuscript on one HTML page: a
//! details table inside a `fieldset` (code, article type, dates), the title in
//! `#td_manu_ttl`, and an authors table with one row per author (name, e-mail,
//! and the affiliation in the sixth column). [`Submission::from_html`] reads
//! those fields so a payload can be started from the page instead of typed in.

use crate::payload::ManuscriptRequest;
use crate::tables::{direct_cells, direct_rows};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{json, Value};

static TRAILING_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\d{1,2}:\d{2}(?::\d{2})?\s*$").expect("valid time regex"));

/// Details table rows holding code, received and accepted date when unlabelled
const CODE_ROW: usize = 0;
const RECEIVED_ROW: usize = 8;
const ACCEPTED_ROW: usize = 10;

/// Columns of the authors table
const AUTHOR_COLUMNS: usize = 6;
const AFFILIATION_COLUMN: usize = 5;

/// One row of the authors table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionAuthor {
    /// Author name as entered
    pub name: String,
    /// E-mail address, possibly empty
    pub email: String,
    /// Free-text affiliation
    pub affiliation: String,
}

/// Fields read from a submission page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Manuscript code assigned by the submission system
    pub code: String,
    /// Manuscript title
    pub research_title: String,
    /// Article type
    pub research_type: String,
    /// Received date, time of day removed
    pub date_received: String,
    /// Accepted date, time of day removed
    pub date_accepted: String,
    /// Authors in page order
    pub authors: Vec<SubmissionAuthor>,
}

impl Submission {
    /// Read the submission fields from a page; missing fields stay empty
    #[must_use = "returns the extracted submission"]
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut submission = Self {
            research_title: select_text(&document, "#td_manu_ttl").unwrap_or_default(),
            authors: authors(&document),
            ..Self::default()
        };
        submission.read_details(&document);
        submission.date_received = strip_time(&submission.date_received);
        submission.date_accepted = strip_time(&submission.date_accepted);
        log::debug!(
            "Read submission '{}' with {} authors",
            submission.code,
            submission.authors.len()
        );
        submission
    }

    /// Whether neither a title nor an author was found
    #[must_use = "checks whether anything was extracted"]
    pub fn is_empty(&self) -> bool {
        self.research_title.is_empty() && self.authors.is_empty()
    }

    /// First non-empty author e-mail
    #[must_use = "returns the contact address"]
    pub fn contact_email(&self) -> Option<&str> {
        self.authors.iter().map(|a| a.email.as_str()).find(|e| !e.is_empty())
    }

    /// The fields as a JSON payload; the code is kept as the `code` extra field
    #[must_use = "returns the payload object"]
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "research_title": self.research_title,
            "research_type": self.research_type,
            "date_received": self.date_received,
            "date_accepted": self.date_accepted,
            "authors": self.authors.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            "affiliation": self.authors.iter().map(|a| a.affiliation.as_str()).collect::<Vec<_>>(),
            "email": self.contact_email().unwrap_or_default(),
        });
        if !self.code.is_empty() {
            payload["code"] = Value::String(self.code.clone());
        }
        payload
    }

    /// Convert into a request for the generator
    #[must_use = "returns the request"]
    pub fn into_request(self) -> ManuscriptRequest {
        let email = self.contact_email().unwrap_or_default().to_string();
        let mut request = ManuscriptRequest {
            research_title: self.research_title,
            research_type: self.research_type,
            date_received: self.date_received,
            date_accepted: self.date_accepted,
            email,
            ..ManuscriptRequest::default()
        };
        for author in self.authors {
            request.authors.push(author.name);
            request.affiliation.push(author.affiliation);
        }
        if !self.code.is_empty() {
            request.extra.insert("code".to_string(), Value::String(self.code));
        }
        request
    }

    /// Fill code, type and dates from the details table
    ///
    /// Rows are matched on their label first; unlabelled pages fall back to
    /// the fixed row positions of the submission system's layout.
    fn read_details(&mut self, document: &Html) {
        let Ok(selector) = Selector::parse("fieldset table") else {
            return;
        };
        let Some(table) = document.select(&selector).next() else {
            return;
        };
        let rows: Vec<Vec<String>> = direct_rows(table)
            .into_iter()
            .map(|row| direct_cells(row).into_iter().map(element_text).collect())
            .collect();

        for cells in rows.iter().filter(|c| (2..AUTHOR_COLUMNS).contains(&c.len())) {
            let label = cells[0].to_lowercase();
            let value = &cells[1];
            let slot = if label.contains("code") {
                &mut self.code
            } else if label.contains("type") {
                &mut self.research_type
            } else if label.contains("receiv") {
                &mut self.date_received
            } else if label.contains("accept") {
                &mut self.date_accepted
            } else if label.contains("title") {
                &mut self.research_title
            } else {
                continue;
            };
            if slot.is_empty() {
                slot.clone_from(value);
            }
        }

        let positional = |index: usize| rows.get(index).and_then(|cells| cells.get(1)).cloned();
        for (index, slot) in [
            (CODE_ROW, &mut self.code),
            (RECEIVED_ROW, &mut self.date_received),
            (ACCEPTED_ROW, &mut self.date_accepted),
        ] {
            if slot.is_empty() {
                *slot = positional(index).unwrap_or_default();
            }
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next().map(element_text)
}

/// Every table row with an author name in its first cell
fn authors(document: &Html) -> Vec<SubmissionAuthor> {
    let Ok(selector) = Selector::parse("tr") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = direct_cells(row)
                .into_iter()
                .filter(|c| c.value().name() == "td")
                .collect();
            if cells.len() < AUTHOR_COLUMNS {
                return None;
            }
            let name = element_text(cells[0]);
            (!name.is_empty()).then(|| SubmissionAuthor {
                name,
                email: element_text(cells[1]),
                affiliation: element_text(cells[AFFILIATION_COLUMN]),
            })
        })
        .collect()
}

fn strip_time(value: &str) -> String {
    TRAILING_TIME_RE.replace(value.trim(), "").into_owned()
}
