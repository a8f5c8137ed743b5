//! Request payload
//!
//! The payload arrives as a JSON object keyed by placeholder name. Field names
//! used by the manuscript submission form (`title`, `affiliations`,
//! `receive_date`, ...) are accepted as aliases. Top-level fields that are not
//! built-in placeholders are kept in [`ManuscriptRequest::extra`] and feed the
//! configured extra placeholders.

use crate::error::{ManudocError, Result};
use crate::submission::Submission;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Validated manuscript request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManuscriptRequest {
    /// Manuscript title
    #[serde(alias = "title", deserialize_with = "text")]
    pub research_title: String,

    /// Research type / main subject
    #[serde(deserialize_with = "text")]
    pub research_type: String,

    /// Received date, ISO `YYYY-MM-DD` preferred
    #[serde(alias = "receive_date", deserialize_with = "text")]
    pub date_received: String,

    /// Accepted date, ISO `YYYY-MM-DD` preferred
    #[serde(alias = "accept_date", deserialize_with = "text")]
    pub date_accepted: String,

    /// Author names in order
    #[serde(deserialize_with = "text_list")]
    pub authors: Vec<String>,

    /// Affiliation of each author, parallel to `authors`
    #[serde(alias = "affiliations", deserialize_with = "text_list")]
    pub affiliation: Vec<String>,

    /// Corresponding e-mail address
    #[serde(deserialize_with = "text")]
    pub email: String,

    /// Abstract, one `Section: text` per line
    #[serde(rename = "abstract", deserialize_with = "text")]
    pub abstract_text: String,

    /// Comma or semicolon separated keywords
    #[serde(deserialize_with = "text")]
    pub keywords: String,

    /// Introduction
    #[serde(alias = "introduction", deserialize_with = "text")]
    pub intro: String,

    /// Aim of the work
    #[serde(alias = "aim_of_work", deserialize_with = "text")]
    pub aim: String,

    /// Patients and methods
    #[serde(alias = "patients_methods", deserialize_with = "text")]
    pub methods: String,

    /// Results
    #[serde(deserialize_with = "text")]
    pub results: String,

    /// Discussion
    #[serde(deserialize_with = "text")]
    pub discussion: String,

    /// References, one per line
    #[serde(deserialize_with = "text")]
    pub references: String,

    /// Tables in submission order
    #[serde(deserialize_with = "fragments")]
    pub tables: Vec<TableFragment>,

    /// Figures in submission order
    #[serde(deserialize_with = "fragments")]
    pub figures: Vec<FigureFragment>,

    /// Remaining top-level fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ManuscriptRequest {
    /// Parse and validate a JSON payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if the JSON is malformed or a field has the
    /// wrong shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(json)?;
        log::debug!(
            "Parsed payload: {} authors, {} tables, {} figures, {} extra fields",
            request.authors.len(),
            request.tables.len(),
            request.figures.len(),
            request.extra.len()
        );
        Ok(request)
    }

    /// Validate an already-parsed JSON value
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if a field has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Start a request from a manuscript submission page
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if the page carries neither a title nor an
    /// author.
    pub fn from_submission_html(html: &str) -> Result<Self> {
        let submission = Submission::from_html(html);
        if submission.is_empty() {
            return Err(ManudocError::InvalidPayload(
                "submission page has no title or authors".to_string(),
            ));
        }
        Ok(submission.into_request())
    }

    /// Text of an extra field; numbers and booleans are rendered as text
    #[must_use = "returns the extra field text"]
    pub fn extra_text(&self, name: &str) -> Option<String> {
        match self.extra.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Whether a payload field is absent or blank
    #[must_use = "checks whether the field is blank"]
    pub fn is_blank(&self, field: &str) -> bool {
        let blank = |s: &str| s.trim().is_empty();
        match field {
            "research_title" => blank(&self.research_title),
            "research_type" => blank(&self.research_type),
            "date_received" => blank(&self.date_received),
            "date_accepted" => blank(&self.date_accepted),
            "authors" => self.authors.iter().all(|a| blank(a)),
            "affiliation" => self.affiliation.iter().all(|a| blank(a)),
            "email" => blank(&self.email),
            "abstract" => blank(&self.abstract_text),
            "keywords" => blank(&self.keywords),
            "intro" => blank(&self.intro),
            "aim" => blank(&self.aim),
            "methods" => blank(&self.methods),
            "results" => blank(&self.results),
            "discussion" => blank(&self.discussion),
            "references" => blank(&self.references),
            "tables" => self.tables.iter().all(TableFragment::is_empty),
            "figures" => self.figures.is_empty(),
            other => self.extra_text(other).map_or(true, |s| blank(&s)),
        }
    }
}

/// Cell grid or HTML markup of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableContent {
    /// Rows of cell text
    Rows {
        /// Cell text, row-major
        rows: Vec<Vec<String>>,
        /// First row is a header row
        header: bool,
    },
    /// HTML fragment containing a `<table>`
    Html(String),
}

/// One table of the payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TableRepr")]
pub struct TableFragment {
    /// Caption text following `Table N:`
    pub caption: Option<String>,
    /// Table body
    pub content: TableContent,
}

impl TableFragment {
    /// Table from rows of cells
    #[must_use = "creates a table fragment"]
    pub fn from_rows<R, C>(caption: Option<&str>, rows: R, header: bool) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            caption: caption.map(str::to_string),
            content: TableContent::Rows {
                rows: rows
                    .into_iter()
                    .map(|r| r.into_iter().map(Into::into).collect())
                    .collect(),
                header,
            },
        }
    }

    /// Table from an HTML fragment
    #[must_use = "creates a table fragment"]
    pub fn from_html(caption: Option<&str>, html: impl Into<String>) -> Self {
        Self {
            caption: caption.map(str::to_string),
            content: TableContent::Html(html.into()),
        }
    }

    /// Whether the fragment has nothing to insert
    #[must_use = "checks whether the fragment is empty"]
    pub fn is_empty(&self) -> bool {
        match &self.content {
            TableContent::Rows { rows, .. } => rows.iter().all(Vec::is_empty),
            TableContent::Html(html) => html.trim().is_empty(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableRepr {
    Rows(Vec<Vec<Value>>),
    Object(TableObject),
}

#[derive(Deserialize)]
struct TableObject {
    #[serde(default, alias = "info")]
    caption: Option<String>,
    #[serde(default)]
    rows: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    header: bool,
    #[serde(default, alias = "content")]
    html: Option<String>,
}

impl TryFrom<TableRepr> for TableFragment {
    type Error = String;

    fn try_from(repr: TableRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            TableRepr::Rows(rows) => Ok(Self {
                caption: None,
                content: TableContent::Rows {
                    rows: cell_rows(rows)?,
                    header: false,
                },
            }),
            TableRepr::Object(obj) => {
                let content = match (obj.rows, obj.html) {
                    (Some(rows), _) => TableContent::Rows {
                        rows: cell_rows(rows)?,
                        header: obj.header,
                    },
                    (None, Some(html)) => TableContent::Html(html),
                    (None, None) => TableContent::Rows {
                        rows: Vec::new(),
                        header: obj.header,
                    },
                };
                Ok(Self {
                    caption: obj.caption.filter(|c| !c.trim().is_empty()),
                    content,
                })
            }
        }
    }
}

fn cell_rows(rows: Vec<Vec<Value>>) -> std::result::Result<Vec<Vec<String>>, String> {
    rows.into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

fn cell_text(value: Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("table cell must be text, got {other}")),
    }
}

/// Where a figure's image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FigureSource {
    /// Raw image bytes
    Bytes(Vec<u8>),
    /// Image file on disk
    Path(PathBuf),
    /// Base64 image data without a URI prefix
    Base64(String),
    /// `data:image/...;base64,...` URI
    DataUri(String),
    /// HTML containing one or more `<img src="data:...">` tags
    Html(String),
}

/// One figure of the payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "FigureObject")]
pub struct FigureFragment {
    /// Caption text following `Figure N:`
    pub caption: Option<String>,
    /// Image source; `None` when the fragment carried no image
    pub source: Option<FigureSource>,
    /// Ordering index; figures without one follow the indexed figures
    pub order: Option<i64>,
}

impl FigureFragment {
    /// Figure with a caption and source
    #[must_use = "creates a figure fragment"]
    pub fn new(caption: Option<&str>, source: FigureSource) -> Self {
        Self {
            caption: caption.map(str::to_string),
            source: Some(source),
            order: None,
        }
    }

    /// Builder: ordering index
    #[must_use = "returns the fragment with an ordering index"]
    pub const fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

#[derive(Deserialize)]
struct FigureObject {
    #[serde(default, alias = "info")]
    caption: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default, alias = "index")]
    order: Option<i64>,
}

impl From<FigureObject> for FigureFragment {
    fn from(obj: FigureObject) -> Self {
        let source = if let Some(data) = obj.data.filter(|d| !d.trim().is_empty()) {
            Some(FigureSource::Base64(data))
        } else if let Some(path) = obj.path {
            Some(FigureSource::Path(path))
        } else {
            obj.content
                .filter(|c| !c.trim().is_empty())
                .map(|content| {
                    if content.trim_start().starts_with("data:") {
                        FigureSource::DataUri(content.trim().to_string())
                    } else {
                        FigureSource::Html(content)
                    }
                })
        };
        Self {
            caption: obj.caption.filter(|c| !c.trim().is_empty()),
            source,
            order: obj.order,
        }
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(de::Error::custom(format!("expected text, got {other}"))),
    }
}

fn text_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(if s.trim().is_empty() { Vec::new() } else { vec![s] }),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Null => Ok(String::new()),
                other => Err(de::Error::custom(format!("expected text list item, got {other}"))),
            })
            .collect(),
        Some(other) => Err(de::Error::custom(format!("expected text or list, got {other}"))),
    }
}

fn fragments<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl std::str::FromStr for ManuscriptRequest {
    type Err = ManudocError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json(s)
    }
}
