//! Table merge unit
//!
//! Turns table fragments into native `w:tbl` elements. Each table is preceded
//! by a `Table N:` caption paragraph and followed by an empty spacing
//! paragraph. HTML tables are laid out on a grid first so that `rowspan` and
//! `colspan` map onto `w:vMerge` and `w:gridSpan`.

use crate::config::GeneratorConfig;
use crate::error::Warning;
use crate::formatting::{apply_text_rules, apply_text_rules_to_runs, content_lines};
use crate::payload::{TableContent, TableFragment};
use crate::style::{
    caption_paragraph, paragraph, set_property, Alignment, ParagraphFormat, RunStyle, StyledRun,
    CELL_PROPERTY_ORDER,
};
use crate::xml::{XmlElement, XmlNode};
use scraper::{ElementRef, Html, Selector};

/// Upper bound on `rowspan`/`colspan` values taken from HTML
const MAX_SPAN: usize = 1000;

/// Text of one table cell: paragraphs of styled runs
type CellContent = Vec<Vec<StyledRun>>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceCell {
    content: CellContent,
    colspan: usize,
    rowspan: usize,
}

/// One position of the laid-out grid
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    /// Top-left position of a cell
    Origin {
        content: CellContent,
        colspan: usize,
        /// Cell spans more than one row
        merged: bool,
    },
    /// Continuation row of a vertically merged cell, at its first column
    Continue { colspan: usize },
    /// Covered by the cell to the left
    Covered,
}

/// A table laid out on a rectangular grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TableGrid {
    rows: Vec<Vec<Option<Slot>>>,
    columns: usize,
    header_rows: usize,
}

impl TableGrid {
    fn from_rows(rows: Vec<Vec<SourceCell>>, header_rows: usize) -> Self {
        let mut grid = Self {
            header_rows,
            ..Self::default()
        };
        for (r, cells) in rows.into_iter().enumerate() {
            grid.ensure_row(r);
            let mut c = 0;
            for cell in cells {
                while grid.rows[r].get(c).is_some_and(Option::is_some) {
                    c += 1;
                }
                grid.place(r, c, cell);
                c += 1;
            }
        }
        grid.columns = grid.rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut grid.rows {
            row.resize(grid.columns, None);
        }
        grid
    }

    fn ensure_row(&mut self, r: usize) {
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
    }

    fn set(&mut self, r: usize, c: usize, slot: Slot) {
        self.ensure_row(r);
        let row = &mut self.rows[r];
        if row.len() <= c {
            row.resize(c + 1, None);
        }
        if row[c].is_none() {
            row[c] = Some(slot);
        }
    }

    fn place(&mut self, r: usize, c: usize, cell: SourceCell) {
        let SourceCell {
            content,
            colspan,
            rowspan,
        } = cell;
        self.set(
            r,
            c,
            Slot::Origin {
                content,
                colspan,
                merged: rowspan > 1,
            },
        );
        for cc in c + 1..c + colspan {
            self.set(r, cc, Slot::Covered);
        }
        for rr in r + 1..r + rowspan {
            self.set(rr, c, Slot::Continue { colspan });
            for cc in c + 1..c + colspan {
                self.set(rr, cc, Slot::Covered);
            }
        }
    }
}

/// Builds table content for the `{{tables}}` location
#[derive(Debug, Clone, Copy)]
pub struct TableMergeUnit<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> TableMergeUnit<'a> {
    /// Merge unit using the given configuration
    #[inline]
    #[must_use = "creates a table merge unit"]
    pub const fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    /// Body elements for all fragments, in submission order
    ///
    /// Fragments without content are skipped and do not consume a table
    /// number. HTML without a parsable `<table>` is inserted as text and
    /// reported in `warnings`.
    #[must_use = "returns the table elements"]
    pub fn build(&self, fragments: &[TableFragment], warnings: &mut Vec<Warning>) -> Vec<XmlElement> {
        let mut out = Vec::new();
        let mut number = 0;
        for fragment in fragments {
            if fragment.is_empty() {
                log::debug!("Skipping empty table fragment");
                continue;
            }
            number += 1;
            out.push(self.caption(number, fragment.caption.as_deref()));

            match &fragment.content {
                TableContent::Rows { rows, header } => {
                    let cells = rows
                        .iter()
                        .map(|row| row.iter().map(|text| text_cell(text)).collect())
                        .collect();
                    let grid = TableGrid::from_rows(cells, usize::from(*header));
                    out.push(self.table(&grid));
                }
                TableContent::Html(html) => match parse_html_table(html) {
                    Some(grid) => out.push(self.table(&grid)),
                    None => {
                        log::warn!("Table {number} has no parsable <table>, inserting as text");
                        warnings.push(Warning::TableFallback {
                            index: number,
                            reason: "no <table> element found".to_string(),
                        });
                        out.extend(fallback_paragraphs(html));
                    }
                },
            }

            out.push(XmlElement::new("w:p"));
        }
        log::debug!("Built {number} tables");
        out
    }

    fn caption(&self, number: usize, caption: Option<&str>) -> XmlElement {
        let format = ParagraphFormat::default()
            .styled(&self.config.caption_style)
            .spaced(6, 6);
        caption_paragraph(&format!("Table {number}"), caption, &format)
    }

    fn table(&self, grid: &TableGrid) -> XmlElement {
        let columns = grid.columns.max(1);
        let col_width = self.config.text_width_twips() / u32::try_from(columns).unwrap_or(u32::MAX);

        let mut tbl = XmlElement::new("w:tbl").with_child(self.table_properties());
        let mut tbl_grid = XmlElement::new("w:tblGrid");
        for _ in 0..columns {
            tbl_grid = tbl_grid.with_child(XmlElement::new("w:gridCol").with_attr("w:w", col_width.to_string()));
        }
        tbl.children.push(XmlNode::Element(tbl_grid));

        for (r, row) in grid.rows.iter().enumerate() {
            let header = r < grid.header_rows;
            let mut tr = XmlElement::new("w:tr");
            if header {
                tr = tr.with_child(XmlElement::new("w:trPr").with_child(XmlElement::new("w:tblHeader")));
            }
            for slot in row {
                let tc = match slot {
                    Some(Slot::Origin {
                        content,
                        colspan,
                        merged,
                    }) => table_cell(content, *colspan, merged.then_some("restart"), header, col_width),
                    Some(Slot::Continue { colspan }) => {
                        table_cell(&Vec::new(), *colspan, Some("continue"), header, col_width)
                    }
                    Some(Slot::Covered) => continue,
                    None => table_cell(&Vec::new(), 1, None, header, col_width),
                };
                tr.children.push(XmlNode::Element(tc));
            }
            tbl.children.push(XmlNode::Element(tr));
        }
        tbl
    }

    fn table_properties(&self) -> XmlElement {
        let mut tbl_pr = XmlElement::new("w:tblPr")
            .with_child(XmlElement::new("w:tblStyle").with_attr("w:val", self.config.table_style.as_str()))
            .with_child(XmlElement::new("w:tblW").with_attr("w:w", "5000").with_attr("w:type", "pct"))
            .with_child(XmlElement::new("w:jc").with_attr("w:val", "center"));
        if self.config.table_borders {
            let mut borders = XmlElement::new("w:tblBorders");
            for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
                borders = borders.with_child(
                    XmlElement::new(side)
                        .with_attr("w:val", "single")
                        .with_attr("w:sz", "4")
                        .with_attr("w:space", "0")
                        .with_attr("w:color", "auto"),
                );
            }
            tbl_pr = tbl_pr.with_child(borders);
        }
        tbl_pr.with_child(
            XmlElement::new("w:tblLook")
                .with_attr("w:val", "04A0")
                .with_attr("w:firstRow", "1")
                .with_attr("w:lastRow", "0")
                .with_attr("w:firstColumn", "1")
                .with_attr("w:lastColumn", "0")
                .with_attr("w:noHBand", "0")
                .with_attr("w:noVBand", "1"),
        )
    }
}

fn table_cell(content: &CellContent, colspan: usize, vmerge: Option<&str>, header: bool, col_width: u32) -> XmlElement {
    let span = u32::try_from(colspan).unwrap_or(1);
    let mut tc_pr = XmlElement::new("w:tcPr");
    set_property(
        &mut tc_pr,
        XmlElement::new("w:tcW")
            .with_attr("w:w", col_width.saturating_mul(span).to_string())
            .with_attr("w:type", "dxa"),
        CELL_PROPERTY_ORDER,
    );
    if colspan > 1 {
        set_property(
            &mut tc_pr,
            XmlElement::new("w:gridSpan").with_attr("w:val", colspan.to_string()),
            CELL_PROPERTY_ORDER,
        );
    }
    if let Some(vmerge) = vmerge {
        set_property(
            &mut tc_pr,
            XmlElement::new("w:vMerge").with_attr("w:val", vmerge),
            CELL_PROPERTY_ORDER,
        );
    }
    set_property(
        &mut tc_pr,
        XmlElement::new("w:vAlign").with_attr("w:val", "center"),
        CELL_PROPERTY_ORDER,
    );

    let format = ParagraphFormat::default().aligned(Alignment::Center);
    let mut tc = XmlElement::new("w:tc").with_child(tc_pr);
    for runs in content {
        let runs = apply_text_rules_to_runs(runs);
        let runs: Vec<StyledRun> = if header {
            runs.into_iter()
                .map(|mut r| {
                    r.style.bold = true;
                    r
                })
                .collect()
        } else {
            runs
        };
        tc.children.push(XmlNode::Element(paragraph(&runs, &format)));
    }
    if !tc.children.iter().any(|c| c.is_element("w:p")) {
        tc.children.push(XmlNode::Element(paragraph(&[], &format)));
    }
    tc
}

fn text_cell(text: &str) -> SourceCell {
    SourceCell {
        content: text
            .lines()
            .map(|line| vec![StyledRun::plain(line)])
            .collect(),
        colspan: 1,
        rowspan: 1,
    }
}

/// Lay out the first `<table>` of an HTML fragment; the first row is the header
fn parse_html_table(html: &str) -> Option<TableGrid> {
    let document = Html::parse_fragment(html);
    let selector = Selector::parse("table").ok()?;
    let table = document.select(&selector).next()?;

    let rows: Vec<Vec<SourceCell>> = direct_rows(table)
        .into_iter()
        .map(|row| {
            direct_cells(row)
                .into_iter()
                .map(|cell| {
                    let (colspan, rowspan) = cell_spans(cell);
                    SourceCell {
                        content: cell_content(cell),
                        colspan,
                        rowspan,
                    }
                })
                .collect()
        })
        .collect();

    if rows.iter().all(Vec::is_empty) {
        return None;
    }
    Some(TableGrid::from_rows(rows, 1))
}

/// `<tr>` children of a table, directly or inside `thead`/`tbody`/`tfoot`
pub(crate) fn direct_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(
                    child
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter(|e| e.value().name() == "tr"),
                );
            }
            _ => {}
        }
    }
    rows
}

pub(crate) fn direct_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
        .collect()
}

fn cell_spans(cell: ElementRef<'_>) -> (usize, usize) {
    let span = |name: &str| {
        cell.value()
            .attr(name)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map_or(1, |n| n.clamp(1, MAX_SPAN))
    };
    (span("colspan"), span("rowspan"))
}

fn cell_content(cell: ElementRef<'_>) -> CellContent {
    let mut paragraphs: CellContent = vec![Vec::new()];
    collect_runs(cell, &RunStyle::plain(), &mut paragraphs);
    paragraphs.retain(|p| p.iter().any(|r| !r.text.trim().is_empty()));
    paragraphs
}

fn collect_runs(element: ElementRef<'_>, style: &RunStyle, paragraphs: &mut CellContent) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let text = collapse_html_whitespace(text);
            if let Some(current) = paragraphs.last_mut() {
                if !text.is_empty() {
                    current.push(StyledRun::new(text, style.clone()));
                }
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            match name {
                "br" => paragraphs.push(Vec::new()),
                "p" | "div" | "li" => {
                    paragraphs.push(Vec::new());
                    collect_runs(child_element, style, paragraphs);
                    paragraphs.push(Vec::new());
                }
                _ => {
                    let mut inner = style.clone();
                    match name {
                        "b" | "strong" => inner.bold = true,
                        "i" | "em" => inner.italic = true,
                        "u" => inner.underline = true,
                        "sup" => inner.superscript = true,
                        "sub" => inner.subscript = true,
                        _ => {}
                    }
                    collect_runs(child_element, &inner, paragraphs);
                }
            }
        }
    }
}

/// Collapse whitespace runs to one space, keeping a single space at either
/// end when the source had one
fn collapse_html_whitespace(raw: &str) -> String {
    let words = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if words.is_empty() {
        return if raw.is_empty() { String::new() } else { " ".to_string() };
    }
    let lead = if raw.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if raw.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{words}{trail}")
}

fn fallback_paragraphs(html: &str) -> Vec<XmlElement> {
    let document = Html::parse_fragment(html);
    let text: String = document.root_element().text().collect::<Vec<_>>().join("\n");
    let format = ParagraphFormat::default();
    content_lines(&text)
        .into_iter()
        .map(|line| paragraph(&[StyledRun::plain(apply_text_rules(&line))], &format))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(fragments: &[TableFragment]) -> (Vec<XmlElement>, Vec<Warning>) {
        let config = GeneratorConfig::default();
        let mut warnings = Vec::new();
        let out = TableMergeUnit::new(&config).build(fragments, &mut warnings);
        (out, warnings)
    }

    fn rows_text(tbl: &XmlElement) -> Vec<Vec<String>> {
        tbl.elements()
            .filter(|e| e.is("w:tr"))
            .map(|tr| tr.elements().filter(|e| e.is("w:tc")).map(XmlElement::text_content).collect())
            .collect()
    }

    #[test]
    fn test_rows_table_layout() {
        let fragment = TableFragment::from_rows(Some("Baseline"), [["A", "B"], ["C", "D"]], true);
        let (out, warnings) = build(&[fragment]);
        assert!(warnings.is_empty());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].text_content(), "Table 1: Baseline");
        assert!(out[1].is("w:tbl"));
        assert!(out[2].is("w:p"));
        assert_eq!(rows_text(&out[1]), vec![vec!["A", "B"], vec!["C", "D"]]);

        let first_row = out[1].elements().find(|e| e.is("w:tr")).unwrap();
        assert!(first_row.child("w:trPr").unwrap().child("w:tblHeader").is_some());
        let grid = out[1].child("w:tblGrid").unwrap();
        assert_eq!(grid.elements().count(), 2);
        assert_eq!(grid.elements().next().unwrap().attr("w:w"), Some("4680"));
    }

    #[test]
    fn test_html_spans() {
        let html = r#"<table>
            <thead><tr><th rowspan="2">Group</th><th colspan="2">Score</th></tr></thead>
            <tbody><tr><td>pre</td><td>post</td></tr>
            <tr><td>A</td><td>1</td><td>2</td></tr></tbody>
        </table>"#;
        let (out, _) = build(&[TableFragment::from_html(None, html)]);
        let tbl = &out[1];
        let rows: Vec<&XmlElement> = tbl.elements().filter(|e| e.is("w:tr")).collect();
        assert_eq!(rows.len(), 3);

        let first: Vec<&XmlElement> = rows[0].elements().filter(|e| e.is("w:tc")).collect();
        assert_eq!(first.len(), 2);
        let tc_pr = first[0].child("w:tcPr").unwrap();
        assert_eq!(tc_pr.child("w:vMerge").unwrap().attr("w:val"), Some("restart"));
        let tc_pr = first[1].child("w:tcPr").unwrap();
        assert_eq!(tc_pr.child("w:gridSpan").unwrap().attr("w:val"), Some("2"));

        let second: Vec<&XmlElement> = rows[1].elements().filter(|e| e.is("w:tc")).collect();
        assert_eq!(second.len(), 3);
        assert_eq!(
            second[0].child("w:tcPr").unwrap().child("w:vMerge").unwrap().attr("w:val"),
            Some("continue")
        );
        assert_eq!(second[1].text_content(), "pre");
        assert_eq!(rows_text(tbl)[2], vec!["A", "1", "2"]);
    }

    #[test]
    fn test_html_inline_markup_and_rules() {
        let html = "<table><tr><td>h</td></tr><tr><td><b>mean</b> (n=4)<br>12%</td></tr></table>";
        let (out, _) = build(&[TableFragment::from_html(Some("x"), html)]);
        let rows: Vec<&XmlElement> = out[1].elements().filter(|e| e.is("w:tr")).collect();
        let tc = rows[1].elements().find(|e| e.is("w:tc")).unwrap();
        let paragraphs: Vec<String> = tc.elements().filter(|e| e.is("w:p")).map(XmlElement::text_content).collect();
        assert_eq!(paragraphs, vec!["mean [n = 4]", "12.0%"]);
        let first_run = tc.elements().find(|e| e.is("w:p")).unwrap().elements().find(|e| e.is("w:r")).unwrap();
        assert!(first_run.child("w:rPr").unwrap().child("w:b").is_some());
    }

    #[test]
    fn test_ragged_rows_padded() {
        let fragment = TableFragment::from_rows(None, vec![vec!["a", "b", "c"], vec!["d"]], false);
        let (out, _) = build(&[fragment]);
        let rows: Vec<&XmlElement> = out[1].elements().filter(|e| e.is("w:tr")).collect();
        let cells: Vec<&XmlElement> = rows[1].elements().filter(|e| e.is("w:tc")).collect();
        assert_eq!(cells.len(), 3);
        assert!(cells[2].child("w:p").is_some());
    }

    #[test]
    fn test_html_without_table_falls_back() {
        let (out, warnings) = build(&[TableFragment::from_html(Some("Notes"), "<p>just text</p>")]);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], Warning::TableFallback { index: 1, .. }));
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].text_content(), "just text");
    }

    #[test]
    fn test_empty_fragments_skipped_without_numbering() {
        let empty = TableFragment::from_rows(Some("none"), Vec::<Vec<String>>::new(), false);
        let real = TableFragment::from_rows(Some("real"), [["1"]], false);
        let (out, _) = build(&[empty, real]);
        assert_eq!(out[0].text_content(), "Table 1: real");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_no_fragments_no_output() {
        let (out, warnings) = build(&[]);
        assert!(out.is_empty());
        assert!(warnings.is_empty());
    }
}
