//! Document processor: placeholder substitution over the story parts
//!
//! Substitution works on the direct runs of each paragraph. Tokens that Word
//! split over several runs are first moved into the run where they start, so
//! the inserted text inherits that run's properties. Block and structural
//! values split the paragraph around the token.
//!
//! Every token is checked before anything is written: a token without a value,
//! or one that sits where substitution cannot reach it (inside a hyperlink or a
//! tracked change, for example), fails the whole run with `Template`. So does
//! a token that a payload value carried into the filled parts.

use crate::config::GeneratorConfig;
use crate::error::{ManudocError, Result, Warning};
use crate::figures::{ensure_namespaces, DrawingIds, FigureMergeUnit};
use crate::mapper::{BlockParagraph, PlaceholderMap, PlaceholderValue};
use crate::package::{DocxPackage, DOCUMENT_PART};
use crate::placeholder::find_tokens;
use crate::style::{append_text, paragraph_properties_mut, set_property, StyledRun};
use crate::tables::TableMergeUnit;
use crate::xml::{XmlDocument, XmlElement, XmlNode};
use once_cell::sync::Lazy;
use regex::Regex;

static STORY_PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/(document|header\d*|footer\d*)\.xml$").expect("valid story part regex"));

/// Subtrees whose text is not part of the paragraph's own text
const FOREIGN_TEXT: &[&str] = &["w:txbxContent", "w:delText"];

/// Paragraph-level elements that carry no visible content
const MARKERS: &[&str] = &[
    "w:proofErr",
    "w:bookmarkStart",
    "w:bookmarkEnd",
    "w:permStart",
    "w:permEnd",
    "w:commentRangeStart",
    "w:commentRangeEnd",
];

/// Whether a package part holds document text that is searched for placeholders
#[must_use = "checks whether the part is a story part"]
pub fn is_story_part(name: &str) -> bool {
    STORY_PART_RE.is_match(name)
}

/// Placeholder names in the order they appear under `root`
#[must_use = "returns the placeholder names found"]
pub fn scan_tokens(root: &XmlElement) -> Vec<String> {
    let mut names = Vec::new();
    root.walk(&mut |e| {
        if e.is("w:p") {
            names.extend(find_tokens(&paragraph_text(e)).into_iter().map(|t| t.name));
        }
    });
    names
}

/// Text of a paragraph, excluding text boxes and deleted text
fn paragraph_text(paragraph: &XmlElement) -> String {
    fn collect(e: &XmlElement, out: &mut String) {
        for child in &e.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(c) if !FOREIGN_TEXT.contains(&c.name.as_str()) => collect(c, out),
                _ => {}
            }
        }
    }
    let mut out = String::new();
    collect(paragraph, &mut out);
    out
}

fn is_text_child(e: &XmlElement) -> bool {
    match e.name.as_str() {
        "w:t" | "w:tab" | "w:cr" => true,
        "w:br" => e.attr("w:type").map_or(true, |t| t == "textWrapping"),
        _ => false,
    }
}

/// Text carried by a run: `w:t` content, tabs as `\t`, line breaks as `\n`
fn run_text(run: &XmlElement) -> String {
    let mut out = String::new();
    for child in run.elements().filter(|c| is_text_child(c)) {
        match child.name.as_str() {
            "w:t" => out.push_str(&child.text_content()),
            "w:tab" => out.push('\t'),
            _ => out.push('\n'),
        }
    }
    out
}

/// Replace the text of a run, keeping its other children in place
fn set_run_text(run: &mut XmlElement, text: &str) {
    let position = run
        .children
        .iter()
        .position(|c| c.as_element().is_some_and(is_text_child));
    run.children.retain(|c| !c.as_element().is_some_and(is_text_child));
    let mut fresh = XmlElement::new("w:r");
    append_text(&mut fresh, text);
    let at = position.unwrap_or(run.children.len()).min(run.children.len());
    run.children.splice(at..at, fresh.children);
}

/// Move every token that spans several direct runs into the run where it starts
fn consolidate_tokens(paragraph: &mut XmlElement) {
    let run_indices: Vec<usize> = paragraph
        .children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_element("w:r"))
        .map(|(i, _)| i)
        .collect();
    let mut texts: Vec<String> = run_indices
        .iter()
        .filter_map(|&i| paragraph.children[i].as_element().map(run_text))
        .collect();
    let full: String = texts.concat();
    let tokens = find_tokens(&full);
    if tokens.is_empty() {
        return;
    }

    let mut changed = vec![false; texts.len()];
    for token in tokens {
        let mut offsets = Vec::with_capacity(texts.len());
        let mut offset = 0;
        for text in &texts {
            offsets.push(offset);
            offset += text.len();
        }
        let locate = |pos: usize| {
            (0..texts.len()).find(|&k| offsets[k] <= pos && pos < offsets[k] + texts[k].len())
        };
        let (Some(first), Some(last)) = (locate(token.range.start), locate(token.range.end - 1)) else {
            continue;
        };
        if first == last {
            continue;
        }

        let mut moved = String::new();
        for k in first + 1..=last {
            let take = (token.range.end - offsets[k]).min(texts[k].len());
            moved.push_str(&texts[k][..take]);
            texts[k] = texts[k][take..].to_string();
            changed[k] = true;
        }
        texts[first].push_str(&moved);
        changed[first] = true;
    }

    for (k, &idx) in run_indices.iter().enumerate() {
        if changed[k] {
            if let Some(run) = paragraph.children[idx].as_element_mut() {
                set_run_text(run, &texts[k]);
            }
        }
    }
}

/// Piece of a paragraph after substitution
enum Piece<'v> {
    /// Content kept or inserted in the paragraph
    Node(XmlNode),
    /// Block or structural value splitting the paragraph
    Split {
        value: &'v PlaceholderValue,
        base_rpr: Option<XmlElement>,
    },
}

/// Per-part processing state
struct StoryContext<'p> {
    part: String,
    is_main: bool,
    package: &'p mut DocxPackage,
    ids: &'p mut DrawingIds,
    warnings: &'p mut Vec<Warning>,
    unresolved: Vec<String>,
    used_drawings: bool,
}

/// Substitutes placeholder values into a template package
#[derive(Debug, Clone, Copy)]
pub struct DocumentProcessor<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> DocumentProcessor<'a> {
    /// Processor using the given configuration
    #[inline]
    #[must_use = "creates a document processor"]
    pub const fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    /// Substitute every placeholder in every story part of `package`
    ///
    /// Returns the non-fatal warnings raised by the merge units.
    ///
    /// # Errors
    ///
    /// Returns `Template` listing unresolved placeholders, `Figure` in strict
    /// mode, or an XML/package error if a part is malformed.
    pub fn process(&self, package: &mut DocxPackage, values: &PlaceholderMap) -> Result<Vec<Warning>> {
        let parts: Vec<String> = package
            .part_names()
            .filter(|name| is_story_part(name))
            .map(str::to_string)
            .collect();

        let mut docs: Vec<(String, XmlDocument)> = Vec::with_capacity(parts.len());
        for part in parts {
            let doc = package.xml_part(&part)?;
            docs.push((part, doc));
        }

        let mut ids = docs
            .iter()
            .map(|(_, doc)| DrawingIds::after_existing(&doc.root))
            .max()
            .unwrap_or_default();

        let mut warnings = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();
        for (part, doc) in &mut docs {
            log::debug!("Processing {part}");
            let mut ctx = StoryContext {
                part: part.clone(),
                is_main: part.as_str() == DOCUMENT_PART,
                package: &mut *package,
                ids: &mut ids,
                warnings: &mut warnings,
                unresolved: Vec::new(),
                used_drawings: false,
            };
            self.process_container(&mut doc.root, values, &mut ctx)?;
            if ctx.used_drawings {
                ensure_namespaces(&mut doc.root);
            }
            for name in ctx.unresolved {
                if !unresolved.contains(&name) {
                    unresolved.push(name);
                }
            }
            fix_table_cells(&mut doc.root);
        }

        if !unresolved.is_empty() {
            return Err(ManudocError::Template(unresolved));
        }

        let mut inserted: Vec<String> = Vec::new();
        for (part, doc) in &docs {
            for name in scan_tokens(&doc.root) {
                log::debug!("Placeholder {{{{{name}}}}} left in {part} after substitution");
                let entry = format!("{name} (inserted by a payload value)");
                if !inserted.contains(&entry) {
                    inserted.push(entry);
                }
            }
        }
        if !inserted.is_empty() {
            return Err(ManudocError::Template(inserted));
        }

        for (part, doc) in &docs {
            package.set_xml_part(part.as_str(), doc)?;
        }
        Ok(warnings)
    }

    fn process_container<'v>(
        &self,
        container: &mut XmlElement,
        values: &'v PlaceholderMap,
        ctx: &mut StoryContext<'_>,
    ) -> Result<()> {
        let children = std::mem::take(&mut container.children);
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            match child {
                XmlNode::Element(p) if p.is("w:p") => {
                    out.extend(self.process_paragraph(p, values, ctx)?.into_iter().map(XmlNode::Element));
                }
                XmlNode::Element(mut e) => {
                    self.process_container(&mut e, values, ctx)?;
                    out.push(XmlNode::Element(e));
                }
                other => out.push(other),
            }
        }
        container.children = out;
        Ok(())
    }

    fn process_textboxes<'v>(
        &self,
        element: &mut XmlElement,
        values: &'v PlaceholderMap,
        ctx: &mut StoryContext<'_>,
    ) -> Result<()> {
        for child in element.elements_mut() {
            if child.is("w:txbxContent") {
                self.process_container(child, values, ctx)?;
            } else {
                self.process_textboxes(child, values, ctx)?;
            }
        }
        Ok(())
    }

    fn process_paragraph<'v>(
        &self,
        mut paragraph: XmlElement,
        values: &'v PlaceholderMap,
        ctx: &mut StoryContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        let mut visible: Vec<String> = find_tokens(&paragraph_text(&paragraph))
            .into_iter()
            .map(|t| t.name)
            .collect();
        self.process_textboxes(&mut paragraph, values, ctx)?;

        consolidate_tokens(&mut paragraph);
        let reachable: Vec<String> = paragraph
            .elements()
            .filter(|e| e.is("w:r"))
            .flat_map(|r| find_tokens(&run_text(r)))
            .map(|t| t.name)
            .collect();
        for name in &reachable {
            if let Some(pos) = visible.iter().position(|v| v == name) {
                visible.remove(pos);
            }
        }
        for name in visible {
            log::debug!("Placeholder {{{{{name}}}}} is outside a direct run");
            ctx.unresolved.push(name);
        }
        if reachable.is_empty() {
            return Ok(vec![paragraph]);
        }

        let attributes: Vec<(String, String)> = paragraph
            .attributes
            .iter()
            .filter(|(k, _)| k != "w14:paraId" && k != "w14:textId")
            .cloned()
            .collect();
        let mut children = std::mem::take(&mut paragraph.children);
        let ppr = children
            .iter()
            .position(|c| c.is_element("w:pPr"))
            .and_then(|i| match children.remove(i) {
                XmlNode::Element(e) => Some(e),
                _ => None,
            });

        let mut pieces = Vec::new();
        for child in children {
            match child {
                XmlNode::Element(run) if run.is("w:r") && !find_tokens(&run_text(&run)).is_empty() => {
                    self.split_run(run, values, ctx, &mut pieces);
                }
                other => pieces.push(Piece::Node(other)),
            }
        }

        if !pieces.iter().any(|p| matches!(p, Piece::Split { .. })) {
            let mut rebuilt = XmlElement::new("w:p");
            rebuilt.attributes = paragraph.attributes;
            if let Some(ppr) = ppr {
                rebuilt.children.push(XmlNode::Element(ppr));
            }
            rebuilt.children.extend(pieces.into_iter().filter_map(|p| match p {
                Piece::Node(n) => Some(n),
                Piece::Split { .. } => None,
            }));
            return Ok(vec![rebuilt]);
        }

        self.assemble(Assembler { attributes, ppr }, pieces, ctx)
    }

    /// Substitute the tokens of one run, emitting the resulting pieces
    fn split_run<'v>(
        &self,
        run: XmlElement,
        values: &'v PlaceholderMap,
        ctx: &mut StoryContext<'_>,
        pieces: &mut Vec<Piece<'v>>,
    ) {
        let text = run_text(&run);
        let base_rpr = run.child("w:rPr").cloned();
        let mut extras: Vec<XmlNode> = run
            .children
            .into_iter()
            .filter(|c| !c.is_element("w:rPr") && !c.as_element().is_some_and(is_text_child))
            .collect();

        let emit_text = |pieces: &mut Vec<Piece<'v>>, fragment: &str, extras: &mut Vec<XmlNode>| {
            if fragment.is_empty() && extras.is_empty() {
                return;
            }
            let mut r = XmlElement::new("w:r");
            if let Some(rpr) = &base_rpr {
                r.children.push(XmlNode::Element(rpr.clone()));
            }
            r.children.append(extras);
            append_text(&mut r, fragment);
            pieces.push(Piece::Node(XmlNode::Element(r)));
        };

        let mut pos = 0;
        for token in find_tokens(&text) {
            let value = match values.get(&token.name) {
                None => {
                    ctx.unresolved.push(token.name);
                    continue;
                }
                Some(PlaceholderValue::Tables(_) | PlaceholderValue::Figures(_)) if !ctx.is_main => {
                    log::debug!("Structural placeholder {} found in {}", token.name, ctx.part);
                    ctx.unresolved.push(format!("{} (only allowed in the document body)", token.name));
                    continue;
                }
                Some(v) => v,
            };

            emit_text(pieces, &text[pos..token.range.start], &mut extras);
            pos = token.range.end;
            match value {
                PlaceholderValue::Inline(runs) => {
                    pieces.extend(
                        runs.iter()
                            .filter(|r| !r.text.is_empty())
                            .map(|r| Piece::Node(XmlNode::Element(r.to_element(base_rpr.as_ref())))),
                    );
                }
                PlaceholderValue::Block(paragraphs) if paragraphs.is_empty() => {}
                _ => pieces.push(Piece::Split {
                    value,
                    base_rpr: base_rpr.clone(),
                }),
            }
        }
        emit_text(pieces, &text[pos..], &mut extras);
    }

    /// Rebuild the paragraph sequence around block and structural values
    fn assemble(&self, asm: Assembler, pieces: Vec<Piece<'_>>, ctx: &mut StoryContext<'_>) -> Result<Vec<XmlElement>> {
        let mut out: Vec<XmlElement> = Vec::new();
        let mut carry: Vec<XmlNode> = Vec::new();
        let mut carry_format: Option<&BlockParagraph> = None;

        for piece in pieces {
            match piece {
                Piece::Node(node) => carry.push(node),
                Piece::Split { value, base_rpr } => match value {
                    PlaceholderValue::Block(paragraphs) => {
                        for (i, block) in paragraphs.iter().enumerate() {
                            if i > 0 {
                                out.push(asm.paragraph(carry_format, std::mem::take(&mut carry)));
                            }
                            carry.extend(block_runs(&block.runs, base_rpr.as_ref()));
                            carry_format = Some(block);
                        }
                    }
                    PlaceholderValue::Tables(fragments) => {
                        if has_content(&carry) {
                            out.push(asm.paragraph(carry_format, std::mem::take(&mut carry)));
                        }
                        carry.clear();
                        carry_format = None;
                        out.extend(TableMergeUnit::new(self.config).build(fragments, ctx.warnings));
                    }
                    PlaceholderValue::Figures(fragments) => {
                        if has_content(&carry) {
                            out.push(asm.paragraph(carry_format, std::mem::take(&mut carry)));
                        }
                        carry.clear();
                        carry_format = None;
                        let figures = FigureMergeUnit::new(self.config).build(
                            ctx.package,
                            &ctx.part,
                            fragments,
                            ctx.ids,
                            ctx.warnings,
                        )?;
                        ctx.used_drawings |= !figures.is_empty();
                        out.extend(figures);
                    }
                    PlaceholderValue::Inline(_) => {}
                },
            }
        }
        if has_content(&carry) || carry_format.is_some() {
            out.push(asm.paragraph(carry_format, carry));
        }

        asm.restore_section_break(&mut out);
        Ok(out)
    }
}

/// Builds paragraphs that share the properties of a split paragraph
struct Assembler {
    attributes: Vec<(String, String)>,
    ppr: Option<XmlElement>,
}

impl Assembler {
    fn paragraph(&self, block: Option<&BlockParagraph>, nodes: Vec<XmlNode>) -> XmlElement {
        let mut p = XmlElement::new("w:p");
        p.attributes = self.attributes.clone();
        let mut ppr = self.ppr.clone().unwrap_or_else(|| XmlElement::new("w:pPr"));
        ppr.remove_children("w:sectPr");
        if let Some(block) = block {
            block.format.apply_to(&mut ppr);
        }
        if !ppr.children.is_empty() {
            p.children.push(XmlNode::Element(ppr));
        }
        p.children.extend(nodes);
        p
    }

    /// A section break on the split paragraph stays with the last paragraph
    fn restore_section_break(&self, out: &mut Vec<XmlElement>) {
        let Some(sect_pr) = self.ppr.as_ref().and_then(|p| p.child("w:sectPr")).cloned() else {
            return;
        };
        if !out.last().is_some_and(|e| e.is("w:p")) {
            out.push(self.paragraph(None, Vec::new()));
        }
        if let Some(last) = out.last_mut() {
            set_property(
                paragraph_properties_mut(last),
                sect_pr,
                &["w:rPr", "w:sectPr", "w:pPrChange"],
            );
        }
    }
}

fn block_runs(runs: &[StyledRun], base_rpr: Option<&XmlElement>) -> Vec<XmlNode> {
    runs.iter()
        .filter(|r| !r.text.is_empty())
        .map(|r| XmlNode::Element(r.to_element(base_rpr)))
        .collect()
}

/// Whether paragraph content holds anything besides markers and empty runs
fn has_content(nodes: &[XmlNode]) -> bool {
    nodes.iter().any(|node| match node {
        XmlNode::Element(e) if e.is("w:r") => e.elements().any(|c| !c.is("w:rPr")),
        XmlNode::Element(e) => !MARKERS.contains(&e.name.as_str()),
        _ => false,
    })
}

/// Give every table cell a trailing paragraph
fn fix_table_cells(root: &mut XmlElement) {
    root.walk_mut(&mut |e| {
        if e.is("w:tc") && !e.elements().last().is_some_and(|c| c.is("w:p")) {
            e.children.push(XmlNode::Element(XmlElement::new("w:p")));
        }
    });
}
