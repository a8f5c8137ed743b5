//! Run and paragraph formatting
//!
//! Inserted text inherits the formatting of the run that held the placeholder;
//! a [`RunStyle`] only overlays emphasis on top of those inherited properties.
//! Property elements are inserted in schema order, which Word enforces when it
//! opens a file.

use crate::xml::{is_xml_char, XmlElement, XmlNode};

/// Child order of `w:rPr` (ECMA-376 CT_RPr)
const RUN_PROPERTY_ORDER: &[&str] = &[
    "w:rStyle", "w:rFonts", "w:b", "w:bCs", "w:i", "w:iCs", "w:caps", "w:smallCaps",
    "w:strike", "w:dstrike", "w:outline", "w:shadow", "w:emboss", "w:imprint", "w:noProof",
    "w:snapToGrid", "w:vanish", "w:webHidden", "w:color", "w:spacing", "w:w", "w:kern",
    "w:position", "w:sz", "w:szCs", "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd",
    "w:fitText", "w:vertAlign", "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout",
    "w:specVanish", "w:oMath",
];

/// Child order of `w:pPr` (ECMA-376 CT_PPr)
const PARAGRAPH_PROPERTY_ORDER: &[&str] = &[
    "w:pStyle", "w:keepNext", "w:keepLines", "w:pageBreakBefore", "w:framePr",
    "w:widowControl", "w:numPr", "w:suppressLineNumbers", "w:pBdr", "w:shd", "w:tabs",
    "w:suppressAutoHyphens", "w:kinsoku", "w:wordWrap", "w:overflowPunct", "w:topLinePunct",
    "w:autoSpaceDE", "w:autoSpaceDN", "w:bidi", "w:adjustRightInd", "w:snapToGrid",
    "w:spacing", "w:ind", "w:contextualSpacing", "w:mirrorIndents", "w:suppressOverlap",
    "w:jc", "w:textDirection", "w:textAlignment", "w:textboxTightWrap", "w:outlineLvl",
    "w:divId", "w:cnfStyle", "w:rPr", "w:sectPr", "w:pPrChange",
];

/// Child order of `w:tcPr` (ECMA-376 CT_TcPr)
pub const CELL_PROPERTY_ORDER: &[&str] = &[
    "w:cnfStyle", "w:tcW", "w:gridSpan", "w:hMerge", "w:vMerge", "w:tcBorders", "w:shd",
    "w:noWrap", "w:tcMar", "w:textDirection", "w:tcFitText", "w:vAlign", "w:hideMark",
];

/// Emphasis overlaid on inherited run properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RunStyle {
    /// Bold
    pub bold: bool,
    /// Italic
    pub italic: bool,
    /// Single underline
    pub underline: bool,
    /// Superscript
    pub superscript: bool,
    /// Subscript
    pub subscript: bool,
    /// Hex colour without `#`, e.g. `FF0000`
    pub color: Option<String>,
}

impl RunStyle {
    /// No overlay
    #[inline]
    #[must_use = "creates a plain style"]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Bold overlay
    #[inline]
    #[must_use = "creates a bold style"]
    pub fn bold() -> Self {
        Self {
            bold: true,
            ..Self::default()
        }
    }

    /// Italic overlay
    #[inline]
    #[must_use = "creates an italic style"]
    pub fn italic() -> Self {
        Self {
            italic: true,
            ..Self::default()
        }
    }

    /// Builder: set a colour
    #[inline]
    #[must_use = "returns the style with a colour"]
    pub fn with_color(mut self, hex: &str) -> Self {
        self.color = Some(hex.trim_start_matches('#').to_uppercase());
        self
    }

    /// Builder: superscript
    #[inline]
    #[must_use = "returns the style as superscript"]
    pub const fn superscript(mut self) -> Self {
        self.superscript = true;
        self
    }

    /// Whether the style changes nothing
    #[inline]
    #[must_use = "checks whether the style is empty"]
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the overlay to a `w:rPr` element
    pub fn apply_to(&self, rpr: &mut XmlElement) {
        if self.bold {
            set_property(rpr, XmlElement::new("w:b"), RUN_PROPERTY_ORDER);
        }
        if self.italic {
            set_property(rpr, XmlElement::new("w:i"), RUN_PROPERTY_ORDER);
        }
        if let Some(color) = &self.color {
            set_property(
                rpr,
                XmlElement::new("w:color").with_attr("w:val", color.as_str()),
                RUN_PROPERTY_ORDER,
            );
        }
        if self.underline {
            set_property(
                rpr,
                XmlElement::new("w:u").with_attr("w:val", "single"),
                RUN_PROPERTY_ORDER,
            );
        }
        let vert = if self.superscript {
            Some("superscript")
        } else if self.subscript {
            Some("subscript")
        } else {
            None
        };
        if let Some(vert) = vert {
            set_property(
                rpr,
                XmlElement::new("w:vertAlign").with_attr("w:val", vert),
                RUN_PROPERTY_ORDER,
            );
        }
    }
}

/// A piece of text with its emphasis
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StyledRun {
    /// Text content
    pub text: String,
    /// Emphasis overlay
    pub style: RunStyle,
}

impl StyledRun {
    /// Run with the given text and style
    #[inline]
    #[must_use = "creates a styled run"]
    pub fn new(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    /// Run without emphasis
    #[inline]
    #[must_use = "creates a plain run"]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, RunStyle::plain())
    }

    /// Bold run
    #[inline]
    #[must_use = "creates a bold run"]
    pub fn bold(text: impl Into<String>) -> Self {
        Self::new(text, RunStyle::bold())
    }

    /// Build a `w:r`, cloning `base_rpr` as the starting properties
    #[must_use = "returns the run element"]
    pub fn to_element(&self, base_rpr: Option<&XmlElement>) -> XmlElement {
        let mut run = XmlElement::new("w:r");
        let mut rpr = base_rpr.cloned().unwrap_or_else(|| XmlElement::new("w:rPr"));
        self.style.apply_to(&mut rpr);
        if !rpr.children.is_empty() {
            run.children.push(XmlNode::Element(rpr));
        }
        append_text(&mut run, &self.text);
        run
    }
}

/// Concatenated text of a list of runs
#[must_use = "returns the joined text"]
pub fn runs_text(runs: &[StyledRun]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

/// Append text to a `w:r`, mapping `\t` to `w:tab` and `\n` to `w:br`
///
/// Control characters XML cannot carry are dropped.
pub fn append_text(run: &mut XmlElement, text: &str) {
    let mut buf = String::new();
    let flush = |run: &mut XmlElement, buf: &mut String| {
        if !buf.is_empty() {
            run.children.push(XmlNode::Element(text_element(buf)));
            buf.clear();
        }
    };
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush(run, &mut buf);
                run.children.push(XmlNode::Element(XmlElement::new("w:tab")));
            }
            '\n' => {
                flush(run, &mut buf);
                run.children.push(XmlNode::Element(XmlElement::new("w:br")));
            }
            // Word's manual line break
            '\u{b}' => {
                flush(run, &mut buf);
                run.children.push(XmlNode::Element(XmlElement::new("w:br")));
            }
            '\r' => {}
            c if !is_xml_char(c) => {}
            _ => buf.push(ch),
        }
    }
    flush(run, &mut buf);
}

/// A `w:t` element that keeps leading and trailing spaces
#[must_use = "returns the text element"]
pub fn text_element(text: &str) -> XmlElement {
    let mut t = XmlElement::new("w:t");
    if text.starts_with(' ') || text.ends_with(' ') || text.contains("  ") {
        t.set_attr("xml:space", "preserve");
    }
    t.with_text(text)
}

/// Paragraph indentation applied to generated paragraphs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Indent {
    /// Keep the template's indentation
    #[default]
    Inherit,
    /// First line indented by half an inch
    FirstLine,
    /// Hanging indent of half an inch
    Hanging,
}

/// Horizontal alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// Keep the template's alignment
    #[default]
    Inherit,
    /// Left aligned
    Left,
    /// Centred
    Center,
    /// Justified
    Justify,
}

impl Alignment {
    const fn value(self) -> Option<&'static str> {
        match self {
            Self::Inherit => None,
            Self::Left => Some("left"),
            Self::Center => Some("center"),
            Self::Justify => Some("both"),
        }
    }
}

/// Paragraph-level formatting of generated paragraphs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParagraphFormat {
    /// Indentation
    pub indent: Indent,
    /// Alignment
    pub alignment: Alignment,
    /// Space after in points, when set
    pub space_after_pt: Option<u32>,
    /// Space before in points, when set
    pub space_before_pt: Option<u32>,
    /// Paragraph style id, when set
    pub style: Option<String>,
}

impl ParagraphFormat {
    /// Builder: alignment
    #[inline]
    #[must_use = "returns the format with alignment set"]
    pub fn aligned(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Builder: indentation
    #[inline]
    #[must_use = "returns the format with indentation set"]
    pub fn indented(mut self, indent: Indent) -> Self {
        self.indent = indent;
        self
    }

    /// Builder: spacing before and after, in points
    #[inline]
    #[must_use = "returns the format with spacing set"]
    pub fn spaced(mut self, before_pt: u32, after_pt: u32) -> Self {
        self.space_before_pt = Some(before_pt);
        self.space_after_pt = Some(after_pt);
        self
    }

    /// Builder: paragraph style
    #[inline]
    #[must_use = "returns the format with a style"]
    pub fn styled(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }

    /// Apply to a `w:pPr` element
    pub fn apply_to(&self, ppr: &mut XmlElement) {
        if let Some(style) = &self.style {
            set_property(
                ppr,
                XmlElement::new("w:pStyle").with_attr("w:val", style.as_str()),
                PARAGRAPH_PROPERTY_ORDER,
            );
        }
        if self.space_before_pt.is_some() || self.space_after_pt.is_some() {
            let mut spacing = ppr
                .child("w:spacing")
                .cloned()
                .unwrap_or_else(|| XmlElement::new("w:spacing"));
            if let Some(before) = self.space_before_pt {
                spacing.set_attr("w:before", (before * 20).to_string());
            }
            if let Some(after) = self.space_after_pt {
                spacing.set_attr("w:after", (after * 20).to_string());
            }
            set_property(ppr, spacing, PARAGRAPH_PROPERTY_ORDER);
        }
        match self.indent {
            Indent::Inherit => {}
            Indent::FirstLine => set_property(
                ppr,
                XmlElement::new("w:ind").with_attr("w:firstLine", "720"),
                PARAGRAPH_PROPERTY_ORDER,
            ),
            Indent::Hanging => set_property(
                ppr,
                XmlElement::new("w:ind")
                    .with_attr("w:left", "720")
                    .with_attr("w:hanging", "720"),
                PARAGRAPH_PROPERTY_ORDER,
            ),
        }
        if let Some(jc) = self.alignment.value() {
            set_property(
                ppr,
                XmlElement::new("w:jc").with_attr("w:val", jc),
                PARAGRAPH_PROPERTY_ORDER,
            );
        }
    }

    /// Build a `w:pPr`, or `None` when nothing is set
    #[must_use = "returns the paragraph properties"]
    pub fn to_element(&self) -> Option<XmlElement> {
        let mut ppr = XmlElement::new("w:pPr");
        self.apply_to(&mut ppr);
        (!ppr.children.is_empty()).then_some(ppr)
    }
}

/// Replace the same-named child of `parent`, or insert `property` at its
/// schema position
pub fn set_property(parent: &mut XmlElement, property: XmlElement, order: &[&str]) {
    if let Some(slot) = parent
        .children
        .iter_mut()
        .find(|c| c.is_element(&property.name))
    {
        *slot = XmlNode::Element(property);
        return;
    }

    let rank = |name: &str| order.iter().position(|o| *o == name);
    let Some(own_rank) = rank(&property.name) else {
        parent.children.push(XmlNode::Element(property));
        return;
    };
    let position = parent
        .children
        .iter()
        .position(|c| {
            c.as_element()
                .and_then(|e| rank(&e.name))
                .is_some_and(|r| r > own_rank)
        })
        .unwrap_or(parent.children.len());
    parent.children.insert(position, XmlNode::Element(property));
}

/// Paragraph properties of a `w:p`, created when absent
pub fn paragraph_properties_mut(paragraph: &mut XmlElement) -> &mut XmlElement {
    if !paragraph.children.first().is_some_and(|c| c.is_element("w:pPr")) {
        if let Some(idx) = paragraph.children.iter().position(|c| c.is_element("w:pPr")) {
            let ppr = paragraph.children.remove(idx);
            paragraph.children.insert(0, ppr);
        } else {
            paragraph
                .children
                .insert(0, XmlNode::Element(XmlElement::new("w:pPr")));
        }
    }
    match paragraph.children.first_mut() {
        Some(XmlNode::Element(ppr)) => ppr,
        _ => unreachable!("w:pPr was just placed first"),
    }
}

/// A paragraph made of styled runs
#[must_use = "returns the paragraph element"]
pub fn paragraph(runs: &[StyledRun], format: &ParagraphFormat) -> XmlElement {
    let mut p = XmlElement::new("w:p");
    if let Some(ppr) = format.to_element() {
        p.children.push(XmlNode::Element(ppr));
    }
    for run in runs.iter().filter(|r| !r.text.is_empty()) {
        p.children.push(XmlNode::Element(run.to_element(None)));
    }
    p
}

/// Caption paragraph: bold `label:` followed by the description
#[must_use = "returns the caption paragraph"]
pub fn caption_paragraph(label: &str, description: Option<&str>, format: &ParagraphFormat) -> XmlElement {
    let mut runs = vec![StyledRun::bold(format!("{label}:"))];
    if let Some(desc) = description.map(str::trim).filter(|d| !d.is_empty()) {
        runs.push(StyledRun::plain(format!(" {desc}")));
    }
    paragraph(&runs, format)
}
