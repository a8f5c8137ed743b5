//! End-to-end generation tests
//!
//! Each test fills a template through `DocumentService` and inspects the
//! written package.

use base64::Engine;
use manudoc_core::package::DOCUMENT_PART;
use manudoc_core::processor::is_story_part;
use manudoc_core::template::bundled_package;
use manudoc_core::xml::{is_xml_char, XmlElement};
use manudoc_core::{DocumentService, DocxPackage, GeneratorConfig, ManudocError, ManuscriptRequest, Warning};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn png_data_uri(width: u32, height: u32) -> String {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes.into_inner())
    )
}

fn payload() -> Value {
    json!({
        "research_type": "Orthopedic Surgery",
        "research_title": "Outcome of early mobilisation after total knee arthroplasty.",
        "authors": ["Lee, Ann", "Omar Hassan", "Sara Khalil"],
        "affiliation": ["department of orthopedics, cairo university", "department of physiotherapy, ain shams university"],
        "date_received": "2024-01-15",
        "date_accepted": "2024-03-02",
        "email": "ann.lee@example.org",
        "abstract": "Background: Knee arthroplasty is common.\nMethods: 40 patients [1] were enrolled.\nResults: Pain fell by 35 %.\nConclusion: Early mobilisation helps.",
        "keywords": "knee, arthroplasty, rehabilitation",
        "intro": "Knee arthroplasty restores function [1].\nSmith et al reported similar outcomes [2].",
        "aim": "To assess early mobilisation.",
        "methods": "A randomised trial of 40 patients.",
        "results": "Mean age was 61 +/- 7 years; 35 % improved.",
        "discussion": "Early mobilisation shortened stay [3].",
        "references": "1. Smith J. Knee outcomes. 2020.\n2. Doe A. Rehab. 2021.\n3. Roe B. Stay. 2022.",
        "tables": [
            {"caption": "First table", "rows": [["Group", "n"], ["A", "20"], ["B", "20"]], "header": true},
            {"caption": "Second table", "html": "<table><tr><th colspan=\"2\">Outcome</th></tr><tr><td>Pain</td><td>35%</td></tr></table>"}
        ],
        "figures": [
            {"caption": "Recovery curve", "content": png_data_uri(64, 32)},
            {"caption": "Broken image", "content": "data:image/png;base64,bm90IGFuIGltYWdl"}
        ]
    })
}

fn request(value: &Value) -> ManuscriptRequest {
    ManuscriptRequest::from_value(value.clone()).unwrap()
}

fn service() -> DocumentService {
    DocumentService::new(GeneratorConfig::default()).unwrap()
}

fn body(path: &Path) -> XmlElement {
    let package = DocxPackage::open(path).unwrap();
    let doc = package.xml_part(DOCUMENT_PART).unwrap();
    doc.root.child("w:body").unwrap().clone()
}

fn paragraph_texts(body: &XmlElement) -> Vec<String> {
    body.elements().filter(|e| e.is("w:p")).map(XmlElement::text_content).collect()
}

fn write_template(dir: &TempDir, document_xml: &str) -> std::path::PathBuf {
    let mut package = bundled_package();
    package.set_part(DOCUMENT_PART, document_xml.as_bytes().to_vec());
    let path = dir.path().join("template.docx");
    package.save(&path).unwrap();
    path
}

const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

#[test]
fn test_no_placeholders_left() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    service().generate(&request(&payload()), &path).unwrap();

    let package = DocxPackage::open(&path).unwrap();
    let parts: Vec<String> = package.part_names().filter(|n| is_story_part(n)).map(str::to_string).collect();
    assert!(parts.len() >= 2);
    for part in parts {
        let text = package.xml_part(&part).unwrap().root.text_content();
        assert!(!text.contains("{{"), "{part} still contains a placeholder: {text}");
    }
}

#[test]
fn test_content_rendered() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    service().generate(&request(&payload()), &path).unwrap();

    let texts = paragraph_texts(&body(&path));
    assert!(texts.contains(&"Main Subject: [Orthopedic Surgery]".to_string()));
    assert!(texts
        .iter()
        .any(|t| t == "Outcome of Early Mobilisation after Total Knee Arthroplasty"));
    assert!(texts.iter().any(|t| t.starts_with("Received: 15-01-2024; Accepted: 02-03-2024")));
    assert!(texts.iter().any(|t| t.starts_with("Citation: Lee A, Hassan O, Khalil S.")));
    assert!(texts.iter().any(|t| t == "Keywords: Knee; Arthroplasty; Rehabilitation;"));

    let header = DocxPackage::open(&path).unwrap().xml_part("word/header1.xml").unwrap();
    assert_eq!(header.root.text_content(), "Lee A, et al.");
}

#[test]
fn test_missing_title_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    let mut value = payload();
    value["research_title"] = json!("   ");

    let err = service().generate(&request(&value), &path).unwrap_err();
    match err {
        ManudocError::MissingField(field) => assert_eq!(field, "research_title"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!path.exists());
}

#[test]
fn test_tables_keep_payload_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    service().generate(&request(&payload()), &path).unwrap();

    let body = body(&path);
    let tables: Vec<&XmlElement> = body.elements().filter(|e| e.is("w:tbl")).collect();
    assert_eq!(tables.len(), 2);

    let texts = paragraph_texts(&body);
    let first = texts.iter().position(|t| t == "Table 1: First table").unwrap();
    let second = texts.iter().position(|t| t == "Table 2: Second table").unwrap();
    assert!(first < second);

    assert!(tables[0].text_content().contains("Group"));
    assert!(tables[1].text_content().contains("Outcome"));
    let merged_cell = tables[1]
        .child("w:tr")
        .and_then(|tr| tr.child("w:tc"))
        .and_then(|tc| tc.child("w:tcPr"))
        .and_then(|pr| pr.child("w:gridSpan"))
        .and_then(|span| span.attr("w:val"));
    assert_eq!(merged_cell, Some("2"));
}

#[test]
fn test_corrupt_figure_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    let report = service().generate(&request(&payload()), &path).unwrap();

    assert_eq!(report.warnings.len(), 1);
    match &report.warnings[0] {
        Warning::Figure(err) => {
            assert_eq!(err.index, 2);
            assert_eq!(err.caption.as_deref(), Some("Broken image"));
        }
        other => panic!("unexpected warning: {other}"),
    }

    let package = DocxPackage::open(&path).unwrap();
    let media: Vec<&str> = package.part_names().filter(|n| n.starts_with("word/media/")).collect();
    assert_eq!(media, ["word/media/image1.png"]);
    let texts = paragraph_texts(&body(&path));
    assert!(texts.contains(&"Figure 1: Recovery curve".to_string()));
    assert!(!texts.iter().any(|t| t.contains("Broken image")));
}

#[test]
fn test_strict_figures_fail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    let config = GeneratorConfig {
        strict_figures: true,
        ..GeneratorConfig::default()
    };
    let err = DocumentService::new(config)
        .unwrap()
        .generate(&request(&payload()), &path)
        .unwrap_err();
    assert!(matches!(err, ManudocError::Figure(ref f) if f.index == 2));
    assert!(!path.exists());
}

#[test]
fn test_output_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("a.docx");
    let second = dir.path().join("b.docx");
    let request = request(&payload());
    service().generate(&request, &first).unwrap();
    service().generate(&request, &second).unwrap();
    assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
}

#[test]
fn test_empty_tables_and_figures_leave_no_residue() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    let mut value = payload();
    value["tables"] = json!([]);
    value["figures"] = json!([]);
    service().generate(&request(&value), &path).unwrap();

    let body = body(&path);
    assert_eq!(body.elements().filter(|e| e.is("w:tbl")).count(), 0);
    let texts = paragraph_texts(&body);
    assert!(texts.iter().all(|t| !t.trim().is_empty()), "{texts:?}");
    assert!(body.elements().last().unwrap().is("w:sectPr"));
}

#[test]
fn test_split_run_placeholder() {
    let dir = TempDir::new().unwrap();
    let template = write_template(
        &dir,
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W_NS}><w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Title: {{{{research_</w:t></w:r><w:r><w:t>title}}}}</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#
        ),
    );
    let path = dir.path().join("paper.docx");
    let config = GeneratorConfig {
        template: Some(template),
        ..GeneratorConfig::default()
    };
    DocumentService::new(config)
        .unwrap()
        .generate(&request(&payload()), &path)
        .unwrap();
    assert_eq!(
        paragraph_texts(&body(&path)),
        vec!["Title: Outcome of Early Mobilisation after Total Knee Arthroplasty"]
    );
}

#[test]
fn test_unknown_placeholder_fails() {
    let dir = TempDir::new().unwrap();
    let template = write_template(
        &dir,
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W_NS}><w:body><w:p><w:r><w:t>Vol {{{{volume}}}}</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#
        ),
    );
    let path = dir.path().join("paper.docx");
    let config = GeneratorConfig {
        template: Some(template),
        ..GeneratorConfig::default()
    };
    let err = DocumentService::new(config)
        .unwrap()
        .generate(&request(&payload()), &path)
        .unwrap_err();
    assert!(matches!(err, ManudocError::Template(ref names) if names == &vec!["volume".to_string()]));
    assert!(!path.exists());
}

#[test]
fn test_extra_field_substituted() {
    let dir = TempDir::new().unwrap();
    let template = write_template(
        &dir,
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W_NS}><w:body><w:p><w:r><w:t>Vol {{{{volume}}}}</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#
        ),
    );
    let path = dir.path().join("paper.docx");
    let config = GeneratorConfig {
        template: Some(template),
        extra_fields: vec!["volume".to_string()],
        ..GeneratorConfig::default()
    };
    let mut value = payload();
    value["volume"] = json!(12);
    DocumentService::new(config)
        .unwrap()
        .generate(&request(&value), &path)
        .unwrap();
    assert_eq!(paragraph_texts(&body(&path)), vec!["Vol 12"]);
}

#[test]
fn test_placeholder_in_payload_value_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    let mut value = payload();
    value["intro"] = json!("see {{appendix}} here");

    let err = service().generate(&request(&value), &path).unwrap_err();
    match err {
        ManudocError::Template(names) => {
            assert_eq!(names, vec!["appendix (inserted by a payload value)".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!path.exists());
}

#[test]
fn test_control_characters_never_reach_the_xml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    let mut value = payload();
    value["intro"] = json!("line\u{b}break \u{1}x");
    value["tables"] = json!([{"caption": "Bell\u{7}", "rows": [["a\u{0}", "b"]]}]);
    service().generate(&request(&value), &path).unwrap();

    let package = DocxPackage::open(&path).unwrap();
    let xml = package.part_str(DOCUMENT_PART).unwrap();
    let forbidden: Vec<char> = xml.chars().filter(|&c| !is_xml_char(c)).collect();
    assert!(forbidden.is_empty(), "{forbidden:?}");

    let texts = paragraph_texts(&body(&path));
    assert!(texts.iter().any(|t| t.starts_with("line") && t.contains("break x")), "{texts:?}");
    assert!(texts.contains(&"Table 1: Bell".to_string()), "{texts:?}");
}

#[test]
fn test_unwritable_output_path() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let path = blocker.join("paper.docx");

    let err = service().generate(&request(&payload()), &path).unwrap_err();
    match err {
        ManudocError::Io { path: failed, .. } => assert_eq!(failed, blocker),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!path.exists());
    assert_eq!(std::fs::read(&blocker).unwrap(), b"not a directory");
}

#[test]
fn test_missing_template_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.docx");
    let config = GeneratorConfig {
        template: Some(dir.path().join("absent.docx")),
        ..GeneratorConfig::default()
    };
    let err = DocumentService::new(config)
        .unwrap()
        .generate(&request(&payload()), &path)
        .unwrap_err();
    assert!(matches!(err, ManudocError::TemplateNotFound(_)));
    assert!(!path.exists());
}
