//! Attachment embedding as an incremental update, extraction and structure
//! inspection.
//!
//! Run with: `cargo test --features pdf --test embed_tests`

#![cfg(feature = "pdf")]

use chrono::{TimeZone, Utc};
use lopdf::{Document, Object, Stream, dictionary};
use zugferd_pipeline::pdf::{
    self, EmbedError, EmbedOptions, XrefKind, embed_attachment, embed_attachment_with,
    extract_attachment, extract_named, inspect_structure, list_attachments,
};

const XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<rsm:CrossIndustryInvoice xmlns:rsm="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100"/>
"#;

/// A one-page PDF built with lopdf. `attach` adds an existing `notes.txt`
/// attachment listed in both `/AF` and `/Names /EmbeddedFiles`.
fn base_pdf(version: &str, attach: bool) -> Vec<u8> {
    let mut doc = Document::with_version(version);

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        b"BT /F1 12 Tf 100 700 Td (Rechnung) Tj ET".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        "Contents" => Object::Reference(content_id),
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => Object::Reference(font_id) } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    };
    if attach {
        let file_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "EmbeddedFile", "Params" => dictionary! { "Size" => 5 } },
            b"hello".to_vec(),
        ));
        let spec_id = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => Object::string_literal("notes.txt"),
            "UF" => Object::string_literal("notes.txt"),
            "AFRelationship" => "Supplement",
            "EF" => dictionary! { "F" => Object::Reference(file_id) },
        });
        catalog.set("AF", vec![Object::Reference(spec_id)]);
        catalog.set(
            "Names",
            dictionary! {
                "EmbeddedFiles" => dictionary! {
                    "Names" => vec![Object::string_literal("notes.txt"), Object::Reference(spec_id)],
                },
            },
        );
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn pdf17() -> Vec<u8> {
    base_pdf("1.7", false)
}

/// A PDF 1.5 file whose only cross-reference section is an uncompressed
/// `/Type /XRef` stream.
fn xref_stream_pdf() -> Vec<u8> {
    let bodies = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] >>",
    ];
    let mut out = b"%PDF-1.5\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_offset = out.len();
    offsets.push(xref_offset);

    let mut rows = vec![0u8, 0, 0, 0, 0, 0xFF, 0xFF];
    for offset in &offsets {
        rows.push(1);
        rows.extend_from_slice(&(*offset as u32).to_be_bytes());
        rows.extend_from_slice(&[0, 0]);
    }
    out.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /XRef /Size 5 /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());
    out
}

/// [`xref_stream_pdf`] with `/DecodeParms` on its xref stream, as written by
/// producers that compress with a PNG predictor. `/Predictor 1` means no
/// prediction, so the rows stay readable as is.
fn xref_stream_pdf_with_decode_parms() -> Vec<u8> {
    let plain = xref_stream_pdf();
    let marker = b"/W [1 4 2]";
    let at = plain.windows(marker.len()).position(|w| w == marker).unwrap() + marker.len();
    // the xref stream is the last object, so earlier offsets do not move
    let mut out = plain[..at].to_vec();
    out.extend_from_slice(b" /DecodeParms << /Predictor 1 >>");
    out.extend_from_slice(&plain[at..]);
    out
}

fn catalog_of(pdf: &[u8]) -> lopdf::Dictionary {
    let doc = Document::load_mem(pdf).unwrap();
    doc.catalog().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Input checks
// ---------------------------------------------------------------------------

#[test]
fn non_pdf_input_is_invalid_container() {
    let err = embed_attachment(b"PK\x03\x04 zip archive", XML, "invoice").unwrap_err();
    assert!(matches!(err, EmbedError::InvalidContainer));
    assert_eq!(err.to_string(), "input is not a PDF document");
}

#[test]
fn empty_xml_is_rejected() {
    let err = embed_attachment(&pdf17(), b"", "invoice").unwrap_err();
    assert!(matches!(err, EmbedError::EmptyPayload));
}

#[test]
fn unreadable_body_is_malformed() {
    let err = embed_attachment(b"%PDF-1.7\ngarbage without objects\n", XML, "invoice").unwrap_err();
    assert!(matches!(err, EmbedError::MalformedDocument(_)));
}

// ---------------------------------------------------------------------------
// Incremental update
// ---------------------------------------------------------------------------

#[test]
fn original_bytes_are_a_prefix() {
    let base = pdf17();
    let out = embed_attachment(&base, XML, "invoice").unwrap();
    assert!(out.len() > base.len());
    assert_eq!(&out[..base.len()], base.as_slice());
    assert!(out.ends_with(b"%%EOF"));
}

#[test]
fn new_objects_are_numbered_above_existing_ones() {
    let base = pdf17();
    let before = Document::load_mem(&base).unwrap();
    let highest = before.objects.keys().map(|(n, _)| *n).max().unwrap();

    let out = embed_attachment(&base, XML, "invoice").unwrap();
    let after = Document::load_mem(&out).unwrap();
    let added: Vec<u32> = after
        .objects
        .keys()
        .map(|(n, _)| *n)
        .filter(|n| !before.objects.keys().any(|(m, _)| m == n))
        .collect();
    assert!(!added.is_empty());
    assert!(added.iter().all(|n| *n > highest));
    let size = after.trailer.get(b"Size").unwrap().as_i64().unwrap();
    assert!(size > i64::from(*added.iter().max().unwrap()));
}

#[test]
fn trailer_links_to_previous_section() {
    let base = pdf17();
    let out = embed_attachment(&base, XML, "invoice").unwrap();
    let tail = String::from_utf8_lossy(&out[base.len()..]).into_owned();
    assert!(tail.contains("xref\n"));
    assert!(tail.contains("/Prev "));
    assert!(tail.contains("/Root "));
}

#[test]
fn trailer_keeps_document_id_and_info() {
    let mut doc = Document::load_mem(&pdf17()).unwrap();
    let info_id = doc.add_object(dictionary! { "Producer" => Object::string_literal("Renderer") });
    doc.trailer.set("Info", Object::Reference(info_id));
    let id = Object::Array(vec![
        Object::String(b"0123456789abcdef".to_vec(), lopdf::StringFormat::Hexadecimal),
        Object::String(b"fedcba9876543210".to_vec(), lopdf::StringFormat::Hexadecimal),
    ]);
    doc.trailer.set("ID", id.clone());
    let mut base = Vec::new();
    doc.save_to(&mut base).unwrap();

    let out = embed_attachment(&base, XML, "invoice").unwrap();
    let after = Document::load_mem(&out).unwrap();
    assert_eq!(after.trailer.get(b"ID").unwrap(), &id);
    assert_eq!(after.trailer.get(b"Info").unwrap().as_reference().unwrap(), info_id);
    assert_eq!(
        after.trailer.get(b"Prev").unwrap().as_i64().unwrap(),
        Document::load_mem(&base).unwrap().xref_start as i64
    );
}

#[test]
fn encrypted_source_is_rejected() {
    let mut doc = Document::load_mem(&pdf17()).unwrap();
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "P" => -4,
    });
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    let mut base = Vec::new();
    doc.save_to(&mut base).unwrap();

    let err = embed_attachment(&base, XML, "invoice").unwrap_err();
    assert!(matches!(err, EmbedError::Encrypted));
}

#[test]
fn catalog_gains_af_names_and_metadata() {
    let out = embed_attachment(&pdf17(), XML, "invoice").unwrap();
    let catalog = catalog_of(&out);
    assert!(catalog.get(b"AF").is_ok(), "AF array missing from catalog");
    assert!(catalog.get(b"Names").is_ok(), "Names dict missing from catalog");
    assert!(catalog.get(b"Metadata").is_ok(), "Metadata missing from catalog");
    assert!(catalog.get(b"Pages").is_ok(), "Pages lost from catalog");
}

#[test]
fn xmp_packet_declares_pdfa3_and_factur_x() {
    let out = embed_attachment(&pdf17(), XML, "invoice").unwrap();
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("<pdfaid:part>3</pdfaid:part>"));
    assert!(text.contains("<fx:DocumentFileName>ZUGFeRD-invoice.xml</fx:DocumentFileName>"));
    assert!(text.contains("<fx:ConformanceLevel>EN 16931</fx:ConformanceLevel>"));
}

#[test]
fn xmp_can_be_disabled() {
    let options = EmbedOptions::new("invoice").write_xmp(false);
    let out = embed_attachment_with(&pdf17(), XML, &options).unwrap();
    assert!(catalog_of(&out).get(b"Metadata").is_err());
}

#[test]
fn filespec_carries_relationship_and_description() {
    let options = EmbedOptions::new("Rechnung RE-2025-001")
        .modified(Utc.with_ymd_and_hms(2025, 7, 14, 9, 30, 0).unwrap());
    let out = embed_attachment_with(&pdf17(), XML, &options).unwrap();
    let doc = Document::load_mem(&out).unwrap();
    let catalog = doc.catalog().unwrap();
    let spec_ref = catalog.get(b"AF").unwrap().as_array().unwrap()[0]
        .as_reference()
        .unwrap();
    let spec = doc.get_dictionary(spec_ref).unwrap();
    assert_eq!(spec.get(b"AFRelationship").unwrap().as_name().unwrap(), b"Data");
    assert_eq!(spec.get(b"Type").unwrap().as_name().unwrap(), b"Filespec");
    match spec.get(b"Desc").unwrap() {
        Object::String(bytes, _) => assert_eq!(bytes.as_slice(), b"Rechnung RE-2025-001"),
        other => panic!("unexpected /Desc {other:?}"),
    }
    let ef = spec.get(b"EF").unwrap().as_dict().unwrap();
    let file = doc
        .get_object(ef.get(b"F").unwrap().as_reference().unwrap())
        .unwrap()
        .as_stream()
        .unwrap();
    assert_eq!(file.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"text/xml");
    let params = file.dict.get(b"Params").unwrap().as_dict().unwrap();
    assert_eq!(params.get(b"ModDate").unwrap().as_str().unwrap(), b"D:20250714093000Z");
    assert_eq!(params.get(b"Size").unwrap().as_i64().unwrap(), XML.len() as i64);
    assert!(String::from_utf8_lossy(&out).contains("/Subtype/text#2Fxml"));
}

#[test]
fn non_ascii_description_is_a_unicode_text_string() {
    let out = embed_attachment(&pdf17(), XML, "Rechnung für März").unwrap();
    let doc = Document::load_mem(&out).unwrap();
    let spec_ref = doc.catalog().unwrap().get(b"AF").unwrap().as_array().unwrap()[0]
        .as_reference()
        .unwrap();
    let desc = doc.get_dictionary(spec_ref).unwrap().get(b"Desc").unwrap();
    assert!(desc.as_str().unwrap().starts_with(&[0xFE, 0xFF]));
    assert_eq!(lopdf::decode_text_string(desc).unwrap(), "Rechnung für März");
}

#[test]
fn old_pdf_versions_are_raised_to_1_7() {
    let out = embed_attachment(&base_pdf("1.4", false), XML, "invoice").unwrap();
    let catalog = catalog_of(&out);
    assert_eq!(catalog.get(b"Version").unwrap().as_name().unwrap(), b"1.7");

    let out = embed_attachment(&pdf17(), XML, "invoice").unwrap();
    assert!(catalog_of(&out).get(b"Version").is_err());
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[test]
fn extract_returns_the_embedded_bytes() {
    let out = embed_attachment(&pdf17(), XML, "invoice").unwrap();
    assert_eq!(extract_attachment(&out).unwrap(), XML);
    assert_eq!(extract_named(&out, "zugferd-invoice.xml").unwrap(), XML);
}

#[test]
fn extract_without_attachment_is_not_found() {
    let err = extract_attachment(&pdf17()).unwrap_err();
    assert!(matches!(err, EmbedError::AttachmentNotFound(_)));
}

#[test]
fn custom_filename_is_found_by_keyword() {
    let options = EmbedOptions::new("invoice").filename("factur-x.xml");
    let out = embed_attachment_with(&pdf17(), XML, &options).unwrap();
    assert_eq!(list_attachments(&out).unwrap(), vec!["factur-x.xml".to_string()]);
    assert_eq!(extract_attachment(&out).unwrap(), XML);
}

#[test]
fn existing_attachments_are_preserved() {
    let out = embed_attachment(&base_pdf("1.7", true), XML, "invoice").unwrap();
    let names = list_attachments(&out).unwrap();
    assert_eq!(names, vec!["notes.txt".to_string(), pdf::ATTACHMENT_FILENAME.to_string()]);
    assert_eq!(extract_named(&out, "notes.txt").unwrap(), b"hello");
    assert_eq!(extract_attachment(&out).unwrap(), XML);

    let catalog = catalog_of(&out);
    assert_eq!(catalog.get(b"AF").unwrap().as_array().unwrap().len(), 2);
}

#[test]
fn embedding_twice_replaces_the_invoice() {
    let first = embed_attachment(&pdf17(), XML, "invoice").unwrap();
    let updated = b"<rsm:CrossIndustryInvoice/>".as_slice();
    let second = embed_attachment(&first, updated, "invoice").unwrap();

    assert_eq!(&second[..first.len()], first.as_slice());
    assert_eq!(extract_attachment(&second).unwrap(), updated);
    assert_eq!(list_attachments(&second).unwrap().len(), 1);
    assert_eq!(catalog_of(&second).get(b"AF").unwrap().as_array().unwrap().len(), 1);
    inspect_structure(&second).unwrap();
}

// ---------------------------------------------------------------------------
// Cross-reference streams
// ---------------------------------------------------------------------------

#[test]
fn xref_stream_source_gets_xref_stream_update() {
    let base = xref_stream_pdf();
    assert_eq!(inspect_structure(&base).unwrap().xref, XrefKind::Stream);

    let out = embed_attachment(&base, XML, "invoice").unwrap();
    assert_eq!(&out[..base.len()], base.as_slice());
    let tail = String::from_utf8_lossy(&out[base.len()..]).into_owned();
    assert!(tail.contains("/Type/XRef"));
    assert!(!tail.contains("\ntrailer\n"));
    assert!(!tail.contains("/DecodeParms"));

    let report = inspect_structure(&out).unwrap();
    assert_eq!(report.xref, XrefKind::Stream);
    assert!(report.has_attachment(pdf::ATTACHMENT_FILENAME));
    assert_eq!(extract_attachment(&out).unwrap(), XML);
}

#[test]
fn previous_xref_stream_parameters_are_not_carried_over() {
    let base = xref_stream_pdf_with_decode_parms();
    assert!(Document::load_mem(&base).unwrap().trailer.has(b"DecodeParms"));

    let out = embed_attachment(&base, XML, "invoice").unwrap();
    let tail = String::from_utf8_lossy(&out[base.len()..]).into_owned();
    assert!(!tail.contains("/DecodeParms"));
    assert_eq!(extract_attachment(&out).unwrap(), XML);
    inspect_structure(&out).unwrap();
}

// ---------------------------------------------------------------------------
// Structure inspection
// ---------------------------------------------------------------------------

#[test]
fn embedded_output_passes_structure_check() {
    let out = embed_attachment(&base_pdf("1.4", true), XML, "invoice").unwrap();
    let report = inspect_structure(&out).unwrap();
    assert_eq!(report.xref, XrefKind::Table);
    assert!(report.has_attachment("ZUGFeRD-invoice.xml"));
    assert!(report.has_attachment("notes.txt"));
    assert!(report.objects > 5);
}

#[test]
fn plain_pdf_passes_with_no_attachments() {
    let report = inspect_structure(&pdf17()).unwrap();
    assert!(report.attachments.is_empty());
    assert_eq!(report.version, "1.7");
}

#[test]
fn af_entry_missing_from_name_tree_is_reported() {
    let mut doc = Document::load_mem(&base_pdf("1.7", true)).unwrap();
    let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_dictionary_mut(root).unwrap().remove(b"Names");
    let mut pdf = Vec::new();
    doc.save_to(&mut pdf).unwrap();

    let err = inspect_structure(&pdf).unwrap_err();
    assert!(err.issues.iter().any(|i| i.contains("notes.txt is in /AF")));
}

#[test]
fn wrong_declared_size_is_reported() {
    let mut doc = Document::load_mem(&base_pdf("1.7", true)).unwrap();
    let file_id = doc
        .objects
        .iter()
        .find(|(_, obj)| {
            obj.as_stream()
                .is_ok_and(|s| s.dict.get(b"Type").and_then(Object::as_name).ok() == Some(b"EmbeddedFile".as_slice()))
        })
        .map(|(id, _)| *id)
        .unwrap();
    if let Ok(Object::Stream(stream)) = doc.get_object_mut(file_id) {
        stream.dict.set("Params", dictionary! { "Size" => 99 });
    }
    let mut pdf = Vec::new();
    doc.save_to(&mut pdf).unwrap();

    let err = inspect_structure(&pdf).unwrap_err();
    assert!(err.issues.iter().any(|i| i.contains("/Params /Size 99")), "{err}");
}
