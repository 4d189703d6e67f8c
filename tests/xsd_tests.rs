//! Schema validation of generated CII XML against the fixture schema set in
//! `tests/fixtures/cii`.
//!
//! Run with: `cargo test --features xsd --test xsd_tests`

#![cfg(feature = "xsd")]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use zugferd_pipeline::cii;
use zugferd_pipeline::core::*;
use zugferd_pipeline::xsd::{self, CompiledSchema, SchemaCache, SchemaError};

fn schema_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cii/CrossIndustryInvoice.xsd")
}

fn invoice(profile: &str) -> InvoiceDocument {
    InvoiceBuilder::new("RE-2025-001", NaiveDate::from_ymd_opt(2025, 7, 14).unwrap())
        .due_date(NaiveDate::from_ymd_opt(2025, 8, 13).unwrap())
        .seller(
            PartyBuilder::new(
                "ACME GmbH",
                AddressBuilder::new("Berlin", "DE")
                    .street("Hauptstraße 1")
                    .postal_code("10115")
                    .build(),
            )
            .vat_id("DE123456789")
            .build(),
        )
        .buyer(PartyBuilder::new("Kunde AG", AddressBuilder::new("Wien", "AT").build()).build())
        .add_line(
            LineItemBuilder::new("1", "Beratung", dec!(2), dec!(100))
                .discount(dec!(5))
                .tax_rate(dec!(19))
                .build(),
        )
        .add_line(LineItemBuilder::new("2", "Export", dec!(1), dec!(40)).build())
        .profile(profile)
        .note("Vielen Dank")
        .build_unchecked()
        .unwrap()
}

fn xml(profile: &str) -> String {
    let tree = cii::map_to_compliance_tree(&invoice(profile)).unwrap();
    String::from_utf8(cii::encode_xml(&tree).unwrap()).unwrap()
}

fn violations(err: &SchemaError) -> Vec<String> {
    err.violations().iter().map(|v| v.to_string()).collect()
}

#[test]
fn fixture_schema_compiles_with_imports() {
    let schema = CompiledSchema::load(schema_path()).unwrap();
    assert_eq!(schema.files().len(), 3);
    assert!(schema.has_element(cii::cii_ns::RSM, "CrossIndustryInvoice"));
}

#[test]
fn generated_xml_is_valid_for_every_profile() {
    let schema = CompiledSchema::load(schema_path()).unwrap();
    for profile in cii::ZugferdProfile::ALL {
        let xml = xml(profile.conformance_level());
        if let Err(e) = schema.validate(xml.as_bytes()) {
            panic!("{profile}: {e}");
        }
    }
}

#[test]
fn validate_xml_compiles_on_each_call() {
    assert!(xsd::validate_xml(xml("EN16931").as_bytes(), schema_path()).is_ok());
}

#[test]
fn missing_schema_is_unavailable_not_a_violation() {
    let err = xsd::validate_xml(xml("EN16931").as_bytes(), "/nonexistent/EN16931.xsd").unwrap_err();
    assert!(err.is_unavailable());
    assert!(matches!(err, SchemaError::Unavailable { .. }));
    assert!(err.violations().is_empty());
}

#[test]
fn missing_import_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root.xsd");
    fs::write(
        &root,
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:import namespace="urn:x" schemaLocation="missing.xsd"/>
</xs:schema>"#,
    )
    .unwrap();
    let err = CompiledSchema::load(&root).unwrap_err();
    assert!(matches!(err, SchemaError::Unavailable { ref path, .. } if path.ends_with("missing.xsd")));
}

#[test]
fn non_schema_file_is_unparsable() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root.xsd");
    fs::write(&root, "<html><body>not a schema</body></html>").unwrap();
    let err = CompiledSchema::load(&root).unwrap_err();
    assert!(matches!(err, SchemaError::Unparsable { .. }));
    assert!(err.is_unavailable());
}

fn compile(body: &str) -> Result<CompiledSchema, SchemaError> {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root.xsd");
    fs::write(
        &root,
        format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:t="urn:t" targetNamespace="urn:t" elementFormDefault="qualified">
{body}
</xs:schema>"#
        ),
    )
    .unwrap();
    CompiledSchema::load(&root)
}

fn unparsable_reason(body: &str) -> String {
    match compile(body) {
        Err(SchemaError::Unparsable { reason, .. }) => reason,
        Err(other) => panic!("expected Unparsable, got {other}"),
        Ok(_) => panic!("schema compiled:\n{body}"),
    }
}

#[test]
fn unsupported_constructs_fail_to_compile() {
    let cases = [
        (
            r#"<xs:element name="head" type="xs:string"/>
  <xs:element name="member" type="xs:string" substitutionGroup="t:head"/>"#,
            "substitution group",
        ),
        (
            r#"<xs:element name="list">
    <xs:complexType><xs:sequence><xs:element name="item" type="xs:string" maxOccurs="unbounded"/></xs:sequence></xs:complexType>
    <xs:unique name="u"><xs:selector xpath="t:item"/><xs:field xpath="."/></xs:unique>
  </xs:element>"#,
            "identity constraint xs:unique",
        ),
        (
            r#"<xs:simpleType name="zoned">
    <xs:restriction base="xs:date"><xs:explicitTimezone value="required"/></xs:restriction>
  </xs:simpleType>"#,
            "facet xs:explicitTimezone",
        ),
        (
            r#"<xs:simpleType name="code">
    <xs:restriction base="xs:string"><xs:pattern value="(?&lt;=a)b"/></xs:restriction>
  </xs:simpleType>"#,
            "cannot be compiled",
        ),
        (
            r#"<xs:import namespace="urn:r" schemaLocation="https://example.org/r.xsd"/>"#,
            "remote schema location",
        ),
        (r#"<xs:redefine schemaLocation="other.xsd"/>"#, "xs:redefine"),
        (r#"<xs:element name="a" type="t:Undeclared"/>"#, "is not declared"),
        (r#"<xs:element name="a" type="xs:strnig"/>"#, "is not declared"),
        (r#"<xs:element name="a" type="xs:string" fixed="x"/>"#, "fixed value"),
    ];
    for (body, expected) in cases {
        let reason = unparsable_reason(body);
        assert!(reason.contains(expected), "{expected:?} not in {reason:?}");
    }
}

#[test]
fn unsupported_construct_is_reported_as_unavailable_schema() {
    let err = compile(r#"<xs:notation name="gif" public="image/gif"/>"#).unwrap_err();
    assert!(err.is_unavailable());
    assert!(err.violations().is_empty());
}

#[test]
fn white_space_facet_applies_before_enumeration() {
    let schema = compile(
        r#"<xs:element name="code">
    <xs:simpleType>
      <xs:restriction base="xs:string">
        <xs:whiteSpace value="collapse"/>
        <xs:enumeration value="A B"/>
      </xs:restriction>
    </xs:simpleType>
  </xs:element>"#,
    )
    .unwrap();
    assert!(schema.validate(br#"<code xmlns="urn:t">  A   B </code>"#).is_ok());
    assert!(schema.validate(br#"<code xmlns="urn:t">AB</code>"#).is_err());
}

#[test]
fn every_violation_is_reported() {
    let bad = xml("EN16931")
        .replace("<ram:InvoiceCurrencyCode>EUR<", "<ram:InvoiceCurrencyCode>eur<")
        .replace("<ram:CountryID>DE<", "<ram:CountryID>de<");
    let err = xsd::validate_xml(bad.as_bytes(), schema_path()).unwrap_err();
    let found = violations(&err);
    assert!(found.len() >= 2, "{found:?}");
    assert!(found.iter().any(|v| v.contains("InvoiceCurrencyCode")));
    assert!(found.iter().any(|v| v.contains("CountryID")));
}

#[test]
fn unknown_document_type_code_is_rejected() {
    let bad = xml("EN16931").replace("<ram:TypeCode>380<", "<ram:TypeCode>999<");
    let err = xsd::validate_xml(bad.as_bytes(), schema_path()).unwrap_err();
    assert!(violations(&err).iter().any(|v| v.contains("TypeCode")));
}

#[test]
fn missing_mandatory_element_is_rejected() {
    let source = xml("EN16931");
    let start = source.find("<ram:GrandTotalAmount>").unwrap();
    let end = source.find("</ram:GrandTotalAmount>").unwrap() + "</ram:GrandTotalAmount>".len();
    let bad = format!("{}{}", &source[..start], &source[end..]);
    let err = xsd::validate_xml(bad.as_bytes(), schema_path()).unwrap_err();
    let found = violations(&err);
    assert!(
        found.iter().any(|v| v.contains("SpecifiedTradeSettlementHeaderMonetarySummation")),
        "{found:?}"
    );
}

#[test]
fn malformed_date_string_is_rejected() {
    let bad = xml("EN16931").replacen(">20250714<", ">2025-07-14<", 1);
    let err = xsd::validate_xml(bad.as_bytes(), schema_path()).unwrap_err();
    assert!(violations(&err).iter().any(|v| v.contains("DateTimeString")));
}

#[test]
fn wrong_root_element_is_rejected() {
    let err = xsd::validate_xml(
        br#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"/>"#,
        schema_path(),
    )
    .unwrap_err();
    assert_eq!(err.violations().len(), 1);
}

#[test]
fn not_well_formed_is_a_single_violation() {
    let err = xsd::validate_xml(b"<rsm:CrossIndustryInvoice", schema_path()).unwrap_err();
    assert_eq!(err.violations().len(), 1);
    assert_eq!(err.violations()[0].path, "/");
}

#[test]
fn cache_reuses_compiled_schema() {
    let cache = SchemaCache::new();
    let xml = xml("EN16931");
    for _ in 0..3 {
        cache.validate(xml.as_bytes(), schema_path()).unwrap();
    }
    assert_eq!(cache.len(), 1);
    let a = cache.get(schema_path()).unwrap();
    let b = cache.get(schema_path()).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn cache_does_not_remember_failures() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.xsd");
    let cache = SchemaCache::new();
    assert!(cache.get(&path).unwrap_err().is_unavailable());

    fs::write(
        &path,
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note" type="xs:string"/>
</xs:schema>"#,
    )
    .unwrap();
    assert!(cache.validate(b"<note>hi</note>", &path).is_ok());
}

#[test]
fn cache_clear_forgets_entries() {
    let cache = SchemaCache::new();
    cache.get(schema_path()).unwrap();
    assert!(!cache.is_empty());
    cache.clear();
    assert!(cache.is_empty());
}
