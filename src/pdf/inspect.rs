use lopdf::xref::XrefType;
use lopdf::{Document, Object};
use thiserror::Error;

use super::extract::{self, Listing};

/// Kind of cross-reference section the last revision ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    /// `xref` keyword followed by fixed-width entries.
    Table,
    /// A `/Type /XRef` stream object (PDF 1.5+).
    Stream,
}

impl From<XrefType> for XrefKind {
    fn from(kind: XrefType) -> Self {
        match kind {
            XrefType::CrossReferenceTable => XrefKind::Table,
            XrefType::CrossReferenceStream => XrefKind::Stream,
        }
    }
}

/// Summary of a PDF that passed [`inspect_structure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureReport {
    pub version: String,
    pub objects: usize,
    pub xref: XrefKind,
    /// Names of embedded files, `/AF` entries first.
    pub attachments: Vec<String>,
}

impl StructureReport {
    pub fn has_attachment(&self, name: &str) -> bool {
        self.attachments.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Error)]
#[error("PDF structure check failed: {}", .issues.join("; "))]
pub struct StructureError {
    pub issues: Vec<String>,
}

impl StructureError {
    fn single(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}

/// Check the container and attachment wiring of a PDF.
///
/// Verifies the header and `%%EOF` marker, that the document loads with
/// its trailer `/Root` pointing at a catalog, that `/Size` covers every
/// object number, and that each attached file has a filespec with
/// `/AFRelationship` whose `/EF` entry is an `EmbeddedFile` stream of the
/// declared size. Files listed in `/AF` must also appear in the
/// `/Names /EmbeddedFiles` tree. All problems found are reported together.
pub fn inspect_structure(pdf: &[u8]) -> Result<StructureReport, StructureError> {
    if !pdf.starts_with(b"%PDF-") {
        return Err(StructureError::single("missing %PDF- header"));
    }
    let tail = &pdf[pdf.len().saturating_sub(1024)..];
    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err(StructureError::single("missing %%EOF marker"));
    }
    let doc = Document::load_mem(pdf)
        .map_err(|e| StructureError::single(format!("document does not load: {e}")))?;
    let kind = XrefKind::from(doc.reference_table.cross_reference_type);

    let mut issues = Vec::new();
    match doc.trailer.get(b"Root").and_then(Object::as_reference) {
        Ok(root) => match doc.get_dictionary(root) {
            Ok(catalog) if is_name(catalog.get(b"Type").ok(), b"Catalog") => {}
            Ok(_) => issues.push("/Root is not a /Type /Catalog dictionary".to_string()),
            Err(_) => issues.push(format!("/Root {} {} R does not resolve", root.0, root.1)),
        },
        Err(_) => issues.push("trailer has no /Root reference".to_string()),
    }

    let highest = doc.objects.keys().map(|(num, _)| *num).max().unwrap_or(0);
    match doc.trailer.get(b"Size").and_then(Object::as_i64) {
        Ok(size) if size > i64::from(highest) => {}
        Ok(size) => issues.push(format!("trailer /Size {size} does not exceed object number {highest}")),
        Err(_) => issues.push("trailer has no /Size".to_string()),
    }

    let attachments = extract::collect(&doc);
    for attachment in &attachments {
        check_filespec(&doc, attachment, &mut issues);
    }
    for af in attachments.iter().filter(|a| a.listing == Listing::AssociatedFiles) {
        let listed = attachments
            .iter()
            .any(|a| a.listing == Listing::NameTree && a.name == af.name);
        if !listed {
            issues.push(format!("{} is in /AF but not in /EmbeddedFiles", af.name));
        }
    }

    if !issues.is_empty() {
        tracing::warn!(issues = issues.len(), "PDF structure check failed");
        return Err(StructureError { issues });
    }

    let mut names: Vec<String> = Vec::new();
    for attachment in attachments {
        if !names.contains(&attachment.name) {
            names.push(attachment.name);
        }
    }
    Ok(StructureReport {
        version: doc.version.clone(),
        objects: doc.objects.len(),
        xref: kind,
        attachments: names,
    })
}

fn check_filespec(doc: &Document, attachment: &extract::Attachment<'_>, issues: &mut Vec<String>) {
    let name = if attachment.name.is_empty() {
        "<unnamed>"
    } else {
        attachment.name.as_str()
    };
    let filespec = attachment.filespec;
    if !is_name(filespec.get(b"Type").ok(), b"Filespec") {
        issues.push(format!("{name}: filespec lacks /Type /Filespec"));
    }
    if attachment.listing == Listing::AssociatedFiles && !filespec.has(b"AFRelationship") {
        issues.push(format!("{name}: filespec lacks /AFRelationship"));
    }

    let stream = filespec
        .get(b"EF")
        .ok()
        .and_then(|obj| extract::resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|ef| ef.get(b"F").ok())
        .and_then(|obj| extract::resolve(doc, obj))
        .and_then(|obj| obj.as_stream().ok());
    let Some(stream) = stream else {
        issues.push(format!("{name}: /EF /F does not resolve to a stream"));
        return;
    };
    if !is_name(stream.dict.get(b"Type").ok(), b"EmbeddedFile") {
        issues.push(format!("{name}: stream lacks /Type /EmbeddedFile"));
    }
    let declared = stream
        .dict
        .get(b"Params")
        .ok()
        .and_then(|obj| extract::resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|params| params.get(b"Size").ok())
        .and_then(|size| size.as_i64().ok());
    if let Some(declared) = declared {
        let actual = extract::content(doc, filespec).map(|c| c.len()).unwrap_or(0);
        if usize::try_from(declared).ok() != Some(actual) {
            issues.push(format!("{name}: /Params /Size {declared} but content has {actual} bytes"));
        }
    }
}

fn is_name(obj: Option<&Object>, expected: &[u8]) -> bool {
    matches!(obj, Some(Object::Name(name)) if name.as_slice() == expected)
}
