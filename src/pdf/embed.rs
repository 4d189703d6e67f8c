use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, IncrementalDocument, Object, ObjectId, Stream, dictionary};

use super::extract::filespec_name;
use super::{ATTACHMENT_FILENAME, DEFAULT_RELATIONSHIP, EmbedError, check_header, xmp};

/// Minimum header version for associated files.
const AF_VERSION: (u8, u8) = (1, 7);

/// Trailer keys that describe the previous cross-reference section only.
const STALE_TRAILER_KEYS: [&[u8]; 3] = [b"XRefStm", b"DecodeParms", b"Filter"];

/// How the attachment is described inside the PDF.
#[derive(Debug, Clone)]
pub struct EmbedOptions {
    pub filename: String,
    pub description: String,
    /// `/AFRelationship` name, `Data` for ZUGFeRD invoices.
    pub relationship: String,
    /// Written to `/Params /ModDate` and the XMP packet.
    pub modified: DateTime<Utc>,
    /// Add an XMP metadata stream when the catalog has none.
    pub write_xmp: bool,
    /// `fx:ConformanceLevel` in the XMP packet.
    pub conformance_level: String,
}

impl EmbedOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            filename: ATTACHMENT_FILENAME.to_string(),
            description: description.into(),
            relationship: DEFAULT_RELATIONSHIP.to_string(),
            modified: Utc::now(),
            write_xmp: true,
            conformance_level: "EN 16931".to_string(),
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = relationship.into();
        self
    }

    pub fn modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified = at;
        self
    }

    pub fn write_xmp(mut self, enabled: bool) -> Self {
        self.write_xmp = enabled;
        self
    }

    pub fn conformance_level(mut self, level: impl Into<String>) -> Self {
        self.conformance_level = level.into();
        self
    }
}

/// Embed `xml` into `pdf` as `ZUGFeRD-invoice.xml` with `/AFRelationship /Data`.
///
/// Returns a new PDF consisting of the original bytes followed by one
/// incremental update.
pub fn embed_attachment(pdf: &[u8], xml: &[u8], description: &str) -> Result<Vec<u8>, EmbedError> {
    embed_attachment_with(pdf, xml, &EmbedOptions::new(description))
}

/// [`embed_attachment`] with explicit options.
pub fn embed_attachment_with(
    pdf: &[u8],
    xml: &[u8],
    options: &EmbedOptions,
) -> Result<Vec<u8>, EmbedError> {
    check_header(pdf)?;
    if xml.is_empty() {
        return Err(EmbedError::EmptyPayload);
    }

    let doc = Document::load_mem(pdf)?;
    // PDF/A-3 forbids encryption, and lopdf would append unencrypted objects
    if doc.is_encrypted() {
        return Err(EmbedError::Encrypted);
    }
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| EmbedError::MalformedDocument("trailer has no /Root reference".into()))?;
    let mut catalog = doc.get_dictionary(catalog_id)?.clone();

    let mut ids = Allocator::new(&doc);
    let file_id = ids.next()?;
    let filespec_id = ids.next()?;
    let metadata_id = if options.write_xmp && !catalog.has(b"Metadata") {
        Some(ids.next()?)
    } else {
        None
    };
    let max_id = ids.last();

    append_af(&doc, &mut catalog, &options.filename, filespec_id)?;
    register_name(&doc, &mut catalog, options.filename.as_bytes(), filespec_id)?;
    if let Some(id) = metadata_id {
        catalog.set("Metadata", Object::Reference(id));
    }
    let version = if header_version(&doc.version).is_some_and(|v| v < AF_VERSION) {
        catalog.set("Version", Object::Name(b"1.7".to_vec()));
        "1.7".to_string()
    } else {
        doc.version.clone()
    };

    let mut update = IncrementalDocument::create_from(pdf.to_vec(), doc);
    let revision = &mut update.new_document;
    revision.version = version;
    revision.max_id = max_id;
    for key in STALE_TRAILER_KEYS {
        revision.trailer.remove(key);
    }
    revision.set_object(file_id, embedded_file(xml, options));
    revision.set_object(filespec_id, filespec(file_id, options));
    if let Some(id) = metadata_id {
        let packet = xmp::build_xmp(&options.filename, &options.conformance_level, options.modified);
        let metadata = Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            packet.into_bytes(),
        )
        .with_compression(false);
        revision.set_object(id, metadata);
    }
    revision.set_object(catalog_id, catalog);

    let mut out = Vec::with_capacity(pdf.len() + xml.len() + 8192);
    update.save_to(&mut out)?;

    tracing::info!(
        attachment = %options.filename,
        bytes = xml.len(),
        file = file_id.0,
        filespec = filespec_id.0,
        "embedded attachment as incremental update"
    );
    Ok(out)
}

/// Hands out object numbers above every number the document uses or
/// declares in its trailer.
struct Allocator<'a> {
    doc: &'a Document,
    next: u32,
}

impl<'a> Allocator<'a> {
    fn new(doc: &'a Document) -> Self {
        let highest_object = doc.objects.keys().map(|(num, _)| *num).max().unwrap_or(0);
        let declared = doc
            .trailer
            .get(b"Size")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|size| u32::try_from(size).ok())
            .map_or(0, |size| size.saturating_sub(1));
        let next = highest_object.max(declared).max(doc.max_id) + 1;
        Self { doc, next }
    }

    fn next(&mut self) -> Result<ObjectId, EmbedError> {
        let num = self.next;
        if self.doc.objects.keys().any(|(n, _)| *n == num) {
            return Err(EmbedError::ObjectNumberCollision(num));
        }
        self.next += 1;
        Ok((num, 0))
    }

    /// Highest number handed out so far.
    fn last(&self) -> u32 {
        self.next - 1
    }
}

fn embedded_file(xml: &[u8], options: &EmbedOptions) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "EmbeddedFile",
            "Subtype" => Object::Name(b"text/xml".to_vec()),
            "Params" => dictionary! {
                "ModDate" => Object::from(options.modified),
                "Size" => Object::Integer(xml.len() as i64),
            },
        },
        xml.to_vec(),
    )
}

fn filespec(file_id: ObjectId, options: &EmbedOptions) -> Dictionary {
    dictionary! {
        "Type" => "Filespec",
        "F" => Object::string_literal(options.filename.as_str()),
        "UF" => lopdf::text_string(&options.filename),
        "Desc" => lopdf::text_string(&options.description),
        "AFRelationship" => Object::Name(options.relationship.as_bytes().to_vec()),
        "EF" => dictionary! {
            "F" => Object::Reference(file_id),
            "UF" => Object::Reference(file_id),
        },
    }
}

/// Append the filespec to the catalog's `/AF` array. Entries for other
/// files are kept; an earlier entry with the same file name is dropped.
fn append_af(
    doc: &Document,
    catalog: &mut Dictionary,
    name: &str,
    filespec_id: ObjectId,
) -> Result<(), EmbedError> {
    let mut af = match catalog.get(b"AF") {
        Ok(obj) => resolve(doc, obj)?
            .as_array()
            .map_err(|_| EmbedError::MalformedDocument("/AF is not an array".into()))?
            .clone(),
        Err(_) => Vec::new(),
    };
    af.retain(|entry| {
        let existing = resolve(doc, entry)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
            .map(filespec_name);
        !existing.is_some_and(|n| n.eq_ignore_ascii_case(name))
    });
    af.push(Object::Reference(filespec_id));
    catalog.set("AF", af);
    Ok(())
}

/// Insert `(name, filespec)` into `/Names /EmbeddedFiles`, keeping the
/// name array sorted. Existing entries under other names are preserved; an
/// entry with the same name is replaced.
fn register_name(
    doc: &Document,
    catalog: &mut Dictionary,
    name: &[u8],
    filespec_id: ObjectId,
) -> Result<(), EmbedError> {
    let mut names = match catalog.get(b"Names") {
        Ok(obj) => resolve_dict(doc, obj, "/Names")?.clone(),
        Err(_) => Dictionary::new(),
    };
    let mut tree = match names.get(b"EmbeddedFiles") {
        Ok(obj) => resolve_dict(doc, obj, "/EmbeddedFiles")?.clone(),
        Err(_) => Dictionary::new(),
    };
    if tree.has(b"Kids") {
        tracing::warn!("EmbeddedFiles name tree has intermediate nodes; attachment is only listed in /AF");
        return Ok(());
    }

    let mut pairs = match tree.get(b"Names") {
        Ok(obj) => name_pairs(resolve(doc, obj)?)?,
        Err(_) => Vec::new(),
    };
    pairs.retain(|(key, _)| key.as_slice() != name);
    let at = pairs.partition_point(|(key, _)| key.as_slice() < name);
    pairs.insert(at, (name.to_vec(), Object::Reference(filespec_id)));

    let flat: Vec<Object> = pairs
        .into_iter()
        .flat_map(|(key, value)| [Object::string_literal(key), value])
        .collect();
    tree.set("Names", flat);
    names.set("EmbeddedFiles", tree);
    catalog.set("Names", names);
    Ok(())
}

fn name_pairs(array: &Object) -> Result<Vec<(Vec<u8>, Object)>, EmbedError> {
    let items = array
        .as_array()
        .map_err(|_| EmbedError::MalformedDocument("/EmbeddedFiles /Names is not an array".into()))?;
    Ok(items
        .chunks_exact(2)
        .filter_map(|pair| match &pair[0] {
            Object::String(key, _) => Some((key.clone(), pair[1].clone())),
            _ => None,
        })
        .collect())
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, EmbedError> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object, what: &str) -> Result<&'a Dictionary, EmbedError> {
    resolve(doc, obj)?
        .as_dict()
        .map_err(|_| EmbedError::MalformedDocument(format!("{what} is not a dictionary")))
}

fn header_version(version: &str) -> Option<(u8, u8)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_version() {
        assert_eq!(header_version("1.4"), Some((1, 4)));
        assert_eq!(header_version("2.0"), Some((2, 0)));
        assert_eq!(header_version("x"), None);
        assert!(header_version("1.4").unwrap() < AF_VERSION);
    }

    #[test]
    fn rejects_non_pdf_and_empty_payload() {
        assert!(matches!(
            embed_attachment(b"not a pdf", b"<a/>", "x"),
            Err(EmbedError::InvalidContainer)
        ));
        assert!(matches!(
            embed_attachment(b"%PDF-1.4\n", b"", "x"),
            Err(EmbedError::EmptyPayload)
        ));
    }

    #[test]
    fn truncated_pdf_is_malformed() {
        assert!(matches!(
            embed_attachment(b"%PDF-1.4\n1 0 obj\n<<", b"<a/>", "x"),
            Err(EmbedError::MalformedDocument(_))
        ));
    }

    #[test]
    fn name_pairs_skip_non_string_keys() {
        let array = Object::Array(vec![
            Object::string_literal("b.xml"),
            Object::Reference((3, 0)),
            Object::Integer(1),
            Object::Reference((4, 0)),
        ]);
        let pairs = name_pairs(&array).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, b"b.xml");
    }
}
