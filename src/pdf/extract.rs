use lopdf::{Dictionary, Document, Object, decode_text_string};

use super::{ATTACHMENT_FILENAME, EmbedError, check_header};

/// Where an attachment was found in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Listing {
    AssociatedFiles,
    NameTree,
}

pub(crate) struct Attachment<'a> {
    pub name: String,
    pub filespec: &'a Dictionary,
    pub listing: Listing,
}

/// Extract the invoice XML from a PDF.
///
/// Looks for `ZUGFeRD-invoice.xml` first, then for any attachment whose name
/// mentions ZUGFeRD, Factur-X or XRechnung. `/AF` is searched before the
/// `/Names /EmbeddedFiles` tree.
pub fn extract_attachment(pdf: &[u8]) -> Result<Vec<u8>, EmbedError> {
    let doc = load(pdf)?;
    let found = collect(&doc);
    found
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(ATTACHMENT_FILENAME))
        .or_else(|| found.iter().find(|a| is_invoice_filename(&a.name)))
        .ok_or_else(|| EmbedError::AttachmentNotFound(ATTACHMENT_FILENAME.into()))
        .and_then(|a| content(&doc, a.filespec))
}

/// Extract the attachment called `name` (compared case-insensitively).
pub fn extract_named(pdf: &[u8], name: &str) -> Result<Vec<u8>, EmbedError> {
    let doc = load(pdf)?;
    let found = collect(&doc);
    let attachment = found
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| EmbedError::AttachmentNotFound(name.into()))?;
    content(&doc, attachment.filespec)
}

/// Names of all embedded files, `/AF` entries first, without duplicates.
pub fn list_attachments(pdf: &[u8]) -> Result<Vec<String>, EmbedError> {
    let doc = load(pdf)?;
    let mut names: Vec<String> = Vec::new();
    for attachment in collect(&doc) {
        if !names.contains(&attachment.name) {
            names.push(attachment.name);
        }
    }
    Ok(names)
}

fn load(pdf: &[u8]) -> Result<Document, EmbedError> {
    check_header(pdf)?;
    Ok(Document::load_mem(pdf)?)
}

pub(crate) fn collect(doc: &Document) -> Vec<Attachment<'_>> {
    let mut found = Vec::new();
    let Ok(catalog) = doc.catalog() else {
        return found;
    };

    if let Some(af) = catalog
        .get(b"AF")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
    {
        for entry in af {
            if let Some(filespec) = resolve(doc, entry).and_then(|o| o.as_dict().ok()) {
                found.push(Attachment {
                    name: filespec_name(filespec),
                    filespec,
                    listing: Listing::AssociatedFiles,
                });
            }
        }
    }

    let names = catalog
        .get(b"Names")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|names| names.get(b"EmbeddedFiles").ok())
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|tree| tree.get(b"Names").ok())
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok());
    if let Some(names) = names {
        // [name1 ref1 name2 ref2 ...]
        for pair in names.chunks_exact(2) {
            let Ok(key) = decode_text_string(&pair[0]) else {
                continue;
            };
            if let Some(filespec) = resolve(doc, &pair[1]).and_then(|o| o.as_dict().ok()) {
                found.push(Attachment {
                    name: key,
                    filespec,
                    listing: Listing::NameTree,
                });
            }
        }
    }
    found
}

/// Uncompressed bytes of the file a filespec points to.
pub(crate) fn content(doc: &Document, filespec: &Dictionary) -> Result<Vec<u8>, EmbedError> {
    let malformed = |what: &str| EmbedError::MalformedDocument(format!("filespec has no {what}"));
    let ef = filespec
        .get(b"EF")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| malformed("/EF dictionary"))?;
    let stream = ef
        .get(b"F")
        .or_else(|_| ef.get(b"UF"))
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_stream().ok())
        .ok_or_else(|| malformed("embedded file stream"))?;
    // decompressed_content() fails when there is no /Filter
    Ok(stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone()))
}

pub(crate) fn filespec_name(filespec: &Dictionary) -> String {
    filespec
        .get(b"UF")
        .or_else(|_| filespec.get(b"F"))
        .and_then(decode_text_string)
        .unwrap_or_default()
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn is_invoice_filename(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("zugferd") || lower.contains("factur-x") || lower.contains("xrechnung")
}
