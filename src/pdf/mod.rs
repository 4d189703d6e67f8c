//! Embedding an invoice XML into a PDF as a PDF/A-3 associated file.
//!
//! The embedder never rewrites the source document. It appends an
//! incremental update (through [`lopdf::IncrementalDocument`]) holding the
//! `EmbeddedFile` stream, its `Filespec`, a new revision of the document
//! catalog with `/AF` and the `/Names /EmbeddedFiles` tree updated, and
//! optional XMP metadata. The closing cross-reference section has the same
//! kind as the source's. Every byte of the input stays at its original offset.
//!
//! ```no_run
//! use zugferd_pipeline::pdf::{embed_attachment, extract_attachment};
//!
//! let pdf = std::fs::read("invoice.pdf")?;
//! let xml = std::fs::read("invoice.xml")?;
//! let out = embed_attachment(&pdf, &xml, "ZUGFeRD invoice")?;
//! assert_eq!(extract_attachment(&out)?, xml);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod embed;
mod extract;
mod inspect;
mod xmp;

use std::io;

use thiserror::Error;

pub use embed::{EmbedOptions, embed_attachment, embed_attachment_with};
pub use extract::{extract_attachment, extract_named, list_attachments};
pub use inspect::{StructureError, StructureReport, XrefKind, inspect_structure};
pub use xmp::build_xmp;

/// File name of the invoice attachment.
pub const ATTACHMENT_FILENAME: &str = "ZUGFeRD-invoice.xml";

/// Value of `/AFRelationship` on the attachment.
pub const DEFAULT_RELATIONSHIP: &str = "Data";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmbedError {
    /// The input does not start with a `%PDF-` header.
    #[error("input is not a PDF document")]
    InvalidContainer,

    #[error("attachment payload is empty")]
    EmptyPayload,

    /// A newly allocated object number is already used by the document.
    #[error("object number {0} is already in use")]
    ObjectNumberCollision(u32),

    /// The PDF has a valid header but its structure cannot be read.
    #[error("malformed PDF: {0}")]
    MalformedDocument(String),

    /// The document carries an `/Encrypt` dictionary, which PDF/A-3 forbids.
    #[error("encrypted PDF documents cannot carry a PDF/A-3 attachment")]
    Encrypted,

    #[error("no embedded file named {0}")]
    AttachmentNotFound(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] io::Error),
}

impl From<lopdf::Error> for EmbedError {
    fn from(err: lopdf::Error) -> Self {
        EmbedError::MalformedDocument(err.to_string())
    }
}

pub(crate) fn check_header(pdf: &[u8]) -> Result<(), EmbedError> {
    if pdf.starts_with(b"%PDF-") {
        Ok(())
    } else {
        Err(EmbedError::InvalidContainer)
    }
}
