//! The compliance pipeline: map → encode → XSD-validate → embed → PDF-validate.
//!
//! Each stage runs once. The first failure stops the run and is reported as
//! a [`PipelineError`] naming the stage that could not be completed, with the
//! stage's own error as the cause. Nothing is written to disk unless every
//! stage succeeded.
//!
//! ```no_run
//! use zugferd_pipeline::config::PipelineConfig;
//! use zugferd_pipeline::pipeline::CompliancePipeline;
//! # fn invoice() -> zugferd_pipeline::core::InvoiceDocument { unimplemented!() }
//!
//! let config = PipelineConfig::from_file("pipeline.toml")?;
//! let pipeline = CompliancePipeline::new(config);
//! let base_pdf = std::fs::read("rendered.pdf")?;
//! let output = pipeline.run_to_file(&invoice(), &base_pdf, "out/invoice.pdf")?;
//! println!("{} bytes of XML embedded", output.xml.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use crate::cii::{self, EncodingError, MappingError, ZugferdProfile};
use crate::config::{CommandConfig, PipelineConfig};
use crate::core::{InvoiceDocument, ValidationFailure, prepare_invoice};
use crate::pdf::{self, EmbedError, EmbedOptions, StructureError};
use crate::xsd::{SchemaCache, SchemaError};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Mapped,
    Encoded,
    XmlValidated,
    Embedded,
    PdfValidated,
    /// Output handed to the caller (or persisted).
    Done,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Mapped,
        Stage::Encoded,
        Stage::XmlValidated,
        Stage::Embedded,
        Stage::PdfValidated,
        Stage::Done,
    ];

    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self as usize + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Mapped => "mapping",
            Stage::Encoded => "encoding",
            Stage::XmlValidated => "xml validation",
            Stage::Embedded => "embedding",
            Stage::PdfValidated => "pdf validation",
            Stage::Done => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying failure of a stage, passed through unchanged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StageError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    PdfValidation(#[from] PdfValidationError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// `stage` is the stage that was not reached.
#[derive(Debug, Error)]
#[error("compliance pipeline failed during {stage}: {cause}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub cause: StageError,
}

impl PipelineError {
    fn at<E: Into<StageError>>(stage: Stage) -> impl FnOnce(E) -> Self {
        move |err| {
            let cause = err.into();
            tracing::warn!(%stage, error = %cause, "compliance pipeline stage failed");
            Self { stage, cause }
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PdfValidationError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("PDF has no attachment named {0}")]
    MissingAttachment(String),

    #[error("could not run {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} rejected the PDF (exit status {status:?}): {output}", .program.display())]
    Rejected {
        program: PathBuf,
        status: Option<i32>,
        output: String,
    },
}

/// Final check on the embedded PDF.
pub trait PdfValidator: Send + Sync {
    fn validate(&self, pdf: &[u8]) -> Result<(), PdfValidationError>;
}

/// Built-in check: container structure plus presence of the attachment.
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    attachment: String,
}

impl StructuralValidator {
    pub fn new(attachment: impl Into<String>) -> Self {
        Self {
            attachment: attachment.into(),
        }
    }
}

impl Default for StructuralValidator {
    fn default() -> Self {
        Self::new(pdf::ATTACHMENT_FILENAME)
    }
}

impl PdfValidator for StructuralValidator {
    fn validate(&self, pdf: &[u8]) -> Result<(), PdfValidationError> {
        let report = pdf::inspect_structure(pdf)?;
        if !report.has_attachment(&self.attachment) {
            return Err(PdfValidationError::MissingAttachment(self.attachment.clone()));
        }
        tracing::debug!(objects = report.objects, xref = ?report.xref, "PDF structure ok");
        Ok(())
    }
}

/// Runs an external validator (e.g. `pdfcpu validate`) on a temporary copy
/// of the PDF. A non-zero exit status rejects the document.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandValidator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl From<&CommandConfig> for CommandValidator {
    fn from(config: &CommandConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }
}

impl PdfValidator for CommandValidator {
    fn validate(&self, pdf: &[u8]) -> Result<(), PdfValidationError> {
        let launch = |source| PdfValidationError::Launch {
            program: self.program.clone(),
            source,
        };
        let mut file = tempfile::Builder::new()
            .prefix("zugferd-")
            .suffix(".pdf")
            .tempfile()
            .map_err(launch)?;
        file.write_all(pdf).map_err(launch)?;
        file.flush().map_err(launch)?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .output()
            .map_err(launch)?;
        if output.status.success() {
            return Ok(());
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(PdfValidationError::Rejected {
            program: self.program.clone(),
            status: output.status.code(),
            output: text.trim().to_string(),
        })
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The CII XML, identical across runs for the same invoice.
    pub xml: Vec<u8>,
    /// The base PDF with the XML attached.
    pub pdf: Vec<u8>,
}

pub struct CompliancePipeline {
    config: PipelineConfig,
    schemas: Arc<SchemaCache>,
    validator: Box<dyn PdfValidator>,
}

impl fmt::Debug for CompliancePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompliancePipeline")
            .field("config", &self.config)
            .field("schemas", &self.schemas)
            .finish_non_exhaustive()
    }
}

impl CompliancePipeline {
    /// Pipeline with its own schema cache. Uses the configured external
    /// validator, or the structural check when none is configured.
    pub fn new(config: PipelineConfig) -> Self {
        let validator: Box<dyn PdfValidator> = match &config.pdf_validator {
            Some(command) => Box::new(CommandValidator::from(command)),
            None => Box::new(StructuralValidator::new(&config.attachment.filename)),
        };
        Self {
            config,
            schemas: Arc::new(SchemaCache::new()),
            validator,
        }
    }

    /// Share a schema cache with other pipelines.
    pub fn with_schema_cache(mut self, schemas: Arc<SchemaCache>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn with_validator(mut self, validator: impl PdfValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Apply configured defaults and tax rules, recompute totals and
    /// validate. Callers run this before [`run`](Self::run) when the invoice
    /// comes from an unvalidated source.
    pub fn prepare(
        &self,
        invoice: InvoiceDocument,
        today: NaiveDate,
    ) -> Result<InvoiceDocument, ValidationFailure> {
        prepare_invoice(invoice, &self.config.defaults, &self.config.tax_rules(), today)
    }

    /// Map, encode and schema-validate. Returns the XML bytes.
    pub fn generate_xml(&self, invoice: &InvoiceDocument) -> Result<Vec<u8>, PipelineError> {
        let tree = cii::map_to_compliance_tree(invoice).map_err(PipelineError::at(Stage::Mapped))?;
        tracing::debug!(stage = %Stage::Mapped, "stage complete");

        let xml = cii::encode_xml(&tree).map_err(PipelineError::at(Stage::Encoded))?;
        tracing::debug!(stage = %Stage::Encoded, bytes = xml.len(), "stage complete");

        self.schemas
            .validate(&xml, &self.config.schema_path)
            .map_err(PipelineError::at(Stage::XmlValidated))?;
        tracing::debug!(stage = %Stage::XmlValidated, "stage complete");
        Ok(xml)
    }

    /// Run every stage on an in-memory base PDF.
    pub fn run(
        &self,
        invoice: &InvoiceDocument,
        base_pdf: &[u8],
    ) -> Result<PipelineOutput, PipelineError> {
        let _span = tracing::info_span!("compliance_pipeline", invoice = %invoice.number).entered();

        let xml = self.generate_xml(invoice)?;

        let pdf = pdf::embed_attachment_with(base_pdf, &xml, &self.embed_options(invoice))
            .map_err(PipelineError::at(Stage::Embedded))?;
        tracing::debug!(stage = %Stage::Embedded, bytes = pdf.len(), "stage complete");

        self.validator
            .validate(&pdf)
            .map_err(PipelineError::at(Stage::PdfValidated))?;

        tracing::info!(xml_bytes = xml.len(), pdf_bytes = pdf.len(), "compliance pipeline done");
        Ok(PipelineOutput { xml, pdf })
    }

    /// [`run`](Self::run), then write the PDF to `dest` atomically. The
    /// destination is untouched if any stage fails.
    pub fn run_to_file(
        &self,
        invoice: &InvoiceDocument,
        base_pdf: &[u8],
        dest: impl AsRef<Path>,
    ) -> Result<PipelineOutput, PipelineError> {
        let output = self.run(invoice, base_pdf)?;
        persist_atomically(dest.as_ref(), &output.pdf).map_err(PipelineError::at(Stage::Done))?;
        Ok(output)
    }

    fn embed_options(&self, invoice: &InvoiceDocument) -> EmbedOptions {
        let level = ZugferdProfile::parse(&invoice.profile)
            .map_or("EN 16931", |profile| profile.conformance_level());
        self.config.attachment.embed_options(level)
    }
}

/// One-shot run with default configuration and the schema at `schema_path`.
/// Returns the embedded PDF bytes.
pub fn run_compliance_pipeline(
    invoice: &InvoiceDocument,
    base_pdf: &[u8],
    schema_path: impl Into<PathBuf>,
) -> Result<Vec<u8>, PipelineError> {
    let config = PipelineConfig {
        schema_path: schema_path.into(),
        ..PipelineConfig::default()
    };
    CompliancePipeline::new(config)
        .run(invoice, base_pdf)
        .map(|output| output.pdf)
}

/// Attach the XML file at `xml_path` to the PDF at `pdf_path`, replacing the
/// PDF in place.
pub fn embed_invoice_file(
    pdf_path: impl AsRef<Path>,
    xml_path: impl AsRef<Path>,
    description: &str,
) -> Result<(), EmbedError> {
    let pdf_path = pdf_path.as_ref();
    let pdf = fs::read(pdf_path)?;
    let xml = fs::read(xml_path.as_ref())?;
    let output = pdf::embed_attachment(&pdf, &xml, description)?;
    persist_atomically(pdf_path, &output)?;
    Ok(())
}

/// Write `bytes` to a temporary file next to `path`, then rename it over
/// `path`. Readers never observe a partially written file.
pub fn persist_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "persisted output");
    Ok(())
}
