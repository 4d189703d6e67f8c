use thiserror::Error;

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "seller.address.country").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// Short rule tag if applicable (e.g. "BR-02").
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule tag.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error with a rule tag.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}

/// Business-rule or required-field violations found before mapping.
///
/// Carries every error found, never just the first. Recoverable by the
/// caller correcting the input.
#[derive(Debug, Clone, Error)]
#[error("validation failed: {}", join_errors(.errors))]
pub struct ValidationFailure {
    pub errors: Vec<ValidationError>,
}

impl ValidationFailure {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    /// Whether any error refers to `field` (exact path match).
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl From<ValidationError> for ValidationFailure {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Arithmetic that left the range of [`rust_decimal::Decimal`].
///
/// `field` uses the same dotted paths as [`ValidationError::field`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{field}: amount exceeds the representable decimal range")]
    Overflow { field: String },
}

impl LedgerError {
    /// Prefix the field path, e.g. `net_amount` → `lines[3].net_amount`.
    pub fn within(self, prefix: &str) -> Self {
        match self {
            Self::Overflow { field } => Self::Overflow {
                field: format!("{prefix}.{field}"),
            },
        }
    }
}

impl From<LedgerError> for ValidationError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Overflow { field } => {
                ValidationError::new(field, "amount exceeds the representable decimal range")
            }
        }
    }
}

impl From<LedgerError> for ValidationFailure {
    fn from(error: LedgerError) -> Self {
        ValidationError::from(error).into()
    }
}
