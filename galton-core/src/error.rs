//! Structured errors and diagnostics
//!
//! Errors never crash the system. Plugins return them as values; the typed
//! API returns them through `Result`. Non-fatal conditions are reported as
//! [`Diagnostic`]s that travel alongside a result instead of aborting it.

use crate::TableError;
use serde::{Deserialize, Serialize};

/// Standard error codes (machine-readable)
pub mod codes {
    pub const TYPE_ERROR: &str = "TYPE_ERROR";
    pub const ARG_COUNT: &str = "ARG_COUNT";
    pub const ARG_TYPE: &str = "ARG_TYPE";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const DEGENERATE_SAMPLE: &str = "DEGENERATE_SAMPLE";
    pub const UNDEFINED_COLUMN: &str = "UNDEFINED_COLUMN";
    pub const UNDEFINED_FIELD: &str = "UNDEFINED_FIELD";
    pub const UNDEFINED_FUNC: &str = "UNDEFINED_FUNC";
    pub const INVALID_TABLE: &str = "INVALID_TABLE";
    pub const INTERNAL: &str = "INTERNAL";
    // Diagnostic codes
    pub const LARGE_SAMPLE: &str = "LARGE_SAMPLE";
    pub const VISUALIZATION_FAILED: &str = "VISUALIZATION_FAILED";
}

/// Severity level of an error or diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Computation continued, result may need a caveat
    Warning,
    /// Computation failed for this call
    Error,
    /// Engine cannot continue
    Fatal,
}

/// Context about where an error occurred
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Function or operation that raised the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// Table column involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Propagation notes
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub notes: Vec<String>,
}

/// Structured error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaltonError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Suggestion for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    /// Where the error occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Severity level
    pub severity: Severity,
}

impl GaltonError {
    /// Create a new error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            suggestion: None,
            context: None,
            severity: Severity::Error,
        }
    }

    /// Builder: add suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Builder: set function context
    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        ctx.function = Some(function.into());
        self
    }

    /// Builder: set column context
    pub fn in_column(mut self, column: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        ctx.column = Some(column.into());
        self
    }

    /// Builder: add propagation note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        ctx.notes.push(note.into());
        self
    }

    /// Builder: set severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    // ========== Common Error Constructors ==========

    pub fn type_error(expected: &str, got: &str) -> Self {
        Self::new(codes::TYPE_ERROR, format!("Expected {}, got {}", expected, got))
            .with_suggestion(format!("Convert value to {} or check the input", expected))
    }

    pub fn arg_count(func: &str, expected: usize, got: usize) -> Self {
        Self::new(codes::ARG_COUNT,
            format!("{}() expects {} arguments, got {}", func, expected, got))
            .with_suggestion(format!("Use help('{}') for usage", func))
    }

    pub fn arg_type(func: &str, arg: &str, expected: &str, got: &str) -> Self {
        Self::new(codes::ARG_TYPE,
            format!("{}() argument '{}': expected {}, got {}", func, arg, expected, got))
    }

    pub fn invalid_argument(details: impl Into<String>) -> Self {
        Self::new(codes::INVALID_ARGUMENT, format!("Invalid argument: {}", details.into()))
    }

    pub fn degenerate_sample(details: impl Into<String>) -> Self {
        Self::new(codes::DEGENERATE_SAMPLE, format!("Degenerate sample: {}", details.into()))
            .with_suggestion("Provide more observations with non-zero spread")
    }

    pub fn undefined_column(name: &str) -> Self {
        Self::new(codes::UNDEFINED_COLUMN, format!("Undefined column: {}", name))
            .with_suggestion(format!("Check that the table has a column named '{}'", name))
    }

    pub fn undefined_field(name: &str) -> Self {
        Self::new(codes::UNDEFINED_FIELD, format!("Undefined field: {}", name))
    }

    pub fn undefined_func(name: &str) -> Self {
        Self::new(codes::UNDEFINED_FUNC, format!("Unknown function: {}", name))
            .with_suggestion("Use help() to list available functions")
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, format!("Internal error: {}", details.into()))
            .with_suggestion("This is a bug, please report it")
            .with_severity(Severity::Fatal)
    }
}

impl std::fmt::Display for GaltonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " (suggestion: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for GaltonError {}

impl From<TableError> for GaltonError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::UnknownColumn(name) => Self::undefined_column(&name),
            TableError::NotNumeric(name) => Self::type_error("numeric column", "categorical column")
                .in_column(name),
            other => Self::new(codes::INVALID_TABLE, other.to_string()),
        }
    }
}

/// Non-fatal event reported alongside a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn large_sample(n: usize, limit: usize) -> Self {
        Self::warning(
            codes::LARGE_SAMPLE,
            format!("Sample size {} >= {}, Shapiro-Wilk might be too sensitive.", n, limit),
        )
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_suggestion() {
        let err = GaltonError::undefined_column("RT");
        let text = err.to_string();
        assert!(text.starts_with("[UNDEFINED_COLUMN]"));
        assert!(text.contains("suggestion"));
    }

    #[test]
    fn test_builders_fill_context() {
        let err = GaltonError::invalid_argument("bad")
            .in_function("outliers")
            .in_column("x")
            .with_note("while profiling");
        let ctx = err.context.unwrap();
        assert_eq!(ctx.function.as_deref(), Some("outliers"));
        assert_eq!(ctx.column.as_deref(), Some("x"));
        assert_eq!(ctx.notes.len(), 1);
    }

    #[test]
    fn test_table_error_conversion() {
        let err: GaltonError = TableError::UnknownColumn("Group".into()).into();
        assert!(err.is(codes::UNDEFINED_COLUMN));

        let err: GaltonError = TableError::NotNumeric("Group".into()).into();
        assert!(err.is(codes::TYPE_ERROR));

        let err: GaltonError = TableError::Ragged { column: "b".into(), expected: 3, got: 2 }.into();
        assert!(err.is(codes::INVALID_TABLE));
    }

    #[test]
    fn test_large_sample_diagnostic() {
        let d = Diagnostic::large_sample(6000, 5000);
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.code, codes::LARGE_SAMPLE);
        assert!(d.message.contains("6000"));
    }
}
