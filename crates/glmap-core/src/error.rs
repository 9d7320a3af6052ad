//! Error types for glmap-core
//!
//! This module provides error handling for the allocation engine,
//! including error codes, detailed messages, and suggestions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Basis total is zero or negative
    InvalidBasis,
    /// Decimal arithmetic overflowed
    ArithmeticOverflow,
    /// Rounding scale out of range
    InvalidRounding,
    /// Validation error
    ValidationError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::InvalidBasis => write!(f, "INVALID_BASIS"),
            ErrorCode::ArithmeticOverflow => write!(f, "ARITHMETIC_OVERFLOW"),
            ErrorCode::InvalidRounding => write!(f, "INVALID_ROUNDING"),
            ErrorCode::ValidationError => write!(f, "VALIDATION_ERROR"),
        }
    }
}

/// Detailed error information for callers that surface errors to users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Suggestions for resolution
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ErrorDetails {
    /// Create a new error detail
    pub fn new(code: ErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            details: None,
            suggestions: vec![],
        }
    }

    /// Add detail information
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.details = Some(detail);
        self
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, "\nDetails: {}", details)?;
        }
        if !self.suggestions.is_empty() {
            write!(f, "\nSuggestions:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n  - {}", suggestion)?;
            }
        }
        Ok(())
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational
    Info,
    /// Warning - caller input needs attention
    Warning,
    /// Error - operation failed
    Error,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
        }
    }
}

/// Main error type for glmap-core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Basis total must be greater than zero (got {total})")]
    InvalidBasis { total: Decimal },

    #[error("Arithmetic overflow while computing {operation}")]
    ArithmeticOverflow { operation: String },

    #[error("Unsupported rounding scale: {scale} decimal places")]
    InvalidRounding { scale: u32 },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl CoreError {
    pub(crate) fn overflow(operation: &str) -> Self {
        CoreError::ArithmeticOverflow {
            operation: operation.to_string(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::InvalidBasis { .. } => ErrorCode::InvalidBasis,
            CoreError::ArithmeticOverflow { .. } => ErrorCode::ArithmeticOverflow,
            CoreError::InvalidRounding { .. } => ErrorCode::InvalidRounding,
            CoreError::ValidationError { .. } => ErrorCode::ValidationError,
        }
    }

    /// Get the severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoreError::InvalidBasis { .. } => ErrorSeverity::Warning,
            CoreError::ArithmeticOverflow { .. } => ErrorSeverity::Error,
            CoreError::InvalidRounding { .. } => ErrorSeverity::Error,
            CoreError::ValidationError { .. } => ErrorSeverity::Warning,
        }
    }

    /// Convert to detailed error info
    pub fn to_details(&self) -> ErrorDetails {
        let mut details = ErrorDetails::new(self.code(), self.to_string());

        match self {
            CoreError::InvalidBasis { total } => {
                details = details.with_detail(serde_json::json!({ "basis_total": total.to_string() }));
                details = details.with_suggestion(
                    "Provide nonzero datapoints for the basis metrics.".to_string(),
                );
            }
            CoreError::ArithmeticOverflow { operation } => {
                details = details.with_detail(serde_json::json!({ "operation": operation }));
                details = details.with_suggestion(
                    "Check the magnitude of the source amount and basis values.".to_string(),
                );
            }
            CoreError::InvalidRounding { .. } => {
                details = details.with_suggestion(format!(
                    "Use between 0 and {} decimal places.",
                    glmap_config::MAX_DECIMAL_PLACES
                ));
            }
            CoreError::ValidationError { message } => {
                details = details.with_suggestion(message.clone());
            }
        }

        details
    }
}

/// Result type with CoreError
pub type CoreResult<T> = Result<T, CoreError>;

/// Error context for reporting
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation being performed
    pub operation: String,
    /// Source account involved (if any)
    pub account_id: Option<String>,
    /// Period being computed (if any)
    pub period_id: Option<String>,
    /// Additional context data
    pub data: serde_json::Value,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            account_id: None,
            period_id: None,
            data: serde_json::json!({}),
        }
    }

    pub fn with_account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn with_period(mut self, period_id: Option<&str>) -> Self {
        self.period_id = period_id.map(str::to_string);
        self
    }

    /// Add context data
    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data[key] = value;
        self
    }
}

/// Error logger trait
pub trait ErrorLogger {
    /// Log an error
    fn log_error(&self, error: &CoreError, context: &ErrorContext);
    /// Log a warning
    fn log_warning(&self, message: &str, context: &ErrorContext);
    /// Log debug information
    fn log_debug(&self, message: &str, context: &ErrorContext);
}

/// Default error logger using log crate
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorLogger;

impl ErrorLogger for DefaultErrorLogger {
    fn log_error(&self, error: &CoreError, context: &ErrorContext) {
        let level = match error.severity() {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
        };
        log::log!(
            target: "glmap::error",
            level,
            "[{}] {} - Operation: {} - Account: {:?} - Period: {:?}",
            error.code(),
            error,
            context.operation,
            context.account_id,
            context.period_id
        );
    }

    fn log_warning(&self, message: &str, context: &ErrorContext) {
        log::warn!(
            target: "glmap::error",
            "WARNING: {} - Operation: {} - Account: {:?}",
            message,
            context.operation,
            context.account_id
        );
    }

    fn log_debug(&self, message: &str, context: &ErrorContext) {
        log::debug!(
            target: "glmap::error",
            "DEBUG: {} - Operation: {} - Account: {:?} - Data: {}",
            message,
            context.operation,
            context.account_id,
            context.data
        );
    }
}

// ==================== Tests ====================
