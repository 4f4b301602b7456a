//! Error types for mlrguard.
//!
//! All errors are explicitly typed using thiserror. Only configuration and
//! input errors ever leave `analyze_content`; collaborator and per-pattern
//! failures are absorbed and surfaced as degraded-mode flags or log events.

use thiserror::Error;

/// Central error type for all mlrguard operations.
#[derive(Debug, Error)]
pub enum MlrError {
    /// The validation context is missing a mandatory field.
    #[error("Invalid validation context: {0}")]
    InvalidContext(String),

    /// A pattern in the library failed to compile.
    #[error("Pattern {index} failed to compile: {source}")]
    PatternCompile {
        /// Position of the pattern in its configuration list.
        index: usize,
        #[source]
        source: regex::Error,
    },

    /// Configuration error (unreadable pattern file, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A brand rule or guideline collaborator reported a failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A collaborator call exceeded its time budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The analysis was cancelled or ran past its deadline.
    #[error("Analysis cancelled")]
    Cancelled,

    /// An override named a claim that is not part of the result.
    #[error("No claim with id {0}")]
    OverrideTarget(String),

    /// Internal state error (poisoned task, cache failure).
    #[error("Internal state error: {0}")]
    InternalState(String),
}

impl MlrError {
    /// Log error with full context using tracing.
    pub fn log_with_context(&self, context: &ErrorContext) {
        match self {
            Self::PatternCompile { .. } | Self::Config(_) | Self::InternalState(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    brand_id = ?context.brand_id,
                    operation = %context.operation,
                    "Configuration error"
                );
            }
            Self::Provider(_) | Self::Http(_) | Self::Timeout { .. } => {
                tracing::warn!(
                    error = %self,
                    request_id = %context.request_id,
                    brand_id = ?context.brand_id,
                    operation = %context.operation,
                    "Collaborator unavailable, falling back to defaults"
                );
            }
            Self::InvalidContext(_) | Self::OverrideTarget(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Invalid input"
                );
            }
            Self::Json(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    brand_id = ?context.brand_id,
                    operation = %context.operation,
                    "Data processing error"
                );
            }
            Self::Cancelled => {
                tracing::info!(
                    request_id = %context.request_id,
                    brand_id = ?context.brand_id,
                    operation = %context.operation,
                    "Analysis cancelled"
                );
            }
        }
    }

    /// Whether analysis can continue with defaults after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Http(_) | Self::Timeout { .. } | Self::Json(_)
        )
    }

    /// Get user-friendly error message (hides internal details)
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidContext(_) => "A brand must be selected before analysis",
            Self::PatternCompile { .. } | Self::Config(_) => "Compliance rules are misconfigured",
            Self::Provider(_) | Self::Http(_) | Self::Timeout { .. } => {
                "Brand guidelines temporarily unavailable"
            }
            Self::Json(_) => "Data format error",
            Self::Cancelled => "Analysis was cancelled",
            Self::OverrideTarget(_) => "The selected finding no longer exists",
            Self::InternalState(_) => "Internal service error",
        }
    }
}

/// Context information for error logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Unique request identifier for correlation
    pub request_id: String,
    /// Brand under analysis, if known
    pub brand_id: Option<String>,
    /// Operation being performed
    pub operation: String,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            brand_id: None,
            operation: operation.into(),
        }
    }

    pub fn with_brand_id(mut self, brand_id: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Result type alias for mlrguard operations.
pub type Result<T> = std::result::Result<T, MlrError>;
