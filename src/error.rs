//! Error types for reliab-core.

use thiserror::Error;

/// Result type alias using reliab-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Specialisation of a provider-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    CostCeiling,
    Other,
}

/// Errors that can occur in the reliability evaluation platform.
#[derive(Error, Debug)]
pub enum Error {
    /// A raw record could not be parsed, or referenced an unknown domain.
    #[error("input error: {0}")]
    Input(String),

    /// A call to an LLM provider failed. `transient` failures are eligible
    /// for retry by the caller; `kind` further classifies rate-limit and
    /// cost-ceiling specialisations.
    #[error("provider error ({kind}, transient={transient}): {message}")]
    Provider {
        transient: bool,
        kind: ProviderErrorKind,
        message: String,
    },

    /// A judge prompt produced malformed output even after a parse-retry.
    #[error("judgement error: {0}")]
    Judgement(String),

    /// A checkpoint or event-log write failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A cancellation signal was observed between iterations or dispatches.
    #[error("cancellation requested")]
    Cancelled,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error surfaced from the persistence layer or scenario-bundle loader.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn provider(
        transient: bool,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            transient,
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::provider(true, ProviderErrorKind::RateLimited, message)
    }

    pub fn cost_ceiling(message: impl Into<String>) -> Self {
        Self::provider(false, ProviderErrorKind::CostCeiling, message)
    }

    pub fn judgement(message: impl Into<String>) -> Self {
        Self::Judgement(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True if a caller-level retry loop should attempt this call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Provider { transient: true, .. })
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::RateLimited => write!(f, "rate_limited"),
            ProviderErrorKind::CostCeiling => write!(f, "cost_ceiling"),
            ProviderErrorKind::Other => write!(f, "other"),
        }
    }
}
