use thiserror::Error;

/// Caller-visible rejections raised by domain rules.
///
/// Every variant carries a short machine-readable reason. None of them
/// leave partial state behind: they are raised before any mutation, or the
/// mutation they guard is rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The caller lacks the required relationship (member, creator, owner).
    #[error("{0}")]
    Unauthorized(String),

    /// Duplicate action or exhausted capacity.
    #[error("{0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
