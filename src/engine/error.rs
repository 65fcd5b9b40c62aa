use std::fmt::Display;

use crate::directory::DirectoryError;
use crate::rules::RuleViolation;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// Well-formed request that breaks a booking or filter rule.
    #[error("{0}")]
    BusinessRule(String),
    /// Caller is not the owner of the resource, or not the identity it asked about.
    #[error("{0}")]
    Ownership(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn business(msg: impl Into<String>) -> Self {
        EngineError::BusinessRule(msg.into())
    }
}

impl From<RuleViolation> for EngineError {
    fn from(v: RuleViolation) -> Self {
        EngineError::BusinessRule(v.0)
    }
}
