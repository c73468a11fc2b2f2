//! Field value validation, applied before any tier mutation.

use thiserror::Error;

use crate::types::FieldName;

/// A proposed field value failed validation; nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value for field '{field}' rejected: {reason}")]
pub struct ValidationError {
    pub field: FieldName,
    pub reason: String,
}

/// Limits a proposed value must satisfy before it reaches the field store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLimits {
    pub max_bytes: usize,
}

impl Default for ValueLimits {
    fn default() -> Self {
        Self {
            max_bytes: crate::config::DEFAULT_MAX_FIELD_BYTES,
        }
    }
}

impl ValueLimits {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Check a proposed value. Control characters other than tab and newline
    /// never survive a round trip through the content API, so they are
    /// rejected here rather than stored.
    pub fn check(&self, field: &FieldName, value: &str) -> Result<(), ValidationError> {
        if value.len() > self.max_bytes {
            return Err(ValidationError {
                field: field.clone(),
                reason: format!("{} bytes exceeds limit of {}", value.len(), self.max_bytes),
            });
        }
        if let Some(bad) = value
            .chars()
            .find(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        {
            return Err(ValidationError {
                field: field.clone(),
                reason: format!("contains control character {:?}", bad),
            });
        }
        Ok(())
    }
}
