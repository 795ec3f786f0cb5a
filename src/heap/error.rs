use thiserror::Error;

use crate::field::FieldId;

/// Errors returned by [`MemHeap`](super::MemHeap) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The field is not in the catalog, cannot be read from the record, or
    /// cannot be aggregated with the requested kind.
    #[error("unknown field {0}")]
    UnknownField(FieldId),

    #[error("record is not allocated")]
    RecordNotAllocated,

    #[error("heap holds no groups")]
    Empty,

    #[error("end of result set")]
    End,

    #[error("dependency cycle while resolving {0}")]
    DependencyCycle(FieldId),
}

impl HeapError {
    /// Whether this error just terminates a cursor walk.
    pub fn is_iteration_end(&self) -> bool {
        matches!(self, Self::Empty | Self::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_end_classification() {
        assert!(HeapError::Empty.is_iteration_end());
        assert!(HeapError::End.is_iteration_end());
        assert!(!HeapError::RecordNotAllocated.is_iteration_end());
        assert!(!HeapError::UnknownField(FieldId::DOCTETS).is_iteration_end());
    }

    #[test]
    fn test_display_names_field() {
        assert_eq!(
            HeapError::UnknownField(FieldId::DOCTETS).to_string(),
            "unknown field bytes"
        );
    }
}
