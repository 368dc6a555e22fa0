//! Explicit soft-failure outcome for collaborator calls.

use crate::provenance::FallbackReason;

/// Result of a stage that may substitute a default instead of failing.
///
/// `Degraded` carries both the substitute value and the reason, so a caller
/// cannot mistake silence for success.
#[derive(Debug, Clone, PartialEq)]
pub enum Gathered<T> {
    Complete(T),
    Degraded { value: T, reason: FallbackReason },
}

impl<T> Gathered<T> {
    pub fn degraded(value: T, reason: FallbackReason) -> Self {
        Self::Degraded { value, reason }
    }

    pub fn reason(&self) -> Option<FallbackReason> {
        match self {
            Self::Complete(_) => None,
            Self::Degraded { reason, .. } => Some(*reason),
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Complete(v) | Self::Degraded { value: v, .. } => v,
        }
    }
}
