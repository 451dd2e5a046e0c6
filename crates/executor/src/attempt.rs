use core_types::{CalculationStatus, Classification};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

/// How the calculation was invoked. Recorded in the result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sync,
    Async,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Async => "async",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One try at executing a calculation.
///
/// All attempts of the same submission share a lease, so a retry can resume
/// a record its earlier attempt left in `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub lease: Uuid,
    /// 1-based.
    pub number: u32,
    pub max_attempts: u32,
    pub mode: ExecutionMode,
}

impl Attempt {
    /// A single, final attempt with a fresh lease.
    pub fn once(mode: ExecutionMode) -> Self {
        Self::first(1, mode)
    }

    pub fn first(max_attempts: u32, mode: ExecutionMode) -> Self {
        Self {
            lease: Uuid::new_v4(),
            number: 1,
            max_attempts: max_attempts.max(1),
            mode,
        }
    }

    pub fn next(&self) -> Self {
        Self {
            number: self.number + 1,
            ..*self
        }
    }

    pub fn is_final(&self) -> bool {
        self.number >= self.max_attempts
    }
}

/// What happened to a calculation after one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed {
        elasticity: Decimal,
        classification: Classification,
    },
    /// The calculation ended in `Failed` with this message.
    Failed { error: String },
    NotFound,
    /// Held by another attempt or already terminal. Nothing was changed.
    Skipped(CalculationStatus),
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed { .. } => "COMPLETED",
            ExecutionOutcome::Failed { .. } => "FAILED",
            ExecutionOutcome::NotFound => "NOT_FOUND",
            ExecutionOutcome::Skipped(_) => "SKIPPED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_share_the_lease() {
        let first = Attempt::first(4, ExecutionMode::Async);
        let last = first.next().next().next();
        assert_eq!(first.lease, last.lease);
        assert_eq!(last.number, 4);
        assert!(!first.is_final());
        assert!(last.is_final());
    }

    #[test]
    fn test_once_is_final() {
        assert!(Attempt::once(ExecutionMode::Sync).is_final());
        assert!(Attempt::first(0, ExecutionMode::Sync).is_final());
    }
}
