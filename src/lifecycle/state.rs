//! Lifecycle State
//!
//! Per-phase and overall progress values stored on every lifecycle entity.

use serde::{Deserialize, Serialize};

/// Progress of a single phase, or of an entity as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeptnState {
    #[default]
    Pending,
    Progressing,
    Succeeded,
    Failed,
}

impl KeptnState {
    pub fn is_succeeded(&self) -> bool {
        *self == KeptnState::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        *self == KeptnState::Failed
    }

    pub fn is_pending(&self) -> bool {
        *self == KeptnState::Pending
    }

    /// Succeeded and Failed are terminal within one rollout attempt.
    pub fn is_completed(&self) -> bool {
        self.is_succeeded() || self.is_failed()
    }

    fn rank(&self) -> u8 {
        match self {
            KeptnState::Pending => 0,
            KeptnState::Progressing => 1,
            KeptnState::Succeeded | KeptnState::Failed => 2,
        }
    }

    /// Returns the state a field should hold after observing `next`.
    ///
    /// Terminal values are sealed and nothing moves backwards.
    pub fn advance(self, next: KeptnState) -> KeptnState {
        if self.is_completed() || next.rank() < self.rank() {
            self
        } else {
            next
        }
    }
}

impl std::fmt::Display for KeptnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeptnState::Pending => write!(f, "Pending"),
            KeptnState::Progressing => write!(f, "Progressing"),
            KeptnState::Succeeded => write!(f, "Succeeded"),
            KeptnState::Failed => write!(f, "Failed"),
        }
    }
}

/// Tally of member states, used to summarise a fan-out set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub progressing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn add(&mut self, state: KeptnState) {
        self.total += 1;
        match state {
            KeptnState::Pending => self.pending += 1,
            KeptnState::Progressing => self.progressing += 1,
            KeptnState::Succeeded => self.succeeded += 1,
            KeptnState::Failed => self.failed += 1,
        }
    }

    /// Failed dominates Progressing, which dominates Pending.
    /// An empty set is trivially Succeeded.
    pub fn overall(&self) -> KeptnState {
        if self.failed > 0 {
            KeptnState::Failed
        } else if self.progressing > 0 {
            KeptnState::Progressing
        } else if self.pending > 0 {
            KeptnState::Pending
        } else {
            KeptnState::Succeeded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_never_regresses() {
        assert_eq!(KeptnState::Pending.advance(KeptnState::Progressing), KeptnState::Progressing);
        assert_eq!(KeptnState::Progressing.advance(KeptnState::Pending), KeptnState::Progressing);
        assert_eq!(KeptnState::Progressing.advance(KeptnState::Failed), KeptnState::Failed);
        assert_eq!(KeptnState::Succeeded.advance(KeptnState::Failed), KeptnState::Succeeded);
        assert_eq!(KeptnState::Failed.advance(KeptnState::Progressing), KeptnState::Failed);
    }

    fn summarise(states: &[KeptnState]) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for state in states {
            summary.add(*state);
        }
        summary
    }

    #[test]
    fn test_summary_failed_dominates() {
        let summary = summarise(&[KeptnState::Succeeded, KeptnState::Progressing, KeptnState::Failed]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.overall(), KeptnState::Failed);
    }

    #[test]
    fn test_summary_requires_every_member_succeeded() {
        let partial = summarise(&[KeptnState::Succeeded, KeptnState::Pending]);
        assert_eq!(partial.overall(), KeptnState::Pending);

        let done = summarise(&[KeptnState::Succeeded, KeptnState::Succeeded]);
        assert_eq!(done.overall(), KeptnState::Succeeded);
    }
}
