//! Variant lifecycle

use crate::{Error, Result};

/// Progress of one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantState {
    /// Nothing done yet
    Start,
    /// First warm-up connection
    Warmup1,
    /// Second warm-up connection
    Warmup2,
    /// A warm-up failed; no measurement
    Aborted,
    /// Measured iterations running
    Iterating,
    /// Writing the summary
    Reporting,
    /// Finished
    Done,
}

impl VariantState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: VariantState) -> bool {
        use VariantState::*;

        matches!(
            (self, next),
            (Start, Warmup1)
                | (Warmup1, Warmup2)
                | (Warmup2, Aborted)
                | (Warmup2, Iterating)
                | (Iterating, Reporting)
                | (Reporting, Done)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: VariantState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// No further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, VariantState::Aborted | VariantState::Done)
    }
}

impl std::fmt::Display for VariantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Warmup1 => "warmup1",
            Self::Warmup2 => "warmup2",
            Self::Aborted => "aborted",
            Self::Iterating => "iterating",
            Self::Reporting => "reporting",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_path() {
        let mut state = VariantState::Start;
        for next in [
            VariantState::Warmup1,
            VariantState::Warmup2,
            VariantState::Iterating,
            VariantState::Reporting,
            VariantState::Done,
        ] {
            state.transition(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_abort_after_warmups() {
        let mut state = VariantState::Warmup2;
        state.transition(VariantState::Aborted).unwrap();
        assert!(state.is_terminal());
        assert!(state.transition(VariantState::Iterating).is_err());
    }

    #[test]
    fn test_cannot_skip_warmups() {
        let mut state = VariantState::Start;
        assert!(state.transition(VariantState::Iterating).is_err());
        assert_eq!(state, VariantState::Start);

        let mut state = VariantState::Warmup1;
        assert!(state.transition(VariantState::Aborted).is_err());
    }
}
