/// Pipeline state definitions for the crawl coordinator
///
/// The coordinator moves through these states in a fixed order; `Failed` is
/// only reachable while provisioning the warehouse.
use std::fmt;

/// Represents the lifecycle stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Holds validated configuration; nothing has been contacted yet
    Idle,

    /// Creating the warehouse dataset and table
    Provisioning,

    /// Fetching pages and submitting records
    Running,

    /// No fetch queued or in flight; waiting for outstanding writes
    Draining,

    // ===== Terminal States =====
    /// The crawl finished and the summary is available
    Done,

    /// Provisioning failed; no page was fetched
    Failed,
}

impl PipelineState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Provisioning)
                | (Self::Provisioning, Self::Running)
                | (Self::Provisioning, Self::Failed)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns all possible pipeline states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Provisioning,
            Self::Running,
            Self::Draining,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed.is_terminal());

        assert!(!PipelineState::Idle.is_terminal());
        assert!(!PipelineState::Provisioning.is_terminal());
        assert!(!PipelineState::Running.is_terminal());
        assert!(!PipelineState::Draining.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            PipelineState::Idle,
            PipelineState::Provisioning,
            PipelineState::Running,
            PipelineState::Draining,
            PipelineState::Done,
        ];

        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_failed_only_from_provisioning() {
        for state in PipelineState::all_states() {
            let allowed = state.can_transition_to(PipelineState::Failed);
            assert_eq!(allowed, state == PipelineState::Provisioning, "{}", state);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in PipelineState::all_states() {
            assert!(!PipelineState::Done.can_transition_to(next));
            assert!(!PipelineState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_skipping_provisioning() {
        assert!(!PipelineState::Idle.can_transition_to(PipelineState::Running));
        assert!(!PipelineState::Running.can_transition_to(PipelineState::Done));
    }

    #[test]
    fn test_display() {
        assert_eq!(PipelineState::Draining.to_string(), "draining");
        assert_eq!(format!("{}", PipelineState::Failed), "failed");
    }
}
