//! Chooses the run's terminal action from its quality verdict.

use strum::{AsRefStr, Display};
use weather_ingest_models::{QualityVerdict, RunState};

/// What the run does once the quality check has answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Branch {
    /// Emit the completion signal.
    Publish,
    /// Move the partition aside and fail the run.
    Quarantine,
}

impl Branch {
    /// State a run enters once this branch has completed.
    #[must_use]
    pub const fn target_state(self) -> RunState {
        match self {
            Self::Publish => RunState::Published,
            Self::Quarantine => RunState::Quarantined,
        }
    }
}

/// Publish on a passing verdict, quarantine otherwise.
#[must_use]
pub const fn decide(verdict: &QualityVerdict) -> Branch {
    if verdict.passed() {
        Branch::Publish
    } else {
        Branch::Quarantine
    }
}

#[cfg(test)]
mod tests {
    use weather_ingest_models::LogicalDate;

    use super::*;

    fn verdict(row_count: u64) -> QualityVerdict {
        QualityVerdict {
            logical_date: "2025-01-01".parse::<LogicalDate>().unwrap(),
            row_count,
        }
    }

    #[test]
    fn zero_rows_quarantines() {
        assert_eq!(decide(&verdict(0)), Branch::Quarantine);
    }

    #[test]
    fn any_rows_publish() {
        assert_eq!(decide(&verdict(1)), Branch::Publish);
        assert_eq!(decide(&verdict(250)), Branch::Publish);
    }

    #[test]
    fn every_branch_ends_in_a_terminal_state() {
        assert_eq!(Branch::Publish.target_state(), RunState::Published);
        assert_eq!(Branch::Quarantine.target_state(), RunState::Quarantined);
        assert!(Branch::Publish.target_state().is_terminal());
        assert!(Branch::Quarantine.target_state().is_terminal());
        assert!(!RunState::Pending.is_terminal());
    }

    #[test]
    fn branch_names() {
        assert_eq!(Branch::Publish.to_string(), "publish");
        assert_eq!(Branch::Quarantine.as_ref(), "quarantine");
    }
}
