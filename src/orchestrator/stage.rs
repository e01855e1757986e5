#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use serde::Serialize;

/// One phase of a grading run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Accepted, nothing done yet.
    Received,
    /// Recovering text from non-text content.
    Extracting,
    /// Text available.
    TextReady,
    /// Language analysis issued.
    AnalyzingLanguage,
    /// Generative grading issued.
    Grading,
    /// Mapping raw scores onto criterion ranges.
    Normalizing,
    /// Computing the weighted overall score.
    Aggregating,
    /// Finished with a grade.
    Completed,
    /// Finished without a grade.
    Failed,
}

impl Stage {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Progress is strictly forward. Every non-terminal stage may fail, and
    /// text-only submissions skip `Extracting`.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;

        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Received, Extracting | TextReady)
            | (Extracting, TextReady)
            | (TextReady, AnalyzingLanguage)
            | (AnalyzingLanguage, Grading)
            | (Grading, Normalizing)
            | (Normalizing, Aggregating)
            | (Aggregating, Completed) => true,
            _ => false,
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Extracting => "extracting",
            Stage::TextReady => "text ready",
            Stage::AnalyzingLanguage => "analyzing language",
            Stage::Grading => "grading",
            Stage::Normalizing => "normalizing",
            Stage::Aggregating => "aggregating",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Records the stages a run passes through.
#[derive(Debug, Clone)]
pub(crate) struct StageTracker {
    /// Every stage entered so far, starting with `Received`.
    trace: Vec<Stage>,
}

impl StageTracker {
    /// Starts a trace at `Received`.
    pub(crate) fn new() -> Self {
        Self {
            trace: vec![Stage::Received],
        }
    }

    /// The stage the run is in.
    pub(crate) fn current(&self) -> Stage {
        self.trace.last().copied().unwrap_or(Stage::Received)
    }

    /// Moves to `next`.
    pub(crate) fn advance(&mut self, next: Stage) {
        let current = self.current();
        debug_assert!(current.can_advance_to(next), "illegal transition {current} -> {next}");
        tracing::debug!("{current} -> {next}");
        self.trace.push(next);
    }

    /// Consumes the tracker, returning the trace.
    pub(crate) fn into_trace(self) -> Vec<Stage> {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Stage; 9] = [
        Stage::Received,
        Stage::Extracting,
        Stage::TextReady,
        Stage::AnalyzingLanguage,
        Stage::Grading,
        Stage::Normalizing,
        Stage::Aggregating,
        Stage::Completed,
        Stage::Failed,
    ];

    #[test]
    fn terminal_stages_go_nowhere() {
        for next in ALL {
            assert!(!Stage::Completed.can_advance_to(next));
            assert!(!Stage::Failed.can_advance_to(next));
        }
    }

    #[test]
    fn every_live_stage_can_fail() {
        for stage in ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(stage.can_advance_to(Stage::Failed), "{stage}");
        }
    }

    #[test]
    fn no_backtracking_or_skipping() {
        assert!(Stage::Received.can_advance_to(Stage::TextReady));
        assert!(!Stage::Received.can_advance_to(Stage::Grading));
        assert!(!Stage::Grading.can_advance_to(Stage::TextReady));
        assert!(!Stage::Normalizing.can_advance_to(Stage::Completed));
        assert!(!Stage::TextReady.can_advance_to(Stage::Extracting));
    }

    #[test]
    fn tracker_records_path() {
        let mut tracker = StageTracker::new();
        tracker.advance(Stage::TextReady);
        tracker.advance(Stage::Failed);
        assert_eq!(tracker.current(), Stage::Failed);
        assert_eq!(tracker.into_trace(), vec![Stage::Received, Stage::TextReady, Stage::Failed]);
    }
}
