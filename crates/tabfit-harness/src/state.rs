use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tabfit_core::{TabError, TabResult};
use thiserror::Error;
use tracing::{info, warn};

/// Where a harness run is.
///
/// `Initialized → Split → Preprocessed → [Tuned →] Fitted → Predicted → Scored`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessState {
    Initialized,
    Split,
    Preprocessed,
    Tuned,
    Fitted,
    Predicted,
    Scored,
    Failed,
}

impl HarnessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HarnessState::Scored | HarnessState::Failed)
    }

    pub fn can_advance_to(&self, next: HarnessState) -> bool {
        use HarnessState::*;
        matches!(
            (self, next),
            (Initialized, Split)
                | (Split, Preprocessed)
                | (Preprocessed, Tuned)
                | (Preprocessed, Fitted)
                | (Tuned, Fitted)
                | (Fitted, Predicted)
                | (Predicted, Scored)
        ) || (next == Failed && !self.is_terminal())
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HarnessState::Initialized => "initialized",
            HarnessState::Split => "split",
            HarnessState::Preprocessed => "preprocessed",
            HarnessState::Tuned => "tuned",
            HarnessState::Fitted => "fitted",
            HarnessState::Predicted => "predicted",
            HarnessState::Scored => "scored",
            HarnessState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A component error together with the state the harness was in when it
/// occurred.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("evaluation failed while {state}: {source}")]
pub struct HarnessError {
    pub state: HarnessState,
    #[source]
    pub source: TabError,
}

/// Wall-clock budget measured from the start of a run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn start(time_limit_ms: Option<u64>) -> Self {
        Deadline {
            started: Instant::now(),
            limit: time_limit_ms.map(Duration::from_millis),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self) -> TabResult<()> {
        match self.limit {
            Some(limit) if self.elapsed() > limit => Err(TabError::DeadlineExceeded {
                elapsed_ms: self.elapsed().as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

/// Drives one run through the harness states.
#[derive(Debug)]
pub struct StateMachine {
    state: HarnessState,
    visited: Vec<HarnessState>,
    deadline: Deadline,
}

impl StateMachine {
    pub fn new(deadline: Deadline) -> Self {
        StateMachine {
            state: HarnessState::Initialized,
            visited: vec![HarnessState::Initialized],
            deadline,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn visited(&self) -> &[HarnessState] {
        &self.visited
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Run `work` in the current state without moving on. The deadline is
    /// checked before and after `work`.
    pub fn guard<T>(&mut self, work: impl FnOnce() -> TabResult<T>) -> Result<T, HarnessError> {
        let deadline = self.deadline;
        let outcome = deadline
            .check()
            .and_then(|_| work())
            .and_then(|value| deadline.check().map(|_| value));
        match outcome {
            Ok(value) => Ok(value),
            Err(source) => Err(self.fail(source)),
        }
    }

    /// Run `work`, then enter `next`. Any error moves the machine to `Failed`.
    pub fn advance<T>(
        &mut self,
        next: HarnessState,
        work: impl FnOnce() -> TabResult<T>,
    ) -> Result<T, HarnessError> {
        if !self.state.can_advance_to(next) || next == HarnessState::Failed {
            let source = TabError::invalid_argument(
                "state",
                format!("cannot move from {} to {}", self.state, next),
            );
            return Err(self.fail(source));
        }
        let value = self.guard(work)?;
        info!(from = %self.state, to = %next, elapsed_ms = self.deadline.elapsed().as_millis() as u64, "harness transition");
        self.state = next;
        self.visited.push(next);
        Ok(value)
    }

    /// Record `source` and move to `Failed`.
    pub fn fail(&mut self, source: TabError) -> HarnessError {
        let state = self.state;
        warn!(state = %state, error = %source, "harness failed");
        if self.state != HarnessState::Failed {
            self.state = HarnessState::Failed;
            self.visited.push(HarnessState::Failed);
        }
        HarnessError { state, source }
    }
}
