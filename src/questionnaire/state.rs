//! Progress state machine — tracks which page the visitor is on.

use serde::{Deserialize, Serialize};

/// Where the visitor is in the questionnaire.
///
/// Moves linearly: Step(1) → … → Step(N) → Submitted. Backward moves are
/// allowed between steps; Submitted is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum Progress {
    Step(u8),
    Submitted,
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved between two steps.
    Moved { from: u8, to: u8 },
    /// Advanced past the last step; the caller must finalize.
    Finalize,
    /// At a boundary or already submitted.
    Stay,
}

impl Progress {
    /// First page.
    pub fn start() -> Self {
        Self::Step(1)
    }

    /// Build a progress value from persisted fields, clamping the step into
    /// `[1, total]`.
    pub fn restore(step: u8, submitted: bool, total: u8) -> Self {
        if submitted {
            Self::Submitted
        } else {
            Self::Step(step.clamp(1, total.max(1)))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted)
    }

    /// Current page number; the last page once submitted.
    pub fn step_or(&self, total: u8) -> u8 {
        match self {
            Self::Step(k) => *k,
            Self::Submitted => total,
        }
    }

    /// What `advance` would do from here.
    pub fn advance(&self, total: u8) -> Transition {
        match *self {
            Self::Step(k) if k < total => Transition::Moved { from: k, to: k + 1 },
            Self::Step(_) => Transition::Finalize,
            Self::Submitted => Transition::Stay,
        }
    }

    /// What `retreat` would do from here.
    pub fn retreat(&self) -> Transition {
        match *self {
            Self::Step(k) if k > 1 => Transition::Moved { from: k, to: k - 1 },
            _ => Transition::Stay,
        }
    }

    /// The addressable view for this state.
    pub fn view_path(&self) -> String {
        match self {
            Self::Step(k) => format!("/questionnaire/{k}"),
            Self::Submitted => "/thank-you".to_string(),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::start()
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step(k) => write!(f, "step_{k}"),
            Self::Submitted => write!(f, "submitted"),
        }
    }
}
