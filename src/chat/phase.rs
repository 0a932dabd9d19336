//! Exchange progress tracking.

use std::sync::atomic::{AtomicU8, Ordering};

/// Last step reached by the most recent exchange of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ExchangePhase {
    #[default]
    Idle = 0,
    ModeratingInput = 1,
    Sending = 2,
    Retrying = 3,
    ModeratingOutput = 4,
    Committed = 5,
    Failed = 6,
}

impl ExchangePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ModeratingInput => "moderating_input",
            Self::Sending => "sending",
            Self::Retrying => "retrying",
            Self::ModeratingOutput => "moderating_output",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ModeratingInput,
            2 => Self::Sending,
            3 => Self::Retrying,
            4 => Self::ModeratingOutput,
            5 => Self::Committed,
            6 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared between a session and its in-flight stream task.
#[derive(Debug, Default)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) fn get(&self) -> ExchangePhase {
        ExchangePhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, phase: ExchangePhase) {
        let previous = ExchangePhase::from_u8(self.0.swap(phase as u8, Ordering::AcqRel));
        if previous != phase {
            tracing::trace!(from = %previous, to = %phase, "exchange phase");
        }
    }
}
