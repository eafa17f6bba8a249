//! Command Lifecycle States
//!
//! Wire spellings and ordering rules for the states a command reports on
//! its way from receipt to a terminal outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The reportable lifecycle states of a command.
///
/// The nominal progression runs preparing through executing into one of the
/// two hand-off states, then `Completed`. `Cancelled` and `Failed` can
/// follow any non-terminal state. Exactly one terminal state is reached for
/// every accepted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    #[serde(rename = "preparing_on_gateway")]
    Preparing,
    #[serde(rename = "uplinking_to_system")]
    Uplinking,
    #[serde(rename = "transmitted_to_system")]
    Transmitted,
    #[serde(rename = "acked_by_system")]
    Acked,
    #[serde(rename = "executing_on_system")]
    Executing,
    #[serde(rename = "processing_on_gateway")]
    Processing,
    #[serde(rename = "downlinking_from_system")]
    Downlinking,
    Cancelled,
    Completed,
    Failed,
}

impl CommandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandState::Preparing => "preparing_on_gateway",
            CommandState::Uplinking => "uplinking_to_system",
            CommandState::Transmitted => "transmitted_to_system",
            CommandState::Acked => "acked_by_system",
            CommandState::Executing => "executing_on_system",
            CommandState::Processing => "processing_on_gateway",
            CommandState::Downlinking => "downlinking_from_system",
            CommandState::Cancelled => "cancelled",
            CommandState::Completed => "completed",
            CommandState::Failed => "failed",
        }
    }

    /// Terminal states are final; nothing may be reported after one
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::Cancelled | CommandState::Completed | CommandState::Failed
        )
    }

    /// Position in the nominal forward progression
    fn rank(&self) -> u8 {
        match self {
            CommandState::Preparing => 0,
            CommandState::Uplinking => 1,
            CommandState::Transmitted => 2,
            CommandState::Acked => 3,
            CommandState::Executing => 4,
            // Alternative hand-off stages at the same depth
            CommandState::Processing | CommandState::Downlinking => 5,
            CommandState::Cancelled | CommandState::Completed | CommandState::Failed => 6,
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether reporting `to` after `from` respects the forward-only
/// progression. Stages may be skipped or repeated for progress updates,
/// never revisited; a terminal state may follow anything and be followed
/// by nothing.
pub fn is_valid_transition(from: CommandState, to: CommandState) -> bool {
    if from.is_terminal() {
        return false;
    }
    if to.is_terminal() {
        return true;
    }
    to.rank() >= from.rank()
}
