//! Link-check behaviors

use std::time::Duration;

use anyhow::Result;
use groundlink_shared::CommandState;

use crate::command::executor::{ExecContext, Outcome};

/// Immediate round-trip acknowledgement
pub async fn ping(_ctx: &ExecContext) -> Result<Outcome> {
    Ok(Outcome::Completed {
        output: "pong".into(),
    })
}

/// Always fails, demonstrating the failure reporting path
pub async fn error_drill(ctx: &ExecContext) -> Result<Outcome> {
    ctx.update_with(
        CommandState::Uplinking,
        &[("status", "Uplinking Command".into())],
    )?;
    if ctx.pause(Duration::from_secs(3)).await.halted() {
        return Ok(Outcome::Cancelled);
    }
    Ok(Outcome::Failed {
        errors: vec!["Command failed to execute.".into()],
    })
}
