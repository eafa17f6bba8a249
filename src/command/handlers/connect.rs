//! Simulated RF lock acquisition

use std::time::Duration;

use anyhow::Result;
use groundlink_shared::CommandState;

use crate::command::executor::{ExecContext, Outcome};

/// Walk the uplink through antenna pointing, RF lock and acknowledgement
pub async fn rf_lock(ctx: &ExecContext) -> Result<Outcome> {
    if ctx.pause(Duration::from_secs(2)).await.halted() {
        return Ok(Outcome::Cancelled);
    }
    ctx.update_with(
        CommandState::Preparing,
        &[("status", "Pointing Antennas".into())],
    )?;

    if ctx.pause(Duration::from_secs(4)).await.halted() {
        return Ok(Outcome::Cancelled);
    }
    ctx.update_with(
        CommandState::Uplinking,
        &[("status", "Establishing RF Lock".into())],
    )?;

    if ctx.pause(Duration::from_secs(4)).await.halted() {
        return Ok(Outcome::Cancelled);
    }
    ctx.update(CommandState::Acked)?;

    if ctx.pause(Duration::from_secs(3)).await.halted() {
        return Ok(Outcome::Cancelled);
    }
    Ok(Outcome::Completed {
        output: "Link Established".into(),
    })
}
