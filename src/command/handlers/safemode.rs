//! Safemode uplink behavior

use std::time::Duration;

use anyhow::Result;
use groundlink_shared::CommandState;

use crate::command::executor::{ExecContext, Outcome};

/// Command the spacecraft into safemode and wait for confirmation
pub async fn safemode(ctx: &ExecContext) -> Result<Outcome> {
    ctx.update_with(
        CommandState::Transmitted,
        &[
            ("status", "Transmitted Safemode Command".into()),
            ("payload", "0xFFFF".into()),
        ],
    )?;

    // Visible to a running beacon immediately; confirmation follows
    ctx.sat().enter_safemode();

    if ctx.pause(Duration::from_secs(10)).await.halted() {
        return Ok(Outcome::Cancelled);
    }
    Ok(Outcome::Completed {
        output: "Spacecraft Confirmed Safemode".into(),
    })
}
