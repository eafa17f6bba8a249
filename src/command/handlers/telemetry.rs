//! Telemetry beacon behavior

use std::time::Duration;

use anyhow::{anyhow, Result};
use groundlink_shared::{limits, CommandState};

use crate::command::executor::{ExecContext, Outcome};
use crate::sat::BeaconMode;

/// Run the health-and-status beacon for the requested duration.
///
/// One metric batch per tick, until the duration elapses, the command is
/// cancelled, or the spacecraft enters safemode (a graceful halt, not a
/// failure).
pub async fn telemetry_beacon(ctx: &ExecContext) -> Result<Outcome> {
    let mode = ctx
        .field_str("mode")
        .and_then(BeaconMode::parse)
        .ok_or_else(|| anyhow!("validated mode field missing"))?;
    let duration = ctx
        .field_i64("duration")
        .ok_or_else(|| anyhow!("validated duration field missing"))?;

    ctx.update_with(
        CommandState::Preparing,
        &[("status", "Arming telemetry beacon".into())],
    )?;
    if ctx.pause(Duration::from_secs(1)).await.halted() {
        return Ok(Outcome::Cancelled);
    }

    ctx.sat().begin_beacon(mode).await;
    ctx.update_with(
        CommandState::Executing,
        &[("status", format!("Beaconing in mode {mode}").into())],
    )?;

    let mut halted_by_safemode = false;
    for _ in 0..duration.max(0) {
        let tick = ctx.sat().beacon_tick(mode).await;
        if !tick.metrics.is_empty() {
            ctx.link().measurements(tick.metrics)?;
        }
        if !tick.events.is_empty() {
            ctx.link().events(tick.events)?;
        }
        if tick.halted {
            halted_by_safemode = true;
            break;
        }
        if ctx
            .pause(Duration::from_millis(limits::BEACON_INTERVAL_MS))
            .await
            .halted()
        {
            return Ok(Outcome::Cancelled);
        }
    }

    let output = if halted_by_safemode {
        "Telemetry beacon halted: spacecraft entered safemode.".to_string()
    } else {
        format!("Started Telemetry Beacon in mode: {mode} for {duration} seconds.")
    };
    Ok(Outcome::Completed { output })
}
