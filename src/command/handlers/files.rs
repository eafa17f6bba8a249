//! File-list downlink behavior

use std::time::Duration;

use anyhow::Result;
use groundlink_shared::{now_ms, CommandState, FileList};
use tracing::debug;

use crate::command::executor::{ExecContext, Outcome};

/// Refresh the simulated payload image index and downlink it
pub async fn update_file_list(ctx: &ExecContext) -> Result<Outcome> {
    let show_hidden = ctx.field_bool("show_hidden").unwrap_or(false);

    ctx.update_with(
        CommandState::Processing,
        &[("status", "Packaging image index".into())],
    )?;
    let added = ctx.sat().grow_file_list(show_hidden).await;
    if ctx.pause(Duration::from_secs(1)).await.halted() {
        return Ok(Outcome::Cancelled);
    }

    ctx.update_with(
        CommandState::Downlinking,
        &[("status", "Downlinking file list".into())],
    )?;
    let files = ctx.sat().file_list().await;
    debug!("downlinking {} files ({added} new)", files.len());
    ctx.link().file_list(FileList {
        system: ctx.system().into(),
        timestamp: now_ms(),
        files,
    })?;

    if ctx.pause(Duration::from_secs(10)).await.halted() {
        return Ok(Outcome::Cancelled);
    }
    Ok(Outcome::Completed {
        output: "Updated Remote File List".into(),
    })
}
