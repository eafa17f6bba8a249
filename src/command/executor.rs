//! Command executor - validates and runs incoming commands
//!
//! Every accepted command becomes its own task, tracked in a registry
//! keyed by id. Cancellation sets a flag the task observes at its own
//! checkpoints; the registry entry is removed on every exit path.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use groundlink_shared::{
    state, Command, CommandState, CommandUpdate, Event, EventLevel, FieldValue,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{definitions, handlers};
use crate::connection::LinkSender;
use crate::sat::Satellite;

/// What to do when a cancellation request misses the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Report the command cancelled anyway, flagging the outcome unverified
    #[default]
    Forced,
    /// Only report that the cancellation could not be honored
    Strict,
}

/// Terminal result of one command behavior
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { output: String },
    Failed { errors: Vec<String> },
    Cancelled,
}

/// Cooperative-cancellation signal returned by checkpoints
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Proceed,
    Halt,
}

impl Progress {
    pub fn halted(self) -> bool {
        self == Progress::Halt
    }
}

struct RunningCommand {
    cancel: Arc<AtomicBool>,
}

/// Handle a command behavior uses to observe cancellation and report progress
pub struct ExecContext {
    pub id: i64,
    pub fields: BTreeMap<String, FieldValue>,
    system: String,
    link: LinkSender,
    sat: Arc<Satellite>,
    cancel: Arc<AtomicBool>,
    last_state: Mutex<Option<CommandState>>,
}

impl ExecContext {
    /// Cooperative cancellation checkpoint
    pub fn checkpoint(&self) -> Progress {
        if self.cancel.load(Ordering::SeqCst) {
            Progress::Halt
        } else {
            Progress::Proceed
        }
    }

    /// Simulated transmission delay, checkpointed on both sides
    pub async fn pause(&self, duration: Duration) -> Progress {
        if self.checkpoint().halted() {
            return Progress::Halt;
        }
        tokio::time::sleep(duration).await;
        self.checkpoint()
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn sat(&self) -> &Satellite {
        &self.sat
    }

    pub fn link(&self) -> &LinkSender {
        &self.link
    }

    /// Report a state transition
    pub fn update(&self, state: CommandState) -> Result<()> {
        self.send_update(CommandUpdate::new(self.id, state))
    }

    /// Report a state transition with free-form status detail
    pub fn update_with(&self, state: CommandState, detail: &[(&str, Value)]) -> Result<()> {
        let mut update = CommandUpdate::new(self.id, state);
        for (key, value) in detail {
            update = update.with(key, value.clone());
        }
        self.send_update(update)
    }

    fn send_update(&self, update: CommandUpdate) -> Result<()> {
        let mut last = self.last_state.lock().unwrap();
        if let Some(previous) = *last {
            if !state::is_valid_transition(previous, update.state) {
                warn!(
                    "command {}: out-of-order state report {previous} -> {}",
                    self.id, update.state
                );
            }
        }
        *last = Some(update.state);
        drop(last);
        self.link.command_update(update)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_i64)
    }

    pub fn field_bool(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(FieldValue::as_bool)
    }
}

/// Runs commands received from ground control
pub struct CommandExecutor {
    system: String,
    cancel_policy: CancelPolicy,
    link: LinkSender,
    sat: Arc<Satellite>,
    running: Arc<RwLock<HashMap<i64, RunningCommand>>>,
}

impl CommandExecutor {
    pub fn new(
        system: impl Into<String>,
        cancel_policy: CancelPolicy,
        link: LinkSender,
        sat: Arc<Satellite>,
    ) -> Self {
        Self {
            system: system.into(),
            cancel_policy,
            link,
            sat,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    /// Register and launch one command. The returned handle resolves once
    /// the command has reported its terminal state and left the registry.
    pub async fn submit(&self, command: Command) -> JoinHandle<()> {
        let id = command.id;
        info!("command {id} received: {}", command.command_type);

        let cancel = Arc::new(AtomicBool::new(false));
        self.running
            .write()
            .await
            .insert(id, RunningCommand { cancel: cancel.clone() });

        let ctx = ExecContext {
            id,
            fields: command.fields,
            system: self.system.clone(),
            link: self.link.clone(),
            sat: self.sat.clone(),
            cancel,
            last_state: Mutex::new(None),
        };
        let command_type = command.command_type;
        let link = self.link.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            // The behavior runs in its own task so that even a panic is
            // translated into a terminal report instead of a lost command
            let body = tokio::spawn(run_command(command_type, ctx));
            let outcome = match body.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => Outcome::Failed {
                    errors: vec![
                        "Unexpected error during command execution".into(),
                        format!("{err:#}"),
                    ],
                },
                Err(err) => Outcome::Failed {
                    errors: vec!["Command task crashed".into(), err.to_string()],
                },
            };

            report_terminal(&link, id, &outcome);
            running.write().await.remove(&id);
            debug!("command {id} unregistered");
        })
    }

    /// Request cancellation. The running task observes the flag at its next
    /// checkpoint; the transition to cancelled is the task's own
    /// responsibility, not immediate.
    pub async fn cancel(&self, id: i64) {
        if let Some(entry) = self.running.read().await.get(&id) {
            info!("cancellation requested for command {id}");
            entry.cancel.store(true, Ordering::SeqCst);
            return;
        }

        match self.cancel_policy {
            CancelPolicy::Forced => {
                warn!("cancel for command {id} missed the registry; forcing a cancelled report");
                let _ = self
                    .link
                    .command_update(CommandUpdate::new(id, CommandState::Cancelled));
                let _ = self.link.events(vec![Event::new(
                    &self.system,
                    format!(
                        "Command {id} was not running; it was marked cancelled without \
                         confirmation from the spacecraft."
                    ),
                )
                .level(EventLevel::Warning)
                .command_id(id)]);
            }
            CancelPolicy::Strict => {
                warn!("cancel for command {id} missed the registry");
                let _ = self.link.events(vec![Event::new(
                    &self.system,
                    format!("Unable to cancel command {id}: it is not currently running."),
                )
                .level(EventLevel::Warning)
                .command_id(id)]);
            }
        }
    }
}

fn report_terminal(link: &LinkSender, id: i64, outcome: &Outcome) {
    let result = match outcome {
        Outcome::Completed { output } => {
            info!("command {id} completed");
            link.complete_command(id, output.clone())
        }
        Outcome::Failed { errors } => {
            warn!("command {id} failed: {errors:?}");
            link.fail_command(id, errors.clone())
        }
        Outcome::Cancelled => {
            info!("command {id} cancelled");
            link.command_update(CommandUpdate::new(id, CommandState::Cancelled))
        }
    };
    if let Err(err) = result {
        warn!("unable to report command {id} outcome: {err}");
    }
}

/// Validate, then dispatch to the behavior for this command type.
/// Validation happens before any state transition is emitted.
async fn run_command(command_type: String, mut ctx: ExecContext) -> Result<Outcome> {
    let Some(def) = definitions::menu().get(&command_type).cloned() else {
        return Ok(Outcome::Failed {
            errors: vec![format!("Command {command_type} not found on satellite.")],
        });
    };
    match definitions::validate_fields(&def, &ctx.fields) {
        Ok(effective) => ctx.fields = effective,
        Err(errors) => return Ok(Outcome::Failed { errors }),
    }

    match command_type.as_str() {
        "ping" => handlers::ping(&ctx).await,
        "error" => handlers::error_drill(&ctx).await,
        "connect" => handlers::rf_lock(&ctx).await,
        "telemetry" => handlers::telemetry_beacon(&ctx).await,
        "update_file_list" => handlers::update_file_list(&ctx).await,
        "safemode" => handlers::safemode(&ctx).await,
        other => Ok(Outcome::Failed {
            errors: vec![format!("Command {other} not found on satellite.")],
        }),
    }
}
