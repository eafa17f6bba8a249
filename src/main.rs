//! Gateway entry point: bootstrap, wiring and the inbound dispatch loop

mod command;
mod connection;
mod sat;
mod transport;

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use groundlink_shared::InboundMessage;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use command::{CancelPolicy, CommandExecutor};
use connection::{Link, LinkConfig, LinkEvent};
use sat::Satellite;
use transport::TcpConnector;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = LinkConfig {
        host: env::var("GATEWAY_HOST").unwrap_or_default(),
        gateway_token: env::var("GATEWAY_TOKEN").unwrap_or_default(),
        basic_auth: env::var("GATEWAY_BASIC_AUTH").ok(),
        ..Default::default()
    };
    config
        .validate()
        .context("invalid gateway configuration")?;

    let system = env::var("GATEWAY_SYSTEM").unwrap_or_else(|_| "Space Oddity".into());
    let cancel_policy = match env::var("GATEWAY_CANCEL_POLICY").as_deref() {
        Ok("strict") => CancelPolicy::Strict,
        _ => CancelPolicy::Forced,
    };

    info!("gateway starting for system \"{system}\"");
    info!("  ground control: {}", config.host);

    let mut link = Link::new(TcpConnector::new(config.host.clone()), config);
    let sat = Arc::new(Satellite::new(system.clone()));
    let executor = CommandExecutor::new(system.clone(), cancel_policy, link.sender(), sat);

    // Published once at startup; it waits in the send queue until the
    // first connection comes up
    link.sender()
        .command_definitions(command::command_definitions(&system))?;

    loop {
        match link.recv().await {
            Some(LinkEvent::Connected) => info!("ground control link up"),
            Some(LinkEvent::Disconnected { reason }) => {
                warn!("ground control link down: {reason}")
            }
            Some(LinkEvent::Received(message)) => dispatch(message, &executor).await,
            None => {
                error!("connection link terminated");
                bail!("connection link terminated unexpectedly");
            }
        }
    }
}

/// Route one inbound message to its collaborator
async fn dispatch(message: InboundMessage, executor: &CommandExecutor) {
    match message {
        InboundMessage::Command { command } => {
            let _ = executor.submit(command).await;
        }
        InboundMessage::Cancel { command } => executor.cancel(command.id).await,
        InboundMessage::Error { error } => {
            error!("ground control reported an error: {error}")
        }
        InboundMessage::Hello { detail } => {
            info!("ground control says hello: {detail:?}")
        }
        InboundMessage::Transit { transit } => info!(
            "Ahoy {} from {}!",
            transit.satellite_name, transit.ground_station_name
        ),
        InboundMessage::RateLimit { rate_limit } => {
            warn!("rate limited by ground control: {rate_limit}")
        }
    }
}
