//! Connection link with automatic reconnection and an offline-safe send queue

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use groundlink_shared::codec::{self, FrameDecoder};
use groundlink_shared::{
    limits, transform, CommandDefinitions, CommandUpdate, Event, Handshake, InboundMessage,
    Measurement, OutboundMessage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::transport::{TransportConnector, TransportStream};

/// Configuration for the link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Ground control endpoint, host:port
    pub host: String,
    /// Fixed authentication token presented on every handshake
    pub gateway_token: String,
    /// Optional "username:password" credentials
    pub basic_auth: Option<String>,
    /// Transport-level connect timeout
    pub connect_timeout: Duration,
    /// Fixed delay between reconnection attempts
    pub reconnect_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:8780".into(),
            gateway_token: String::new(),
            basic_auth: None,
            connect_timeout: Duration::from_secs(limits::CONNECT_TIMEOUT_SECS),
            reconnect_delay: Duration::from_secs(limits::RECONNECT_DELAY_SECS),
        }
    }
}

impl LinkConfig {
    /// Startup validation. Failures here are fatal and surface before any
    /// connection attempt is made.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.host.is_empty(), "ground control host must not be empty");
        ensure!(
            !self.gateway_token.is_empty(),
            "gateway token must not be empty"
        );
        if let Some(auth) = &self.basic_auth {
            ensure!(
                auth.contains(':'),
                "basic auth credentials must be in \"username:password\" format"
            );
        }
        Ok(())
    }

    fn authorization(&self) -> Option<String> {
        self.basic_auth
            .as_ref()
            .map(|credentials| format!("Basic {}", BASE64_STANDARD.encode(credentials)))
    }
}

/// Events emitted by the link
#[derive(Debug)]
pub enum LinkEvent {
    /// Handshake sent and the queued backlog drained
    Connected,
    /// Transport dropped; the link retries on its own
    Disconnected { reason: String },
    /// A well-formed inbound message
    Received(InboundMessage),
}

/// Clonable handle for queueing outbound messages.
///
/// Messages are never dropped: while the link is down they wait for the
/// next connection and go out in submission order.
#[derive(Debug, Clone)]
pub struct LinkSender {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl LinkSender {
    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| anyhow!("link closed"))
    }

    pub fn command_update(&self, update: CommandUpdate) -> Result<()> {
        self.send(OutboundMessage::update(update))
    }

    pub fn complete_command(&self, id: i64, output: impl Into<String>) -> Result<()> {
        self.send(OutboundMessage::completed(id, output))
    }

    pub fn fail_command(&self, id: i64, errors: Vec<String>) -> Result<()> {
        self.send(OutboundMessage::failed(id, errors))
    }

    pub fn measurements(&self, batch: Vec<Measurement>) -> Result<()> {
        self.send(OutboundMessage::Measurements {
            measurements: batch,
        })
    }

    pub fn events(&self, batch: Vec<Event>) -> Result<()> {
        self.send(OutboundMessage::Events { events: batch })
    }

    pub fn file_list(&self, file_list: groundlink_shared::FileList) -> Result<()> {
        self.send(OutboundMessage::FileList { file_list })
    }

    pub fn command_definitions(&self, command_definitions: CommandDefinitions) -> Result<()> {
        self.send(OutboundMessage::CommandDefinitionsUpdate {
            command_definitions,
        })
    }

    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Owns the logical connection to ground control
pub struct Link {
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    event_rx: mpsc::Receiver<LinkEvent>,
}

impl Link {
    /// Create the link and start its connection loop
    pub fn new<C: TransportConnector>(connector: C, config: LinkConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(100);

        tokio::spawn(async move {
            if let Err(e) = connection_loop(connector, config, outbound_rx, event_tx).await {
                tracing::error!("link terminated: {e:#}");
            }
        });

        Self {
            outbound_tx,
            event_rx,
        }
    }

    /// Get a clone of the outbound handle
    pub fn sender(&self) -> LinkSender {
        LinkSender {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Receive the next link event. `None` means the link died of a
    /// non-transport error and will not recover.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.event_rx.recv().await
    }
}

/// How an active session ended
enum SessionEnd {
    /// Plausibly transient network condition; retried
    Transport(String),
    /// Programming or configuration error; terminates the link
    Fatal(anyhow::Error),
}

/// Main connection loop. Transport failures are retried forever at a fixed
/// interval; anything else propagates out and kills the link.
async fn connection_loop<C: TransportConnector>(
    connector: C,
    config: LinkConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    event_tx: mpsc::Sender<LinkEvent>,
) -> Result<()> {
    let mut pending: VecDeque<OutboundMessage> = VecDeque::new();

    loop {
        match timeout(config.connect_timeout, connector.connect()).await {
            Ok(Ok(stream)) => {
                info!("connected to ground control at {}", connector.endpoint());
                match run_session(stream, &config, &mut pending, &mut outbound_rx, &event_tx).await
                {
                    SessionEnd::Transport(reason) => {
                        warn!(
                            "connection lost, retrying in {}s ({reason})",
                            config.reconnect_delay.as_secs()
                        );
                        let _ = event_tx.send(LinkEvent::Disconnected { reason }).await;
                    }
                    SessionEnd::Fatal(err) => return Err(err),
                }
            }
            Ok(Err(e)) => {
                warn!(
                    "connection to {} failed, retrying in {}s ({e})",
                    connector.endpoint(),
                    config.reconnect_delay.as_secs()
                );
            }
            Err(_) => {
                warn!(
                    "connection to {} timed out, retrying in {}s",
                    connector.endpoint(),
                    config.reconnect_delay.as_secs()
                );
            }
        }

        // Keep accepting outbound messages while offline so nothing is dropped
        let wait = tokio::time::sleep(config.reconnect_delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                message = outbound_rx.recv() => match message {
                    Some(message) => pending.push_back(message),
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Drive one live connection until it drops
async fn run_session<S: TransportStream>(
    stream: S,
    config: &LinkConfig,
    pending: &mut VecDeque<OutboundMessage>,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    event_tx: &mpsc::Sender<LinkEvent>,
) -> SessionEnd {
    let (mut reader, mut writer) = tokio::io::split(stream);

    // Authentication rides the first frame of every connection
    let handshake = Handshake {
        token: config.gateway_token.clone(),
        authorization: config.authorization(),
    };
    if let Err(end) = transmit(&mut writer, &handshake).await {
        return end;
    }

    // Everything submitted while offline goes out first, in submission
    // order, before any new inbound traffic is looked at
    while let Ok(message) = outbound_rx.try_recv() {
        pending.push_back(message);
    }
    while let Some(message) = pending.front() {
        if let Err(end) = transmit(&mut writer, message).await {
            // The unsent message stays at the head for the next session
            return end;
        }
        pending.pop_front();
    }
    let _ = event_tx.send(LinkEvent::Connected).await;

    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            message = outbound_rx.recv() => {
                let Some(message) = message else {
                    return SessionEnd::Transport("link handle dropped".into());
                };
                debug!("to ground control: {message:?}");
                if let Err(end) = transmit(&mut writer, &message).await {
                    if matches!(end, SessionEnd::Transport(_)) {
                        // At-least-once: the frame may have partially left;
                        // requeue so it is resent after reconnecting
                        pending.push_back(message);
                    }
                    return end;
                }
            }

            read = reader.read(&mut read_buf) => {
                match read {
                    Ok(0) => return SessionEnd::Transport("closed by ground control".into()),
                    Ok(n) => {
                        decoder.extend(&read_buf[..n]);
                        if let Err(end) = dispatch_frames(&mut decoder, event_tx).await {
                            return end;
                        }
                    }
                    Err(e) => return SessionEnd::Transport(format!("read error: {e}")),
                }
            }
        }
    }
}

/// Drain complete frames from the decoder, forwarding well-formed messages.
/// Malformed frames and unknown message types are protocol anomalies:
/// logged and skipped, never fatal to the receive loop.
async fn dispatch_frames(
    decoder: &mut FrameDecoder,
    event_tx: &mpsc::Sender<LinkEvent>,
) -> Result<(), SessionEnd> {
    loop {
        match decoder.next_frame() {
            Ok(Some(frame)) => {
                let payload = transform::decode(frame);
                match serde_json::from_slice::<InboundMessage>(&payload) {
                    Ok(message) => {
                        debug!("from ground control: {message:?}");
                        let _ = event_tx.send(LinkEvent::Received(message)).await;
                    }
                    Err(e) => warn!(
                        "ignoring unrecognized frame: {e} ({})",
                        String::from_utf8_lossy(&payload)
                    ),
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => return Err(SessionEnd::Transport(format!("framing error: {e}"))),
        }
    }
}

/// Encode, transform and write one message
async fn transmit<W, T>(writer: &mut W, message: &T) -> Result<(), SessionEnd>
where
    W: AsyncWriteExt + Unpin,
    T: serde::Serialize,
{
    let payload = match codec::encode(message) {
        Ok(payload) => payload,
        Err(e) => return Err(SessionEnd::Fatal(anyhow!("outbound message encoding: {e}"))),
    };
    let wire = match codec::frame(&transform::encode(payload)) {
        Ok(wire) => wire,
        Err(e) => return Err(SessionEnd::Fatal(anyhow!("outbound frame: {e}"))),
    };
    match writer.write_all(&wire).await {
        Ok(()) => Ok(()),
        Err(e) => Err(SessionEnd::Transport(format!("write error: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use groundlink_shared::CommandRef;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, ReadHalf};

    /// Hands out pre-arranged in-memory streams, refusing once they run out
    struct DuplexConnector {
        streams: Arc<Mutex<VecDeque<DuplexStream>>>,
    }

    #[async_trait]
    impl TransportConnector for DuplexConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> Result<DuplexStream> {
            self.streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("connection refused"))
        }

        fn endpoint(&self) -> String {
            "duplex".into()
        }
    }

    fn stream_pool() -> (DuplexConnector, Arc<Mutex<VecDeque<DuplexStream>>>) {
        let streams: Arc<Mutex<VecDeque<DuplexStream>>> = Arc::default();
        (
            DuplexConnector {
                streams: streams.clone(),
            },
            streams,
        )
    }

    fn test_config() -> LinkConfig {
        LinkConfig {
            gateway_token: "token-123".into(),
            ..Default::default()
        }
    }

    async fn wait_connected(link: &mut Link) {
        loop {
            match link.recv().await {
                Some(LinkEvent::Connected) => return,
                Some(_) => continue,
                None => panic!("link died while waiting for connection"),
            }
        }
    }

    async fn read_frame(reader: &mut BufReader<ReadHalf<DuplexStream>>) -> serde_json::Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn authorization_is_base64_of_the_credentials() {
        let config = LinkConfig {
            basic_auth: Some("user:pass".into()),
            ..test_config()
        };
        assert_eq!(config.authorization().unwrap(), "Basic dXNlcjpwYXNz");
        assert_eq!(test_config().authorization(), None);
    }

    #[test]
    fn misconfiguration_is_rejected_up_front() {
        assert!(test_config().validate().is_ok());

        let no_token = LinkConfig::default();
        assert!(no_token.validate().is_err());

        let bad_auth = LinkConfig {
            basic_auth: Some("no-separator".into()),
            ..test_config()
        };
        assert!(bad_auth.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn messages_queued_while_offline_drain_in_order() {
        let (connector, streams) = stream_pool();
        let (client, server) = tokio::io::duplex(64 * 1024);

        let mut link = Link::new(connector, test_config());
        let sender = link.sender();
        sender.send(OutboundMessage::completed(1, "one")).unwrap();
        sender.send(OutboundMessage::completed(2, "two")).unwrap();
        sender.send(OutboundMessage::completed(3, "three")).unwrap();
        streams.lock().unwrap().push_back(client);

        wait_connected(&mut link).await;

        let (server_read, _server_write) = tokio::io::split(server);
        let mut reader = BufReader::new(server_read);

        let handshake = read_frame(&mut reader).await;
        assert_eq!(handshake["token"], "token-123");

        for expected in ["one", "two", "three"] {
            let frame = read_frame(&mut reader).await;
            assert_eq!(frame["type"], "command_update");
            assert_eq!(frame["command"]["output"], expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delivers_messages_sent_during_the_outage() {
        let (connector, streams) = stream_pool();
        let (client1, server1) = tokio::io::duplex(64 * 1024);
        let (client2, server2) = tokio::io::duplex(64 * 1024);
        streams.lock().unwrap().push_back(client1);

        let mut link = Link::new(connector, test_config());
        let sender = link.sender();
        wait_connected(&mut link).await;

        // Remote drops the connection
        drop(server1);
        loop {
            match link.recv().await {
                Some(LinkEvent::Disconnected { .. }) => break,
                Some(_) => continue,
                None => panic!("link died"),
            }
        }

        sender.send(OutboundMessage::completed(10, "ten")).unwrap();
        sender
            .send(OutboundMessage::completed(11, "eleven"))
            .unwrap();
        streams.lock().unwrap().push_back(client2);

        wait_connected(&mut link).await;

        let (server_read, _server_write) = tokio::io::split(server2);
        let mut reader = BufReader::new(server_read);

        let handshake = read_frame(&mut reader).await;
        assert_eq!(handshake["token"], "token-123");
        assert_eq!(read_frame(&mut reader).await["command"]["output"], "ten");
        assert_eq!(read_frame(&mut reader).await["command"]["output"], "eleven");
    }

    #[tokio::test(start_paused = true)]
    async fn receive_loop_survives_protocol_anomalies() {
        let (connector, streams) = stream_pool();
        let (client, server) = tokio::io::duplex(64 * 1024);
        streams.lock().unwrap().push_back(client);

        let mut link = Link::new(connector, test_config());
        wait_connected(&mut link).await;

        let (_server_read, mut server_write) = tokio::io::split(server);
        server_write
            .write_all(
                b"{\"type\":\"hello\",\"mission\":\"demo\"}\n\
                  not json at all\n\
                  {\"type\":\"planetary_alignment\"}\n\
                  {\"type\":\"cancel\",\"command\":{\"id\":17}}\n",
            )
            .await
            .unwrap();

        match link.recv().await {
            Some(LinkEvent::Received(InboundMessage::Hello { detail })) => {
                assert_eq!(detail["mission"], "demo");
            }
            other => panic!("expected hello, got {other:?}"),
        }
        // The malformed and unknown frames are skipped without killing the loop
        match link.recv().await {
            Some(LinkEvent::Received(InboundMessage::Cancel { command })) => {
                assert_eq!(command, CommandRef { id: 17 });
            }
            other => panic!("expected cancel, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failures_keep_retrying_without_losing_messages() {
        let (connector, streams) = stream_pool();
        let (client, server) = tokio::io::duplex(64 * 1024);

        // No stream available: several attempts fail before one succeeds
        let mut link = Link::new(connector, test_config());
        let sender = link.sender();
        sender.send(OutboundMessage::completed(5, "five")).unwrap();

        // Let two retry windows elapse before the endpoint comes up
        tokio::time::sleep(Duration::from_secs(12)).await;
        streams.lock().unwrap().push_back(client);

        wait_connected(&mut link).await;

        let (server_read, _server_write) = tokio::io::split(server);
        let mut reader = BufReader::new(server_read);
        let _handshake = read_frame(&mut reader).await;
        assert_eq!(read_frame(&mut reader).await["command"]["output"], "five");
    }
}
