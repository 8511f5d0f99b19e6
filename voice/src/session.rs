//! The voice session state machine.
//!
//! A session is a single background task. While connected it handles
//! exactly one event at a time: a user command, a WebSocket message, a
//! heartbeat tick, or a UDP helper notification. The handshake accumulates
//! state in one direction only: connect, learn the heartbeat interval,
//! learn the SSRC and UDP endpoint, discover the external address, receive
//! the session key.
//!
//! Protocol violations are terminal. A supervisor loop around the machine
//! re-creates it with carried-forward resume data after a delay.

use crate::{
    config::VoiceConfig,
    model::{incoming, outgoing, IncomingEvent, OutgoingEvent},
    udp::{UdpCommand, UdpEvent, UdpHandle, UdpKey, UdpLauncher},
    GATEWAY_VERSION,
};
use futures_util::{SinkExt, StreamExt};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    future,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::{self, Instant, Interval},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Encryption mode selected for the UDP transport.
const ENCRYPTION_MODE: &str = "xsalsa20_poly1305";

/// Fraction of the announced heartbeat interval actually used.
const HEARTBEAT_RATIO: f64 = 0.75;

/// Longest delay between reconnection attempts.
const RECONNECT_WAIT_MAX: Duration = Duration::from_secs(64);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An error occurred while running the voice session.
#[derive(Debug)]
pub struct VoiceError {
    kind: VoiceErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl VoiceError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &VoiceErrorType {
        &self.kind
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (VoiceErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }
}

impl Display for VoiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            VoiceErrorType::Connecting => f.write_str("failed to connect to the voice gateway"),
            VoiceErrorType::HeartbeatUnacknowledged => {
                f.write_str("previous heartbeat was never acknowledged")
            }
            VoiceErrorType::NonceMismatch { expected, got } => write!(
                f,
                "heartbeat acknowledgement carried nonce {got}, expected {expected:?}"
            ),
            VoiceErrorType::SendingMessage => f.write_str("sending a frame failed"),
            VoiceErrorType::Serializing => f.write_str("serializing a frame as json failed"),
            VoiceErrorType::StreamEnded => f.write_str("the voice gateway connection ended"),
            VoiceErrorType::UdpTerminated => {
                f.write_str("the udp helper stopped while the session was active")
            }
        }
    }
}

impl Error for VoiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`VoiceError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum VoiceErrorType {
    /// Opening the WebSocket connection failed.
    Connecting,
    /// A heartbeat came due while the previous one was unacknowledged.
    HeartbeatUnacknowledged,
    /// An acknowledgement carried a nonce that was never sent.
    NonceMismatch {
        /// Nonce of the heartbeat awaiting acknowledgement.
        expected: Option<u64>,
        /// Nonce the acknowledgement carried.
        got: u64,
    },
    /// Sending a frame over the WebSocket failed.
    SendingMessage,
    /// An outgoing frame could not be serialized.
    Serializing,
    /// The WebSocket connection closed or failed.
    StreamEnded,
    /// The UDP helper stopped while the session was active.
    UdpTerminated,
}

/// The session's background task has shut down.
#[derive(Debug)]
pub struct SessionClosed;

impl Display for SessionClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("the voice session task has shut down")
    }
}

impl Error for SessionClosed {}

/// Instruction for a running [`Session`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Command {
    /// Open the connection and start the handshake.
    Login,
    /// Close the connection and end the session for good.
    Logout,
    /// Close the connection and log back in after a delay.
    Restart {
        /// Whether to discard the carried resume data.
        fresh: bool,
        /// How long to stay inactive before logging back in.
        wait: Duration,
    },
    /// Announce the client's speaking state.
    Speaking(bool),
}

/// Notification emitted by a running [`Session`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// The server accepted the session and assigned an SSRC.
    Connected {
        /// Synchronization source assigned to this session.
        ssrc: u32,
    },
    /// UDP discovery produced the externally visible endpoint and the
    /// protocol was selected.
    IpDiscovered {
        /// Externally visible address.
        address: String,
        /// Externally visible port.
        port: u16,
    },
    /// The connection died; it will be re-created after a delay.
    Reconnecting,
    /// The session key arrived and was handed to the UDP helper.
    SessionSecured,
    /// A user's speaking state changed.
    Speaking(incoming::Speaking),
    /// The session ended for good.
    Stopped,
}

/// Handle to a voice session task.
///
/// Created with [`Session::spawn`]. Cheaply cloneable; the task stops when
/// it is logged out or every handle has been dropped.
#[derive(Clone, Debug)]
pub struct Session {
    commands: UnboundedSender<Command>,
}

impl Session {
    /// Spawn a supervised session task.
    ///
    /// The session starts inactive; send [`Command::Login`] to connect.
    /// Progress is reported through the returned event channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<L>(config: VoiceConfig, launcher: L) -> (Self, UnboundedReceiver<Event>)
    where
        L: UdpLauncher + Send + Sync + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let resume = ResumeData::from_config(&config);

        tokio::spawn(
            Runner {
                commands: command_rx,
                config,
                events: event_tx,
                launcher,
                resume,
            }
            .run(),
        );

        (
            Self {
                commands: command_tx,
            },
            event_rx,
        )
    }

    /// Open the connection and start the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session task has shut down.
    pub fn login(&self) -> Result<(), SessionClosed> {
        self.command(Command::Login)
    }

    /// Close the connection and end the session for good.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session task has shut down.
    pub fn logout(&self) -> Result<(), SessionClosed> {
        self.command(Command::Logout)
    }

    /// Close the connection and log back in after `wait`.
    ///
    /// With `fresh` set, the carried resume data is reset to the
    /// configured identity before the next login.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session task has shut down.
    pub fn restart(&self, fresh: bool, wait: Duration) -> Result<(), SessionClosed> {
        self.command(Command::Restart { fresh, wait })
    }

    /// Announce the client's speaking state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session task has shut down.
    pub fn speaking(&self, speaking: bool) -> Result<(), SessionClosed> {
        self.command(Command::Speaking(speaking))
    }

    fn command(&self, command: Command) -> Result<(), SessionClosed> {
        self.commands.send(command).map_err(|_| SessionClosed)
    }
}

/// Data sufficient to re-identify after a reconnect.
#[derive(Clone, Debug)]
struct ResumeData {
    server_id: String,
    session_id: String,
    token: String,
}

impl ResumeData {
    fn from_config(config: &VoiceConfig) -> Self {
        Self {
            server_id: config.server_id.clone(),
            session_id: config.session_id.clone(),
            token: config.token.clone(),
        }
    }
}

/// Why the active connection ended without an error.
enum Outcome {
    LoggedOut,
    Restart { fresh: bool, wait: Duration },
}

/// What woke the active connection up.
enum Input {
    Command(Option<Command>),
    HeartbeatDue,
    Message(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Udp(Option<UdpEvent>),
}

/// Handshake progress of an active connection.
///
/// Stages only ever accumulate detail; the machine never moves backwards
/// while connected.
enum Stage {
    /// Connected and identified, awaiting the heartbeat interval.
    WithQueue,
    /// Heartbeating, awaiting the session's SSRC and UDP endpoint.
    WithHeartbeat {
        previous_nonce: Option<u64>,
        received_ack: bool,
    },
    /// Coordinating with the UDP helper.
    WithUdp {
        ip: Option<IpEndpoint>,
        previous_nonce: Option<u64>,
        received_ack: bool,
        ssrc: u32,
    },
}

/// Externally visible endpoint reported by UDP discovery.
struct IpEndpoint {
    address: String,
    port: u16,
}

/// Everything an active connection owns.
struct ActiveState {
    heartbeat: Option<Interval>,
    stage: Stage,
    udp: Option<UdpHandle>,
    ws: WsStream,
}

struct Runner<L> {
    commands: UnboundedReceiver<Command>,
    config: VoiceConfig,
    events: UnboundedSender<Event>,
    launcher: L,
    resume: ResumeData,
}

impl<L: UdpLauncher> Runner<L> {
    /// Supervisor loop: wait for a login, run the connection, and after a
    /// failure or restart request come back with carried resume data.
    async fn run(mut self) {
        let mut pending_login = false;
        let mut reconnect_wait = Duration::from_secs(1);

        loop {
            if !pending_login {
                match self.commands.recv().await {
                    None | Some(Command::Logout) => break,
                    Some(Command::Login) => {}
                    Some(Command::Restart { fresh, wait }) => {
                        if fresh {
                            self.resume = ResumeData::from_config(&self.config);
                        }

                        if !self.wait_inactive(wait).await {
                            break;
                        }
                    }
                    Some(Command::Speaking(_)) => {
                        tracing::warn!("not logged in, ignoring speaking command");

                        continue;
                    }
                }
            }

            let ws = match self.connect().await {
                Ok(ws) => {
                    reconnect_wait = Duration::from_secs(1);

                    ws
                }
                Err(source) => {
                    tracing::warn!("connecting to the voice gateway failed: {source}");
                    let _res = self.events.send(Event::Reconnecting);

                    if !self.wait_inactive(reconnect_wait).await {
                        break;
                    }

                    reconnect_wait = (reconnect_wait * 2).min(RECONNECT_WAIT_MAX);
                    pending_login = true;

                    continue;
                }
            };

            match self.run_active(ws).await {
                Ok(Outcome::LoggedOut) => break,
                Ok(Outcome::Restart { fresh, wait }) => {
                    if fresh {
                        self.resume = ResumeData::from_config(&self.config);
                    }

                    tracing::debug!(wait = %wait.as_millis(), "restarting voice session");

                    if !self.wait_inactive(wait).await {
                        break;
                    }

                    pending_login = true;
                }
                Err(source) => {
                    tracing::warn!("voice session failed: {source}");
                    let _res = self.events.send(Event::Reconnecting);

                    if !self.wait_inactive(reconnect_wait).await {
                        break;
                    }

                    reconnect_wait = (reconnect_wait * 2).min(RECONNECT_WAIT_MAX);
                    pending_login = true;
                }
            }
        }

        let _res = self.events.send(Event::Stopped);

        tracing::debug!("voice session ended");
    }

    /// Sit out a delay while staying responsive to commands.
    ///
    /// Returns false when the session should end instead of logging back
    /// in. An explicit login cuts the wait short.
    async fn wait_inactive(&mut self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Logout) => return false,
                    Some(Command::Login) => return true,
                    Some(Command::Restart { fresh, .. }) => {
                        if fresh {
                            self.resume = ResumeData::from_config(&self.config);
                        }
                    }
                    Some(Command::Speaking(_)) => {
                        tracing::warn!("not logged in, ignoring speaking command");
                    }
                },
                _ = time::sleep_until(deadline) => return true,
            }
        }
    }

    async fn connect(&self) -> Result<WsStream, VoiceError> {
        let scheme = if self.config.use_tls { "wss" } else { "ws" };
        let url = format!(
            "{scheme}://{}/?v={GATEWAY_VERSION}",
            self.config.address,
        );

        tracing::debug!(%url, "connecting to the voice gateway");

        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|source| VoiceError {
                kind: VoiceErrorType::Connecting,
                source: Some(Box::new(source)),
            })?;

        Ok(ws)
    }

    async fn run_active(&mut self, ws: WsStream) -> Result<Outcome, VoiceError> {
        let mut active = ActiveState {
            heartbeat: None,
            stage: Stage::WithQueue,
            udp: None,
            ws,
        };

        let identify = OutgoingEvent::from(outgoing::Identify::new(outgoing::IdentifyInfo {
            server_id: self.resume.server_id.clone(),
            session_id: self.resume.session_id.clone(),
            token: self.resume.token.clone(),
            user_id: self.config.user_id.clone(),
        }));
        Self::send(&self.config, &mut active.ws, &identify).await?;

        loop {
            let input = tokio::select! {
                command = self.commands.recv() => Input::Command(command),
                message = active.ws.next() => Input::Message(message),
                _ = next_heartbeat(&mut active.heartbeat) => Input::HeartbeatDue,
                event = next_udp_event(&mut active.udp) => Input::Udp(event),
            };

            match input {
                Input::Command(None) | Input::Command(Some(Command::Logout)) => {
                    Self::shutdown(&mut active).await;

                    return Ok(Outcome::LoggedOut);
                }
                Input::Command(Some(Command::Restart { fresh, wait })) => {
                    Self::shutdown(&mut active).await;

                    return Ok(Outcome::Restart { fresh, wait });
                }
                Input::Command(Some(Command::Login)) => {
                    tracing::debug!("already logged in, ignoring login command");
                }
                Input::Command(Some(Command::Speaking(speaking))) => {
                    self.set_speaking(&mut active, speaking).await?;
                }
                Input::HeartbeatDue => self.heartbeat(&mut active).await?,
                Input::Message(None) => {
                    return Err(VoiceError {
                        kind: VoiceErrorType::StreamEnded,
                        source: None,
                    });
                }
                Input::Message(Some(Err(source))) => {
                    return Err(VoiceError {
                        kind: VoiceErrorType::StreamEnded,
                        source: Some(Box::new(source)),
                    });
                }
                Input::Message(Some(Ok(message))) => {
                    self.handle_message(&mut active, message).await?;
                }
                Input::Udp(None) | Input::Udp(Some(UdpEvent::Closed)) => {
                    return Err(VoiceError {
                        kind: VoiceErrorType::UdpTerminated,
                        source: None,
                    });
                }
                Input::Udp(Some(UdpEvent::FoundIp { address, port })) => {
                    self.handle_found_ip(&mut active, address, port).await?;
                }
            }
        }
    }

    async fn handle_message(
        &mut self,
        active: &mut ActiveState,
        message: Message,
    ) -> Result<(), VoiceError> {
        let text = match message {
            Message::Close(frame) => {
                tracing::debug!(?frame, "server closed the connection");

                return Err(VoiceError {
                    kind: VoiceErrorType::StreamEnded,
                    source: None,
                });
            }
            Message::Ping(data) => {
                active
                    .ws
                    .send(Message::Pong(data))
                    .await
                    .map_err(|source| VoiceError {
                        kind: VoiceErrorType::SendingMessage,
                        source: Some(Box::new(source)),
                    })?;

                return Ok(());
            }
            Message::Text(text) => text,
            other => {
                tracing::debug!("got non-text payload: {other:?}");

                return Ok(());
            }
        };

        if self.config.log_received_ws {
            tracing::debug!(payload = %text, "received voice payload");
        }

        let event = match IncomingEvent::parse(&text) {
            Ok(event) => event,
            Err(source) => {
                tracing::warn!("unknown voice payload: {source}");

                return Ok(());
            }
        };

        match event {
            IncomingEvent::HeartbeatAck(nonce) => self.handle_heartbeat_ack(active, nonce),
            IncomingEvent::Hello(hello) => {
                self.handle_hello(active, &hello);

                Ok(())
            }
            IncomingEvent::Ignored(opcode) => {
                tracing::debug!(?opcode, "ignoring frame");

                Ok(())
            }
            IncomingEvent::Ready(ready) => {
                self.handle_ready(active, ready);

                Ok(())
            }
            IncomingEvent::SessionDescription(description) => {
                self.handle_session_description(active, description);

                Ok(())
            }
            IncomingEvent::Speaking(speaking) => {
                let _res = self.events.send(Event::Speaking(speaking));

                Ok(())
            }
        }
    }

    fn handle_hello(&self, active: &mut ActiveState, hello: &incoming::Hello) {
        if !matches!(active.stage, Stage::WithQueue) {
            tracing::warn!("got hello after the handshake started, ignoring");

            return;
        }

        let millis = (hello.heartbeat_interval * HEARTBEAT_RATIO) as u64;

        if millis > 0 {
            let period = Duration::from_millis(millis);

            tracing::debug!(interval = %period.as_millis(), "starting heartbeats");

            active.heartbeat = Some(time::interval_at(Instant::now() + period, period));
        } else {
            tracing::warn!("server announced a zero heartbeat interval");
        }

        active.stage = Stage::WithHeartbeat {
            previous_nonce: None,
            received_ack: true,
        };
    }

    fn handle_ready(&mut self, active: &mut ActiveState, ready: incoming::Ready) {
        if let Stage::WithHeartbeat {
            previous_nonce,
            received_ack,
        } = active.stage
        {
            tracing::debug!(ssrc = ready.ssrc, port = ready.port, "voice server ready");

            let handle = self.launcher.launch(
                UdpKey {
                    address: ready.ip,
                    port: ready.port,
                    ssrc: ready.ssrc,
                },
                self.config.udp_queue.clone(),
            );
            let _res = handle.commands.send(UdpCommand::DiscoverIp);
            let _res = self.events.send(Event::Connected { ssrc: ready.ssrc });

            active.stage = Stage::WithUdp {
                ip: None,
                previous_nonce,
                received_ack,
                ssrc: ready.ssrc,
            };
            active.udp = Some(handle);
        } else {
            tracing::warn!("got ready in an unexpected stage, ignoring");
        }
    }

    fn handle_heartbeat_ack(
        &self,
        active: &mut ActiveState,
        nonce: u64,
    ) -> Result<(), VoiceError> {
        match &mut active.stage {
            Stage::WithQueue => {
                tracing::warn!("got heartbeat ack before hello, ignoring");

                Ok(())
            }
            Stage::WithHeartbeat {
                previous_nonce,
                received_ack,
            }
            | Stage::WithUdp {
                previous_nonce,
                received_ack,
                ..
            } => {
                if *previous_nonce == Some(nonce) {
                    *received_ack = true;

                    Ok(())
                } else {
                    Err(VoiceError {
                        kind: VoiceErrorType::NonceMismatch {
                            expected: *previous_nonce,
                            got: nonce,
                        },
                        source: None,
                    })
                }
            }
        }
    }

    async fn handle_found_ip(
        &mut self,
        active: &mut ActiveState,
        address: String,
        port: u16,
    ) -> Result<(), VoiceError> {
        match &mut active.stage {
            Stage::WithUdp { ip, .. } if ip.is_none() => {
                ip.replace(IpEndpoint { address, port });
            }
            _ => {
                tracing::warn!("unexpected ip discovery result, ignoring");

                return Ok(());
            }
        }

        // The selection is built from the recorded endpoint.
        let (address, port) = match &active.stage {
            Stage::WithUdp {
                ip: Some(endpoint), ..
            } => (endpoint.address.clone(), endpoint.port),
            _ => return Ok(()),
        };

        let frame = OutgoingEvent::from(outgoing::SelectProtocol::udp(
            address.clone(),
            port,
            ENCRYPTION_MODE.to_owned(),
        ));
        Self::send(&self.config, &mut active.ws, &frame).await?;

        let _res = self.events.send(Event::IpDiscovered { address, port });

        Ok(())
    }

    fn handle_session_description(
        &self,
        active: &mut ActiveState,
        description: incoming::SessionDescription,
    ) {
        if !matches!(active.stage, Stage::WithUdp { .. }) {
            tracing::warn!("got session description before udp stage, ignoring");

            return;
        }

        if let Some(udp) = &active.udp {
            let _res = udp.commands.send(UdpCommand::StartConnection {
                secret_key: description.secret_key,
            });
        }

        let _res = self.events.send(Event::SessionSecured);
    }

    /// Send a heartbeat for the current tick.
    ///
    /// An unacknowledged previous heartbeat is a dead or desynchronized
    /// connection and ends the session.
    async fn heartbeat(&self, active: &mut ActiveState) -> Result<(), VoiceError> {
        match &mut active.stage {
            Stage::WithQueue => Ok(()),
            Stage::WithHeartbeat {
                previous_nonce,
                received_ack,
            }
            | Stage::WithUdp {
                previous_nonce,
                received_ack,
                ..
            } => {
                if !*received_ack {
                    return Err(VoiceError {
                        kind: VoiceErrorType::HeartbeatUnacknowledged,
                        source: None,
                    });
                }

                let nonce = epoch_millis();
                *received_ack = false;
                *previous_nonce = Some(nonce);

                tracing::debug!(nonce, "sending heartbeat");

                let frame = OutgoingEvent::from(outgoing::Heartbeat::new(nonce));

                Self::send(&self.config, &mut active.ws, &frame).await
            }
        }
    }

    async fn set_speaking(
        &self,
        active: &mut ActiveState,
        speaking: bool,
    ) -> Result<(), VoiceError> {
        if let Stage::WithUdp { ssrc, .. } = active.stage {
            let frame = OutgoingEvent::from(outgoing::Speaking::new(outgoing::SpeakingInfo {
                delay: 0,
                speaking,
                ssrc,
            }));

            Self::send(&self.config, &mut active.ws, &frame).await
        } else {
            tracing::warn!("speaking before the handshake finished, ignoring");

            Ok(())
        }
    }

    /// Complete the outbound side: tell the UDP helper to stop and close
    /// the WebSocket.
    async fn shutdown(active: &mut ActiveState) {
        if let Some(udp) = &active.udp {
            let _res = udp.commands.send(UdpCommand::Shutdown);
        }

        let _res = active.ws.send(Message::Close(None)).await;
    }

    async fn send(
        config: &VoiceConfig,
        ws: &mut WsStream,
        event: &OutgoingEvent,
    ) -> Result<(), VoiceError> {
        let json = serde_json::to_string(event).map_err(|source| VoiceError {
            kind: VoiceErrorType::Serializing,
            source: Some(Box::new(source)),
        })?;

        if config.log_sent_ws {
            tracing::debug!(payload = %json, "sending voice payload");
        }

        ws.send(Message::Text(json))
            .await
            .map_err(|source| VoiceError {
                kind: VoiceErrorType::SendingMessage,
                source: Some(Box::new(source)),
            })
    }
}

/// Resolve when the heartbeat timer ticks; never, before the timer starts.
async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

/// Resolve with the next UDP helper event; never, before the helper runs.
async fn next_udp_event(udp: &mut Option<UdpHandle>) -> Option<UdpEvent> {
    match udp {
        Some(handle) => handle.events.recv().await,
        None => future::pending().await,
    }
}

/// Current time as milliseconds since the Unix epoch, used as the
/// heartbeat nonce.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::{Command, Event, Session, SessionClosed, VoiceError, VoiceErrorType};
    use static_assertions::assert_impl_all;
    use std::{error::Error, fmt::Debug};

    assert_impl_all!(Session: Clone, Debug, Send, Sync);
    assert_impl_all!(Command: Clone, Debug, Send, Sync);
    assert_impl_all!(Event: Clone, Debug, Send, Sync);
    assert_impl_all!(VoiceError: Debug, Error, Send, Sync);
    assert_impl_all!(VoiceErrorType: Debug, Send, Sync);
    assert_impl_all!(SessionClosed: Debug, Error, Send, Sync);
}
