//! Models to (de)serialize incoming and outgoing voice gateway frames.
//!
//! Frames are JSON envelopes of the form `{"op": <opcode>, "d": <payload>}`.

use serde_repr::{Deserialize_repr, Serialize_repr};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Numeric opcode of a voice gateway frame.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, PartialEq, Serialize_repr)]
#[non_exhaustive]
#[repr(u8)]
pub enum OpCode {
    /// Start a session, sent by the client.
    Identify = 0,
    /// Choose the transport protocol, sent by the client.
    SelectProtocol = 1,
    /// Handshake completion with SSRC and UDP port, sent by the server.
    Ready = 2,
    /// Keepalive with a nonce, sent by the client.
    Heartbeat = 3,
    /// Session key delivery, sent by the server.
    SessionDescription = 4,
    /// Speaking state change, sent by either side.
    Speaking = 5,
    /// Acknowledgement of a heartbeat, sent by the server.
    HeartbeatAck = 6,
    /// Heartbeat interval announcement, sent by the server.
    Hello = 8,
    /// Video state change; recognized but not acted upon.
    Video = 12,
    /// A user disconnected from voice; recognized but not acted upon.
    ClientDisconnect = 13,
}

/// Decoding a voice gateway frame failed.
#[derive(Debug)]
pub struct PayloadError {
    pub(crate) kind: PayloadErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl PayloadError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &PayloadErrorType {
        &self.kind
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (PayloadErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }

    fn deserializing(source: serde_json::Error) -> Self {
        Self {
            kind: PayloadErrorType::Deserializing,
            source: Some(Box::new(source)),
        }
    }
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            PayloadErrorType::Deserializing => f.write_str("frame could not be deserialized"),
            PayloadErrorType::UnexpectedOpcode { opcode } => {
                write!(f, "frame has client-to-server opcode {opcode:?}")
            }
        }
    }
}

impl Error for PayloadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`PayloadError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum PayloadErrorType {
    /// The frame or its payload is not valid JSON of the expected shape.
    Deserializing,
    /// The server sent an opcode only clients send.
    UnexpectedOpcode {
        /// The offending opcode.
        opcode: OpCode,
    },
}

pub use self::{incoming::IncomingEvent, outgoing::OutgoingEvent};

pub mod incoming {
    //! Events the voice server sends to clients.

    use super::{OpCode, PayloadError, PayloadErrorType};
    use serde::{Deserialize, Serialize};

    /// An incoming frame, decoded by opcode.
    #[derive(Clone, Debug, PartialEq)]
    #[non_exhaustive]
    pub enum IncomingEvent {
        /// Acknowledgement of a heartbeat, carrying back its nonce.
        HeartbeatAck(u64),
        /// Heartbeat interval announcement.
        Hello(Hello),
        /// A frame the protocol specifies but the session ignores.
        Ignored(OpCode),
        /// Handshake completion with SSRC and UDP endpoint.
        Ready(Ready),
        /// Session key delivery.
        SessionDescription(SessionDescription),
        /// A speaking state change of some user.
        Speaking(Speaking),
    }

    impl IncomingEvent {
        /// Decode a frame received over the voice gateway.
        ///
        /// # Errors
        ///
        /// Returns a [`PayloadErrorType::Deserializing`] error type if the
        /// text is not a known frame, or
        /// [`PayloadErrorType::UnexpectedOpcode`] if the opcode is one only
        /// clients send.
        pub fn parse(text: &str) -> Result<Self, PayloadError> {
            #[derive(Deserialize)]
            struct Frame {
                op: OpCode,
                d: serde_json::Value,
            }

            let frame: Frame =
                serde_json::from_str(text).map_err(PayloadError::deserializing)?;

            match frame.op {
                OpCode::HeartbeatAck => serde_json::from_value(frame.d)
                    .map(Self::HeartbeatAck)
                    .map_err(PayloadError::deserializing),
                OpCode::Hello => serde_json::from_value(frame.d)
                    .map(Self::Hello)
                    .map_err(PayloadError::deserializing),
                OpCode::Ready => serde_json::from_value(frame.d)
                    .map(Self::Ready)
                    .map_err(PayloadError::deserializing),
                OpCode::SessionDescription => serde_json::from_value(frame.d)
                    .map(Self::SessionDescription)
                    .map_err(PayloadError::deserializing),
                OpCode::Speaking => serde_json::from_value(frame.d)
                    .map(Self::Speaking)
                    .map_err(PayloadError::deserializing),
                OpCode::Video | OpCode::ClientDisconnect => Ok(Self::Ignored(frame.op)),
                opcode => Err(PayloadError {
                    kind: PayloadErrorType::UnexpectedOpcode { opcode },
                    source: None,
                }),
            }
        }
    }

    /// Heartbeat interval announcement.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct Hello {
        /// Interval between heartbeats in milliseconds.
        pub heartbeat_interval: f64,
    }

    /// Handshake completion.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct Ready {
        /// Address of the UDP endpoint.
        pub ip: String,
        /// Encryption modes the server supports.
        pub modes: Vec<String>,
        /// Port of the UDP endpoint.
        pub port: u16,
        /// Synchronization source assigned to this session.
        pub ssrc: u32,
    }

    /// Session key delivery.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct SessionDescription {
        /// The selected encryption mode.
        pub mode: String,
        /// Key the UDP transport encrypts with.
        pub secret_key: Vec<u8>,
    }

    /// A speaking state change of some user.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct Speaking {
        /// Whether the user is speaking.
        pub speaking: bool,
        /// Synchronization source of the user.
        pub ssrc: u32,
        /// ID of the user, when the server provides it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub user_id: Option<String>,
    }
}

pub mod outgoing {
    //! Events clients send to the voice server.

    use super::OpCode;
    use serde::{Deserialize, Serialize};

    /// An outgoing frame.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[non_exhaustive]
    #[serde(untagged)]
    pub enum OutgoingEvent {
        /// Start a session.
        Identify(Identify),
        /// Keepalive with a nonce.
        Heartbeat(Heartbeat),
        /// Choose the transport protocol and discovered endpoint.
        SelectProtocol(SelectProtocol),
        /// Announce the client's speaking state.
        Speaking(Speaking),
    }

    impl From<Identify> for OutgoingEvent {
        fn from(event: Identify) -> Self {
            Self::Identify(event)
        }
    }

    impl From<Heartbeat> for OutgoingEvent {
        fn from(event: Heartbeat) -> Self {
            Self::Heartbeat(event)
        }
    }

    impl From<SelectProtocol> for OutgoingEvent {
        fn from(event: SelectProtocol) -> Self {
            Self::SelectProtocol(event)
        }
    }

    impl From<Speaking> for OutgoingEvent {
        fn from(event: Speaking) -> Self {
            Self::Speaking(event)
        }
    }

    /// Start a session.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct Identify {
        op: OpCode,
        /// Payload of the frame.
        pub d: IdentifyInfo,
    }

    impl Identify {
        /// Create a new identify frame.
        pub const fn new(d: IdentifyInfo) -> Self {
            Self {
                op: OpCode::Identify,
                d,
            }
        }
    }

    /// Credentials identifying a session.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct IdentifyInfo {
        /// ID of the server to join.
        pub server_id: String,
        /// ID of the joining user's session.
        pub session_id: String,
        /// Token authorizing the session.
        pub token: String,
        /// ID of the joining user.
        pub user_id: String,
    }

    /// Keepalive with a nonce.
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct Heartbeat {
        op: OpCode,
        /// The nonce, matched against the acknowledgement.
        pub d: u64,
    }

    impl Heartbeat {
        /// Create a new heartbeat frame with the given nonce.
        pub const fn new(nonce: u64) -> Self {
            Self {
                op: OpCode::Heartbeat,
                d: nonce,
            }
        }
    }

    /// Choose the transport protocol and discovered endpoint.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct SelectProtocol {
        op: OpCode,
        /// Payload of the frame.
        pub d: SelectProtocolInfo,
    }

    impl SelectProtocol {
        /// Create a new frame selecting UDP with the given discovered
        /// endpoint and encryption mode.
        pub fn udp(address: String, port: u16, mode: String) -> Self {
            Self {
                op: OpCode::SelectProtocol,
                d: SelectProtocolInfo {
                    data: SelectProtocolData {
                        address,
                        mode,
                        port,
                    },
                    protocol: "udp".to_owned(),
                },
            }
        }
    }

    /// Protocol selection payload.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct SelectProtocolInfo {
        /// Endpoint and encryption details.
        pub data: SelectProtocolData,
        /// Name of the transport protocol.
        pub protocol: String,
    }

    /// Endpoint and encryption details of a protocol selection.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct SelectProtocolData {
        /// Externally visible address discovered over UDP.
        pub address: String,
        /// Selected encryption mode.
        pub mode: String,
        /// Externally visible port discovered over UDP.
        pub port: u16,
    }

    /// Announce the client's speaking state.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct Speaking {
        op: OpCode,
        /// Payload of the frame.
        pub d: SpeakingInfo,
    }

    impl Speaking {
        /// Create a new speaking frame.
        pub const fn new(d: SpeakingInfo) -> Self {
            Self {
                op: OpCode::Speaking,
                d,
            }
        }
    }

    /// Speaking state of the client.
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[non_exhaustive]
    pub struct SpeakingInfo {
        /// Delay in milliseconds before audio starts.
        pub delay: u64,
        /// Whether the client is speaking.
        pub speaking: bool,
        /// Synchronization source of this session.
        pub ssrc: u32,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        incoming::{Hello, IncomingEvent, Ready},
        outgoing::{Heartbeat, Identify, IdentifyInfo, OutgoingEvent, SelectProtocol},
        OpCode, PayloadError, PayloadErrorType,
    };
    use static_assertions::assert_impl_all;
    use std::{error::Error, fmt::Debug};

    assert_impl_all!(OpCode: Clone, Copy, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(IncomingEvent: Clone, Debug, PartialEq, Send, Sync);
    assert_impl_all!(OutgoingEvent: Clone, Debug, PartialEq, Send, Sync);
    assert_impl_all!(PayloadError: Debug, Error, Send, Sync);

    #[test]
    fn heartbeat_envelope() {
        let frame = OutgoingEvent::from(Heartbeat::new(1_629_473));

        assert_eq!(
            r#"{"op":3,"d":1629473}"#,
            serde_json::to_string(&frame).unwrap(),
        );
    }

    #[test]
    fn identify_envelope() {
        let frame = OutgoingEvent::from(Identify::new(IdentifyInfo {
            server_id: "1".to_owned(),
            session_id: "abc".to_owned(),
            token: "tok".to_owned(),
            user_id: "2".to_owned(),
        }));

        let json = serde_json::to_string(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(0, value["op"]);
        assert_eq!("abc", value["d"]["session_id"]);
    }

    #[test]
    fn select_protocol_envelope() {
        let frame = SelectProtocol::udp(
            "1.2.3.4".to_owned(),
            60_000,
            "xsalsa20_poly1305".to_owned(),
        );

        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(1, value["op"]);
        assert_eq!("udp", value["d"]["protocol"]);
        assert_eq!("1.2.3.4", value["d"]["data"]["address"]);
        assert_eq!(60_000, value["d"]["data"]["port"]);
        assert_eq!("xsalsa20_poly1305", value["d"]["data"]["mode"]);
    }

    #[test]
    fn parse_hello() {
        let event =
            IncomingEvent::parse(r#"{"op":8,"d":{"heartbeat_interval":41250.0}}"#).unwrap();

        assert_eq!(
            IncomingEvent::Hello(Hello {
                heartbeat_interval: 41250.0,
            }),
            event,
        );
    }

    #[test]
    fn parse_ready() {
        let event = IncomingEvent::parse(
            r#"{"op":2,"d":{"ssrc":7,"ip":"127.0.0.1","port":5000,"modes":["xsalsa20_poly1305"]}}"#,
        )
        .unwrap();

        assert_eq!(
            IncomingEvent::Ready(Ready {
                ip: "127.0.0.1".to_owned(),
                modes: vec!["xsalsa20_poly1305".to_owned()],
                port: 5000,
                ssrc: 7,
            }),
            event,
        );
    }

    #[test]
    fn parse_heartbeat_ack() {
        let event = IncomingEvent::parse(r#"{"op":6,"d":123}"#).unwrap();

        assert_eq!(IncomingEvent::HeartbeatAck(123), event);
    }

    #[test]
    fn ignored_opcodes() {
        let video = IncomingEvent::parse(r#"{"op":12,"d":{}}"#).unwrap();
        let disconnect = IncomingEvent::parse(r#"{"op":13,"d":{"user_id":"5"}}"#).unwrap();

        assert_eq!(IncomingEvent::Ignored(OpCode::Video), video);
        assert_eq!(IncomingEvent::Ignored(OpCode::ClientDisconnect), disconnect);
    }

    #[test]
    fn client_opcode_from_server_is_an_error() {
        let err = IncomingEvent::parse(r#"{"op":0,"d":{}}"#).unwrap_err();

        assert!(matches!(
            err.kind(),
            PayloadErrorType::UnexpectedOpcode {
                opcode: OpCode::Identify,
            }
        ));
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        assert!(IncomingEvent::parse(r#"{"op":9,"d":false}"#).is_err());
    }
}
