#![deny(
    clippy::all,
    future_incompatible,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused
)]
#![doc = include_str!("../README.md")]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod model;
pub mod session;
pub mod udp;

pub use self::{
    config::VoiceConfig,
    session::{Command, Event, Session, SessionClosed, VoiceError, VoiceErrorType},
    udp::{UdpCommand, UdpEvent, UdpHandle, UdpKey, UdpLauncher, UdpQueueConfig},
};

/// Version of the voice gateway protocol the session speaks.
pub const GATEWAY_VERSION: u8 = 4;
