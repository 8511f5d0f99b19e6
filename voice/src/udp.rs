//! Seam to the external UDP transport helper.
//!
//! The session does not implement UDP audio transport itself. It spawns a
//! helper through a [`UdpLauncher`] implementation once the server has
//! assigned an endpoint, asks it to discover the externally visible
//! address, and later hands it the session key. The helper talks back over
//! an event channel; its termination while the session is active is a
//! fatal error.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// What a UDP helper instance is keyed to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct UdpKey {
    /// Address of the server's UDP endpoint.
    pub address: String,
    /// Port of the server's UDP endpoint.
    pub port: u16,
    /// Synchronization source assigned to the session.
    pub ssrc: u32,
}

/// Instruction for the UDP helper.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum UdpCommand {
    /// Discover the externally visible address and port.
    DiscoverIp,
    /// Tear the helper down.
    Shutdown,
    /// Begin the encrypted connection with the session key.
    StartConnection {
        /// Key the transport encrypts with.
        secret_key: Vec<u8>,
    },
}

/// Notification from the UDP helper.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum UdpEvent {
    /// The helper stopped.
    Closed,
    /// IP discovery finished.
    FoundIp {
        /// Externally visible address.
        address: String,
        /// Externally visible port.
        port: u16,
    },
}

/// Control handle of a spawned UDP helper.
#[derive(Debug)]
pub struct UdpHandle {
    /// Instructions for the helper.
    pub commands: UnboundedSender<UdpCommand>,
    /// Notifications from the helper.
    pub events: UnboundedReceiver<UdpEvent>,
}

/// Shape of the helper's outbound packet queue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UdpQueueConfig {
    /// How many packets may be sent in one burst.
    pub max_burst_amount: usize,
    /// How many packets may be queued before new ones are dropped.
    pub max_packets_before_drop: usize,
    /// How many packets to request from the producer at a time.
    pub send_request_amount: usize,
}

impl Default for UdpQueueConfig {
    fn default() -> Self {
        Self {
            max_burst_amount: 10,
            max_packets_before_drop: 1000,
            send_request_amount: 100,
        }
    }
}

/// Factory spawning UDP helpers for sessions.
///
/// Implementations start whatever transport they like and return the
/// channels the session coordinates over. The session sends
/// [`UdpCommand::DiscoverIp`] right after launching and expects a
/// [`UdpEvent::FoundIp`] back.
pub trait UdpLauncher {
    /// Start a helper for the given key.
    fn launch(&self, key: UdpKey, queue: UdpQueueConfig) -> UdpHandle;
}

#[cfg(test)]
mod tests {
    use super::{UdpCommand, UdpEvent, UdpHandle, UdpKey, UdpQueueConfig};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(UdpKey: Clone, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(UdpCommand: Clone, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(UdpEvent: Clone, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(UdpHandle: Debug, Send);
    assert_impl_all!(UdpQueueConfig: Clone, Debug, Default, Eq, PartialEq, Send, Sync);
}
