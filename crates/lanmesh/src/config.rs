//! Tunable constants and the beacon's configuration struct.

/// Port the control RPC replier binds to (`tcp://*:{CONTROL_PORT}`).
pub const CONTROL_PORT: u16 = 9998;

/// Port used for UDP advertisement broadcast and receipt.
pub const BEACON_PORT: u16 = 9999;

/// Maximum size, in bytes, of an advertisement datagram.
pub const BEACON_MESSAGE_SIZE: usize = 256;

/// Character encoding used for all text this crate produces. The transport
/// and control-RPC payloads are UTF-8 JSON; this constant exists so the
/// encoding is named in one place rather than assumed at each call site.
pub const ENCODING: &str = "utf-8";

/// Broadcast address advertisements are sent to.
pub const BROADCAST_ADDR: &str = "255.255.255.255";

/// Tunables for a single [`crate::beacon::BeaconHandle`].
///
/// Broadcast every two seconds by default, and spend half a second per cycle
/// listening for peers' broadcasts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeaconConfig {
    /// Minimum time between two broadcast rounds.
    pub interval_secs: f64,
    /// How long each cycle polls the UDP socket for incoming adverts.
    pub finder_timeout_secs: f64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            finder_timeout_secs: 0.5,
        }
    }
}
