//! Wire protocol constants
//!
//! Every line on both links is ASCII and terminated by a single `\n`.

/// Line terminator
pub const LINE_TERMINATOR: u8 = b'\n';

/// Heartbeat request sent by the host
pub const HEARTBEAT: &[u8] = b"C\n";

/// Heartbeat reply, answered by the broker without a device round-trip
pub const HEARTBEAT_REPLY: &[u8] = b"c\n";

/// Command accepted (syntactically valid and converted)
pub const ACK: &[u8] = b"OK\n";

/// Malformed host command
pub const ERR_BAD_COMMAND: &[u8] = b"ERR1:BadCmd\n";

/// Move addressed an axis with no configuration
pub const ERR_BAD_AXIS: &[u8] = b"ERR2:BadAxis\n";

/// Default baud rate of both links
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read/write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Default pause between reconnect attempts in milliseconds
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 2_000;
