//! Forwarding engine
//!
//! Two blocking loops, one per direction. Each alternates between reading a
//! line (bounded by the link timeout) and processing it.
//!
//! Host to device: heartbeats are answered locally, moves are converted to
//! steps and rewritten, other valid commands are forwarded unchanged, and
//! invalid lines are rejected. The host always gets its acknowledgement
//! before anything is written to the device.
//!
//! Device to host: lines are relayed verbatim.

use super::{BrokerState, Direction};
use crate::communication::link_manager::Session;
use std::io;
use stepbridge_core::constants::{ACK, ERR_BAD_AXIS, ERR_BAD_COMMAND, HEARTBEAT_REPLY};
use stepbridge_core::{AxisRegistry, Command, ConversionError, Unit};
use tracing::{debug, error, info, warn};

/// What to write in response to one host line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReply {
    /// Written to the host first
    pub to_host: &'static [u8],
    /// Then written to the device, if present
    pub to_device: Option<Vec<u8>>,
}

impl HostReply {
    fn host_only(to_host: &'static [u8]) -> Self {
        Self {
            to_host,
            to_device: None,
        }
    }

    fn forward(to_device: Vec<u8>) -> Self {
        Self {
            to_host: ACK,
            to_device: Some(to_device),
        }
    }
}

/// Decide the replies for one complete host line
pub fn handle_host_line(line: &[u8], axes: &AxisRegistry) -> HostReply {
    match Command::parse(line) {
        Command::Heartbeat => HostReply::host_only(HEARTBEAT_REPLY),
        Command::Move {
            kind,
            axis,
            value,
            unit,
        } => match axes.convert(axis, value, unit) {
            Ok(steps) => {
                let rewritten = Command::Move {
                    kind,
                    axis,
                    value: steps,
                    unit: Unit::Steps,
                };
                HostReply::forward(format!("{}\n", rewritten).into_bytes())
            }
            Err(e @ ConversionError::UnknownAxisConfig { .. }) => {
                warn!("Rejected move: {}", e);
                HostReply::host_only(ERR_BAD_AXIS)
            }
            Err(e @ ConversionError::OutOfRange { .. }) => {
                warn!("Rejected move: {}", e);
                HostReply::host_only(ERR_BAD_COMMAND)
            }
        },
        Command::Invalid { raw } => {
            debug!("Rejected invalid command {:?}", raw);
            HostReply::host_only(ERR_BAD_COMMAND)
        }
        Command::Home { .. }
        | Command::StatusRequest
        | Command::EmergencyStop
        | Command::Kill { .. }
        | Command::Profile { .. }
        | Command::TimeoutSet { .. } => HostReply::forward(line.to_vec()),
    }
}

/// One host-to-device cycle: read a line, acknowledge it, forward it
pub fn pump_host(session: &Session, axes: &AxisRegistry) -> io::Result<()> {
    let Some(line) = session.host().read_line()? else {
        return Ok(());
    };
    info!("host -> {}", String::from_utf8_lossy(&line).trim_end());

    let reply = handle_host_line(&line, axes);
    session.host().write_line(reply.to_host)?;
    if let Some(forward) = reply.to_device {
        session.device().write_line(&forward)?;
    }
    Ok(())
}

/// One device-to-host cycle: relay a line verbatim
pub fn pump_device(session: &Session) -> io::Result<()> {
    let Some(line) = session.device().read_line()? else {
        return Ok(());
    };
    info!("device -> {}", String::from_utf8_lossy(&line).trim_end());
    session.host().write_line(&line)
}

/// Run one direction until shutdown
pub fn run_direction(direction: Direction, state: &BrokerState) {
    let mut session = match state.links.open_all() {
        Ok(session) => session,
        Err(e) => {
            debug!(%direction, "Worker not started: {}", e);
            return;
        }
    };
    info!(%direction, "Worker started");

    while !state.shutdown.is_triggered() {
        let result = match direction {
            Direction::HostToDevice => pump_host(&session, &state.axes),
            Direction::DeviceToHost => pump_device(&session),
        };

        if let Err(e) = result {
            if state.shutdown.is_triggered() {
                break;
            }
            error!(
                %direction,
                generation = session.generation(),
                "Transport fault: {}. Reopening links",
                e
            );
            match state.links.reopen(&session) {
                Ok(fresh) => session = fresh,
                Err(e) => {
                    debug!(%direction, "Reconnect abandoned: {}", e);
                    break;
                }
            }
        }
    }

    info!(%direction, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepbridge_core::{AxisConfig, AxisId};

    fn axes() -> AxisRegistry {
        AxisRegistry::from_configs([
            AxisConfig::new(AxisId::new(1).unwrap(), 200),
            AxisConfig::new(AxisId::new(2).unwrap(), 400).with_gear_ratio(5.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_heartbeat_is_answered_locally() {
        let reply = handle_host_line(b"C\n", &axes());
        assert_eq!(reply.to_host, b"c\n");
        assert_eq!(reply.to_device, None);
    }

    #[test]
    fn test_move_in_steps() {
        let reply = handle_host_line(b"M1100\n", &axes());
        assert_eq!(reply.to_host, b"OK\n");
        assert_eq!(reply.to_device.as_deref(), Some(&b"M1100\n"[..]));
    }

    #[test]
    fn test_move_with_explicit_sign_and_unit() {
        let reply = handle_host_line(b"M1+100S\n", &axes());
        assert_eq!(reply.to_device.as_deref(), Some(&b"M1100\n"[..]));
    }

    #[test]
    fn test_move_in_degrees() {
        let reply = handle_host_line(b"A2-90G\n", &axes());
        assert_eq!(reply.to_host, b"OK\n");
        assert_eq!(reply.to_device.as_deref(), Some(&b"A2-500\n"[..]));
    }

    #[test]
    fn test_unknown_axis() {
        let reply = handle_host_line(b"M3100\n", &axes());
        assert_eq!(reply.to_host, b"ERR2:BadAxis\n");
        assert_eq!(reply.to_device, None);
    }

    #[test]
    fn test_conversion_overflow() {
        let reply = handle_host_line(b"M29223372036854775807G\n", &axes());
        assert_eq!(reply.to_host, b"ERR1:BadCmd\n");
        assert_eq!(reply.to_device, None);
    }

    #[test]
    fn test_pass_through_is_byte_identical() {
        for line in [
            &b"H1\n"[..],
            b"S\n",
            b"E\n",
            b"K6\n",
            b"PV0042\n",
            b"PA500\n",
            b"T1000\n",
        ] {
            let reply = handle_host_line(line, &axes());
            assert_eq!(reply.to_host, b"OK\n");
            assert_eq!(reply.to_device.as_deref(), Some(line));
        }
    }

    #[test]
    fn test_invalid_line() {
        let reply = handle_host_line(b"Z9\n", &axes());
        assert_eq!(reply.to_host, b"ERR1:BadCmd\n");
        assert_eq!(reply.to_device, None);
    }
}
