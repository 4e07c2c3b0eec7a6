//! # StepBridge Communication
//!
//! Serial transport and forwarding for the StepBridge broker.
//! Owns the host-facing and device-facing links, reopens them as a pair on
//! transport faults, and runs the two duplex forwarding loops.

pub mod broker;
pub mod communication;

pub use broker::{
    forwarding::{handle_host_line, HostReply},
    Broker, BrokerState, Direction,
};
pub use communication::{
    link_manager::{LinkManager, LinkOpener, LinkPair, Session},
    memory::{MemoryLink, MemoryOpener},
    serial::{list_ports, SerialOpener, SerialPortInfo, SerialPortLink},
    LinkParams, LinkRole, SerialLink,
};
