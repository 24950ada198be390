// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Fibre Channel host bus adapter topology discovery
//!
//! Adapters, their local ports and the remote ports reachable through them
//! are discovered from the FC transport class in sysfs. LUNs are mapped back
//! to remote ports through the SCSI device hierarchy, and resolved to their
//! block and SCSI generic device nodes.
//!
//! ```no_run
//! use hba::Topology;
//!
//! let mut topology = Topology::discover()?;
//! for (index, adapter) in topology.adapters() {
//!     println!("{index}: {}", adapter.name);
//! }
//! # Ok::<(), hba::Error>(())
//! ```

use std::io;

use thiserror::Error;

pub mod adapter;
pub mod attributes;
pub mod binding;
pub mod codec;
pub mod pci;
pub mod rport;
pub mod scsi;
pub mod stats;
mod sysfs;
pub mod table;
pub mod topology;
pub mod wwn;

#[cfg(test)]
mod mock;

pub use adapter::{Adapter, LocalPort};
pub use attributes::{
    AdapterAttributes, BindCapability, ClassOfService, Fc4Types, PortAttributes, PortSpeed, PortState, PortType,
};
pub use binding::{Filter, TargetMapping};
pub use rport::RemotePort;
pub use table::Table;
pub use topology::{Handle, Topology};
pub use wwn::Wwn;

const FC_HOST_DIR: &str = "sys/class/fc_host";
const NET_DIR: &str = "sys/class/net";
const SCSI_DEVICE_DIR: &str = "sys/class/scsi_device";
const FC_REMOTE_PORTS_DIR: &str = "sys/class/fc_remote_ports";
const PCI_DEVICES_DIR: &str = "sys/bus/pci/devices";
const DEVFS_DIR: &str = "/dev";

/// Errors returned by topology queries
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("invalid adapter handle 0x{0:x}")]
    InvalidHandle(u32),

    #[error("no entry at index {0}")]
    IllegalIndex(usize),

    #[error("no port with WWN {0}")]
    IllegalWwn(Wwn),

    #[error("WWN {0} matches {1} ports")]
    AmbiguousWwn(Wwn, usize),

    #[error("no port with FC-ID 0x{0:06x}")]
    IllegalFcid(u32),

    #[error("LUN {0} is not mapped")]
    TargetLun(u64),

    #[error("no target port with WWN {0}")]
    TargetPortWwn(Wwn),

    #[error("operation not supported")]
    NotSupported,

    #[error("adapter is incapable of the requested operation")]
    Incapable,

    #[error("SCSI CHECK CONDITION")]
    ScsiCheckCondition { sense: Vec<u8> },

    /// More entries matched than the caller asked for
    #[error("{} mappings available, room for {}", .0.total, .0.entries.len())]
    MoreData(Box<TargetMapping>),

    #[error("table: {0}")]
    Table(#[from] table::TableError),

    #[error("parse: {0}")]
    Parse(#[from] codec::ParseError),

    #[error("scsi: {0}")]
    Scsi(#[from] sg::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
