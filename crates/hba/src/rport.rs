// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Remote (discovered) ports
//!
//! `sys/class/fc_remote_ports` lists the remote ports of every host in one
//! directory. It is scanned once into a [`RemotePortRegistry`], then each
//! local port claims the entries carrying its host and channel numbers.

use std::{path::Path, sync::OnceLock};

use log::{debug, warn};
use regex::Regex;

use crate::{
    adapter::{LocalPort, SysfsInit},
    attributes::{ClassOfService, PortAttributes, PortState},
    sysfs, Table, FC_REMOTE_PORTS_DIR,
};

/// Regex pattern for remote port entries, `rport-<host>:<channel>-<index>`
static RPORT_PATTERN: OnceLock<Regex> = OnceLock::new();

/// A port discovered through a local port
#[derive(Debug, Clone)]
pub struct RemotePort {
    pub kernel_host: u32,
    pub channel: u32,
    /// Discovery index, the last number of the entry name
    pub disc_index: u32,
    /// SCSI target number, `None` when the port has no SCSI target
    pub scsi_target: Option<u32>,
    /// Owning adapter, set once attached to a local port
    pub adapter: Option<usize>,
    pub attributes: PortAttributes,
}

fn parse_name(name: &str) -> Option<(u32, u32, u32)> {
    let regex = RPORT_PATTERN
        .get_or_init(|| Regex::new(r"^rport-(\d+):(\d+)-(\d+)$").expect("Failed to initialise known-working regex"));
    let captures = regex.captures(name)?;
    Some((
        captures[1].parse().ok()?,
        captures[2].parse().ok()?,
        captures[3].parse().ok()?,
    ))
}

impl SysfsInit for RemotePort {
    /// Every identifying attribute must be readable; a port missing
    /// any of them is dropped.
    fn from_sysfs_path(sysroot: &Path, name: &str) -> Option<Self> {
        let Some((kernel_host, channel, disc_index)) = parse_name(name) else {
            warn!("remote port {name} didn't parse");
            return None;
        };
        let dir = sysroot.join(FC_REMOTE_PORTS_DIR).join(name);
        let node = dir.as_path();

        let read = || -> crate::Result<_> {
            let state_text = sysfs::read_line(node, "port_state")?;
            let state = PortState::from_sysfs(&state_text).ok_or_else(|| {
                crate::Error::Parse(crate::codec::ParseError::UnknownToken(state_text.clone()))
            })?;
            Ok((
                sysfs::read_wwn(node, "node_name")?,
                sysfs::read_wwn(node, "port_name")?,
                sysfs::read_u32(node, "port_id")?,
                sysfs::read_i32(node, "scsi_target_id")?,
                state,
                ClassOfService::from_sysfs(&sysfs::read_line(node, "supported_classes")?)?,
            ))
        };
        let (node_wwn, port_wwn, fcid, target, state, supported_cos) = match read() {
            Ok(values) => values,
            Err(e) => {
                warn!("{}: {e}", node.display());
                return None;
            }
        };

        let attributes = PortAttributes {
            node_wwn,
            port_wwn,
            fcid,
            state,
            supported_cos,
            max_frame_size: sysfs::read_leading_u32(node, "maxframe_size").unwrap_or(0),
            os_device_name: dir.display().to_string(),
            ..Default::default()
        };

        Some(Self {
            kernel_host,
            channel,
            disc_index,
            scsi_target: u32::try_from(target).ok(),
            adapter: None,
            attributes,
        })
    }
}

/// Process-wide registry of remote ports, filled on first use
#[derive(Debug, Default)]
pub struct RemotePortRegistry {
    scanned: bool,
    ports: Table<RemotePort>,
}

impl RemotePortRegistry {
    /// Scan `sys/class/fc_remote_ports` unless it has been scanned before.
    ///
    /// A missing directory leaves the registry empty.
    pub(crate) fn ensure_scanned(&mut self, sysroot: &Path) {
        if self.scanned {
            return;
        }
        self.scanned = true;

        let dir = sysroot.join(FC_REMOTE_PORTS_DIR);
        let names = match sysfs::dir_names(&dir) {
            Ok(names) => names,
            Err(e) => {
                debug!("{}: {e}", dir.display());
                return;
            }
        };
        for name in names {
            let Some(port) = RemotePort::from_sysfs_path(sysroot, &name) else {
                continue;
            };
            if let Err(e) = self.ports.append(port) {
                warn!("unable to register remote port {name}: {e}");
            }
        }
        debug!("Found {} remote ports", self.ports.len());
    }

    /// Attach every unclaimed remote port of `port`'s host and channel to it.
    ///
    /// A second entry with the same discovery index replaces the first.
    pub(crate) fn attach(&mut self, port: &mut LocalPort) {
        if port.rports_matched {
            return;
        }
        port.rports_matched = true;

        for (index, rport) in self.ports.iter_mut() {
            let foreign = rport.kernel_host != port.kernel_host || rport.channel as usize != port.index;
            if foreign || rport.adapter.is_some() {
                continue;
            }
            rport.adapter = Some(port.adapter);
            let disc_index = rport.disc_index as usize;
            if port.rports.get(disc_index).is_some() {
                warn!(
                    "discovered port exists. host {} port {} rport {}",
                    port.kernel_host, port.index, disc_index
                );
            }
            if let Err(e) = port.rports.insert(disc_index, index) {
                warn!("unable to attach remote port {disc_index} to host {}: {e}", port.kernel_host);
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&RemotePort> {
        self.ports.get(index)
    }

    /// Iterate every registered remote port
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RemotePort)> {
        self.ports.iter()
    }
}
