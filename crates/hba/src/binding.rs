// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! LUN to target port mapping and persistent binding support
//!
//! `sys/class/scsi_device` holds one `<host>:<channel>:<target>:<lun>`
//! entry per LUN. A mapping walk filters those entries, resolves each back to
//! the remote port owning the target, and collects the block and SCSI
//! generic device nodes found under the entry's `device` directory.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

use crate::{
    attributes::{BindCapability, BINDING_TYPES},
    codec,
    rport::RemotePort,
    sysfs, Error, Handle, Result, Topology, Wwn, DEVFS_DIR, SCSI_DEVICE_DIR,
};

/// Regex pattern for SCSI device entries, `<host>:<channel>:<target>:<lun>`
static LUN_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Binding modes every adapter can provide
const BINDING_CAPABILITIES: BindCapability = BindCapability::D_ID
    .union(BindCapability::WWPN)
    .union(BindCapability::WWNN);

/// Data allocation for the device identification inquiry
const LUID_ALLOC_LEN: usize = 256;

/// Host attribute selecting the target id binding mode
const BIND_ATTRIBUTE: &str = "tgtid_bind_type";

/// Constrains a mapping walk. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    pub host: u32,
    pub channel: Option<u32>,
    pub target: Option<u32>,
    pub lun: Option<u64>,
}

impl Filter {
    /// Match every LUN of `host`
    pub fn host(host: u32) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    fn matches(&self, host: u32, channel: u32, target: u32, lun: u64) -> bool {
        host == self.host
            && self.channel.map_or(true, |c| c == channel)
            && self.target.map_or(true, |t| t == target)
            && self.lun.map_or(true, |l| l == lun)
    }
}

/// The SCSI address of a LUN as seen by the operating system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScsiId {
    /// Block device node, e.g. `/dev/sdc`; empty if the LUN has none
    pub os_device_name: String,
    pub bus: u32,
    pub target: u32,
    pub os_lun: u64,
}

/// The FC address of a LUN
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FcpId {
    pub fcid: u32,
    pub node_wwn: Wwn,
    pub port_wwn: Wwn,
    pub fcp_lun: u64,
}

/// One mapped LUN
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScsiEntry {
    pub scsi: ScsiId,
    pub fcp: FcpId,
    /// Best device identification descriptor, when requested and available
    pub luid: Option<Vec<u8>>,
    /// SCSI generic device node, e.g. `/dev/sg3`; empty if the LUN has none
    pub sg_device: String,
}

/// Result of a mapping walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetMapping {
    pub entries: Vec<ScsiEntry>,
    /// Number of matching LUNs, which may exceed `entries.len()`
    pub total: usize,
}

fn parse_lun_name(name: &str) -> Option<(u32, u32, u32, u64)> {
    let regex = LUN_PATTERN
        .get_or_init(|| Regex::new(r"^(\d+):(\d+):(\d+):(\d+)$").expect("Failed to initialise known-working regex"));
    let captures = regex.captures(name)?;
    Some((
        captures[1].parse().ok()?,
        captures[2].parse().ok()?,
        captures[3].parse().ok()?,
        captures[4].parse().ok()?,
    ))
}

/// Block and SCSI generic device nodes under a LUN's `device` directory.
///
/// Both the `block:sdX` symlink form and the older `block/sdX`
/// subdirectory form are searched; the entry visited last wins.
fn device_names(device_dir: &Path) -> (Option<String>, Option<String>) {
    let mut block = None;
    let mut generic = None;
    let mut record = |class: &str, name: &str| {
        let node = format!("{DEVFS_DIR}/{name}");
        match class {
            "block" => block = Some(node),
            "scsi_generic" => generic = Some(node),
            _ => {}
        }
    };

    for entry in sysfs::dir_names(device_dir).unwrap_or_default() {
        let path = device_dir.join(&entry);
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        match entry.split_once(':') {
            Some((class, name)) if meta.file_type().is_symlink() => record(class, name),
            None if meta.is_dir() && (entry == "block" || entry == "scsi_generic") => {
                for child in sysfs::dir_names(&path).unwrap_or_default() {
                    record(&entry, &child);
                }
            }
            _ => {}
        }
    }
    (block, generic)
}

impl Topology {
    /// Walk the SCSI device hierarchy for LUNs of the adapter matching `filter`.
    ///
    /// At most `limit` entries are filled but every match is counted. When
    /// more LUNs match than fit, [`Error::MoreData`] carries the partial
    /// mapping and the true total.
    ///
    /// The owning remote port is `known` when given, otherwise the remote
    /// port of the entry's channel whose SCSI target number matches.
    pub(crate) fn map_luns(
        &mut self,
        handle: Handle,
        filter: Filter,
        known: Option<usize>,
        limit: usize,
        identify: bool,
    ) -> Result<TargetMapping> {
        if known.is_none() {
            self.match_all_remote_ports(handle)?;
        }
        let adapter = self.adapter(handle)?;
        let known = known.and_then(|i| self.remote_ports.get(i));

        let dir = self.sysroot.join(SCSI_DEVICE_DIR);
        let names = sysfs::dir_names(&dir).unwrap_or_else(|e| {
            debug!("{}: {e}", dir.display());
            Vec::new()
        });

        let mut mapping = TargetMapping::default();
        for name in names {
            let Some((host, channel, target, lun)) = parse_lun_name(&name) else {
                continue;
            };
            if !filter.matches(host, channel, target, lun) {
                continue;
            }
            mapping.total += 1;
            if mapping.entries.len() >= limit {
                continue;
            }

            let rport: Option<&RemotePort> = known.or_else(|| {
                let local = adapter.port(channel as usize)?;
                self.attached(local).find(|r| r.scsi_target == Some(target))
            });
            let fcp = rport
                .map(|r| FcpId {
                    fcid: r.attributes.fcid,
                    node_wwn: r.attributes.node_wwn,
                    port_wwn: r.attributes.port_wwn,
                    fcp_lun: lun,
                })
                .unwrap_or_default();

            let (block, generic) = device_names(&dir.join(&name).join("device"));
            let luid = match (&generic, identify) {
                (Some(sg), true) => match sg::device_id::identify(
                    self.passthrough.as_ref(),
                    Path::new(sg),
                    LUID_ALLOC_LEN,
                ) {
                    Ok(luid) => luid,
                    Err(e) => {
                        warn!("{sg}: device identification failed: {e}");
                        None
                    }
                },
                _ => None,
            };

            mapping.entries.push(ScsiEntry {
                scsi: ScsiId {
                    os_device_name: block.unwrap_or_default(),
                    bus: host,
                    target,
                    os_lun: lun,
                },
                fcp,
                luid,
                sg_device: generic.unwrap_or_default(),
            });
        }

        if mapping.total > limit {
            Err(Error::MoreData(Box::new(mapping)))
        } else {
            Ok(mapping)
        }
    }

    /// Map every LUN of the adapter, without LUN identities
    pub fn target_mapping_v1(&mut self, handle: Handle, limit: usize) -> Result<TargetMapping> {
        let host = self.adapter(handle)?.kernel_index;
        self.map_luns(handle, Filter::host(host), None, limit, false)
    }

    /// Map the LUNs reachable through the local port `wwn`, identifying each
    pub fn target_mapping_v2(&mut self, handle: Handle, wwn: Wwn, limit: usize) -> Result<TargetMapping> {
        let port = self.unique_port_by_wwn(handle, wwn)?;
        let filter = Filter {
            host: port.kernel_host,
            channel: Some(port.index as u32),
            ..Default::default()
        };
        self.map_luns(handle, filter, None, limit, true)
    }

    /// Resolve LUN `lun` of remote port `disc_wwpn` to its SCSI generic node
    pub fn sg_name(&mut self, handle: Handle, port: usize, disc_wwpn: Wwn, lun: u64) -> Result<PathBuf> {
        self.match_remote_ports(handle, port)?;
        let local = self.port(handle, port)?;
        let (index, rport) = local
            .rports
            .values()
            .filter_map(|i| Some((*i, self.remote_ports.get(*i)?)))
            .find(|(_, r)| r.attributes.port_wwn == disc_wwpn)
            .ok_or(Error::IllegalWwn(disc_wwpn))?;
        let target = rport.scsi_target.ok_or(Error::TargetLun(lun))?;
        let filter = Filter {
            host: rport.kernel_host,
            channel: Some(rport.channel),
            target: Some(target),
            lun: Some(lun),
        };

        let mapping = match self.map_luns(handle, filter, Some(index), 1, false) {
            Ok(mapping) => mapping,
            Err(Error::MoreData(_)) => return Err(Error::TargetLun(lun)),
            Err(e) => return Err(e),
        };
        match mapping.entries.as_slice() {
            [entry] if mapping.total == 1 && !entry.sg_device.is_empty() => Ok(PathBuf::from(&entry.sg_device)),
            _ => Err(Error::TargetLun(lun)),
        }
    }

    /// Binding modes available on the port `wwn`
    pub fn binding_capability(&self, handle: Handle, wwn: Wwn) -> Result<BindCapability> {
        self.unique_port_by_wwn(handle, wwn)?;
        Ok(BINDING_CAPABILITIES)
    }

    /// Binding mode currently selected on the port `wwn`; empty when unreadable
    pub fn binding_support(&self, handle: Handle, wwn: Wwn) -> Result<BindCapability> {
        let port = self.unique_port_by_wwn(handle, wwn)?;
        let support = sysfs::read_line(&port.host_dir, BIND_ATTRIBUTE)
            .ok()
            .and_then(|text| codec::encode(BINDING_TYPES, &text))
            .map(BindCapability::from_bits_retain)
            .unwrap_or_default();
        Ok(support)
    }

    /// Select the binding mode of the port `wwn`
    pub fn set_binding_support(&self, handle: Handle, wwn: Wwn, flags: BindCapability) -> Result<()> {
        let port = self.unique_port_by_wwn(handle, wwn)?;
        if !BINDING_CAPABILITIES.contains(flags) {
            return Err(Error::NotSupported);
        }
        let mode = codec::decode(BINDING_TYPES, flags.bits());
        if mode.contains("Unknown") {
            return Err(Error::NotSupported);
        }
        sysfs::write_line(&port.host_dir, BIND_ATTRIBUTE, &mode).map_err(|e| {
            warn!("{}/{BIND_ATTRIBUTE}: {e}", port.host_dir.display());
            Error::Incapable
        })
    }
}
