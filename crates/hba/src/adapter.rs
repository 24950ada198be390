// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Adapters and their local ports
//!
//! Every `fc_host` entry whose symbolic name carries the ` over ` marker of
//! an FCoE interface becomes one adapter with a single local port.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, error, warn};

use crate::{
    attributes::{AdapterAttributes, ClassOfService, Fc4Types, PortAttributes, PortSpeed, PortState, PortType},
    codec::ParseError,
    pci::{PciAddress, PciIdentity, PciLookup},
    sysfs, Table, FC_HOST_DIR, NET_DIR,
};

/// Marker separating the driver description from the interface name in
/// an FCoE host's `symbolic_name`
const OVER_MARKER: &str = " over ";

/// Trait for initializing entities from a sysfs directory entry
pub(crate) trait SysfsInit: Sized {
    /// Creates a new instance by reading information from the named entry
    ///
    /// # Arguments
    ///
    /// * `sysroot` - The system root directory path
    /// * `name` - The directory entry name, e.g. `host4`
    ///
    /// # Returns
    ///
    /// `Some(Self)` if the entry was successfully read, `None` otherwise
    fn from_sysfs_path(sysroot: &Path, name: &str) -> Option<Self>;
}

/// Use the attribute value or log the failure and fall back to the default
pub(crate) fn or_default<T: Default, E: fmt::Display>(node: &Path, key: &str, value: Result<T, E>) -> T {
    value.unwrap_or_else(|e| {
        warn!("{}/{key}: {e}", node.display());
        T::default()
    })
}

fn parse_attr<T>(node: &Path, key: &str, parse: impl FnOnce(&str) -> Result<T, ParseError>) -> crate::Result<T> {
    let text = sysfs::read_line(node, key)?;
    Ok(parse(&text)?)
}

/// A local FC port
#[derive(Debug)]
pub struct LocalPort {
    /// Index of this port within its adapter
    pub index: usize,
    /// Index of the owning adapter
    pub adapter: usize,
    /// Kernel SCSI host number
    pub kernel_host: u32,
    /// `sys/class/fc_host/hostN` under the sysroot
    pub host_dir: PathBuf,
    /// Remote ports attached to this port, keyed by their discovery index.
    /// Values index the topology's remote port registry.
    pub rports: Table<usize>,
    /// Set once the remote port registry has been partitioned onto this port
    pub rports_matched: bool,
    pub attributes: PortAttributes,
}

impl SysfsInit for LocalPort {
    fn from_sysfs_path(sysroot: &Path, name: &str) -> Option<Self> {
        let kernel_host = name.strip_prefix("host")?.parse().ok()?;
        let host_dir = sysroot.join(FC_HOST_DIR).join(name);
        let node = host_dir.as_path();

        let state = or_default(
            node,
            "port_state",
            sysfs::read_line(node, "port_state").map(|s| {
                PortState::from_sysfs(&s).unwrap_or_else(|| {
                    warn!("{}/port_state: unrecognised state {s:?}", node.display());
                    PortState::Unknown
                })
            }),
        );
        let speed = or_default(
            node,
            "speed",
            sysfs::read_line(node, "speed").map(|s| PortSpeed::from_token(&s).unwrap_or_default()),
        );

        let attributes = PortAttributes {
            node_wwn: or_default(node, "node_name", sysfs::read_wwn(node, "node_name")),
            port_wwn: or_default(node, "port_name", sysfs::read_wwn(node, "port_name")),
            fcid: or_default(node, "port_id", sysfs::read_u32(node, "port_id")),
            port_type: or_default(
                node,
                "port_type",
                sysfs::read_line(node, "port_type").map(|s| PortType::from_sysfs(&s)),
            ),
            state,
            supported_cos: or_default(
                node,
                "supported_classes",
                parse_attr(node, "supported_classes", ClassOfService::from_sysfs),
            ),
            supported_fc4_types: or_default(
                node,
                "supported_fc4s",
                parse_attr(node, "supported_fc4s", Fc4Types::from_sysfs),
            ),
            active_fc4_types: or_default(node, "active_fc4s", parse_attr(node, "active_fc4s", Fc4Types::from_sysfs)),
            symbolic_name: or_default(node, "symbolic_name", sysfs::read_line(node, "symbolic_name")),
            os_device_name: name.to_owned(),
            supported_speed: or_default(
                node,
                "supported_speeds",
                parse_attr(node, "supported_speeds", PortSpeed::from_list),
            ),
            speed,
            max_frame_size: or_default(node, "maxframe_size", sysfs::read_leading_u32(node, "maxframe_size")),
            fabric_name: or_default(node, "fabric_name", sysfs::read_wwn(node, "fabric_name")),
            discovered_ports: count_rports(&host_dir.join("device")),
        };

        Some(Self {
            index: 0,
            adapter: 0,
            kernel_host,
            host_dir,
            rports: Table::new(),
            rports_matched: false,
            attributes,
        })
    }
}

/// Count the `rport-` entries below a host's device directory
fn count_rports(dir: &Path) -> u32 {
    sysfs::dir_names(dir)
        .map(|names| names.iter().filter(|n| n.contains("rport-")).count() as u32)
        .unwrap_or(0)
}

/// An FC adapter
#[derive(Debug)]
pub struct Adapter {
    /// Index of this adapter in the topology
    pub index: usize,
    /// Kernel SCSI host number
    pub kernel_index: u32,
    /// `fcoe:<interface>`
    pub name: String,
    pub ports: Table<LocalPort>,
    pub attributes: AdapterAttributes,
}

impl Adapter {
    /// Probe the `fc_host` entry `name`, returning `None` if it is not an
    /// FCoE host or its hardware can not be identified.
    pub(crate) fn probe(sysroot: &Path, name: &str, pci: &dyn PciLookup) -> Option<Self> {
        let host_dir = sysroot.join(FC_HOST_DIR).join(name);
        let Ok(symbolic_name) = sysfs::read_line(&host_dir, "symbolic_name") else {
            debug!("{}: no symbolic_name", host_dir.display());
            return None;
        };
        let Some((_, ifname)) = symbolic_name.split_once(OVER_MARKER) else {
            debug!("{name}: {symbolic_name:?} is not an FCoE host, skipping");
            return None;
        };
        let ifname = ifname.trim();

        let link = match sysfs::read_link(&host_dir) {
            Ok(link) => link,
            Err(e) => {
                warn!("{}: {e}", host_dir.display());
                return None;
            }
        };

        let (hba_dir, pci_path) = if link.to_string_lossy().contains("devices/pci") {
            (host_dir.join("device").join(".."), link)
        } else {
            let physical = physical_interface(sysroot, ifname);
            let hba_dir = sysroot.join(NET_DIR).join(&physical).join("device");
            match sysfs::read_link(&hba_dir) {
                Ok(target) => (hba_dir, target),
                Err(e) => {
                    warn!("{}: {e}", hba_dir.display());
                    return None;
                }
            }
        };

        let Some(address) = PciAddress::find_in_path(&pci_path) else {
            warn!("{name}: no PCI device in {}", pci_path.display());
            return None;
        };

        let mut port = LocalPort::from_sysfs_path(sysroot, name)?;
        let kernel_index = port.kernel_host;
        let node_wwn = port.attributes.node_wwn;
        port.attributes.symbolic_name = symbolic_name.clone();

        let mut ports = Table::new();
        if let Err(e) = ports.insert(port.index, port) {
            error!("{name}: unable to register local port: {e}");
            return None;
        }

        let adapter_name = format!("fcoe:{ifname}");
        let identity = PciIdentity::from_sysfs(&hba_dir, address);
        let descriptor = pci.lookup(&identity);
        let model = descriptor
            .as_ref()
            .and_then(|d| d.model_description.as_deref())
            .and_then(|d| d.split_whitespace().next())
            .map(str::to_owned)
            .unwrap_or_else(|| identity.synthesized_model());
        let descriptor = descriptor.unwrap_or_default();

        let attributes = AdapterAttributes {
            manufacturer: descriptor.manufacturer,
            serial_number: descriptor.serial_number,
            model,
            model_description: descriptor.model_description.unwrap_or_else(|| "Unknown".to_owned()),
            node_wwn,
            node_symbolic_name: adapter_name.clone(),
            hardware_version: descriptor.hardware_version,
            driver_version: sysfs::read_line(&hba_dir, "driver/module/version").unwrap_or_default(),
            option_rom_version: String::new(),
            firmware_version: String::new(),
            vendor_specific_id: 0,
            number_of_ports: descriptor.number_of_ports,
            driver_name: driver_name(&hba_dir),
        };

        Some(Self {
            index: 0,
            kernel_index,
            name: adapter_name,
            ports,
            attributes,
        })
    }

    /// Local port at `index`
    pub fn port(&self, index: usize) -> Option<&LocalPort> {
        self.ports.get(index)
    }

    /// Update the adapter index, including the back-reference held by each port
    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
        for (_, port) in self.ports.iter_mut() {
            port.adapter = index;
        }
    }
}

/// The module name from the `driver/module` link, or `Unknown`
fn driver_name(hba_dir: &Path) -> String {
    sysfs::read_link(&hba_dir.join("driver/module"))
        .ok()
        .and_then(|link| {
            let link = link.to_string_lossy();
            let (_, module) = link.split_once("module/")?;
            Some(module.to_owned())
        })
        .unwrap_or_else(|| "Unknown".to_owned())
}

/// Resolve a virtual interface (such as a VLAN) to the interface it is
/// stacked on, by matching its `iflink` against every `ifindex`
fn physical_interface(sysroot: &Path, ifname: &str) -> String {
    let net = sysroot.join(NET_DIR);
    let dir = net.join(ifname);
    let (Some(ifindex), Some(iflink)) = (
        sysfs::sysfs_read::<u32>(&dir, "ifindex"),
        sysfs::sysfs_read::<u32>(&dir, "iflink"),
    ) else {
        return ifname.to_owned();
    };
    if ifindex == iflink {
        return ifname.to_owned();
    }

    let names = sysfs::dir_names(&net).unwrap_or_default();
    match names
        .into_iter()
        .find(|n| sysfs::sysfs_read::<u32>(&net.join(n), "ifindex") == Some(iflink))
    {
        Some(physical) => {
            debug!("{ifname} is stacked on {physical}");
            physical
        }
        None => {
            warn!("{ifname}: no interface with ifindex {iflink}");
            ifname.to_owned()
        }
    }
}
