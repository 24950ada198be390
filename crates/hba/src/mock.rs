// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Synthetic sysfs trees and collaborators for testing.
//!
//! [`MockSysfs`] lays out the FC transport, network, PCI and SCSI device
//! hierarchies under a temporary directory, with the same symlinks the
//! kernel creates, so discovery can run against it as a sysroot.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs, io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
    rc::Rc,
};

use tempfile::TempDir;

use crate::pci::{PciAddress, PciDescriptor, PciIdentity, PciLookup};

/// Layout of the block and scsi_generic links under a LUN's device directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkStyle {
    /// `block:sdb` and `scsi_generic:sg1` symlinks
    Modern,
    /// `block/sdb` and `scsi_generic/sg1` subdirectories
    Deprecated,
}

/// A sysroot populated with sysfs entries
pub struct MockSysfs {
    dir: TempDir,
}

impl MockSysfs {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temporary sysroot"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `path` relative to the root, creating parents
    pub fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = self.root().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, contents).expect("Failed to write attribute");
    }

    /// Create a symlink at `path` relative to the root
    pub fn symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = self.root().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        match symlink(target, &path) {
            Err(e) if e.kind() != io::ErrorKind::AlreadyExists => panic!("Failed to create symlink: {e}"),
            _ => {}
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        fs::remove_file(self.root().join(path)).expect("Failed to remove attribute");
    }

    fn mkdir(&self, path: impl AsRef<Path>) {
        fs::create_dir_all(self.root().join(path)).expect("Failed to create directory");
    }

    fn pci_dir(address: &str) -> String {
        format!("sys/devices/pci0000:00/{address}")
    }

    /// Add an Intel 82599 function at `address`, bound to ixgbe
    pub fn add_pci_device(&self, address: &str) {
        let dir = Self::pci_dir(address);
        for (key, value) in [
            ("vendor", "0x8086"),
            ("device", "0x10fb"),
            ("subsystem_vendor", "0x8086"),
            ("subsystem_device", "0x000c"),
            ("class", "0x020000"),
            ("revision", "0x01"),
        ] {
            self.write(format!("{dir}/{key}"), format!("{value}\n"));
        }
        self.symlink(format!("{dir}/driver"), "../../../bus/pci/drivers/ixgbe");
        self.symlink("sys/bus/pci/drivers/ixgbe/module", "../../../../module/ixgbe");
        self.mkdir("sys/module/ixgbe");
        self.symlink(
            format!("sys/bus/pci/devices/{address}"),
            format!("../../../devices/pci0000:00/{address}"),
        );
    }

    /// Write the attributes and statistics of an FCoE `fc_host` at `dir`
    fn write_host_attributes(&self, dir: &str, host: u32, ifname: &str) {
        let mut fc4s = vec!["0x00"; 32];
        fc4s[2] = "0x01";
        let fc4s = fc4s.join(" ");
        for (key, value) in [
            ("symbolic_name", format!("fcoe v0.1 over {ifname}")),
            ("node_name", format!("0x20000000c9a000{host:02x}")),
            ("port_name", format!("0x10000000c9a000{host:02x}")),
            ("port_id", format!("0x{:06x}", 0x0a0000 + host)),
            ("port_type", "NPort (fabric via point-to-point)".to_owned()),
            ("port_state", "Online".to_owned()),
            ("speed", "10 Gbit".to_owned()),
            ("supported_speeds", "1 Gbit, 10 Gbit".to_owned()),
            ("maxframe_size", "2048 bytes".to_owned()),
            ("supported_fc4s", fc4s.clone()),
            ("active_fc4s", fc4s.clone()),
            ("fabric_name", "0x2001000dec0a0b01".to_owned()),
            ("supported_classes", "Class 3".to_owned()),
            ("tgtid_bind_type", "wwpn (World Wide Port Name)".to_owned()),
        ] {
            self.write(format!("{dir}/{key}"), format!("{value}\n"));
        }

        let counters = [
            "tx_frames",
            "tx_words",
            "rx_frames",
            "rx_words",
            "lip_count",
            "nos_count",
            "error_frames",
            "dumped_frames",
            "link_failure_count",
            "loss_of_sync_count",
            "loss_of_signal_count",
            "prim_seq_protocol_err_count",
            "invalid_tx_word_count",
            "invalid_crc_count",
            "fcp_input_requests",
            "fcp_output_requests",
            "fcp_control_requests",
            "fcp_input_megabytes",
            "fcp_output_megabytes",
        ];
        self.write(format!("{dir}/statistics/seconds_since_last_reset"), "0x64\n");
        for counter in counters {
            self.write(format!("{dir}/statistics/{counter}"), "0x0\n");
        }
    }

    /// Add `hostN` as an FCoE host directly below the PCI function `address`
    pub fn add_fc_host(&self, host: u32, address: &str, ifname: &str) {
        self.add_pci_device(address);
        let scsi_host = format!("{}/host{host}", Self::pci_dir(address));
        let fc_host = format!("{scsi_host}/fc_host/host{host}");
        self.mkdir(&scsi_host);
        self.write_host_attributes(&fc_host, host, ifname);
        self.symlink(format!("{fc_host}/device"), format!("../../../host{host}"));
        self.symlink(
            format!("sys/class/fc_host/host{host}"),
            format!("../../devices/pci0000:00/{address}/host{host}/fc_host/host{host}"),
        );
    }

    /// Add `hostN` as an FCoE host below a virtual network interface
    pub fn add_virtual_fc_host(&self, host: u32, ifname: &str) {
        let scsi_host = format!("sys/devices/virtual/net/{ifname}/ctlr_0/host{host}");
        let fc_host = format!("{scsi_host}/fc_host/host{host}");
        self.mkdir(&scsi_host);
        self.write_host_attributes(&fc_host, host, ifname);
        self.symlink(format!("{fc_host}/device"), format!("../../../host{host}"));
        self.symlink(
            format!("sys/class/fc_host/host{host}"),
            format!("../../devices/virtual/net/{ifname}/ctlr_0/host{host}/fc_host/host{host}"),
        );
    }

    /// Add a network interface, physical when `address` names its PCI function
    pub fn add_net_iface(&self, name: &str, ifindex: u32, iflink: u32, address: Option<&str>) {
        let dir = match address {
            Some(address) => {
                let dir = format!("{}/net/{name}", Self::pci_dir(address));
                self.write(format!("{}/vendor", Self::pci_dir(address)), "0x8086\n");
                self.symlink(format!("{dir}/device"), format!("../../../{address}"));
                format!("devices/pci0000:00/{address}/net/{name}")
            }
            None => format!("devices/virtual/net/{name}"),
        };
        self.write(format!("sys/{dir}/ifindex"), format!("{ifindex}\n"));
        self.write(format!("sys/{dir}/iflink"), format!("{iflink}\n"));
        self.symlink(format!("sys/class/net/{name}"), format!("../../{dir}"));
    }

    /// Add remote port `rport-<host>:<channel>-<index>` below an existing host
    pub fn add_rport(&self, host: u32, channel: u32, index: u32, wwpn: u64, target: Option<u32>) {
        self.add_rport_named(host, &format!("rport-{host}:{channel}-{index}"), wwpn, target);
    }

    /// As [`Self::add_rport`], with the class entry named verbatim
    pub fn add_rport_named(&self, host: u32, name: &str, wwpn: u64, target: Option<u32>) {
        let host_device = fs::canonicalize(self.root().join(format!("sys/class/fc_host/host{host}/device")))
            .unwrap_or_else(|_| self.root().join(format!("sys/devices/virtual/host{host}")));
        let dir = host_device.join(name).join("fc_remote_ports").join(name);
        fs::create_dir_all(&dir).expect("Failed to create remote port");

        let target = target.map_or_else(|| "-1".to_owned(), |t| t.to_string());
        for (key, value) in [
            ("node_name", format!("0x{:016x}", wwpn.wrapping_add(0x1000_0000_0000_0000))),
            ("port_name", format!("0x{wwpn:016x}")),
            ("port_id", format!("0x{:06x}", wwpn & 0xff_ffff)),
            ("scsi_target_id", target),
            ("port_state", "Online".to_owned()),
            ("supported_classes", "Class 3".to_owned()),
            ("maxframe_size", "2048 bytes".to_owned()),
            ("roles", "FCP Target".to_owned()),
        ] {
            fs::write(dir.join(key), format!("{value}\n")).expect("Failed to write attribute");
        }
        self.symlink(format!("sys/class/fc_remote_ports/{name}"), &dir);
    }

    /// Add SCSI device `<host>:<channel>:<target>:<lun>` with its block and
    /// scsi_generic nodes
    pub fn add_lun(&self, name: &str, block: &str, generic: &str, style: SymlinkStyle) {
        let device = format!("sys/devices/mock/{name}");
        self.mkdir(&device);
        match style {
            SymlinkStyle::Modern => {
                self.symlink(format!("{device}/block:{block}"), format!("../../../block/{block}"));
                self.symlink(
                    format!("{device}/scsi_generic:{generic}"),
                    format!("../../../class/scsi_generic/{generic}"),
                );
            }
            SymlinkStyle::Deprecated => {
                self.mkdir(format!("{device}/block/{block}"));
                self.mkdir(format!("{device}/scsi_generic/{generic}"));
            }
        }
        self.symlink(
            format!("sys/class/scsi_device/{name}/device"),
            format!("../../../devices/mock/{name}"),
        );
    }
}

/// PCI metadata keyed by address; unknown devices have no descriptor
#[derive(Debug, Default)]
pub struct MockPci {
    devices: HashMap<PciAddress, PciDescriptor>,
}

impl MockPci {
    pub fn with_model(address: &str, manufacturer: &str, description: &str) -> Self {
        let mut devices = HashMap::new();
        devices.insert(
            address.parse().expect("Invalid PCI address"),
            PciDescriptor {
                manufacturer: manufacturer.to_owned(),
                model_description: Some(description.to_owned()),
                serial_number: "001B21A0B1C2".to_owned(),
                hardware_version: "01".to_owned(),
                number_of_ports: 1,
            },
        );
        Self { devices }
    }
}

impl PciLookup for MockPci {
    fn lookup(&self, identity: &PciIdentity) -> Option<PciDescriptor> {
        self.devices.get(&identity.address).cloned()
    }
}

/// Commands recorded by [`MockPassthrough`]: device and CDB
pub type Calls = Rc<RefCell<Vec<(PathBuf, Vec<u8>)>>>;

/// Answers SCSI commands without a device.
///
/// Device identification inquiries return an NAA designator for devices
/// registered with [`MockPassthrough::with_device_id`] and fail otherwise;
/// every other command returns `data_len` bytes with the configured status.
#[derive(Debug, Default)]
pub struct MockPassthrough {
    device_ids: HashMap<PathBuf, Vec<u8>>,
    status: u8,
    calls: Calls,
}

impl MockPassthrough {
    pub fn with_device_id(mut self, device: &str, naa: &[u8]) -> Self {
        let mut page = vec![0x00, sg::device_id::VPD_DEVICE_ID, 0x00, 0x00];
        // a SCSI name string ahead of the NAA designator
        page.extend_from_slice(&[0x03, 0x08, 0x00, 0x04, b'M', b'O', b'C', b'K']);
        page.extend_from_slice(&[0x01, 0x03, 0x00, naa.len() as u8]);
        page.extend_from_slice(naa);
        let len = (page.len() - 4) as u16;
        page[2..4].copy_from_slice(&len.to_be_bytes());
        self.device_ids.insert(PathBuf::from(device), page);
        self
    }

    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    /// Shared log of the commands issued
    pub fn calls(&self) -> Calls {
        Rc::clone(&self.calls)
    }
}

impl sg::Passthrough for MockPassthrough {
    fn execute(&self, device: &Path, cdb: &[u8], data_len: usize, sense_len: usize) -> sg::Result<sg::Response> {
        self.calls.borrow_mut().push((device.to_path_buf(), cdb.to_vec()));

        if cdb[0] == sg::commands::OP_INQUIRY && cdb[1] & sg::commands::INQUIRY_EVPD != 0 {
            let page = self
                .device_ids
                .get(device)
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
            return Ok(sg::Response {
                data: page.iter().copied().take(data_len).collect(),
                ..Default::default()
            });
        }

        let sense = if self.status == sg::STATUS_CHECK_CONDITION {
            let mut sense = vec![0x70, 0x00, 0x05];
            sense.resize(sense_len.min(18), 0);
            sense
        } else {
            Vec::new()
        };
        Ok(sg::Response {
            data: vec![0xa5; data_len],
            status: self.status,
            sense,
        })
    }
}
