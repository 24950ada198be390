// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! PCI identity of the hardware behind an FC host
//!
//! Adapters are matched to a PCI function by walking a sysfs symlink
//! target for a `domain:bus:device.function` component. Vendor, model
//! and serial metadata come from a [`PciLookup`], by default
//! [`SysfsPci`] which reads the device's config space and `pci.ids`.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::debug;
use serde::Serialize;

use crate::{sysfs, PCI_DEVICES_DIR};

/// Locations of the PCI ID database, relative to the sysroot
const PCI_IDS: &[&str] = &["usr/share/hwdata/pci.ids", "usr/share/misc/pci.ids"];

/// Vendors commonly found behind FC and FCoE hosts
static VENDORS: phf::Map<u16, &'static str> = phf::phf_map! {
    0x8086u16 => "Intel Corporation",
    0x10dfu16 => "Emulex Corporation",
    0x1077u16 => "QLogic Corp.",
    0x14e4u16 => "Broadcom Inc. and subsidiaries",
    0x19a2u16 => "Emulex Corporation",
    0x15b3u16 => "Mellanox Technologies",
    0x1425u16 => "Chelsio Communications Inc",
    0x117cu16 => "ATTO Technology, Inc.",
    0x1657u16 => "Brocade Communications Systems, Inc.",
    0x1924u16 => "Solarflare Communications",
};

const PCI_STATUS: usize = 0x06;
const PCI_STATUS_CAP_LIST: u16 = 0x10;
const PCI_CAPABILITY_LIST: usize = 0x34;
const PCI_CAP_ID_EXP: u8 = 0x10;
const PCI_EXT_CAP_START: usize = 0x100;
const PCI_EXT_CAP_ID_DSN: u32 = 0x0003;

/// Upper bound on capability list walks, guarding against loops in config space
const MAX_CAPABILITIES: usize = 64;

/// A PCI function address, `domain:bus:device.function`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PciAddress {
    pub domain: u32,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    /// Find the last path component that parses as a PCI address
    ///
    /// e.g. `../devices/pci0000:00/0000:00:07.0/0000:06:00.4/host2/fc_host/host2`
    /// yields `0000:06:00.4`.
    pub fn find_in_path(path: &Path) -> Option<Self> {
        path.components()
            .rev()
            .find_map(|c| c.as_os_str().to_str()?.parse().ok())
    }
}

impl FromStr for PciAddress {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, rest) = s.split_once(':').ok_or(())?;
        let (bus, rest) = rest.split_once(':').ok_or(())?;
        let (device, function) = rest.split_once('.').ok_or(())?;
        let hex = |s: &str| u32::from_str_radix(s, 16).map_err(|_| ());
        let narrow = |v: u32| u8::try_from(v).map_err(|_| ());
        Ok(Self {
            domain: hex(domain)?,
            bus: narrow(hex(bus)?)?,
            device: narrow(hex(device)?)?,
            function: narrow(hex(function)?)?,
        })
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:02x}:{:02x}.{:x}", self.domain, self.bus, self.device, self.function)
    }
}

/// Identifiers read from a PCI function's sysfs directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PciIdentity {
    pub address: PciAddress,
    pub vendor: u16,
    pub device: u16,
    pub subsystem_vendor: u16,
    pub subsystem_device: u16,
    /// Class code without the programming interface byte
    pub class: u32,
}

impl PciIdentity {
    /// Read the identifiers from `dir`; unreadable fields are left zero
    pub fn from_sysfs(dir: &Path, address: PciAddress) -> Self {
        let id = |key: &str| sysfs::read_u32(dir, key).map(|v| v as u16).unwrap_or(0);
        Self {
            address,
            vendor: id("vendor"),
            device: id("device"),
            subsystem_vendor: id("subsystem_vendor"),
            subsystem_device: id("subsystem_device"),
            class: sysfs::read_u32(dir, "class").unwrap_or(0) >> 8,
        }
    }

    /// `[vvvv:dddd]-[ssss:ssss]-(cccc)`, used when no model name is known
    pub fn synthesized_model(&self) -> String {
        format!(
            "[{:04x}:{:04x}]-[{:04x}:{:04x}]-({:04x})",
            self.vendor, self.device, self.subsystem_vendor, self.subsystem_device, self.class
        )
    }
}

/// Hardware metadata for a PCI function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PciDescriptor {
    pub manufacturer: String,
    pub model_description: Option<String>,
    pub serial_number: String,
    pub hardware_version: String,
    pub number_of_ports: u32,
}

/// Source of PCI hardware metadata
pub trait PciLookup {
    fn lookup(&self, identity: &PciIdentity) -> Option<PciDescriptor>;
}

/// Reads PCI metadata from sysfs and the PCI ID database under a sysroot
#[derive(Debug, Clone)]
pub struct SysfsPci {
    sysroot: PathBuf,
}

impl SysfsPci {
    pub fn new(sysroot: impl Into<PathBuf>) -> Self {
        Self {
            sysroot: sysroot.into(),
        }
    }

    fn names(&self, identity: &PciIdentity) -> (Option<String>, Option<String>) {
        PCI_IDS
            .iter()
            .find_map(|path| fs::read_to_string(self.sysroot.join(path)).ok())
            .map(|db| lookup_ids(&db, identity.vendor, identity.device))
            .unwrap_or_default()
    }
}

impl PciLookup for SysfsPci {
    fn lookup(&self, identity: &PciIdentity) -> Option<PciDescriptor> {
        let dir = self.sysroot.join(PCI_DEVICES_DIR).join(identity.address.to_string());
        if !dir.exists() {
            debug!("No PCI device at {}", dir.display());
            return None;
        }

        let (vendor, device) = self.names(identity);
        let manufacturer = vendor
            .or_else(|| VENDORS.get(&identity.vendor).map(|v| v.to_string()))
            .unwrap_or_else(|| "Unknown".to_owned());
        let hardware_version = sysfs::read_u32(&dir, "revision")
            .map(|r| format!("{r:02x}"))
            .unwrap_or_default();
        let serial_number = fs::read(dir.join("config"))
            .ok()
            .and_then(|config| device_serial_number(&config))
            .unwrap_or_default();

        Some(PciDescriptor {
            manufacturer,
            model_description: device,
            serial_number,
            hardware_version,
            number_of_ports: 1,
        })
    }
}

/// Find the vendor and device names for `vendor:device` in a `pci.ids` database
fn lookup_ids(db: &str, vendor: u16, device: u16) -> (Option<String>, Option<String>) {
    let vendor_key = format!("{vendor:04x}");
    let device_key = format!("{device:04x}");
    let mut lines = db.lines().filter(|l| !l.starts_with('#') && !l.trim().is_empty());

    let Some(vendor_name) = lines.by_ref().find_map(|l| {
        let (id, name) = l.split_once("  ")?;
        (id == vendor_key).then(|| name.trim().to_owned())
    }) else {
        return (None, None);
    };

    // device lines carry one tab, subsystem lines two; the vendor block ends at
    // the next untabbed line
    let device_name = lines
        .take_while(|l| l.starts_with('\t'))
        .filter(|l| !l.starts_with("\t\t"))
        .find_map(|l| {
            let (id, name) = l.trim_start_matches('\t').split_once("  ")?;
            (id == device_key).then(|| name.trim().to_owned())
        });

    (Some(vendor_name), device_name)
}

fn config_u8(config: &[u8], offset: usize) -> Option<u8> {
    config.get(offset).copied()
}

fn config_u16(config: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(config.get(offset..offset + 2)?.try_into().ok()?))
}

fn config_u32(config: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(config.get(offset..offset + 4)?.try_into().ok()?))
}

/// Format the Device Serial Number extended capability, if the device has one
///
/// Requires the PCI Express capability in the legacy list before the
/// extended list at 0x100 is searched.
pub(crate) fn device_serial_number(config: &[u8]) -> Option<String> {
    let status = config_u16(config, PCI_STATUS)?;
    if status & PCI_STATUS_CAP_LIST == 0 {
        debug!("PCI capabilities are not supported");
        return None;
    }

    let mut offset = config_u8(config, PCI_CAPABILITY_LIST)? as usize;
    let mut express = false;
    for _ in 0..MAX_CAPABILITIES {
        if offset == 0 {
            break;
        }
        if config_u8(config, offset)? == PCI_CAP_ID_EXP {
            express = true;
            break;
        }
        offset = config_u8(config, offset + 1)? as usize;
    }
    if !express {
        return None;
    }

    let mut offset = PCI_EXT_CAP_START;
    for _ in 0..MAX_CAPABILITIES {
        let header = config_u32(config, offset)?;
        if header & 0xffff == PCI_EXT_CAP_ID_DSN {
            let low = config_u32(config, offset + 4)?;
            let high = config_u32(config, offset + 8)?;
            return Some(format!(
                "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
                high >> 24,
                (high >> 16) & 0xff,
                (high >> 8) & 0xff,
                (low >> 16) & 0xff,
                (low >> 8) & 0xff,
                low & 0xff
            ));
        }
        offset = (header >> 20) as usize;
        if offset == 0 {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test_log::test]
    fn test_address() {
        let addr: PciAddress = "0000:03:00.0".parse().unwrap();
        assert_eq!(addr, PciAddress { domain: 0, bus: 3, device: 0, function: 0 });
        assert_eq!(addr.to_string(), "0000:03:00.0");
        assert!("pci0000:00".parse::<PciAddress>().is_err());
        assert!("host4".parse::<PciAddress>().is_err());

        let path = Path::new("../../devices/pci0000:00/0000:00:07.0/0000:06:00.4/host2/fc_host/host2");
        assert_eq!(PciAddress::find_in_path(path), "0000:06:00.4".parse().ok());
        assert_eq!(PciAddress::find_in_path(Path::new("../../devices/virtual/net/eth0")), None);
    }

    #[test_log::test]
    fn test_pci_ids() {
        let db = "# comment\n\
                  10df  Emulex Corporation\n\
                  \t0720  OneConnect NIC (Skyhawk)\n\
                  \t\t10df e100  OneConnect OCe14100\n\
                  8086  Intel Corporation\n\
                  \t10fb  82599ES 10-Gigabit SFI/SFP+ Network Connection\n\
                  \t\t8086 000c  Ethernet Server Adapter X520-2\n\
                  \t1521  I350 Gigabit Network Connection\n\
                  8088  Beijing Wangxun\n";
        assert_eq!(
            lookup_ids(db, 0x8086, 0x10fb),
            (
                Some("Intel Corporation".to_owned()),
                Some("82599ES 10-Gigabit SFI/SFP+ Network Connection".to_owned())
            )
        );
        assert_eq!(lookup_ids(db, 0x10df, 0x10fb), (Some("Emulex Corporation".to_owned()), None));
        assert_eq!(lookup_ids(db, 0x1234, 0x0001), (None, None));
    }

    fn config_with_dsn() -> Vec<u8> {
        let mut config = vec![0u8; 0x200];
        config[PCI_STATUS] = PCI_STATUS_CAP_LIST as u8;
        config[PCI_CAPABILITY_LIST] = 0x40;
        // power management, then PCI Express
        config[0x40] = 0x01;
        config[0x41] = 0x70;
        config[0x70] = PCI_CAP_ID_EXP;
        // AER at 0x100 pointing at DSN at 0x140
        config[0x100..0x104].copy_from_slice(&(0x0001u32 | (0x140 << 20)).to_le_bytes());
        config[0x140..0x144].copy_from_slice(&PCI_EXT_CAP_ID_DSN.to_le_bytes());
        config[0x144..0x148].copy_from_slice(&0x00a0b1c2u32.to_le_bytes());
        config[0x148..0x14c].copy_from_slice(&0x001b32ffu32.to_le_bytes());
        config
    }

    #[test_log::test]
    fn test_device_serial_number() {
        assert_eq!(device_serial_number(&config_with_dsn()).as_deref(), Some("001B32A0B1C2"));

        let mut legacy = config_with_dsn();
        legacy[0x70] = 0x05;
        assert_eq!(device_serial_number(&legacy), None);

        // unprivileged reads of config stop after the standard header
        assert_eq!(device_serial_number(&config_with_dsn()[..64]), None);
    }

    #[test_log::test]
    fn test_sysfs_lookup() {
        let dir = tempfile::TempDir::new().unwrap();
        let dev = dir.path().join(PCI_DEVICES_DIR).join("0000:03:00.0");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("revision"), "0x01\n").unwrap();
        fs::write(dev.join("config"), config_with_dsn()).unwrap();

        let identity = PciIdentity {
            address: "0000:03:00.0".parse().unwrap(),
            vendor: 0x8086,
            device: 0x10fb,
            ..Default::default()
        };
        let pci = SysfsPci::new(dir.path());
        let desc = pci.lookup(&identity).unwrap();
        assert_eq!(desc.manufacturer, "Intel Corporation");
        assert_eq!(desc.model_description, None);
        assert_eq!(desc.hardware_version, "01");
        assert_eq!(desc.serial_number, "001B32A0B1C2");
        assert_eq!(desc.number_of_ports, 1);

        let missing = PciIdentity {
            address: "0000:04:00.0".parse().unwrap(),
            ..identity
        };
        assert_eq!(pci.lookup(&missing), None);
    }
}
