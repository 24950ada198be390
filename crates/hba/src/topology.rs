// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The discovered topology and the queries answered from it

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use log::{debug, error, info};
use serde::Serialize;

use crate::{
    adapter::{Adapter, LocalPort},
    attributes::{AdapterAttributes, PortAttributes},
    pci::{PciLookup, SysfsPci},
    rport::{RemotePort, RemotePortRegistry},
    sysfs, Error, Result, Table, Wwn, FC_HOST_DIR,
};

/// Handles are offset from adapter indices so that 0 is never valid
const HANDLE_OFFSET: u32 = 0x100;

/// An adapter handle returned by [`Topology::open`] and [`Topology::open_by_wwn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Handle(u32);

impl Handle {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn for_index(index: usize) -> Self {
        Self(HANDLE_OFFSET.saturating_add(u32::try_from(index).unwrap_or(u32::MAX)))
    }

    /// The adapter index this handle refers to
    pub fn index(self) -> Option<usize> {
        self.0.checked_sub(HANDLE_OFFSET).map(|i| i as usize)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Configures collaborators before discovery
pub struct TopologyBuilder {
    sysroot: PathBuf,
    pci: Option<Box<dyn PciLookup>>,
    passthrough: Option<Box<dyn sg::Passthrough>>,
}

impl TopologyBuilder {
    /// Replace the sysfs/`pci.ids` metadata lookup
    pub fn with_pci(mut self, pci: impl PciLookup + 'static) -> Self {
        self.pci = Some(Box::new(pci));
        self
    }

    /// Replace the `SG_IO` passthrough used for SCSI commands
    pub fn with_passthrough(mut self, passthrough: impl sg::Passthrough + 'static) -> Self {
        self.passthrough = Some(Box::new(passthrough));
        self
    }

    /// Scan `sys/class/fc_host` under the sysroot
    pub fn discover(self) -> Result<Topology> {
        let pci = self.pci.unwrap_or_else(|| Box::new(SysfsPci::new(&self.sysroot)));
        let passthrough = self.passthrough.unwrap_or_else(|| Box::new(sg::SgIo));
        let adapters = scan_adapters(&self.sysroot, pci.as_ref())?;
        Ok(Topology {
            sysroot: self.sysroot,
            adapters,
            remote_ports: RemotePortRegistry::default(),
            passthrough,
        })
    }
}

fn scan_adapters(sysroot: &Path, pci: &dyn PciLookup) -> Result<Table<Adapter>> {
    let dir = sysroot.join(FC_HOST_DIR);
    let names = match sysfs::dir_names(&dir) {
        Ok(names) => names,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist", dir.display());
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    let mut adapters = Table::new();
    for name in names {
        let Some(adapter) = Adapter::probe(sysroot, &name, pci) else {
            continue;
        };
        match adapters.append(adapter) {
            Ok(index) => {
                if let Some(adapter) = adapters.get_mut(index) {
                    adapter.set_index(index);
                    info!("Registered adapter {} ({name}) at index {index}", adapter.name);
                }
            }
            Err(e) => error!("{name}: unable to register adapter: {e}"),
        }
    }
    Ok(adapters)
}

/// Adapters, local ports and remote ports found under a sysroot
pub struct Topology {
    pub(crate) sysroot: PathBuf,
    pub(crate) adapters: Table<Adapter>,
    pub(crate) remote_ports: RemotePortRegistry,
    pub(crate) passthrough: Box<dyn sg::Passthrough>,
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("sysroot", &self.sysroot)
            .field("adapters", &self.adapters)
            .field("remote_ports", &self.remote_ports)
            .finish_non_exhaustive()
    }
}

impl Topology {
    /// Start configuring a topology rooted at `sysroot`
    pub fn builder(sysroot: impl AsRef<Path>) -> TopologyBuilder {
        TopologyBuilder {
            sysroot: sysroot.as_ref().to_path_buf(),
            pci: None,
            passthrough: None,
        }
    }

    /// Discovers the FC topology of the running system.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let topology = hba::Topology::discover()?;
    /// println!("{} adapters", topology.adapter_count());
    /// # Ok::<(), hba::Error>(())
    /// ```
    pub fn discover() -> Result<Self> {
        Self::discover_in_sysroot("/")
    }

    /// Discovers the FC topology in a specified sysroot directory.
    ///
    /// # Arguments
    ///
    /// * `sysroot` - Path to the system root directory
    pub fn discover_in_sysroot(sysroot: impl AsRef<Path>) -> Result<Self> {
        Self::builder(sysroot).discover()
    }

    /// Number of adapter slots, including empty ones
    pub fn adapter_count(&self) -> usize {
        self.adapters.limit()
    }

    /// Iterate registered adapters with their indices
    pub fn adapters(&self) -> impl Iterator<Item = (usize, &Adapter)> {
        self.adapters.iter()
    }

    /// Every remote port scanned so far, attached or not
    pub fn remote_port_registry(&self) -> &RemotePortRegistry {
        &self.remote_ports
    }

    /// `<adapter name>-<index>`
    pub fn adapter_name(&self, index: usize) -> Result<String> {
        let adapter = self.adapters.get(index).ok_or(Error::IllegalIndex(index))?;
        Ok(format!("{}-{index}", adapter.name))
    }

    /// Find the adapter named `name` as returned by [`Self::adapter_name`].
    ///
    /// The search ends at the first empty slot.
    pub fn open(&self, name: &str) -> Option<Handle> {
        for index in 0..self.adapters.limit() {
            let candidate = self.adapter_name(index).ok()?;
            if candidate == name {
                return Some(Handle::for_index(index));
            }
        }
        None
    }

    /// Find the adapter whose node WWN, or failing that one of whose port
    /// WWNs, is `wwn`
    pub fn open_by_wwn(&self, wwn: Wwn) -> Result<Handle> {
        let mut found = None;
        let mut count = 0;
        for (index, adapter) in self.adapters.iter() {
            if adapter.attributes.node_wwn == wwn {
                count += 1;
                found = Some(index);
            } else {
                for port in adapter.ports.values().filter(|p| p.attributes.port_wwn == wwn) {
                    debug!("{wwn} matches port {} of {}", port.index, adapter.name);
                    count += 1;
                    found = Some(index);
                }
            }
        }
        match (count, found) {
            (1, Some(index)) => Ok(Handle::for_index(index)),
            (0, _) | (_, None) => Err(Error::IllegalWwn(wwn)),
            (n, _) => Err(Error::AmbiguousWwn(wwn, n)),
        }
    }

    pub fn adapter(&self, handle: Handle) -> Result<&Adapter> {
        handle
            .index()
            .and_then(|i| self.adapters.get(i))
            .ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn adapter_attributes(&self, handle: Handle) -> Result<&AdapterAttributes> {
        Ok(&self.adapter(handle)?.attributes)
    }

    pub fn port(&self, handle: Handle, port: usize) -> Result<&LocalPort> {
        self.adapter(handle)?.port(port).ok_or(Error::IllegalIndex(port))
    }

    pub fn port_attributes(&self, handle: Handle, port: usize) -> Result<&PortAttributes> {
        Ok(&self.port(handle, port)?.attributes)
    }

    /// The local port of `handle` with port WWN `wwn`, and the number of
    /// ports carrying that WWN. No port is returned when the count exceeds one.
    pub fn port_by_wwn(&self, handle: Handle, wwn: Wwn) -> Result<(Option<&LocalPort>, usize)> {
        let adapter = self.adapter(handle)?;
        let mut matches = adapter.ports.values().filter(|p| p.attributes.port_wwn == wwn);
        let first = matches.next();
        let count = first.map_or(0, |_| 1 + matches.count());
        Ok((first.filter(|_| count == 1), count))
    }

    /// As [`Self::port_by_wwn`], reporting zero or many matches as errors
    pub fn unique_port_by_wwn(&self, handle: Handle, wwn: Wwn) -> Result<&LocalPort> {
        match self.port_by_wwn(handle, wwn)? {
            (Some(port), _) => Ok(port),
            (None, 0) => Err(Error::IllegalWwn(wwn)),
            (None, n) => Err(Error::AmbiguousWwn(wwn, n)),
        }
    }

    /// Attach remote ports to the local port, scanning them on first use
    pub(crate) fn match_remote_ports(&mut self, handle: Handle, port: usize) -> Result<()> {
        let index = handle.index().ok_or(Error::InvalidHandle(handle.raw()))?;
        let local = self
            .adapters
            .get_mut(index)
            .ok_or(Error::InvalidHandle(handle.raw()))?
            .ports
            .get_mut(port)
            .ok_or(Error::IllegalIndex(port))?;
        self.remote_ports.ensure_scanned(&self.sysroot);
        self.remote_ports.attach(local);
        Ok(())
    }

    /// Match remote ports for every local port of the adapter
    pub(crate) fn match_all_remote_ports(&mut self, handle: Handle) -> Result<()> {
        let ports = self.adapter(handle)?.ports.iter().map(|(i, _)| i).collect::<Vec<_>>();
        for port in ports {
            self.match_remote_ports(handle, port)?;
        }
        Ok(())
    }

    /// Remote ports attached to `local`, in discovery index order
    pub(crate) fn attached<'a>(&'a self, local: &'a LocalPort) -> impl Iterator<Item = &'a RemotePort> + 'a {
        local.rports.values().filter_map(|i| self.remote_ports.get(*i))
    }

    fn search_remote_ports<P>(&mut self, handle: Handle, port: usize, mut predicate: P) -> Result<Option<&RemotePort>>
    where
        P: FnMut(&RemotePort) -> bool,
    {
        self.match_remote_ports(handle, port)?;
        let local = self.port(handle, port)?;
        Ok(self.attached(local).find(|r| predicate(*r)))
    }

    /// Every remote port discovered through a local port
    pub fn remote_ports(&mut self, handle: Handle, port: usize) -> Result<Vec<&RemotePort>> {
        self.match_remote_ports(handle, port)?;
        let local = self.port(handle, port)?;
        Ok(self.attached(local).collect())
    }

    /// Remote port with discovery index `index`
    pub fn remote_port(&mut self, handle: Handle, port: usize, index: usize) -> Result<&RemotePort> {
        self.match_remote_ports(handle, port)?;
        let local = self.port(handle, port)?;
        local
            .rports
            .get(index)
            .and_then(|i| self.remote_ports.get(*i))
            .ok_or(Error::IllegalIndex(index))
    }

    /// The `n`th remote port (0-based), skipping unused discovery indices
    pub fn nth_remote_port(&mut self, handle: Handle, port: usize, n: usize) -> Result<&RemotePort> {
        self.match_remote_ports(handle, port)?;
        let local = self.port(handle, port)?;
        local
            .rports
            .nth(n)
            .and_then(|i| self.remote_ports.get(*i))
            .ok_or(Error::IllegalIndex(n))
    }

    pub fn remote_port_by_target(&mut self, handle: Handle, port: usize, target: u32) -> Result<Option<&RemotePort>> {
        self.search_remote_ports(handle, port, |r| r.scsi_target == Some(target))
    }

    pub fn remote_port_by_wwn(&mut self, handle: Handle, port: usize, wwn: Wwn) -> Result<Option<&RemotePort>> {
        self.search_remote_ports(handle, port, |r| r.attributes.port_wwn == wwn)
    }

    pub fn remote_port_by_fcid(&mut self, handle: Handle, port: usize, fcid: u32) -> Result<Option<&RemotePort>> {
        self.search_remote_ports(handle, port, |r| r.attributes.fcid == fcid)
    }

    /// Attributes of the `n`th discovered port of a local port
    pub fn discovered_port_attributes(&mut self, handle: Handle, port: usize, n: usize) -> Result<&PortAttributes> {
        Ok(&self.nth_remote_port(handle, port, n)?.attributes)
    }

    /// Attributes of the local or remote port with port WWN `wwn`
    pub fn port_attributes_by_wwn(&mut self, handle: Handle, wwn: Wwn) -> Result<&PortAttributes> {
        self.match_all_remote_ports(handle)?;
        let adapter = self.adapter(handle)?;
        let mut matches = Vec::new();
        for port in adapter.ports.values() {
            if port.attributes.port_wwn == wwn {
                matches.push(&port.attributes);
            }
            matches.extend(
                self.attached(port)
                    .filter(|r| r.attributes.port_wwn == wwn)
                    .map(|r| &r.attributes),
            );
        }
        match matches.as_slice() {
            [] => Err(Error::IllegalWwn(wwn)),
            [only] => Ok(only),
            many => Err(Error::AmbiguousWwn(wwn, many.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockPassthrough, MockPci, MockSysfs},
        PortState,
    };

    fn discover(sys: &MockSysfs) -> Topology {
        Topology::builder(sys.root())
            .with_pci(MockPci::default())
            .with_passthrough(MockPassthrough::default())
            .discover()
            .unwrap()
    }

    #[test_log::test]
    fn test_end_to_end_single_host() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.write("sys/class/fc_host/host4/port_name", "0x2000001b32a0b1c2\n");

        let topology = discover(&sys);
        assert_eq!(topology.adapters().count(), 1);
        let handle = topology.open("fcoe:eth2-0").unwrap();
        let port = topology.port_attributes(handle, 0).unwrap();
        assert_eq!(port.state, PortState::Online);
        assert_eq!(port.port_wwn.bytes(), &[0x20, 0x00, 0x00, 0x1b, 0x32, 0xa0, 0xb1, 0xc2]);
        assert!(topology.port_attributes(handle, 1).is_err());
    }

    #[test_log::test]
    fn test_missing_fc_host_dir() {
        let sys = MockSysfs::new();
        let topology = discover(&sys);
        assert_eq!(topology.adapter_count(), 0);
        assert!(topology.open("fcoe:eth0-0").is_none());
    }

    #[test_log::test]
    fn test_handles_and_names() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.add_fc_host(5, "0000:03:00.1", "eth3");
        // not FCoE, skipped without using a slot
        sys.add_fc_host(6, "0000:05:00.0", "eth4");
        sys.write("sys/class/fc_host/host6/symbolic_name", "QLE2562 FW:v5.06.05\n");

        let topology = discover(&sys);
        assert_eq!(topology.adapter_count(), 2);
        assert_eq!(topology.adapter_name(1).unwrap(), "fcoe:eth3-1");
        assert!(matches!(topology.adapter_name(2), Err(Error::IllegalIndex(2))));

        let handle = topology.open("fcoe:eth3-1").unwrap();
        assert_eq!(handle.raw(), 0x101);
        assert_eq!(handle.index(), Some(1));
        assert_eq!(topology.adapter(handle).unwrap().kernel_index, 5);
        assert!(matches!(
            topology.adapter(Handle::from_raw(0)),
            Err(Error::InvalidHandle(0))
        ));
        assert!(matches!(
            topology.adapter(Handle::from_raw(0x105)),
            Err(Error::InvalidHandle(0x105))
        ));
    }

    #[test_log::test]
    fn test_open_by_wwn() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.add_fc_host(5, "0000:03:00.1", "eth3");
        sys.write("sys/class/fc_host/host4/node_name", "0x2000000000000004\n");
        sys.write("sys/class/fc_host/host4/port_name", "0x1000000000000004\n");
        sys.write("sys/class/fc_host/host5/node_name", "0x2000000000000005\n");
        sys.write("sys/class/fc_host/host5/port_name", "0x1000000000000005\n");

        let topology = discover(&sys);
        assert_eq!(topology.open_by_wwn(Wwn::from_u64(0x2000000000000005)).unwrap().raw(), 0x101);
        assert_eq!(topology.open_by_wwn(Wwn::from_u64(0x1000000000000004)).unwrap().raw(), 0x100);
        assert!(matches!(
            topology.open_by_wwn(Wwn::from_u64(0x42)),
            Err(Error::IllegalWwn(_))
        ));
    }

    #[test_log::test]
    fn test_duplicate_port_wwn_is_ambiguous() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.add_fc_host(5, "0000:03:00.1", "eth3");
        sys.write("sys/class/fc_host/host4/port_name", "0x1000000000000abc\n");
        sys.write("sys/class/fc_host/host5/port_name", "0x1000000000000abc\n");

        let topology = discover(&sys);
        assert!(matches!(
            topology.open_by_wwn(Wwn::from_u64(0x1000000000000abc)),
            Err(Error::AmbiguousWwn(_, 2))
        ));
    }

    #[test_log::test]
    fn test_port_by_wwn() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.write("sys/class/fc_host/host4/port_name", "0x1000000000000004\n");

        let topology = discover(&sys);
        let handle = Handle::for_index(0);
        let (port, count) = topology.port_by_wwn(handle, Wwn::from_u64(0x1000000000000004)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(port.unwrap().kernel_host, 4);
        let (port, count) = topology.port_by_wwn(handle, Wwn::from_u64(0x1)).unwrap();
        assert!(port.is_none());
        assert_eq!(count, 0);
        assert!(matches!(
            topology.unique_port_by_wwn(handle, Wwn::from_u64(0x1)),
            Err(Error::IllegalWwn(_))
        ));
    }

    #[test_log::test]
    fn test_remote_port_queries() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.add_rport(4, 0, 2, 0x2100_0024_ff01_0002, Some(0));
        sys.add_rport(4, 0, 5, 0x2100_0024_ff01_0005, Some(1));
        sys.add_rport(4, 0, 7, 0x2100_0024_ff01_0007, None);
        sys.add_rport(9, 0, 1, 0x2100_0024_ff09_0001, Some(0));

        let mut topology = discover(&sys);
        let handle = Handle::for_index(0);

        assert_eq!(topology.remote_ports(handle, 0).unwrap().len(), 3);
        assert_eq!(topology.remote_port(handle, 0, 5).unwrap().scsi_target, Some(1));
        assert!(matches!(topology.remote_port(handle, 0, 3), Err(Error::IllegalIndex(3))));
        assert_eq!(topology.nth_remote_port(handle, 0, 2).unwrap().disc_index, 7);
        assert!(topology.nth_remote_port(handle, 0, 3).is_err());

        let rport = topology.remote_port_by_target(handle, 0, 1).unwrap().unwrap();
        assert_eq!(rport.disc_index, 5);
        let fcid = rport.attributes.fcid;
        assert_eq!(topology.remote_port_by_fcid(handle, 0, fcid).unwrap().unwrap().disc_index, 5);
        let wwn = Wwn::from_u64(0x2100_0024_ff01_0007);
        assert_eq!(topology.remote_port_by_wwn(handle, 0, wwn).unwrap().unwrap().disc_index, 7);
        assert!(topology.remote_port_by_target(handle, 0, 9).unwrap().is_none());

        let attrs = topology.discovered_port_attributes(handle, 0, 0).unwrap();
        assert_eq!(attrs.port_wwn, Wwn::from_u64(0x2100_0024_ff01_0002));
    }

    #[test_log::test]
    fn test_port_attributes_by_wwn() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.write("sys/class/fc_host/host4/port_name", "0x1000000000000004\n");
        sys.add_rport(4, 0, 1, 0x2100_0024_ff01_0001, Some(0));
        sys.add_rport(4, 0, 2, 0x2100_0024_ff01_0001, Some(1));
        sys.add_rport(4, 0, 3, 0x2100_0024_ff01_0003, Some(2));

        let mut topology = discover(&sys);
        let handle = Handle::for_index(0);
        let local = topology
            .port_attributes_by_wwn(handle, Wwn::from_u64(0x1000000000000004))
            .unwrap();
        assert_eq!(local.os_device_name, "host4");
        let remote = topology
            .port_attributes_by_wwn(handle, Wwn::from_u64(0x2100_0024_ff01_0003))
            .unwrap();
        assert!(remote.os_device_name.ends_with("rport-4:0-3"));
        assert!(matches!(
            topology.port_attributes_by_wwn(handle, Wwn::from_u64(0x2100_0024_ff01_0001)),
            Err(Error::AmbiguousWwn(_, 2))
        ));
    }
}
