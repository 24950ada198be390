// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Port traffic and error counters from `fc_host/hostN/statistics`
//!
//! The kernel prints counters it does not support as all ones, which read
//! back as `u64::MAX`.

use std::path::Path;

use log::error;
use serde::Serialize;

use crate::{sysfs, Error, Handle, Result, Topology, Wwn};

/// FC-4 type code of FCP
pub const FC4_TYPE_FCP: u8 = 0x08;

/// Link level counters of a local port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortStatistics {
    pub seconds_since_last_reset: u64,
    pub tx_frames: u64,
    pub tx_words: u64,
    pub rx_frames: u64,
    pub rx_words: u64,
    pub lip_count: u64,
    pub nos_count: u64,
    pub error_frames: u64,
    pub dumped_frames: u64,
    pub link_failure_count: u64,
    pub loss_of_sync_count: u64,
    pub loss_of_signal_count: u64,
    pub primitive_seq_protocol_err_count: u64,
    pub invalid_tx_word_count: u64,
    pub invalid_crc_count: u64,
}

impl PortStatistics {
    fn from_sysfs(dir: &Path) -> std::io::Result<Self> {
        let read = |key: &str| sysfs::read_u64(dir, key);
        Ok(Self {
            seconds_since_last_reset: read("seconds_since_last_reset")?,
            tx_frames: read("tx_frames")?,
            tx_words: read("tx_words")?,
            rx_frames: read("rx_frames")?,
            rx_words: read("rx_words")?,
            lip_count: read("lip_count")?,
            nos_count: read("nos_count")?,
            error_frames: read("error_frames")?,
            dumped_frames: read("dumped_frames")?,
            link_failure_count: read("link_failure_count")?,
            loss_of_sync_count: read("loss_of_sync_count")?,
            loss_of_signal_count: read("loss_of_signal_count")?,
            primitive_seq_protocol_err_count: read("prim_seq_protocol_err_count")?,
            invalid_tx_word_count: read("invalid_tx_word_count")?,
            invalid_crc_count: read("invalid_crc_count")?,
        })
    }
}

/// FCP request counters of a local port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fc4Statistics {
    pub input_requests: u64,
    pub output_requests: u64,
    pub control_requests: u64,
    pub input_megabytes: u64,
    pub output_megabytes: u64,
}

impl Fc4Statistics {
    fn from_sysfs(dir: &Path) -> std::io::Result<Self> {
        let read = |key: &str| sysfs::read_u64(dir, key);
        Ok(Self {
            input_requests: read("fcp_input_requests")?,
            output_requests: read("fcp_output_requests")?,
            control_requests: read("fcp_control_requests")?,
            input_megabytes: read("fcp_input_megabytes")?,
            output_megabytes: read("fcp_output_megabytes")?,
        })
    }
}

impl Topology {
    pub fn port_statistics(&self, handle: Handle, port: usize) -> Result<PortStatistics> {
        let local = self.port(handle, port)?;
        PortStatistics::from_sysfs(&local.host_dir.join("statistics")).map_err(|e| {
            error!("statistics of host{} port {port}: {e}", local.kernel_host);
            e.into()
        })
    }

    /// FC-4 counters of the port `wwn`; only FCP is counted
    pub fn fc4_statistics(&self, handle: Handle, wwn: Wwn, fc4_type: u8) -> Result<Fc4Statistics> {
        let local = self.unique_port_by_wwn(handle, wwn)?;
        if fc4_type != FC4_TYPE_FCP {
            return Err(Error::NotSupported);
        }
        Fc4Statistics::from_sysfs(&local.host_dir.join("statistics")).map_err(|e| {
            error!("FC-4 statistics of host{}: {e}", local.kernel_host);
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPassthrough, MockPci, MockSysfs};

    fn topology(sys: &MockSysfs) -> Topology {
        Topology::builder(sys.root())
            .with_pci(MockPci::default())
            .with_passthrough(MockPassthrough::default())
            .discover()
            .unwrap()
    }

    #[test_log::test]
    fn test_port_statistics() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.write("sys/class/fc_host/host4/statistics/tx_frames", "0x1f\n");
        sys.write("sys/class/fc_host/host4/statistics/lip_count", "0xffffffffffffffff\n");

        let stats = topology(&sys).port_statistics(Handle::for_index(0), 0).unwrap();
        assert_eq!(stats.tx_frames, 0x1f);
        assert_eq!(stats.lip_count, u64::MAX);
        assert_eq!(stats.seconds_since_last_reset, 100);

        sys.remove("sys/class/fc_host/host4/statistics/nos_count");
        assert!(matches!(
            topology(&sys).port_statistics(Handle::for_index(0), 0),
            Err(Error::Io(_))
        ));
    }

    #[test_log::test]
    fn test_fc4_statistics() {
        let sys = MockSysfs::new();
        sys.add_fc_host(4, "0000:03:00.0", "eth2");
        sys.write("sys/class/fc_host/host4/port_name", "0x1000000000000004\n");
        sys.write("sys/class/fc_host/host4/statistics/fcp_input_megabytes", "0x200\n");
        let topology = topology(&sys);
        let wwn = Wwn::from_u64(0x1000000000000004);

        let stats = topology.fc4_statistics(Handle::for_index(0), wwn, FC4_TYPE_FCP).unwrap();
        assert_eq!(stats.input_megabytes, 0x200);
        assert!(matches!(
            topology.fc4_statistics(Handle::for_index(0), wwn, 0x05),
            Err(Error::NotSupported)
        ));
        assert!(matches!(
            topology.fc4_statistics(Handle::for_index(0), Wwn::from_u64(1), FC4_TYPE_FCP),
            Err(Error::IllegalWwn(_))
        ));
    }
}
