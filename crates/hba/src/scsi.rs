// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! SCSI commands addressed to a LUN by FC identity

use std::path::PathBuf;

use log::debug;

use crate::{Error, Handle, Result, Topology, Wwn};

/// How the local port issuing a command is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    /// Port 0 of the adapter. CHECK CONDITION is reported as
    /// [`Error::ScsiCheckCondition`].
    FirstPort,
    /// The local port with this port WWN. The SCSI status is returned to
    /// the caller in the response.
    PortWwn(Wwn),
}

/// A LUN behind a remote port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LunAddress {
    pub via: Via,
    /// Port WWN of the remote port
    pub target: Wwn,
    pub lun: u64,
}

impl Topology {
    fn issuing_port(&self, handle: Handle, via: Via) -> Result<usize> {
        match via {
            Via::FirstPort => self
                .port(handle, 0)
                .map(|p| p.index)
                .map_err(|_| Error::InvalidHandle(handle.raw())),
            Via::PortWwn(wwn) => self.unique_port_by_wwn(handle, wwn).map(|p| p.index),
        }
    }

    /// SCSI generic node of a LUN, or `unmapped` if it can not be resolved
    fn lun_device(&mut self, handle: Handle, via: Via, target: Wwn, lun: u64, unmapped: Error) -> Result<PathBuf> {
        let port = self.issuing_port(handle, via)?;
        self.sg_name(handle, port, target, lun).map_err(|e| {
            debug!("unable to resolve LUN {lun} of {target}: {e}");
            unmapped
        })
    }

    fn checked(via: Via, response: sg::Response) -> Result<sg::Response> {
        if via == Via::FirstPort && response.is_check_condition() {
            Err(Error::ScsiCheckCondition { sense: response.sense })
        } else {
            Ok(response)
        }
    }

    /// Send INQUIRY with CDB bytes 1 and 2 set to `flags` and `page_code`
    pub fn scsi_inquiry(
        &mut self,
        handle: Handle,
        address: &LunAddress,
        flags: u8,
        page_code: u8,
        data_len: usize,
        sense_len: usize,
    ) -> Result<sg::Response> {
        let device = self.lun_device(handle, address.via, address.target, address.lun, Error::TargetLun(address.lun))?;
        let response = sg::inquiry(self.passthrough.as_ref(), &device, flags, page_code, data_len, sense_len)?;
        Self::checked(address.via, response)
    }

    pub fn scsi_read_capacity(
        &mut self,
        handle: Handle,
        address: &LunAddress,
        data_len: usize,
        sense_len: usize,
    ) -> Result<sg::Response> {
        let device = self.lun_device(handle, address.via, address.target, address.lun, Error::TargetLun(address.lun))?;
        let response = sg::read_capacity(self.passthrough.as_ref(), &device, data_len, sense_len)?;
        Self::checked(address.via, response)
    }

    /// Send REPORT LUNS through LUN 0 of the remote port `target`
    pub fn scsi_report_luns(
        &mut self,
        handle: Handle,
        via: Via,
        target: Wwn,
        data_len: usize,
        sense_len: usize,
    ) -> Result<sg::Response> {
        let device = self.lun_device(handle, via, target, 0, Error::TargetPortWwn(target))?;
        let response = sg::report_luns(self.passthrough.as_ref(), &device, data_len, sense_len)?;
        Self::checked(via, response)
    }
}
