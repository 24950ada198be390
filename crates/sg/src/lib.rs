// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! SCSI commands issued through the Linux SCSI generic (sg) driver
//!
//! Each LUN reachable through a Fibre Channel port has a `/dev/sgN`
//! character device. This crate sends the handful of commands the HBA
//! library needs (INQUIRY, READ CAPACITY and REPORT LUNS) and decodes
//! the device identification VPD page.

use std::{
    fs::OpenOptions,
    io,
    os::{fd::AsRawFd, raw::c_void},
    path::Path,
};

use log::{debug, error};
use nix::libc;
use thiserror::Error;

pub mod commands;
pub mod device_id;

pub use commands::{inquiry, read_capacity, report_luns};

/// `SG_IO` request number from `<scsi/sg.h>`
const SG_IO: u32 = 0x2285;

/// Data transfer from the device to the host
const SG_DXFER_FROM_DEV: i32 = -3;

/// Milliseconds to wait for a command to complete
pub const TIMEOUT_MS: u32 = 3000;

/// SCSI status byte for CHECK CONDITION
pub const STATUS_CHECK_CONDITION: u8 = 0x02;

/// Errors raised while talking to a SCSI generic device
#[derive(Debug, Error)]
pub enum Error {
    /// The device node could not be opened
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// The `SG_IO` ioctl itself failed
    #[error("SG_IO failed on {device}: {source}")]
    Ioctl {
        device: String,
        #[source]
        source: io::Error,
    },

    /// The device returned fewer bytes than the response header needs
    #[error("short response: {0} bytes")]
    ShortResponse(usize),

    /// A VPD response carried a different page than the one requested
    #[error("unexpected VPD page 0x{0:02x}")]
    UnexpectedPage(u8),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a completed SCSI command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Data returned by the device, truncated to the transferred length
    pub data: Vec<u8>,
    /// SCSI status byte
    pub status: u8,
    /// Sense data written by the device, if any
    pub sense: Vec<u8>,
}

impl Response {
    /// Returns true if the device reported CHECK CONDITION
    pub fn is_check_condition(&self) -> bool {
        self.status == STATUS_CHECK_CONDITION
    }
}

/// A transport able to execute a CDB against a device node.
///
/// The default transport is [`SgIo`]; tests and alternative platforms
/// provide their own.
pub trait Passthrough {
    /// Execute `cdb` against `device`, reading at most `data_len` bytes of
    /// data and `sense_len` bytes of sense.
    fn execute(&self, device: &Path, cdb: &[u8], data_len: usize, sense_len: usize) -> Result<Response>;
}

/// Mirror of `struct sg_io_hdr`
#[repr(C)]
struct SgIoHdr {
    interface_id: i32,
    dxfer_direction: i32,
    cmd_len: u8,
    mx_sb_len: u8,
    iovec_count: u16,
    dxfer_len: u32,
    dxferp: *mut c_void,
    cmdp: *const u8,
    sbp: *mut u8,
    timeout: u32,
    flags: u32,
    pack_id: i32,
    usr_ptr: *mut c_void,
    status: u8,
    masked_status: u8,
    msg_status: u8,
    sb_len_wr: u8,
    host_status: u16,
    driver_status: u16,
    resid: i32,
    duration: u32,
    info: u32,
}

/// Passthrough using the `SG_IO` ioctl
#[derive(Debug, Default, Clone, Copy)]
pub struct SgIo;

impl Passthrough for SgIo {
    fn execute(&self, device: &Path, cdb: &[u8], data_len: usize, sense_len: usize) -> Result<Response> {
        let file = OpenOptions::new().read(true).write(true).open(device).map_err(|e| {
            error!("open of {} failed: {}", device.display(), e);
            e
        })?;

        let mut data = vec![0u8; data_len];
        let mut sense = vec![0u8; sense_len.min(u8::MAX as usize)];

        let mut hdr = SgIoHdr {
            interface_id: 'S' as i32,
            dxfer_direction: SG_DXFER_FROM_DEV,
            cmd_len: cdb.len() as u8,
            mx_sb_len: sense.len() as u8,
            iovec_count: 0,
            dxfer_len: data.len() as u32,
            dxferp: data.as_mut_ptr() as *mut c_void,
            cmdp: cdb.as_ptr(),
            sbp: sense.as_mut_ptr(),
            timeout: TIMEOUT_MS,
            flags: 0,
            pack_id: 0,
            usr_ptr: std::ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        };

        debug!("SG_IO opcode 0x{:02x} on {}", cdb.first().copied().unwrap_or(0), device.display());
        let res = unsafe { libc::ioctl(file.as_raw_fd(), SG_IO as _, &mut hdr) };
        if res < 0 {
            let source = io::Error::last_os_error();
            error!("SG_IO error on {}: {}", device.display(), source);
            return Err(Error::Ioctl {
                device: device.display().to_string(),
                source,
            });
        }

        let transferred = data_len.saturating_sub(hdr.resid.max(0) as usize);
        data.truncate(transferred);
        sense.truncate(hdr.sb_len_wr as usize);

        Ok(Response {
            data,
            status: hdr.status,
            sense,
        })
    }
}
