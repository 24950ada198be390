// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Command descriptor blocks for the commands issued to FC LUNs

use std::path::Path;

use log::debug;
use zerocopy::{
    byteorder::{BigEndian, U16, U32, U64},
    Immutable, IntoBytes,
};

use crate::{Passthrough, Response, Result};

/// INQUIRY operation code
pub const OP_INQUIRY: u8 = 0x12;
/// READ CAPACITY(10) operation code
pub const OP_READ_CAPACITY_10: u8 = 0x25;
/// SERVICE ACTION IN(16) operation code
pub const OP_SERVICE_ACTION_IN_16: u8 = 0x9e;
/// REPORT LUNS operation code
pub const OP_REPORT_LUNS: u8 = 0xa0;

/// READ CAPACITY(16) service action
const SA_READ_CAPACITY_16: u8 = 0x10;

/// INQUIRY flag requesting vital product data
pub const INQUIRY_EVPD: u8 = 0x01;

/// Size of the READ CAPACITY(16) parameter data
pub const READ_CAPACITY_16_LEN: usize = 32;

/// INQUIRY data and sense lengths must fit in an 8-bit field on some targets
const INQUIRY_MAX_LEN: usize = 255;

#[derive(IntoBytes, Immutable, Debug, Default)]
#[repr(C)]
struct Inquiry {
    op: u8,
    flags: u8,
    page_code: u8,
    alloc_len: U16<BigEndian>,
    control: u8,
}

#[derive(IntoBytes, Immutable, Debug, Default)]
#[repr(C)]
struct ReadCapacity10 {
    op: u8,
    flags: u8,
    lba: U32<BigEndian>,
    reserved: [u8; 2],
    pmi: u8,
    control: u8,
}

#[derive(IntoBytes, Immutable, Debug, Default)]
#[repr(C)]
struct ReadCapacity16 {
    op: u8,
    service_action: u8,
    lba: U64<BigEndian>,
    alloc_len: U32<BigEndian>,
    pmi: u8,
    control: u8,
}

#[derive(IntoBytes, Immutable, Debug, Default)]
#[repr(C)]
struct ReportLuns {
    op: u8,
    reserved1: u8,
    select_report: u8,
    reserved2: [u8; 3],
    alloc_len: U32<BigEndian>,
    reserved3: u8,
    control: u8,
}

/// Issue an INQUIRY to `device`.
///
/// # Arguments
///
/// * `flags` - byte 1 of the CDB (e.g. [`INQUIRY_EVPD`])
/// * `page_code` - byte 2 of the CDB
/// * `alloc_len` - requested data length, clamped to 255
/// * `sense_len` - sense buffer length, clamped to 255
pub fn inquiry(
    transport: &dyn Passthrough,
    device: &Path,
    flags: u8,
    page_code: u8,
    alloc_len: usize,
    sense_len: usize,
) -> Result<Response> {
    let alloc_len = alloc_len.min(INQUIRY_MAX_LEN);
    let sense_len = sense_len.min(INQUIRY_MAX_LEN);
    let cmd = Inquiry {
        op: OP_INQUIRY,
        flags,
        page_code,
        alloc_len: U16::new(alloc_len as u16),
        control: 0,
    };
    transport.execute(device, cmd.as_bytes(), alloc_len, sense_len)
}

/// Issue READ CAPACITY to `device`.
///
/// The 16-byte form is used when the response buffer can hold its
/// parameter data, otherwise READ CAPACITY(10).
pub fn read_capacity(
    transport: &dyn Passthrough,
    device: &Path,
    alloc_len: usize,
    sense_len: usize,
) -> Result<Response> {
    if alloc_len >= READ_CAPACITY_16_LEN {
        debug!("READ CAPACITY(16) on {}", device.display());
        let cmd = ReadCapacity16 {
            op: OP_SERVICE_ACTION_IN_16,
            service_action: SA_READ_CAPACITY_16,
            alloc_len: U32::new(alloc_len as u32),
            ..Default::default()
        };
        transport.execute(device, cmd.as_bytes(), alloc_len, sense_len)
    } else {
        debug!("READ CAPACITY(10) on {}", device.display());
        let cmd = ReadCapacity10 {
            op: OP_READ_CAPACITY_10,
            ..Default::default()
        };
        transport.execute(device, cmd.as_bytes(), alloc_len, sense_len)
    }
}

/// Issue REPORT LUNS to `device`
pub fn report_luns(transport: &dyn Passthrough, device: &Path, alloc_len: usize, sense_len: usize) -> Result<Response> {
    let cmd = ReportLuns {
        op: OP_REPORT_LUNS,
        alloc_len: U32::new(alloc_len as u32),
        ..Default::default()
    };
    transport.execute(device, cmd.as_bytes(), alloc_len, sense_len)
}
