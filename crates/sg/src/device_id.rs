// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Device identification VPD page (0x83)
//!
//! A LUN may report several designators. Only the addressable kinds
//! (vendor specific, T10 vendor id, EUI-64 and NAA) are considered, and of
//! those a single "best" one is kept: the lowest designator type, then
//! the shortest designator, then the lexicographically smallest bytes.

use std::path::Path;

use log::debug;
use zerocopy::{
    byteorder::{BigEndian, U16},
    FromBytes, Immutable, KnownLayout,
};

use crate::{commands, Error, Passthrough, Result};

/// Page code of the device identification VPD page
pub const VPD_DEVICE_ID: u8 = 0x83;

/// Highest designator type eligible as a LUN identity
const DESIGNATOR_TYPE_NAA: u8 = 0x3;

/// Length of a designation descriptor header
const DESCRIPTOR_HEADER_LEN: usize = 4;

#[derive(FromBytes, KnownLayout, Immutable, Debug)]
#[repr(C)]
struct PageHeader {
    device_type: u8,
    page_code: u8,
    page_len: U16<BigEndian>,
}

/// A single designation descriptor, header included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Designator<'a> {
    raw: &'a [u8],
}

impl<'a> Designator<'a> {
    /// Code set (binary, ASCII, UTF-8)
    pub fn code_set(&self) -> u8 {
        self.raw[0] & 0x0f
    }

    /// Association (LUN, target port, target device)
    pub fn association(&self) -> u8 {
        (self.raw[1] >> 4) & 0x03
    }

    /// Designator type
    pub fn designator_type(&self) -> u8 {
        self.raw[1] & 0x0f
    }

    /// The designator bytes without the descriptor header
    pub fn designator(&self) -> &'a [u8] {
        &self.raw[DESCRIPTOR_HEADER_LEN..]
    }

    /// The whole descriptor, header included
    pub fn as_bytes(&self) -> &'a [u8] {
        self.raw
    }

    fn rank(&self) -> (u8, usize, &'a [u8]) {
        (self.designator_type(), self.designator().len(), self.designator())
    }
}

/// Iterate the designation descriptors of a device identification page.
///
/// Iteration stops at the first descriptor that overruns the page.
pub fn designators(page: &[u8]) -> Result<impl Iterator<Item = Designator<'_>>> {
    let (header, body) = PageHeader::ref_from_prefix(page).map_err(|_| Error::ShortResponse(page.len()))?;
    if header.page_code != VPD_DEVICE_ID {
        return Err(Error::UnexpectedPage(header.page_code));
    }
    let body = &body[..(header.page_len.get() as usize).min(body.len())];

    let mut rest = body;
    Ok(std::iter::from_fn(move || {
        if rest.len() < DESCRIPTOR_HEADER_LEN {
            return None;
        }
        let len = DESCRIPTOR_HEADER_LEN + rest[3] as usize;
        if len > rest.len() {
            return None;
        }
        let (raw, tail) = rest.split_at(len);
        rest = tail;
        Some(Designator { raw })
    }))
}

/// Select the best LUN designator from a device identification page
pub fn best_designator(page: &[u8]) -> Result<Option<Designator<'_>>> {
    Ok(designators(page)?
        .filter(|d| d.designator_type() <= DESIGNATOR_TYPE_NAA)
        .min_by(|a, b| a.rank().cmp(&b.rank())))
}

/// Read the device identification page of `device` and return the raw
/// best descriptor, or `None` if the device offers none.
pub fn identify(transport: &dyn Passthrough, device: &Path, alloc_len: usize) -> Result<Option<Vec<u8>>> {
    let response = commands::inquiry(
        transport,
        device,
        commands::INQUIRY_EVPD,
        VPD_DEVICE_ID,
        alloc_len,
        252,
    )?;
    let Some(best) = best_designator(&response.data)? else {
        debug!("{}: no usable designator", device.display());
        return Ok(None);
    };
    debug!(
        "{}: best designator type {} code set {} association {}: {:02x?}",
        device.display(),
        best.designator_type(),
        best.code_set(),
        best.association(),
        best.designator()
    );
    Ok(Some(best.as_bytes().to_vec()))
}
