// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! World-Wide Names

use std::{fmt, num::ParseIntError, str::FromStr};

use serde::{Serialize, Serializer};

/// A 64-bit World-Wide Name, stored most significant byte first
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wwn([u8; 8]);

impl Wwn {
    /// Build a WWN from its raw big-endian bytes
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Build a WWN from its numeric value
    pub const fn from_u64(value: u64) -> Self {
        Self::from_bytes(value.to_be_bytes())
    }

    /// The numeric value of the WWN
    pub const fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    /// The raw bytes, most significant first
    pub const fn bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<u64> for Wwn {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl fmt::Display for Wwn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.as_u64())
    }
}

impl fmt::Debug for Wwn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wwn({self})")
    }
}

impl FromStr for Wwn {
    type Err = ParseIntError;

    /// Parses `0x2000001b32a0b1c2`, `2000001b32a0b1c2` or `20:00:00:1b:32:a0:b1:c2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let digits = digits.replace(':', "");
        u64::from_str_radix(&digits, 16).map(Self::from_u64)
    }
}

impl Serialize for Wwn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
