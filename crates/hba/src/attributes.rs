// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Adapter and port attribute blocks, and the kernel tokens they decode from

use std::fmt;

use bitflags::bitflags;
use serde::Serialize;

use crate::{
    codec::{self, NameTable, ParseError},
    Wwn,
};

/// `port_state` tokens; several kernel states collapse onto `Unknown`
pub static PORT_STATES: &NameTable = &[
    ("Not Present", PortState::Unknown as u32),
    ("Online", PortState::Online as u32),
    ("Offline", PortState::Offline as u32),
    ("Blocked", PortState::Unknown as u32),
    ("Bypassed", PortState::Bypassed as u32),
    ("Diagnostics", PortState::Diagnostics as u32),
    ("Linkdown", PortState::LinkDown as u32),
    ("Error", PortState::Error as u32),
    ("Loopback", PortState::Loopback as u32),
    ("Deleted", PortState::Unknown as u32),
];

/// `speed` and `supported_speeds` tokens
pub static PORT_SPEEDS: &NameTable = &[
    ("1 Gbit", PortSpeed::GBIT_1.bits()),
    ("2 Gbit", PortSpeed::GBIT_2.bits()),
    ("4 Gbit", PortSpeed::GBIT_4.bits()),
    ("8 Gbit", PortSpeed::GBIT_8.bits()),
    ("10 Gbit", PortSpeed::GBIT_10.bits()),
    ("16 Gbit", PortSpeed::GBIT_16.bits()),
    ("20 Gbit", PortSpeed::GBIT_20.bits()),
    ("32 Gbit", PortSpeed::GBIT_32.bits()),
    ("40 Gbit", PortSpeed::GBIT_40.bits()),
    ("50 Gbit", PortSpeed::GBIT_50.bits()),
    ("64 Gbit", PortSpeed::GBIT_64.bits()),
    ("100 Gbit", PortSpeed::GBIT_100.bits()),
    ("128 Gbit", PortSpeed::GBIT_128.bits()),
    ("256 Gbit", PortSpeed::GBIT_256.bits()),
    ("Not Negotiated", PortSpeed::NOT_NEGOTIATED.bits()),
    ("Unknown", 0),
];

/// `port_type` tokens as printed by the FC transport class
pub static PORT_TYPES: &NameTable = &[
    ("Unknown", PortType::Unknown as u32),
    ("Other", PortType::Other as u32),
    ("Not Present", PortType::NotPresent as u32),
    ("NPort (fabric via point-to-point)", PortType::NPort as u32),
    ("NLPort (fabric via loop)", PortType::NLPort as u32),
    ("LPort (private loop)", PortType::LPort as u32),
    ("Point-To-Point (direct nport connection)", PortType::PointToPoint as u32),
    ("NPIV VPORT", PortType::NPort as u32),
];

/// `tgtid_bind_type` tokens
pub static BINDING_TYPES: &NameTable = &[
    ("none", 0),
    ("wwpn (World Wide Port Name)", BindCapability::WWPN.bits()),
    ("wwnn (World Wide Node Name)", BindCapability::WWNN.bits()),
    ("port_id (FC Address)", BindCapability::D_ID.bits()),
];

/// Link state of a port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum PortState {
    #[default]
    Unknown = 1,
    Online = 2,
    Offline = 3,
    Bypassed = 4,
    Diagnostics = 5,
    LinkDown = 6,
    Error = 7,
    Loopback = 8,
}

impl PortState {
    pub fn from_raw(value: u32) -> Self {
        match value {
            2 => Self::Online,
            3 => Self::Offline,
            4 => Self::Bypassed,
            5 => Self::Diagnostics,
            6 => Self::LinkDown,
            7 => Self::Error,
            8 => Self::Loopback,
            _ => Self::Unknown,
        }
    }

    /// Decode a `port_state` attribute, `None` if the token is unknown
    pub fn from_sysfs(text: &str) -> Option<Self> {
        codec::encode(PORT_STATES, text).map(Self::from_raw)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Online => "Online",
            Self::Offline => "Offline",
            Self::Bypassed => "Bypassed",
            Self::Diagnostics => "Diagnostics",
            Self::LinkDown => "Linkdown",
            Self::Error => "Error",
            Self::Loopback => "Loopback",
        };
        f.write_str(name)
    }
}

/// Topology role of a port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum PortType {
    #[default]
    Unknown = 1,
    Other = 2,
    NotPresent = 3,
    NPort = 5,
    NLPort = 6,
    LPort = 20,
    PointToPoint = 21,
}

impl PortType {
    pub fn from_raw(value: u32) -> Self {
        match value {
            2 => Self::Other,
            3 => Self::NotPresent,
            5 => Self::NPort,
            6 => Self::NLPort,
            20 => Self::LPort,
            21 => Self::PointToPoint,
            _ => Self::Unknown,
        }
    }

    /// Decode a `port_type` attribute; unrecognised text is `Unknown`
    pub fn from_sysfs(text: &str) -> Self {
        codec::encode(PORT_TYPES, text).map(Self::from_raw).unwrap_or_default()
    }
}

bitflags! {
    /// Port speed flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct PortSpeed: u32 {
        const GBIT_1 = 0x1;
        const GBIT_2 = 0x2;
        const GBIT_10 = 0x4;
        const GBIT_4 = 0x8;
        const GBIT_8 = 0x10;
        const GBIT_16 = 0x20;
        const GBIT_32 = 0x40;
        const GBIT_20 = 0x80;
        const GBIT_40 = 0x100;
        const GBIT_128 = 0x200;
        const GBIT_64 = 0x400;
        const GBIT_256 = 0x800;
        const GBIT_50 = 0x1000;
        const GBIT_100 = 0x2000;
        const NOT_NEGOTIATED = 0x8000;
    }
}

impl PortSpeed {
    /// Decode a single `speed` token
    pub fn from_token(text: &str) -> Option<Self> {
        codec::encode(PORT_SPEEDS, text).map(Self::from_bits_retain)
    }

    /// Decode a `supported_speeds` list such as `"1 Gbit, 10 Gbit"`
    pub fn from_list(text: &str) -> Result<Self, ParseError> {
        codec::decode_bitmask_list(PORT_SPEEDS, text).map(Self::from_bits_retain)
    }
}

impl fmt::Display for PortSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::decode_flags(PORT_SPEEDS, self.bits()))
    }
}

bitflags! {
    /// Supported classes of service, one bit per class number
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct ClassOfService: u32 {
        const CLASS_1 = 1 << 1;
        const CLASS_2 = 1 << 2;
        const CLASS_3 = 1 << 3;
        const CLASS_4 = 1 << 4;
        const CLASS_6 = 1 << 6;
    }
}

impl ClassOfService {
    /// Decode a `supported_classes` attribute such as `"Class 2, Class 3"`
    pub fn from_sysfs(text: &str) -> Result<Self, ParseError> {
        codec::parse_classes(text).map(Self::from_bits_retain)
    }
}

bitflags! {
    /// Persistent target binding modes
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct BindCapability: u32 {
        const D_ID = 0x1;
        const WWPN = 0x2;
        const WWNN = 0x4;
    }
}

/// FC-4 protocol bitmap, eight big-endian 32-bit words as 32 bytes in file order
///
/// Type `t` is bit `t % 32` of word `t / 32`, so FCP (type 8) lands in byte 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Fc4Types(pub [u8; 32]);

impl Fc4Types {
    /// Decode a `supported_fc4s`/`active_fc4s` attribute
    pub fn from_sysfs(text: &str) -> Result<Self, ParseError> {
        codec::parse_hex_words::<32>(text).map(Self)
    }

    /// Returns true if the bit for FC-4 `type_code` is set
    pub fn contains(&self, type_code: u8) -> bool {
        let t = type_code as usize;
        let byte = self.0[(t / 32) * 4 + 3 - (t % 32) / 8];
        byte & (1 << (t % 8)) != 0
    }
}

/// Attributes of a local or remote port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortAttributes {
    pub node_wwn: Wwn,
    pub port_wwn: Wwn,
    pub fcid: u32,
    pub port_type: PortType,
    pub state: PortState,
    pub supported_cos: ClassOfService,
    pub supported_fc4_types: Fc4Types,
    pub active_fc4_types: Fc4Types,
    pub symbolic_name: String,
    /// Host name (`host4`) for local ports, sysfs path for remote ports
    pub os_device_name: String,
    pub supported_speed: PortSpeed,
    pub speed: PortSpeed,
    pub max_frame_size: u32,
    pub fabric_name: Wwn,
    pub discovered_ports: u32,
}

/// Attributes of an adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdapterAttributes {
    pub manufacturer: String,
    pub serial_number: String,
    pub model: String,
    pub model_description: String,
    pub node_wwn: Wwn,
    pub node_symbolic_name: String,
    pub hardware_version: String,
    pub driver_version: String,
    pub option_rom_version: String,
    pub firmware_version: String,
    pub vendor_specific_id: u32,
    pub number_of_ports: u32,
    pub driver_name: String,
}
