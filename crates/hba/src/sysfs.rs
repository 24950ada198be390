// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Helper functions for interacting with Linux sysfs interfaces

use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::Wwn;

/// Reads a value from a sysfs attribute and attempts to parse it to type T
///
/// # Arguments
///
/// * `node` - Path to the sysfs directory holding the attribute
/// * `key` - Name of the sysfs attribute to read
///
/// # Returns
///
/// * `Some(T)` if the value was successfully read and parsed
/// * `None` if the file could not be read or parsed
pub(crate) fn sysfs_read<T>(node: &Path, key: &str) -> Option<T>
where
    T: FromStr,
{
    fs::read_to_string(node.join(key)).ok()?.trim().parse().ok()
}

/// Read the first line of an attribute, without the trailing newline
pub(crate) fn read_line(node: &Path, key: &str) -> io::Result<String> {
    let text = fs::read_to_string(node.join(key))?;
    Ok(text.lines().next().unwrap_or_default().trim_end().to_owned())
}

fn invalid(node: &Path, key: &str, text: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}: unparsable value {text:?}", node.join(key).display()),
    )
}

/// Parse an integer printed either as `0x`-prefixed hex or decimal
pub(crate) fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Read an integer attribute (hex or decimal)
pub(crate) fn read_u64(node: &Path, key: &str) -> io::Result<u64> {
    let text = read_line(node, key)?;
    parse_u64(&text).ok_or_else(|| invalid(node, key, &text))
}

/// Read an integer attribute (hex or decimal) that must fit 32 bits
pub(crate) fn read_u32(node: &Path, key: &str) -> io::Result<u32> {
    let text = read_line(node, key)?;
    parse_u64(&text)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid(node, key, &text))
}

/// Read a signed decimal attribute such as `scsi_target_id`
pub(crate) fn read_i32(node: &Path, key: &str) -> io::Result<i32> {
    let text = read_line(node, key)?;
    text.trim().parse().map_err(|_| invalid(node, key, &text))
}

/// Read a World-Wide Name printed as 64-bit hex
pub(crate) fn read_wwn(node: &Path, key: &str) -> io::Result<Wwn> {
    let text = read_line(node, key)?;
    text.parse().map_err(|_| invalid(node, key, &text))
}

/// Read the leading decimal digits of an attribute, e.g. `2048 bytes`
pub(crate) fn read_leading_u32(node: &Path, key: &str) -> io::Result<u32> {
    let text = read_line(node, key)?;
    let trimmed = text.trim_start();
    let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    trimmed[..digits].parse().map_err(|_| invalid(node, key, &text))
}

/// Write `value` to an attribute
pub(crate) fn write_line(node: &Path, key: &str, value: &str) -> io::Result<()> {
    fs::write(node.join(key), value)
}

/// Names of the entries in `dir`, sorted
pub(crate) fn dir_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Target of the symlink at `path`
pub(crate) fn read_link(path: &Path) -> io::Result<PathBuf> {
    fs::read_link(path)
}
