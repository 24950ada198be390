// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use log::{info, warn};
use serde::Serialize;
use std::{env, path::PathBuf};

use hba::{AdapterAttributes, Error, Handle, PortAttributes, TargetMapping, Topology};

/// Most LUNs listed per adapter
const MAPPING_LIMIT: usize = 256;

#[derive(Serialize)]
struct PortReport<'a> {
    attributes: &'a PortAttributes,
    remote_ports: Vec<&'a PortAttributes>,
}

#[derive(Serialize)]
struct AdapterReport<'a> {
    name: String,
    attributes: AdapterAttributes,
    ports: Vec<PortReport<'a>>,
    mapping: Option<TargetMapping>,
}

/// Map the adapter's LUNs, keeping the partial mapping if it overflows
fn target_mapping(topology: &mut Topology, handle: Handle) -> Option<TargetMapping> {
    match topology.target_mapping_v1(handle, MAPPING_LIMIT) {
        Ok(mapping) => Some(mapping),
        Err(Error::MoreData(partial)) => {
            warn!("{handle}: showing {} of {} LUNs", partial.entries.len(), partial.total);
            Some(*partial)
        }
        Err(e) => {
            warn!("{handle}: target mapping failed: {e}");
            None
        }
    }
}

/// Print the FC topology of the running system, or of the sysroot given as
/// the first argument. `--json` prints it as JSON instead.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let mut json = false;
    let mut sysroot = PathBuf::from("/");
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            _ => sysroot = PathBuf::from(arg),
        }
    }

    info!("Discovering FC adapters in {}", sysroot.display());
    let mut topology = Topology::discover_in_sysroot(&sysroot)?;
    let names = topology
        .adapters()
        .filter_map(|(index, _)| topology.adapter_name(index).ok())
        .collect::<Vec<_>>();

    // Remote ports are matched lazily, so resolve everything before borrowing
    let mut handles = Vec::new();
    for name in &names {
        let Some(handle) = topology.open(name) else {
            continue;
        };
        let ports = topology.adapter(handle)?.ports.iter().map(|(i, _)| i).collect::<Vec<_>>();
        for port in &ports {
            topology.remote_ports(handle, *port)?;
        }
        let mapping = target_mapping(&mut topology, handle);
        handles.push((name.clone(), handle, ports, mapping));
    }

    let mut reports = Vec::new();
    for (name, handle, ports, mapping) in handles {
        let adapter = topology.adapter(handle)?;
        let ports = ports
            .iter()
            .filter_map(|p| adapter.port(*p))
            .map(|port| PortReport {
                attributes: &port.attributes,
                remote_ports: port
                    .rports
                    .values()
                    .filter_map(|r| topology.remote_port_registry().get(*r))
                    .map(|r| &r.attributes)
                    .collect(),
            })
            .collect();
        reports.push(AdapterReport {
            name,
            attributes: adapter.attributes.clone(),
            ports,
            mapping,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    info!("Found {} adapters", reports.len());
    for report in &reports {
        let a = &report.attributes;
        info!(
            "{} ({} {}, driver {} {})",
            report.name, a.manufacturer, a.model, a.driver_name, a.driver_version
        );
        for port in &report.ports {
            let p = &port.attributes;
            info!("  └─{} WWPN {} FCID 0x{:06x} {} {}", p.os_device_name, p.port_wwn, p.fcid, p.state, p.speed);
            for remote in &port.remote_ports {
                info!(
                    "    ├─WWPN {} WWNN {} FCID 0x{:06x} {}",
                    remote.port_wwn, remote.node_wwn, remote.fcid, remote.state
                );
            }
        }
        for entry in report.mapping.iter().flat_map(|m| &m.entries) {
            info!(
                "  ▸ {}:{}:{} WWPN {} {} {}",
                entry.scsi.bus,
                entry.scsi.target,
                entry.scsi.os_lun,
                entry.fcp.port_wwn,
                entry.scsi.os_device_name,
                entry.sg_device
            );
        }
    }

    Ok(())
}
