//! Plain-text tables for console reporting.
//!
//! Everything renders to a `String` so commands can print catalogs and
//! lab summaries wherever they need them, error paths included.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::compute::{Flavor, Image, PUBLIC_ADDRESS_NET};
use crate::ledger::LedgerEntry;

/// Flavor catalog table.
pub fn flavor_table(flavors: &[Flavor]) -> String {
    let rows: Vec<Vec<String>> = flavors
        .iter()
        .map(|flavor| {
            vec![
                flavor.id.clone(),
                flavor.name.clone(),
                flavor.ram_mb.to_string(),
                flavor.vcpus.to_string(),
                format!("{:.1}", flavor.rxtx_factor),
            ]
        })
        .collect();
    render_table(&["ID", "NAME", "RAM MB", "VCPUS", "RXTX"], &rows)
}

/// Image catalog table.
pub fn image_table(images: &[Image]) -> String {
    let rows: Vec<Vec<String>> = images
        .iter()
        .map(|image| vec![image.id.clone(), image.name.clone()])
        .collect();
    render_table(&["ID", "NAME"], &rows)
}

/// Lab summary from its ledger entries: one row per recorded instance,
/// metadata entries appended after the table.
pub fn lab_table(lab: &str, entries: &BTreeMap<String, LedgerEntry>) -> String {
    let net_label = format!("{}_net", lab);
    let mut rows = Vec::new();
    let mut metadata = Vec::new();
    for (node, entry) in entries {
        if let Some(record) = entry.as_server() {
            rows.push(vec![
                node.clone(),
                record.id.clone(),
                record.status.to_string(),
                record.ipv4_on(&net_label).unwrap_or("-").to_string(),
                record.ipv4_on(PUBLIC_ADDRESS_NET).unwrap_or("-").to_string(),
            ]);
        } else if let Some(value) = entry.as_text() {
            metadata.push(format!("{} = {}", node, value.trim_end()));
        }
    }

    let mut out = render_table(&["NODE", "ID", "STATUS", "LAB IP", "PUBLIC IP"], &rows);
    if !metadata.is_empty() {
        out.push('\n');
        for line in metadata {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Renders headers and rows as space-aligned columns. Every column is as
/// wide as its widest cell; rows never carry trailing spaces.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.len()).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if cell.len() > widths[index] {
                widths[index] = cell.len();
            }
        }
    }

    let mut out = String::new();
    render_row(&mut out, headers.iter().copied(), &widths);
    for row in rows {
        render_row(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn render_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut line = String::new();
    for (index, cell) in cells.enumerate() {
        if index > 0 {
            line.push_str("  ");
        }
        let _ = write!(line, "{:<width$}", cell, width = widths[index]);
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ServerAddress, ServerRecord, ServerStatus};

    fn flavor(id: &str, name: &str, ram_mb: u32, rxtx_factor: f64) -> Flavor {
        Flavor {
            id: id.to_string(),
            name: name.to_string(),
            ram_mb,
            vcpus: 1,
            rxtx_factor,
        }
    }

    #[test]
    fn test_columns_align_to_the_widest_cell() {
        let table = flavor_table(&[
            flavor("2", "512MB Standard Instance", 512, 80.0),
            flavor("performance1-1", "1 GB Performance", 1024, 200.0),
        ]);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        // The NAME column starts at the same offset in every line.
        let name_at = lines[0].find("NAME").unwrap();
        assert_eq!(lines[1].find("512MB Standard Instance"), Some(name_at));
        assert_eq!(lines[2].find("1 GB Performance"), Some(name_at));
        assert!(lines[2].starts_with("performance1-1  "));
        // No trailing padding on any row.
        assert!(lines.iter().all(|line| !line.ends_with(' ')));
    }

    #[test]
    fn test_image_table_lists_every_candidate() {
        let table = image_table(&[
            Image {
                id: "img-1".to_string(),
                name: "Ubuntu 22.04 LTS".to_string(),
            },
            Image {
                id: "img-2".to_string(),
                name: "Debian 12".to_string(),
            },
        ]);

        assert!(table.contains("Ubuntu 22.04 LTS"));
        assert!(table.contains("Debian 12"));
        assert_eq!(table.lines().count(), 3);
    }

    #[test]
    fn test_lab_table_reports_addresses_and_metadata() {
        let mut addresses = BTreeMap::new();
        addresses.insert(
            "public".to_string(),
            vec![ServerAddress {
                version: 4,
                addr: "203.0.113.5".to_string(),
            }],
        );
        addresses.insert(
            "alpha_net".to_string(),
            vec![ServerAddress {
                version: 4,
                addr: "192.168.3.2".to_string(),
            }],
        );
        let record = ServerRecord {
            id: "srv-1".to_string(),
            name: "alpha_controller1".to_string(),
            status: ServerStatus::Active,
            addresses,
            admin_pass: None,
        };

        let mut entries = BTreeMap::new();
        entries.insert(
            "alpha_controller1".to_string(),
            LedgerEntry::server(record),
        );
        entries.insert(
            "cluster_token".to_string(),
            LedgerEntry::text("s3cr3t\n"),
        );

        let table = lab_table("alpha", &entries);
        assert!(table.contains("alpha_controller1"));
        assert!(table.contains("ACTIVE"));
        assert!(table.contains("192.168.3.2"));
        assert!(table.contains("203.0.113.5"));
        assert!(table.contains("cluster_token = s3cr3t"));
    }

    #[test]
    fn test_node_without_addresses_shows_placeholders() {
        let record = ServerRecord {
            id: "srv-9".to_string(),
            name: "alpha_compute1".to_string(),
            status: ServerStatus::Build,
            addresses: BTreeMap::new(),
            admin_pass: None,
        };
        let mut entries = BTreeMap::new();
        entries.insert("alpha_compute1".to_string(), LedgerEntry::server(record));

        let table = lab_table("alpha", &entries);
        let row = table.lines().nth(1).unwrap();
        assert!(row.contains("BUILD"));
        assert!(row.contains('-'));
    }
}
