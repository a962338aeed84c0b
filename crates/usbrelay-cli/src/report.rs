//! Rendering of controller results for stdout.
//!
//! The desktop shell parses `relay<N>=<0|1>` status tokens and the
//! `list-ports --json` array, so both formats are kept stable.

use serde::Serialize;
use usbrelay_core::controller::ApplyReply;
use usbrelay_core::prelude::*;
use usbrelay_core::protocol::{decode_text, to_hex};

const HEADERS: [&str; 7] = ["Port", "VID", "PID", "Manufacturer", "Model", "HWID", "Address"];
const CSV_FIELDS: [&str; 7] = ["port", "vid", "pid", "manufacturer", "model", "hwid", "address"];

#[derive(Serialize)]
struct JsonPort<'a> {
    port: &'a str,
    device: &'a str,
    description: Option<&'a str>,
    vid: Option<u16>,
    pid: Option<u16>,
    manufacturer: Option<&'a str>,
    model: Option<&'a str>,
    hwid: &'a str,
    address: Option<&'a str>,
}

#[derive(Serialize)]
struct CsvPort<'a> {
    port: &'a str,
    vid: Option<u16>,
    pid: Option<u16>,
    manufacturer: Option<&'a str>,
    model: Option<&'a str>,
    hwid: &'a str,
    address: Option<&'a str>,
}

fn model(port: &PortInfo) -> Option<&str> {
    port.product.as_deref().or(port.description.as_deref())
}

fn cell(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".to_string(),
    }
}

fn id_cell(value: Option<u16>) -> String {
    value
        .map(|v| format!("0x{:04X}", v))
        .unwrap_or_else(|| "-".to_string())
}

/// One device path per line
pub fn ports_plain(ports: &[PortInfo]) -> String {
    ports
        .iter()
        .map(|p| p.path.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aligned table with a header and divider
pub fn ports_table(ports: &[PortInfo]) -> String {
    let rows: Vec<[String; 7]> = ports
        .iter()
        .map(|p| {
            [
                cell(Some(&p.path)),
                id_cell(p.vid),
                id_cell(p.pid),
                cell(p.manufacturer.as_deref()),
                cell(model(p)),
                cell(Some(&p.hardware_id)),
                cell(p.address.as_deref()),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, value) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(value.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut lines = vec![line(HEADERS.to_vec())];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &rows {
        lines.push(line(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

/// CSV with a `port,vid,pid,manufacturer,model,hwid,address` header
pub fn ports_csv(ports: &[PortInfo]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if ports.is_empty() {
        writer.write_record(CSV_FIELDS)?;
    }
    for p in ports {
        writer.serialize(CsvPort {
            port: &p.path,
            vid: p.vid,
            pid: p.pid,
            manufacturer: p.manufacturer.as_deref(),
            model: model(p),
            hwid: &p.hardware_id,
            address: p.address.as_deref(),
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("csv output: {}", e))?;
    Ok(String::from_utf8(bytes)?.trim_end().to_string())
}

/// Pretty JSON array consumed by the desktop shell
pub fn ports_json(ports: &[PortInfo]) -> anyhow::Result<String> {
    let rows: Vec<JsonPort> = ports
        .iter()
        .map(|p| JsonPort {
            port: &p.path,
            device: &p.path,
            description: p.description.as_deref(),
            vid: p.vid,
            pid: p.pid,
            manufacturer: p.manufacturer.as_deref(),
            model: model(p),
            hwid: &p.hardware_id,
            address: p.address.as_deref(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Confirmation line for on/off/pulse
pub fn apply_line(reply: &ApplyReply, port: &str) -> String {
    match reply {
        ApplyReply::Switched(r) => {
            let mut line = format!("OK: {} {} ({})", r.target, r.state, port);
            if !r.response.is_empty() {
                line.push_str(&format!(" -> {}", r.text()));
            }
            line
        }
        ApplyReply::Pulsed(p) => format!("OK: {} pulse {}s ({})", p.target, p.seconds, port),
    }
}

/// `RAW: <hex>` line, `(no data)` for an empty response
pub fn raw_line(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "RAW: (no data)".to_string()
    } else {
        format!("RAW: {}", to_hex(bytes))
    }
}

/// Text for a raw command's response
pub fn raw_response(bytes: &[u8], as_hex: bool) -> String {
    if as_hex {
        raw_line(bytes)
    } else if bytes.is_empty() {
        "No response".to_string()
    } else {
        decode_text(bytes)
    }
}
