use crate::metrics::MetricsSnapshot;
use crate::publisher::format_payload;
use crossterm::style::{Color, Stylize};
use std::io::{stdout, Write};
use tracing::error;

pub fn print_status_line(snapshot: &MetricsSnapshot) {
    if let Err(e) = write_line(&mut stdout(), &status_line(snapshot)) {
        error!("Console render error: {}", e);
    }
}

pub fn print_json_line(snapshot: &MetricsSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(line) => {
            if let Err(e) = write_line(&mut stdout(), &line) {
                error!("Console render error: {}", e);
            }
        }
        Err(e) => error!("Failed to serialize snapshot: {}", e),
    }
}

fn write_line(out: &mut impl Write, line: &str) -> std::io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}

pub fn status_line(snap: &MetricsSnapshot) -> String {
    format!(
        "CPU: {} | RAM: {} ({}/{} GB) | Disk: {} | Disk I/O: R {} MB/s W {} MB/s | Net: ↓ {} MB/s ↑ {} MB/s",
        color_pct(snap.cpu_percent, 50.0, 80.0),
        color_pct(snap.ram_percent, 70.0, 90.0),
        format_payload(snap.ram_used_gb),
        format_payload(snap.ram_total_gb),
        color_pct(snap.disk_percent, 80.0, 95.0),
        format_payload(snap.disk_read_rate),
        format_payload(snap.disk_write_rate),
        format_payload(snap.net_recv_rate),
        format_payload(snap.net_sent_rate),
    )
}

fn color_pct(value: f64, warn: f64, crit: f64) -> String {
    let s = format!("{value:.1}%");
    if value >= crit {
        s.with(Color::Red).to_string()
    } else if value >= warn {
        s.with(Color::Yellow).to_string()
    } else {
        s.with(Color::Green).to_string()
    }
}
