use crate::config::{ReportConfig, ThresholdsConfig};
use crate::state::{Metric, MetricKind, ResourceAlert, Snapshot, UsageBytes};
use chrono::{DateTime, Local};
use std::fmt::Write;

const DIVIDER: &str = "━━━━━━━━━━━━━━━";

/// Renders the report printed locally and delivered to chat. Output depends
/// only on the arguments.
pub fn format_report(
    snapshot: &Snapshot,
    alerts: &[ResourceAlert],
    now: DateTime<Local>,
    thresholds: &ThresholdsConfig,
    cfg: &ReportConfig,
) -> String {
    let mut out = vec![
        format!("🖥️ {} - {}", cfg.title, format_timestamp(now, &cfg.time_format)),
        String::new(),
    ];

    for kind in MetricKind::ALL {
        out.push(format_metric(snapshot.metric(kind), thresholds.threshold(kind)));
    }
    out.push(format!(
        "📊 负载: {} / {} / {}",
        snapshot.load.one, snapshot.load.five, snapshot.load.fifteen
    ));
    out.push(format!(
        "⏱️ 运行: {}",
        snapshot.uptime.text.as_deref().unwrap_or("N/A")
    ));
    out.push(String::new());

    if alerts.is_empty() {
        out.push("✅ 状态正常".to_string());
    } else {
        out.push(DIVIDER.to_string());
        out.push(format!("⚠️ 告警 ({})", alerts.len()));
        out.extend(alerts.iter().map(|a| a.text.clone()));
    }

    out.push(String::new());
    out.push(cfg.footer.clone());
    out.join("\n")
}

fn format_metric(metric: &Metric, threshold: f64) -> String {
    let value = metric.effective_value();
    let mut line = format!(
        "{} {}: {:.1}{}",
        status_marker(metric.kind, value, threshold),
        metric.kind.title(),
        value,
        metric.unit
    );
    if let Some(usage) = metric.usage {
        line.push_str(&format_usage(usage));
    }
    if metric.is_failed() {
        line.push_str(" (采集失败)");
    }
    line
}

/// Green below the comfort level, yellow below the alert threshold, red at or
/// above it.
pub fn status_marker(kind: MetricKind, value: f64, threshold: f64) -> &'static str {
    let comfortable = match kind {
        MetricKind::Cpu => 50.0,
        MetricKind::Memory | MetricKind::Disk => 70.0,
    };
    if value < comfortable {
        "🟢"
    } else if value < threshold {
        "🟡"
    } else {
        "🔴"
    }
}

fn format_usage(usage: UsageBytes) -> String {
    format!(
        " ({:.2}GB / {:.2}GB)",
        bytes_to_gb(usage.used_bytes),
        bytes_to_gb(usage.total_bytes)
    )
}

fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0 / 1024.0
}

fn format_timestamp(now: DateTime<Local>, pattern: &str) -> String {
    let mut text = String::new();
    if write!(text, "{}", now.format(pattern)).is_err() {
        text.clear();
        let _ = write!(text, "{}", now.format("%m/%d %H:%M"));
    }
    text
}
