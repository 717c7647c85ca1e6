use crate::config::ThresholdsConfig;
use crate::state::{MetricKind, ResourceAlert, Snapshot};

/// Compares cpu, memory and disk against their thresholds, in that order.
/// A metric whose collection failed reads as zero and so never alerts.
pub fn evaluate(snapshot: &Snapshot, thresholds: &ThresholdsConfig) -> Vec<ResourceAlert> {
    MetricKind::ALL
        .into_iter()
        .filter(|kind| thresholds.is_checked(*kind))
        .filter_map(|kind| {
            let value = snapshot.metric(kind).effective_value();
            let threshold = thresholds.threshold(kind);
            (value > threshold).then(|| ResourceAlert {
                kind,
                value,
                threshold,
                text: format!(
                    "{}: {:.1}% (阈值 {}%)",
                    alert_label(kind),
                    value,
                    threshold
                ),
            })
        })
        .collect()
}

fn alert_label(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Cpu => "🔥 CPU 过高",
        MetricKind::Memory => "⚠️ 内存不足",
        MetricKind::Disk => "💾 磁盘空间不足",
    }
}
