use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
}

impl MetricKind {
    /// Evaluation and display order.
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Memory, MetricKind::Disk];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Memory => "内存",
            MetricKind::Disk => "磁盘",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageBytes {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub kind: MetricKind,
    pub value: f64,
    pub unit: &'static str,
    pub error: Option<String>,
    pub usage: Option<UsageBytes>,
}

impl Metric {
    pub fn ok(kind: MetricKind, value: f64) -> Self {
        Self {
            kind,
            value,
            unit: "%",
            error: None,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: UsageBytes) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn failed(kind: MetricKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            value: 0.0,
            unit: "%",
            error: Some(error.into()),
            usage: None,
        }
    }

    /// Value used for evaluation and display. A failed collection counts as zero
    /// whatever was left in `value`.
    pub fn effective_value(&self) -> f64 {
        if self.error.is_some() {
            0.0
        } else {
            self.value
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAverage {
    pub one: String,
    pub five: String,
    pub fifteen: String,
}

impl Default for LoadAverage {
    fn default() -> Self {
        Self {
            one: "0".to_string(),
            five: "0".to_string(),
            fifteen: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uptime {
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub cpu: Metric,
    pub memory: Metric,
    pub disk: Metric,
    pub load: LoadAverage,
    pub uptime: Uptime,
    pub captured_at: DateTime<Local>,
}

impl Snapshot {
    pub fn metric(&self, kind: MetricKind) -> &Metric {
        match kind {
            MetricKind::Cpu => &self.cpu,
            MetricKind::Memory => &self.memory,
            MetricKind::Disk => &self.disk,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceAlert {
    pub kind: MetricKind,
    pub value: f64,
    pub threshold: f64,
    pub text: String,
}
