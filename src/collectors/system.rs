use crate::collectors::command::CommandRunner;
use crate::config::CollectConfig;
use crate::state::{LoadAverage, Metric, MetricKind, Snapshot, Uptime, UsageBytes};
use chrono::Local;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::{debug, warn};

pub(crate) const CPU_TOP: &str = r#"top -bn1 | awk -F',' '/Cpu\(s\)/ { for (i = 1; i <= NF; i++) if ($i ~ / id/) { gsub(/[^0-9.]/, "", $i); print 100 - $i; exit } }'"#;
pub(crate) const CPU_VMSTAT: &str = "vmstat 1 2 | tail -1 | awk 'NF >= 15 { print 100 - $15 }'";
pub(crate) const MEMORY_FREE: &str = "free -b";
pub(crate) const LOAD_PROC: &str = "cat /proc/loadavg";
pub(crate) const UPTIME_PRETTY: &str = "uptime -p";
pub(crate) const UPTIME_RAW: &str = "uptime";

type Attempt<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + 'a>>;

/// Collects one [`Snapshot`] per call. Every metric walks its own probe list
/// and degrades on its own, so a broken `df` never costs the CPU reading.
pub struct MetricSource<R> {
    runner: R,
    command_timeout: Duration,
    disk_mount: String,
    native_fallback: bool,
    system: System,
}

impl<R: CommandRunner> MetricSource<R> {
    pub fn new(runner: R, cfg: &CollectConfig) -> Self {
        Self {
            runner,
            command_timeout: cfg.command_timeout(),
            disk_mount: cfg.disk_mount.clone(),
            native_fallback: cfg.native_fallback,
            system: System::new(),
        }
    }

    pub async fn collect(&mut self) -> Snapshot {
        let cpu = match self.cpu_percent().await {
            Ok(value) => Metric::ok(MetricKind::Cpu, value),
            Err(err) => degraded(MetricKind::Cpu, err),
        };
        let memory = match self.memory_usage().await {
            Ok((value, usage)) => Metric::ok(MetricKind::Memory, value).with_usage(usage),
            Err(err) => degraded(MetricKind::Memory, err),
        };
        let disk = match self.disk_usage().await {
            Ok((value, Some(usage))) => Metric::ok(MetricKind::Disk, value).with_usage(usage),
            Ok((value, None)) => Metric::ok(MetricKind::Disk, value),
            Err(err) => degraded(MetricKind::Disk, err),
        };
        let load = self.load_average().await.unwrap_or_else(|err| {
            warn!(error = %err, "load average unavailable");
            LoadAverage::default()
        });
        let uptime = Uptime {
            text: self
                .uptime_text()
                .await
                .map_err(|err| warn!(error = %err, "uptime unavailable"))
                .ok(),
        };

        Snapshot {
            cpu,
            memory,
            disk,
            load,
            uptime,
            captured_at: Local::now(),
        }
    }

    async fn cpu_percent(&mut self) -> Result<f64, String> {
        let limit = self.command_timeout;
        let mut attempts: Vec<Attempt<'_, f64>> = vec![
            shell(&self.runner, CPU_TOP.to_string(), limit, parse_percent),
            shell(&self.runner, CPU_VMSTAT.to_string(), limit, parse_percent),
        ];
        if self.native_fallback {
            attempts.push(Box::pin(native_cpu(&mut self.system)));
        }
        first_success("cpu", attempts).await
    }

    async fn memory_usage(&mut self) -> Result<(f64, UsageBytes), String> {
        let limit = self.command_timeout;
        let mut attempts: Vec<Attempt<'_, (f64, UsageBytes)>> = vec![shell(
            &self.runner,
            MEMORY_FREE.to_string(),
            limit,
            parse_free,
        )];
        if self.native_fallback {
            let system = &mut self.system;
            attempts.push(Box::pin(async move { native_memory(system) }));
        }
        first_success("memory", attempts).await
    }

    async fn disk_usage(&mut self) -> Result<(f64, Option<UsageBytes>), String> {
        let limit = self.command_timeout;
        let command = format!("df -P -B1 {}", shell_quote(&self.disk_mount));
        let mut attempts: Vec<Attempt<'_, (f64, Option<UsageBytes>)>> =
            vec![shell(&self.runner, command, limit, parse_df)];
        if self.native_fallback {
            let system = &mut self.system;
            let mount = self.disk_mount.as_str();
            attempts.push(Box::pin(async move { native_disk(system, mount) }));
        }
        first_success("disk", attempts).await
    }

    async fn load_average(&mut self) -> Result<LoadAverage, String> {
        let limit = self.command_timeout;
        let mut attempts: Vec<Attempt<'_, LoadAverage>> = vec![shell(
            &self.runner,
            LOAD_PROC.to_string(),
            limit,
            parse_loadavg,
        )];
        if self.native_fallback {
            let system = &self.system;
            attempts.push(Box::pin(async move { native_load(system) }));
        }
        first_success("load", attempts).await
    }

    async fn uptime_text(&mut self) -> Result<String, String> {
        let limit = self.command_timeout;
        let mut attempts: Vec<Attempt<'_, String>> = vec![
            shell(&self.runner, UPTIME_PRETTY.to_string(), limit, parse_pretty_uptime),
            shell(&self.runner, UPTIME_RAW.to_string(), limit, parse_raw_uptime),
        ];
        if self.native_fallback {
            let system = &self.system;
            attempts.push(Box::pin(async move { native_uptime(system) }));
        }
        first_success("uptime", attempts).await
    }
}

fn degraded(kind: MetricKind, err: String) -> Metric {
    warn!(metric = %kind, error = %err, "metric collection failed");
    Metric::failed(kind, err)
}

fn shell<'a, R, T>(
    runner: &'a R,
    command: String,
    limit: Duration,
    parse: fn(&str) -> Result<T, String>,
) -> Attempt<'a, T>
where
    R: CommandRunner,
    T: 'a,
{
    Box::pin(async move {
        let out = runner
            .run(&command, limit)
            .await
            .map_err(|err| err.to_string())?;
        parse(&out).map_err(|err| format!("`{command}`: {err}"))
    })
}

/// Awaits the attempts in order and returns the first success. The futures
/// are lazy, so later probes never run once one succeeds.
async fn first_success<T>(metric: &str, attempts: Vec<Attempt<'_, T>>) -> Result<T, String> {
    let mut failures = Vec::with_capacity(attempts.len());
    for attempt in attempts {
        match attempt.await {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(metric, error = %err, "probe failed, trying next");
                failures.push(err);
            }
        }
    }
    if failures.is_empty() {
        return Err("no probes configured".to_string());
    }
    Err(failures.join("; "))
}

/// Accepts an optional leading `-` and at most one `.`; everything else must
/// be ASCII digits, and something must be left.
pub fn is_numeric(input: &str) -> bool {
    let unsigned = input.strip_prefix('-').unwrap_or(input);
    let digits = unsigned.replacen('.', "", 1);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_number(token: &str) -> Result<f64, String> {
    if !is_numeric(token) {
        return Err(format!("'{token}' is not a number"));
    }
    token
        .parse::<f64>()
        .map_err(|err| format!("'{token}': {err}"))
}

pub(crate) fn parse_percent(out: &str) -> Result<f64, String> {
    parse_number(out.trim())
}

pub(crate) fn parse_free(out: &str) -> Result<(f64, UsageBytes), String> {
    let row = out
        .lines()
        .find(|line| line.trim_start().starts_with("Mem:"))
        .ok_or_else(|| "no Mem: row".to_string())?;
    let mut fields = row.split_whitespace().skip(1);
    let total = parse_bytes(fields.next())?;
    let used = parse_bytes(fields.next())?;
    if total == 0 {
        return Err("total memory is zero".to_string());
    }
    let usage = UsageBytes {
        used_bytes: used,
        total_bytes: total,
    };
    Ok((percent(used, total), usage))
}

pub(crate) fn parse_df(out: &str) -> Result<(f64, Option<UsageBytes>), String> {
    let row = out
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| "empty df output".to_string())?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    let capacity = fields
        .get(4)
        .ok_or_else(|| format!("unexpected df row '{row}'"))?;
    let value = capacity
        .strip_suffix('%')
        .ok_or_else(|| format!("capacity '{capacity}' has no trailing %"))?;
    let pct = parse_number(value)?;

    let usage = match (parse_bytes(fields.get(1).copied()), parse_bytes(fields.get(2).copied())) {
        (Ok(total), Ok(used)) if total > 0 => Some(UsageBytes {
            used_bytes: used,
            total_bytes: total,
        }),
        _ => None,
    };
    Ok((pct, usage))
}

pub(crate) fn parse_loadavg(out: &str) -> Result<LoadAverage, String> {
    let mut tokens = out.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(one), Some(five), Some(fifteen)) => Ok(LoadAverage {
            one: one.to_string(),
            five: five.to_string(),
            fifteen: fifteen.to_string(),
        }),
        _ => Err(format!("expected three load tokens, got '{}'", out.trim())),
    }
}

pub(crate) fn parse_pretty_uptime(out: &str) -> Result<String, String> {
    let text = out.trim();
    if text.is_empty() {
        return Err("empty output".to_string());
    }
    Ok(text.to_string())
}

/// `10:02:11 up 3 days,  4:05,  1 user, ...` keeps the 3rd and 4th tokens.
pub(crate) fn parse_raw_uptime(out: &str) -> Result<String, String> {
    let tokens: Vec<&str> = out.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err(format!("unexpected uptime output '{}'", out.trim()));
    }
    let text = format!("{} {}", tokens[2], tokens[3]);
    Ok(text.trim_end_matches(',').to_string())
}

fn parse_bytes(token: Option<&str>) -> Result<u64, String> {
    let token = token.ok_or_else(|| "missing field".to_string())?;
    token
        .parse::<u64>()
        .map_err(|err| format!("'{token}': {err}"))
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

async fn native_cpu(system: &mut System) -> Result<f64, String> {
    system.refresh_cpu();
    tokio::time::sleep(System::MINIMUM_CPU_UPDATE_INTERVAL).await;
    system.refresh_cpu();
    if system.cpus().is_empty() {
        return Err("sysinfo: no cpus reported".to_string());
    }
    let usage = system.global_cpu_info().cpu_usage() as f64;
    if !usage.is_finite() {
        return Err("sysinfo: cpu usage is not finite".to_string());
    }
    Ok(usage)
}

fn native_memory(system: &mut System) -> Result<(f64, UsageBytes), String> {
    system.refresh_memory();
    let total = system.total_memory();
    let used = system.used_memory();
    if total == 0 {
        return Err("sysinfo: total memory is zero".to_string());
    }
    let usage = UsageBytes {
        used_bytes: used,
        total_bytes: total,
    };
    Ok((percent(used, total), usage))
}

fn native_disk(system: &mut System, mount: &str) -> Result<(f64, Option<UsageBytes>), String> {
    system.refresh_disks_list();
    let disk = system
        .disks()
        .iter()
        .find(|d| d.mount_point() == Path::new(mount))
        .ok_or_else(|| format!("sysinfo: no disk mounted at {mount}"))?;
    let total = disk.total_space();
    if total == 0 {
        return Err(format!("sysinfo: disk at {mount} reports zero size"));
    }
    let used = total.saturating_sub(disk.available_space());
    let usage = UsageBytes {
        used_bytes: used,
        total_bytes: total,
    };
    Ok((percent(used, total), Some(usage)))
}

fn native_load(system: &System) -> Result<LoadAverage, String> {
    let load = system.load_average();
    Ok(LoadAverage {
        one: format!("{:.2}", load.one),
        five: format!("{:.2}", load.five),
        fifteen: format!("{:.2}", load.fifteen),
    })
}

fn native_uptime(system: &System) -> Result<String, String> {
    let secs = system.uptime();
    if secs == 0 {
        return Err("sysinfo: uptime unavailable".to_string());
    }
    Ok(format_uptime(secs))
}

/// Whole minutes only, never below one.
pub(crate) fn format_uptime(secs: u64) -> String {
    let rounded = Duration::from_secs(secs - secs % 60).max(Duration::from_secs(60));
    format!("up {}", humantime::format_duration(rounded))
}
