use crate::alerts::evaluate;
use crate::collectors::command::CommandRunner;
use crate::collectors::system::MetricSource;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::notify::{maybe_send, DeliveryOutcome, MessageSender, SendPolicy};
use crate::report::format_report;
use crate::state::{ResourceAlert, Snapshot};
use chrono::{DateTime, Local};
use tracing::info;

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: Snapshot,
    pub alerts: Vec<ResourceAlert>,
    pub report: String,
    pub delivery: DeliveryOutcome,
}

/// One monitoring pass: collect, evaluate, format, then hand the report to
/// the sender when the send policy allows it.
pub async fn run_once<R, S>(
    source: &mut MetricSource<R>,
    sender: &S,
    cfg: &Config,
    credentials: Option<&Credentials>,
    now: DateTime<Local>,
) -> RunOutcome
where
    R: CommandRunner,
    S: MessageSender,
{
    let snapshot = source.collect().await;
    let alerts = evaluate(&snapshot, &cfg.thresholds);
    info!(
        cpu = snapshot.cpu.effective_value(),
        memory = snapshot.memory.effective_value(),
        disk = snapshot.disk.effective_value(),
        alerts = alerts.len(),
        captured_at = %snapshot.captured_at.format("%H:%M:%S"),
        "metrics collected"
    );

    let report = format_report(&snapshot, &alerts, now, &cfg.thresholds, &cfg.report);
    let delivery = maybe_send(
        sender,
        &report,
        &alerts,
        now,
        credentials,
        SendPolicy::from(&cfg.feishu),
    )
    .await;

    RunOutcome {
        snapshot,
        alerts,
        report,
        delivery,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::CommandError;
    use crate::notify::tests::{creds, FakeSender};
    use crate::state::MetricKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    /// Stands in for the shell: answers by command prefix.
    struct ScriptedHost {
        outputs: Vec<(&'static str, String)>,
    }

    impl ScriptedHost {
        fn new(cpu: &str, mem_used: &str, disk_pct: &str) -> Self {
            let outputs = vec![
                ("top", cpu.to_string()),
                (
                    "free",
                    format!("              total   used\nMem:   1000   {mem_used}\n"),
                ),
                (
                    "df",
                    format!(
                        "Filesystem 1-blocks Used Available Capacity Mounted on\n/dev/root 100 50 50 {disk_pct} /\n"
                    ),
                ),
                ("cat /proc/loadavg", "0.10 0.20 0.30 1/100 42".to_string()),
                ("uptime -p", "up 1 day".to_string()),
            ];
            Self { outputs }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedHost {
        async fn run(&self, command: &str, _limit: Duration) -> Result<String, CommandError> {
            self.outputs
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix))
                .map(|(_, out)| out.clone())
                .ok_or_else(|| CommandError::Exit {
                    command: command.to_string(),
                    code: 127,
                    stderr: "not found".to_string(),
                })
        }
    }

    fn cfg() -> Config {
        let mut cfg = Config::default();
        cfg.collect.native_fallback = false;
        cfg.feishu.enabled = true;
        cfg.feishu.receive_id = "oc_chat".to_string();
        cfg
    }

    fn at_minute(minute: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 3, 14, 10, minute, 0)
            .single()
            .expect("valid local time")
    }

    #[tokio::test]
    async fn healthy_host_reports_normal_status() {
        let cfg = cfg();
        let mut source = MetricSource::new(ScriptedHost::new("45.0", "600", "55%"), &cfg.collect);
        let sender = FakeSender::default();

        let outcome = run_once(&mut source, &sender, &cfg, Some(&creds()), at_minute(30)).await;

        assert!(outcome.alerts.is_empty());
        assert!(outcome.report.contains("状态正常"));
        assert!(outcome.report.contains("CPU: 45.0%"));
        assert!(outcome.report.contains("内存: 60.0%"));
        assert!(outcome.report.contains("磁盘: 55.0%"));
        assert_eq!(outcome.delivery, DeliveryOutcome::Skipped);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn cpu_alert_is_delivered_mid_hour() {
        let cfg = cfg();
        let mut source = MetricSource::new(ScriptedHost::new("92.3", "600", "55%"), &cfg.collect);
        let sender = FakeSender::default();

        let outcome = run_once(&mut source, &sender, &cfg, Some(&creds()), at_minute(37)).await;

        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].kind, MetricKind::Cpu);
        assert!(outcome.alerts[0].text.contains("92.3%"));
        assert!(outcome.alerts[0].text.contains("80%"));
        assert_eq!(outcome.delivery, DeliveryOutcome::Sent);
        assert_eq!(sender.sent(), vec![outcome.report.clone()]);
    }

    #[tokio::test]
    async fn failed_cpu_probe_never_alerts() {
        let cfg = cfg();
        // both cpu probes return garbage; a bogus 200 never reaches evaluation
        let mut source = MetricSource::new(ScriptedHost::new("200%", "600", "55%"), &cfg.collect);
        let sender = FakeSender::default();

        let outcome = run_once(&mut source, &sender, &cfg, Some(&creds()), at_minute(30)).await;

        assert!(outcome.snapshot.cpu.is_failed());
        assert!(outcome.alerts.is_empty());
        assert!(outcome.report.contains("采集失败"));
    }

    #[tokio::test]
    async fn missing_credentials_still_produce_a_report() {
        let cfg = cfg();
        let mut source = MetricSource::new(ScriptedHost::new("92.3", "950", "95%"), &cfg.collect);
        let sender = FakeSender::default();

        let outcome = run_once(&mut source, &sender, &cfg, None, at_minute(1)).await;

        assert_eq!(outcome.delivery, DeliveryOutcome::NotConfigured);
        assert_eq!(outcome.alerts.len(), 3);
        assert!(outcome.report.contains("告警"));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn default_config_without_credentials_is_not_configured() {
        let cfg = Config::default();
        let mut source = MetricSource::new(ScriptedHost::new("45.0", "600", "55%"), &cfg.collect);
        let sender = FakeSender::default();

        let outcome = run_once(&mut source, &sender, &cfg, None, at_minute(2)).await;

        assert_eq!(outcome.delivery, DeliveryOutcome::NotConfigured);
        assert!(outcome.report.contains("状态正常"));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_does_not_lose_the_report() {
        let cfg = cfg();
        let mut source = MetricSource::new(ScriptedHost::new("10", "100", "10%"), &cfg.collect);
        let sender = FakeSender {
            fail_with: Some("HTTP 503".to_string()),
            ..FakeSender::default()
        };

        let outcome = run_once(&mut source, &sender, &cfg, Some(&creds()), at_minute(0)).await;

        assert_eq!(outcome.delivery, DeliveryOutcome::Failed("HTTP 503".to_string()));
        assert!(outcome.report.contains("状态正常"));
    }
}
