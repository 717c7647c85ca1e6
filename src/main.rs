mod alerts;
mod collectors;
mod config;
mod credentials;
mod feishu;
mod notify;
mod pipeline;
mod report;
mod state;

use chrono::Local;
use clap::Parser;
use collectors::command::ShellRunner;
use collectors::system::MetricSource;
use config::Config;
use feishu::FeishuClient;
use notify::DeliveryOutcome;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostmon")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    /// Overrides feishu.credentials_path.
    #[arg(long)]
    credentials: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, conflicts_with = "notify_off")]
    notify_on: bool,
    #[arg(long, conflicts_with = "notify_on")]
    notify_off: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    if cli.notify_on {
        cfg.feishu.enabled = true;
    } else if cli.notify_off {
        cfg.feishu.enabled = false;
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }

    let credentials =
        credentials::resolve(&cfg.feishu, cli.credentials.as_deref().map(Path::new));

    info!(
        config = %cli.config,
        notify = cfg.feishu.enabled,
        mount = %cfg.collect.disk_mount,
        "starting hostmon run"
    );

    let mut source = MetricSource::new(ShellRunner, &cfg.collect);
    let sender = match FeishuClient::new(&cfg.feishu) {
        Ok(sender) => sender,
        Err(err) => {
            error!(error = %err, "failed to initialize feishu client");
            std::process::exit(1);
        }
    };
    let outcome = pipeline::run_once(
        &mut source,
        &sender,
        &cfg,
        credentials.as_ref(),
        Local::now(),
    )
    .await;

    println!("{}", outcome.report);

    match &outcome.delivery {
        DeliveryOutcome::Failed(err) => {
            warn!(error = %err, "report printed but not delivered")
        }
        other => info!(delivery = %other, alerts = outcome.alerts.len(), "run finished"),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
