//! Prometheus exporter for unused

use clap::Parser;
use std::path::PathBuf;

use unused::{Config, ProvidersConfig};

#[derive(Parser)]
#[command(name = "unused-exporter")]
#[command(about = "Export unused disk counts across AWS, Azure and GCP as Prometheus metrics", long_about = None)]
#[command(version)]
struct Cli {
    /// GCP project to inventory (repeatable)
    #[arg(long = "gcp.project", value_name = "PROJECT")]
    gcp_projects: Vec<String>,

    /// AWS CLI profile to inventory (repeatable)
    #[arg(long = "aws.profile", value_name = "PROFILE")]
    aws_profiles: Vec<String>,

    /// Azure subscription to inventory (repeatable)
    #[arg(long = "azure.sub", value_name = "SUBSCRIPTION")]
    azure_subscriptions: Vec<String>,

    /// Address to listen on [default: 0.0.0.0:8080]
    #[arg(long = "web.address", value_name = "ADDR")]
    address: Option<String>,

    /// Path serving the metrics [default: /metrics]
    #[arg(long = "metrics.path", value_name = "PATH")]
    metrics_path: Option<String>,

    /// Seconds between polls [default: 300]
    #[arg(long = "collect.interval", value_name = "SECS")]
    interval_secs: Option<u64>,

    /// Deadline for one provider poll in seconds [default: 60]
    #[arg(long = "collect.timeout", value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Config file (default: ~/.config/unused/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    fn config(self) -> unused::Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        config.providers.merge(ProvidersConfig {
            gcp_projects: self.gcp_projects,
            aws_profiles: self.aws_profiles,
            azure_subscriptions: self.azure_subscriptions,
        });

        let exporter = &mut config.exporter;
        if let Some(address) = self.address {
            exporter.address = address;
        }
        if let Some(path) = self.metrics_path {
            exporter.metrics_path = path;
        }
        if let Some(secs) = self.interval_secs {
            exporter.interval_secs = secs;
        }
        if let Some(secs) = self.timeout_secs {
            exporter.timeout_secs = secs;
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> unused::Result<()> {
    let config = cli.config()?;
    let providers = unused::create_providers(&config.providers).await?;
    log::info!(
        "exporting {} providers every {}s",
        providers.len(),
        config.exporter.interval_secs
    );
    unused::exporter::serve(providers, &config.exporter).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
