//! CLI tool for unused

use clap::Parser;
use std::path::PathBuf;

use unused::output::{self, OutputFormat, OutputOptions};
use unused::tui::{self, ViewOptions};
use unused::{Config, Filter, ProvidersConfig, SortKey};

#[derive(Parser)]
#[command(name = "unused")]
#[command(about = "List unattached block-storage disks across AWS, Azure and GCP", long_about = None)]
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

    /// Browse and delete disks interactively
    #[arg(short, long)]
    interactive: bool,

    /// Show all metadata in a META column
    #[arg(short, long)]
    verbose: bool,

    /// Only show disks whose metadata has KEY set to VALUE
    #[arg(long, value_name = "KEY=VALUE")]
    filter: Option<Filter>,

    /// Show a metadata key as its own column (repeatable)
    #[arg(long = "add-column", value_name = "NAME")]
    add_columns: Vec<String>,

    /// Print total size per value of this metadata key
    #[arg(long, value_name = "KEY")]
    group_by: Option<String>,

    /// Print CSV instead of a table
    #[arg(long)]
    csv: bool,

    /// Sort by provider, name or created
    #[arg(long)]
    sort: Option<SortKey>,

    /// Config file (default: ~/.config/unused/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Config file settings with the command line layered on top
    fn config(&self) -> unused::Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        config.providers.merge(ProvidersConfig {
            gcp_projects: self.gcp_projects.clone(),
            aws_profiles: self.aws_profiles.clone(),
            azure_subscriptions: self.azure_subscriptions.clone(),
        });
        config.output.verbose |= self.verbose;
        config.output.extra_columns.extend(self.add_columns.iter().cloned());
        if let Some(sort) = self.sort {
            config.output.sort = sort;
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> unused::Result<()> {
    let config = cli.config()?;
    let providers = unused::create_providers(&config.providers).await?;

    if cli.interactive {
        let options = ViewOptions {
            filter: cli.filter,
            sort: config.output.sort,
            extra_columns: config.output.extra_columns,
            verbose: config.output.verbose,
        };
        return tui::run(providers, options).await;
    }

    let mut disks = unused::list_all(&providers).await?;
    if let Some(filter) = &cli.filter {
        disks = disks.filter(|d| filter.matches(d.as_ref()));
    }
    disks.sort(config.output.sort);

    let options = OutputOptions {
        format: if cli.csv {
            OutputFormat::Csv
        } else {
            OutputFormat::Table
        },
        verbose: config.output.verbose,
        extra_columns: config.output.extra_columns,
        group_by: cli.group_by,
    };
    let rendered = output::render(&disks, &options, chrono::Utc::now());
    if rendered.ends_with('\n') {
        print!("{}", rendered);
    } else {
        println!("{}", rendered);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
