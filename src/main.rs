use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use employee_etl::app::ports::{PublishPort, SourcePort};
use employee_etl::config::{Config, SourceKind};
use employee_etl::infra::demo_seed::seed_demo_database;
use employee_etl::infra::{FilePublishAdapter, InMemoryPublisher, NdjsonSourceAdapter, SqliteSourceAdapter};
use employee_etl::logging;
use employee_etl::observability::{init_metrics, write_snapshot};
use employee_etl::pipeline::{PipelineOrchestrator, StageSelector};

#[derive(Parser)]
#[command(name = "employee_etl")]
#[command(about = "Bronze/silver/gold ETL for employee records")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to ./pipeline.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: extract, clean, aggregate
    Run {
        /// Keep only records whose CurrentFlag is set
        #[arg(long)]
        active_only: bool,
        /// Keep published datasets in memory instead of writing files
        #[arg(long)]
        dry_run: bool,
    },
    /// Extract source tables into the bronze layer
    Extract,
    /// Clean the latest bronze employees into the silver layer
    Transform {
        #[arg(long)]
        active_only: bool,
    },
    /// Build the gold views from the latest silver employees
    Load,
    /// Test the connection to the configured source
    CheckSource,
    /// Write a synthetic SQLite source database
    SeedDemo {
        /// Output database (defaults to the configured source path)
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long, default_value_t = 290)]
        employees: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn build_source(config: &Config) -> Arc<dyn SourcePort> {
    match config.source.kind {
        SourceKind::Sqlite => Arc::new(SqliteSourceAdapter::new(&config.source.path)),
        SourceKind::Ndjson => Arc::new(NdjsonSourceAdapter::new(&config.source.path)),
    }
}

fn build_publisher(config: &Config, dry_run: bool) -> Arc<dyn PublishPort> {
    if dry_run {
        info!("Dry run: datasets stay in memory");
        Arc::new(InMemoryPublisher::new())
    } else {
        Arc::new(
            FilePublishAdapter::new(&config.storage.data_root)
                .with_history(config.storage.retain_history),
        )
    }
}

async fn run_pipeline(
    mut config: Config,
    selector: StageSelector,
    active_only: bool,
    dry_run: bool,
) -> anyhow::Result<ExitCode> {
    if active_only {
        config.cleaning.active_only = true;
    }

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let orchestrator = PipelineOrchestrator::new(build_source(&config), build_publisher(&config, dry_run))
        .with_rules(config.cleaning_rules());
    let ctx = orchestrator.run_stage(selector).await;

    println!("\n📊 Pipeline summary");
    print!("{}", ctx);

    if let (Some(handle), false) = (metrics.as_ref(), dry_run) {
        if let Err(e) = write_snapshot(handle, &config.metrics_snapshot_path()) {
            warn!("Could not write metrics snapshot: {}", e);
        }
    }

    Ok(if ctx.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let _guard = logging::init_logging(&config.logging);

    match cli.command {
        Commands::Run {
            active_only,
            dry_run,
        } => run_pipeline(config, StageSelector::All, active_only, dry_run).await,
        Commands::Extract => run_pipeline(config, StageSelector::Extract, false, false).await,
        Commands::Transform { active_only } => {
            run_pipeline(config, StageSelector::Transform, active_only, false).await
        }
        Commands::Load => run_pipeline(config, StageSelector::Load, false, false).await,
        Commands::CheckSource => {
            println!("🔌 Testing connection to {}...", config.source.path.display());
            match build_source(&config).ping().await {
                Ok(info) => {
                    println!("✅ Connected to {} source at {}", info.kind, info.location);
                    println!("   {}", info.detail);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!("Connection test failed: {}", e);
                    println!("❌ Connection failed: {}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::SeedDemo {
            path,
            employees,
            seed,
        } => {
            let path = path.unwrap_or_else(|| config.source.path.clone());
            let summary = seed_demo_database(&path, employees, seed)?;
            println!(
                "🌱 Wrote {} employee rows and {} department groups to {}",
                summary.employee_rows,
                summary.department_groups,
                path.display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
