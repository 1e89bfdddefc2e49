use anyhow::Context;
use clap::{Parser, Subcommand};
use feed_ingest::config::{LogFormat, LoggingSection};
use feed_ingest::{
    ArticleStore, CancelSignal, HttpFetcher, IngestConfig, Orchestrator, PgArticleStore, RateLimiter, RunType,
    SweepOptions, SweepReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feed-ingest", about = "Scrape tracked feeds and store new articles")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one sweep over all active sources
    Sweep {
        #[arg(long, default_value = "manual")]
        run_type: RunType,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Run scheduled sweeps on a fixed interval until Ctrl-C
    Schedule {
        /// Seconds between sweep starts
        #[arg(long)]
        every: Option<u64>,
    },
    /// Apply database migrations
    Migrate,
    /// List active sources
    Sources,
}

fn init_tracing(logging: &LoggingSection) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn redact(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => database_url.to_string(),
    }
}

fn log_report(report: &SweepReport) {
    for outcome in report.outcomes.iter().filter(|o| o.error.is_some()) {
        error!(
            source = %outcome.source_name,
            error = outcome.error.as_deref().unwrap_or_default(),
            "Source failed"
        );
    }
}

async fn schedule(orchestrator: &Orchestrator, options: SweepOptions, every: Duration) -> anyhow::Result<()> {
    let cancel = CancelSignal::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Scheduling sweeps every {:?}", every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        let sweep = orchestrator.run_sweep_until(&options, &cancel);
        tokio::pin!(sweep);

        let finished = tokio::select! {
            result = &mut sweep => Some(result),
            _ = &mut shutdown => None,
        };

        let (result, stop) = match finished {
            Some(result) => (result, false),
            None => {
                info!("Shutdown requested, stopping after the current source");
                cancel.cancel();
                (sweep.await, true)
            }
        };

        match result {
            Ok(report) => log_report(&report),
            Err(e) => error!(error = %e, "Sweep aborted"),
        }

        if stop {
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = IngestConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging);

    info!("Connecting to database: {}", redact(&config.database.url));
    let store = PgArticleStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("connecting to database")?;

    match cli.command {
        Command::Migrate => {
            store.migrate().await.context("running migrations")?;
        }
        Command::Sources => {
            let sources = store.list_active_sources().await.context("listing sources")?;
            for source in sources {
                println!("{}\t{}\t{}", source.id, source.name, source.feed_url);
            }
        }
        Command::Sweep { run_type, concurrency } => {
            let orchestrator = build_orchestrator(&config, store)?;
            let mut options = config.sweep_options(run_type);
            if let Some(concurrency) = concurrency {
                options.concurrency = concurrency.max(1);
            }

            let report = orchestrator.run_sweep(&options).await.context("sweep failed")?;
            log_report(&report);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Schedule { every } => {
            let orchestrator = build_orchestrator(&config, store)?;
            let every = Duration::from_secs(every.unwrap_or(config.sweep.interval_seconds).max(1));
            schedule(&orchestrator, config.sweep_options(RunType::Scheduled), every).await?;
        }
    }

    Ok(())
}

fn build_orchestrator(config: &IngestConfig, store: PgArticleStore) -> anyhow::Result<Orchestrator> {
    let fetcher = HttpFetcher::new(config.fetch_config())?;
    Ok(Orchestrator::new(
        Arc::new(store),
        Arc::new(fetcher),
        Arc::new(RateLimiter::new(config.pacing())),
    ))
}
