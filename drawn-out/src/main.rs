use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chesscom_extractor::{
    BrowserTab, ChessBrowser, ListingClient, default_client, install_rustls_provider,
};
use clap::{Parser, Subcommand};
use drawn_out::analysis::AnalysisRunner;
use drawn_out::config::AppConfig;
use drawn_out::database::models::JobStatus;
use drawn_out::database::repositories::Repositories;
use drawn_out::pipeline::{Pipeline, SessionPool, StopReason};
use drawn_out::{database, logging};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const LISTING_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Claim jobs and fetch every game of their tournaments
    Scrape,

    /// Summarize fetched games that have not been analyzed yet
    Analyze,

    /// Queue tournaments for scraping
    Enqueue {
        /// Tournament ids, as used in the live tournament URL
        #[arg(required = true)]
        tournament_ids: Vec<String>,
    },

    /// Show job and game progress
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::from_env()?;

    let _log_guard = logging::init_logging(config.log_dir.as_deref())?;
    if let Some(dir) = &config.log_dir {
        match logging::cleanup_old_logs(dir).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "removed old log files"),
            Err(e) => warn!(error = %e, "log cleanup failed"),
        }
    }

    let pool = database::init_pool(&config.db_uri)
        .await
        .with_context(|| format!("opening database {}", config.db_uri))?;
    database::run_migrations(&pool).await?;
    let repos = Repositories::from_pool(pool.clone());

    let result = match args.command {
        Commands::Scrape => scrape(&config, &repos).await,
        Commands::Analyze => analyze(&repos).await,
        Commands::Enqueue { tournament_ids } => enqueue(&repos, &tournament_ids).await,
        Commands::Status => status(&config, &repos).await,
    };

    pool.close().await;
    if let Err(e) = &result {
        error!(error = %e, "drawn-out failed");
    }
    result
}

async fn scrape(config: &AppConfig, repos: &Repositories) -> anyhow::Result<()> {
    install_rustls_provider();

    let browser = if config.debug {
        ChessBrowser::launch(&config.chess_host, config.browser.clone()).await?
    } else {
        ChessBrowser::connect(&config.browser_uri, &config.chess_host, config.browser.clone())
            .await?
    };
    let browser = Arc::new(browser.with_screenshot_dir(config.screenshot_path.clone()));

    let sessions = match SessionPool::open(browser.as_ref(), config.max_tabs).await {
        Ok(sessions) => sessions,
        Err(e) => {
            if let Err(close_err) = browser.shutdown().await {
                warn!(error = %close_err, "browser shutdown failed");
            }
            return Err(e.into());
        }
    };

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping pipeline");
            interrupt.cancel();
        }
    });

    let result = run_pipeline(config, repos, Arc::clone(&browser), sessions.clone(), token).await;

    sessions.shutdown(Arc::clone(&browser), POOL_DRAIN_TIMEOUT).await;
    if let Err(e) = browser.shutdown().await {
        warn!(error = %e, "browser shutdown failed");
    }

    result
}

async fn run_pipeline(
    config: &AppConfig,
    repos: &Repositories,
    browser: Arc<ChessBrowser>,
    sessions: SessionPool<BrowserTab>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let listings = ListingClient::new(default_client(LISTING_TIMEOUT)?, &config.chess_host)?;
    let pipeline = Pipeline::new(
        repos,
        Arc::new(listings),
        browser,
        sessions,
        config.pipeline.clone(),
    )?;

    let summary = pipeline.run(token).await?;
    match &summary.stop {
        StopReason::NoJobs => info!("no jobs left"),
        StopReason::Interrupted => warn!("pipeline interrupted"),
        StopReason::Stalled { tournament_id } => {
            warn!(%tournament_id, "stopped on a job that keeps failing; it stays pending")
        }
    }
    Ok(())
}

async fn analyze(repos: &Repositories) -> anyhow::Result<()> {
    let report = AnalysisRunner::new(repos.summaries.clone()).run().await?;
    println!(
        "analyzed {} games ({} unreadable); {} rook endgames out of {} summaries",
        report.inserted, report.failed, report.totals.rook_endgames, report.totals.analyzed
    );
    Ok(())
}

async fn enqueue(repos: &Repositories, tournament_ids: &[String]) -> anyhow::Result<()> {
    let added = repos.jobs.enqueue(tournament_ids).await?;
    info!(added, requested = tournament_ids.len(), "jobs enqueued");
    println!("{added} of {} tournaments queued", tournament_ids.len());
    Ok(())
}

async fn status(config: &AppConfig, repos: &Repositories) -> anyhow::Result<()> {
    let counts = repos.jobs.count_by_status().await?;
    println!(
        "jobs: {} not_asked, {} pending, {} complete",
        counts.not_asked, counts.pending, counts.complete
    );

    let max_retries = config.pipeline.max_retries;
    for job in repos.jobs.list_jobs_by_status(JobStatus::Pending).await? {
        let rounds = match repos.tournaments.rounds_fetched(&job.tournament_id).await {
            Ok(rounds) => rounds,
            Err(drawn_out::Error::NotFound { .. }) => 0,
            Err(e) => return Err(e.into()),
        };
        let games = repos.games.counts_for(&job.tournament_id, max_retries).await?;
        println!(
            "  {}: rounds {}/{}, games {} (success {}, not_asked {}, error {}, exhausted {})",
            job.tournament_id,
            rounds,
            config.pipeline.total_rounds,
            games.total(),
            games.success,
            games.not_asked,
            games.error,
            games.exhausted,
        );
    }
    Ok(())
}
