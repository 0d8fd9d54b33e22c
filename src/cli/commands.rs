//! CLI command definitions for trendpulse.
//!
//! Thin adapters over the library: every command loads `PipelineConfig` from
//! the environment, connects to Redis, and drives one library operation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::{info, warn};

use crate::clients::{FilePostSource, LiteLlmClient, LlmAnalysisClient};
use crate::config::PipelineConfig;
use crate::metrics::{export_metrics, init_metrics};
use crate::queue::{
    MessageHandler, QueueConsumer, QueueKind, QueueMessage, QueueProducer, QueueStore,
    RedisQueueStore,
};
use crate::stages::{AnalysisStage, GenerationStage, RedisStageStore};
use crate::trends::{RedisTrendStore, Trend, TrendPipeline, TrendStore};
use crate::worker::{PoolStats, WorkerPool};

/// Queue substrate and trend pipeline for social-media trend detection.
#[derive(Parser)]
#[command(name = "trendpulse")]
#[command(about = "Detect trending topics and drive them through the analysis pipeline")]
#[command(version)]
#[command(
    long_about = "trendpulse scores raw post batches for trending topics, stores the trends and \
                  queues them for AI analysis, content generation and publication.\n\n\
                  Settings come from TRENDPULSE_* environment variables.\n\n\
                  Example usage:\n  trendpulse analyze --batch reddit/tech/2024-05-01.json --subreddit tech\n  \
                  trendpulse worker --queue ai:analysis:queue --workers 2"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one analysis pass over a raw post batch.
    Analyze(AnalyzeArgs),

    /// Run stage workers against one queue until Ctrl-C.
    Worker(WorkerArgs),

    /// Show live, scheduled and dead-letter depth of the queues.
    Depth(DepthArgs),

    /// Inspect or redrive a dead letter queue.
    Dlq(DlqArgs),

    /// List stored trends by descending score.
    Trends(TrendsArgs),
}

/// Arguments for `trendpulse analyze`.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Batch reference, relative to TRENDPULSE_RAW_DATA_DIR.
    #[arg(short, long)]
    pub batch: String,

    /// Subreddit the batch was fetched from.
    #[arg(short, long)]
    pub subreddit: String,

    /// Print the detected trends as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `trendpulse worker`.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Queue to consume (ai:analysis:queue or post:generate:queue).
    #[arg(short, long)]
    pub queue: String,

    /// Number of concurrent workers.
    #[arg(short, long, default_value = "1")]
    pub workers: usize,

    /// Print Prometheus metrics on shutdown.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `trendpulse depth`.
#[derive(Parser, Debug)]
pub struct DepthArgs {
    /// Queue to inspect; every queue when omitted.
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `trendpulse dlq`.
#[derive(Parser, Debug)]
pub struct DlqArgs {
    /// Queue whose dead letters to inspect.
    #[arg(short, long)]
    pub queue: String,

    /// Maximum number of dead letters to show or redrive.
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Move the dead letters back to the live queue with a fresh retry budget.
    #[arg(long)]
    pub redrive: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `trendpulse trends`.
#[derive(Parser, Debug)]
pub struct TrendsArgs {
    /// Only trends of this subreddit.
    #[arg(short, long)]
    pub subreddit: Option<String>,

    /// Maximum number of trends.
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Analyze(args) => run_analyze_command(&config, args).await,
        Commands::Worker(args) => run_worker_command(&config, args).await,
        Commands::Depth(args) => run_depth_command(&config, args).await,
        Commands::Dlq(args) => run_dlq_command(&config, args).await,
        Commands::Trends(args) => run_trends_command(&config, args).await,
    }
}

/// Shared Redis handles of one command invocation.
struct Backend {
    connection: ConnectionManager,
    queues: Arc<dyn QueueStore>,
}

impl Backend {
    async fn connect(config: &PipelineConfig) -> anyhow::Result<Self> {
        let store = RedisQueueStore::connect(&config.redis_url)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;
        Ok(Self {
            connection: store.connection(),
            queues: Arc::new(store),
        })
    }

    fn producer(&self, config: &PipelineConfig) -> Arc<QueueProducer> {
        Arc::new(QueueProducer::new(Arc::clone(&self.queues)).with_retry_policy(config.publish_retry()))
    }

    fn consumer(&self, config: &PipelineConfig) -> QueueConsumer {
        QueueConsumer::new(Arc::clone(&self.queues))
            .with_max_retries(config.max_retries)
            .with_pop_timeout(config.pop_timeout)
    }
}

fn parse_queue(name: &str) -> anyhow::Result<QueueKind> {
    name.parse::<QueueKind>().map_err(|e| {
        let known: Vec<&str> = QueueKind::ALL.iter().map(|q| q.as_str()).collect();
        anyhow::anyhow!("{}. Known queues: {}", e, known.join(", "))
    })
}

#[derive(Debug, Serialize)]
struct AnalyzeOutput<'a> {
    batch: &'a str,
    subreddit: &'a str,
    trends: &'a [Trend],
}

async fn run_analyze_command(config: &PipelineConfig, args: AnalyzeArgs) -> anyhow::Result<()> {
    let backend = Backend::connect(config).await?;
    let pipeline = TrendPipeline::from_config(
        config,
        Arc::new(FilePostSource::new(&config.raw_data_dir)),
        Arc::new(RedisTrendStore::new(backend.connection.clone())),
        backend.producer(config),
    );

    let trends = pipeline
        .run_analysis_pass(&args.batch, &args.subreddit)
        .await;

    if args.json {
        let output = AnalyzeOutput {
            batch: &args.batch,
            subreddit: &args.subreddit,
            trends: &trends,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if trends.is_empty() {
        println!("No trends detected in {}", args.batch);
        return Ok(());
    }

    println!("Detected {} trend(s) in r/{}:", trends.len(), args.subreddit.trim_start_matches("r/"));
    for trend in &trends {
        println!(
            "  {:<24} score {:>9.2}  velocity {:>6.2}/h  posts {:>3}",
            trend.topic, trend.trend_score, trend.velocity, trend.post_count
        );
    }
    Ok(())
}

fn build_handler(
    config: &PipelineConfig,
    backend: &Backend,
    queue: QueueKind,
) -> anyhow::Result<Arc<dyn MessageHandler>> {
    let stage_store = Arc::new(RedisStageStore::new(backend.connection.clone()));
    let producer = backend.producer(config);

    match queue {
        QueueKind::AiAnalysis | QueueKind::PostGeneration => {
            let provider = LiteLlmClient::from_env()
                .context("Failed to initialize LLM client. Set LLM_API_BASE (and LLM_API_KEY if required)")?;
            let client = Arc::new(LlmAnalysisClient::new(Arc::new(provider)));

            if queue == QueueKind::AiAnalysis {
                let source = Arc::new(FilePostSource::new(&config.raw_data_dir));
                return Ok(Arc::new(AnalysisStage::new(source, client, stage_store, producer)));
            }

            let mut stage = GenerationStage::new(client, stage_store, producer);
            if config.auto_publish {
                stage = stage.with_auto_publish(config.publish_credentials_ref.clone());
            }
            Ok(Arc::new(stage))
        }
        QueueKind::PostPublish => Err(anyhow::anyhow!(
            "No publish client is available for {}; drafts stay queued until one is configured",
            queue
        )),
    }
}

async fn run_worker_command(config: &PipelineConfig, args: WorkerArgs) -> anyhow::Result<()> {
    let queue = parse_queue(&args.queue)?;
    if args.metrics {
        init_metrics().context("Failed to initialize metrics")?;
    }

    let backend = Backend::connect(config).await?;
    let handler = build_handler(config, &backend, queue)?;

    let mut pool = WorkerPool::new(
        queue,
        args.workers,
        backend.consumer(config),
        handler,
        config.worker_config(),
    );
    pool.start()?;
    info!(queue = %queue, workers = pool.num_workers(), "Workers running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    if let Err(e) = pool.shutdown().await {
        warn!(error = %e, "Worker pool did not shut down cleanly");
    }

    let stats = pool.stats();
    info!(
        processed = stats.processed,
        retried = stats.retried,
        dead_lettered = stats.dead_lettered,
        rejected = stats.rejected,
        success_rate = %format_success_rate(&stats),
        "Worker pool stopped"
    );

    if args.metrics {
        print!("{}", export_metrics());
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct DepthEntry {
    queue: &'static str,
    live: usize,
    scheduled: usize,
    dead_letters: usize,
}

async fn run_depth_command(config: &PipelineConfig, args: DepthArgs) -> anyhow::Result<()> {
    let queues = match args.queue.as_deref() {
        Some(name) => vec![parse_queue(name)?],
        None => QueueKind::ALL.to_vec(),
    };

    let backend = Backend::connect(config).await?;
    let consumer = backend.consumer(config);

    let mut entries = Vec::with_capacity(queues.len());
    for queue in queues {
        entries.push(DepthEntry {
            queue: queue.as_str(),
            live: consumer.queue_depth(queue).await?,
            scheduled: consumer.scheduled_depth(queue).await?,
            dead_letters: consumer.dead_letter_depth(queue).await?,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{:<22} {:>8} {:>10} {:>8}", "QUEUE", "LIVE", "SCHEDULED", "DLQ");
    for entry in entries {
        println!(
            "{:<22} {:>8} {:>10} {:>8}",
            entry.queue, entry.live, entry.scheduled, entry.dead_letters
        );
    }
    Ok(())
}

async fn run_dlq_command(config: &PipelineConfig, args: DlqArgs) -> anyhow::Result<()> {
    let queue = parse_queue(&args.queue)?;
    let backend = Backend::connect(config).await?;
    let consumer = backend.consumer(config);

    if args.redrive {
        let moved = consumer.redrive_dead_letters(queue, args.limit).await?;
        info!(queue = %queue, redriven = moved, "Redrove dead letters");
        if args.json {
            println!("{}", serde_json::json!({ "queue": queue.as_str(), "redriven": moved }));
        } else {
            println!("Moved {} dead letter(s) back to {}", moved, queue);
        }
        return Ok(());
    }

    let total = consumer.dead_letter_depth(queue).await?;
    let letters: Vec<QueueMessage> = consumer.peek_dead_letters(queue, args.limit).await?;

    if args.json {
        let output = serde_json::json!({
            "queue": queue.as_str(),
            "total": total,
            "messages": letters,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} dead letter(s) in {}", total, queue.dead_letter_key());
    for letter in &letters {
        println!(
            "  {}  {:<16} retries {}  age {}  topic {}",
            letter.id,
            letter.payload.kind(),
            letter.retry_count,
            format_age(letter.age().to_std().unwrap_or_default()),
            letter.payload.topic().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn run_trends_command(config: &PipelineConfig, args: TrendsArgs) -> anyhow::Result<()> {
    let backend = Backend::connect(config).await?;
    let store = RedisTrendStore::new(backend.connection.clone());

    let mut trends = match args.subreddit.as_deref() {
        Some(subreddit) => store.by_subreddit(subreddit).await?,
        None => store.top_active(args.limit).await?,
    };
    trends.truncate(args.limit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&trends)?);
        return Ok(());
    }

    println!(
        "{:<24} {:<16} {:>9} {:>8} {:>6}  LAST UPDATED",
        "TOPIC", "SUBREDDIT", "SCORE", "VELOCITY", "POSTS"
    );
    for trend in trends {
        println!(
            "{:<24} {:<16} {:>9.2} {:>8.2} {:>6}  {}",
            trend.topic,
            trend.subreddit,
            trend.trend_score,
            trend.velocity,
            trend.post_count,
            trend.last_updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn format_success_rate(stats: &PoolStats) -> String {
    format!("{:.1}%", stats.success_rate())
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_worker_args() {
        let cli = Cli::try_parse_from([
            "trendpulse",
            "worker",
            "--queue",
            "ai:analysis:queue",
            "--workers",
            "4",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Worker(args) => {
                assert_eq!(args.queue, "ai:analysis:queue");
                assert_eq!(args.workers, 4);
                assert!(!args.metrics);
            }
            _ => panic!("expected worker command"),
        }
    }

    #[test]
    fn test_parse_dlq_defaults() {
        let cli = Cli::try_parse_from(["trendpulse", "dlq", "-q", "post:generate:queue"]).unwrap();
        match cli.command {
            Commands::Dlq(args) => {
                assert_eq!(args.limit, 10);
                assert!(!args.redrive);
            }
            _ => panic!("expected dlq command"),
        }
    }

    #[test]
    fn test_analyze_requires_batch() {
        assert!(Cli::try_parse_from(["trendpulse", "analyze", "--subreddit", "tech"]).is_err());
    }

    #[test]
    fn test_parse_queue() {
        assert_eq!(parse_queue("post:publish:queue").unwrap(), QueueKind::PostPublish);
        let err = parse_queue("emails").unwrap_err().to_string();
        assert!(err.contains("ai:analysis:queue"));
    }

    #[test]
    fn test_format_success_rate() {
        let stats = PoolStats {
            processed: 3,
            retried: 1,
            ..PoolStats::default()
        };
        assert_eq!(format_success_rate(&stats), "75.0%");
        assert_eq!(format_success_rate(&PoolStats::default()), "0.0%");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::from_secs(42)), "42s");
        assert_eq!(format_age(Duration::from_secs(600)), "10m");
        assert_eq!(format_age(Duration::from_secs(7200)), "2h");
        assert_eq!(format_age(Duration::from_secs(3 * 86_400)), "3d");
    }
}
