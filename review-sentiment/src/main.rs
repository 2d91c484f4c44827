use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use interfaces::SnapshotDocument;
use review_sentiment::{
    ChangeSignal, HttpClassifier, HttpIngestor, JsonFileRecordStore, PipelineBuilder, PipelineConfig,
    PipelineDriver, RecordStore, TrendBinner,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "review-sentiment")]
#[command(about = "Incremental sentiment labeling for product review pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label every review in a document snapshot once
    Run(PipelineArgs),

    /// Label reviews as the document snapshot changes on disk
    Watch {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// How often to check the snapshot for changes, in milliseconds
        #[arg(long, default_value = "1000")]
        poll_ms: u64,
    },

    /// Print the sentiment distribution and trend series of a record store
    Trends {
        /// JSON record store written by `run` or `watch`
        #[arg(short, long, default_value = "sentiment_results.json")]
        store: PathBuf,

        /// Records per bucket when no review has a usable date
        #[arg(long, default_value = "5")]
        bucket_size: usize,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// JSON document snapshot (page info plus review fragments)
    #[arg(short, long)]
    document: PathBuf,

    /// JSON record store, reset at start-up
    #[arg(short, long, default_value = "sentiment_results.json")]
    store: PathBuf,

    /// Base URL of the sentiment service
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Keep results local instead of forwarding them to `/ingest_results`
    #[arg(long)]
    no_ingest: bool,
}

impl PipelineArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env()?;
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        config.validate()?;
        Ok(config)
    }

    async fn build(&self, document: Arc<SnapshotDocument>) -> Result<PipelineDriver> {
        let config = self.config()?;
        let classifier = HttpClassifier::new(&config)?;
        info!("Using sentiment service at {}", classifier.endpoint());

        let mut builder = PipelineBuilder::new(config.clone())
            .document(document)
            .classifier(Arc::new(classifier))
            .store(Arc::new(JsonFileRecordStore::new(&self.store)));
        if !self.no_ingest {
            builder = builder.ingestor(Arc::new(HttpIngestor::new(&config)?));
        }
        Ok(builder.build().await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Watch { pipeline, poll_ms } => watch(pipeline, Duration::from_millis(poll_ms)).await,
        Commands::Trends { store, bucket_size } => trends(&store, bucket_size).await,
    }
}

async fn run(args: PipelineArgs) -> Result<()> {
    let document = Arc::new(
        SnapshotDocument::open(&args.document)
            .with_context(|| format!("opening document {}", args.document.display()))?,
    );
    let driver = args.build(document).await?;
    let summary = driver.run_once().await?;

    info!(
        "Labeled {} of {} discovered reviews ({} degraded)",
        summary.records, summary.discovered, summary.degraded
    );
    if let Some(outcome) = summary.sink {
        info!("Record store now holds {} results", outcome.total);
    }
    Ok(())
}

async fn watch(args: PipelineArgs, poll: Duration) -> Result<()> {
    let document = Arc::new(
        SnapshotDocument::open(&args.document)
            .with_context(|| format!("opening document {}", args.document.display()))?,
    );
    let driver = args.build(document.clone()).await?;

    let (tx, rx) = mpsc::channel(64);
    let path = args.document.clone();
    let poller = tokio::spawn(async move {
        let mut last_modified = modified_at(&path);
        let mut ticker = tokio::time::interval(poll.max(Duration::from_millis(10)));
        loop {
            ticker.tick().await;
            let modified = modified_at(&path);
            if modified == last_modified {
                continue;
            }
            last_modified = modified;

            match document.reload() {
                Ok(count) => info!("Document changed, {} fragments", count),
                Err(e) => {
                    warn!("Failed to reload {}: {}", path.display(), e);
                    continue;
                }
            }
            if tx.send(ChangeSignal).await.is_err() {
                break;
            }
        }
    });

    info!("Watching {} (ctrl-c to stop)", args.document.display());
    tokio::select! {
        _ = driver.watch(rx) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Stopping");
        }
    }
    poller.abort();

    let total = driver.store().load().await?.len();
    info!("Record store holds {} results", total);
    Ok(())
}

async fn trends(path: &Path, bucket_size: usize) -> Result<()> {
    let store = JsonFileRecordStore::new(path);
    let records = store.load().await?;
    let report = TrendBinner::new().with_batch_size(bucket_size).bin(&records);

    let output = serde_json::json!({
        "report": report,
        "series": report.series(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
