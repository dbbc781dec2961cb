use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use quarry_client::{ApiClient, ApiResolver, KeywordAnnotator};
use quarry_core::dedup::{DedupLedger, DedupSnapshot, FilterStats};
use quarry_core::models::{HarvestBatch, Resource, RunStamp};
use quarry_core::orchestrator::{CollectionOrchestrator, CollectionReport, TracingHarvestReporter};
use quarry_core::quota::{BudgetSnapshot, QuotaConfig, QuotaLedger, QuotaSummary};
use quarry_core::resume::ResumeBook;
use quarry_core::traits::{HarvestSink, IdentityResolver, SnapshotStore};
use quarry_core::views::{self, KeywordSegment, TopComment};
use quarry_core::{
    HarvestConfig, PriorityAllowList, ResourceEnumerator, RetryPolicy, RetryingCaller,
    ThreadHarvester,
};
use quarry_store::{HarvestFiles, JsonSnapshotStore, StoreConfig};

#[derive(Parser)]
#[command(name = "quarry", version, about = "Quota-budgeted comment harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Directory holding the budget, ledgers and harvest files
    #[arg(long, env = "QUARRY_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Daily budget in cost units
    #[arg(long, env = "QUARRY_DAILY_QUOTA", default_value_t = 10_000)]
    daily_quota: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest new comments from a set of channels
    Harvest {
        /// Channel ids, @handles, URLs or names to harvest
        #[arg(
            short,
            long = "channel",
            env = "QUARRY_CHANNELS",
            value_delimiter = ',',
            required = true
        )]
        channels: Vec<String>,

        /// Channels harvested to completion before everything else
        #[arg(short, long = "priority", env = "QUARRY_PRIORITY_CHANNELS", value_delimiter = ',')]
        priority: Vec<String>,

        /// API key (reads from QUARRY_API_KEY env var if not provided)
        #[arg(short, long, env = "QUARRY_API_KEY", hide_env_values = true)]
        api_key: String,

        #[command(flatten)]
        store: StoreArgs,

        /// Videos enumerated per channel
        #[arg(long, default_value_t = 150)]
        max_videos: usize,

        /// Balanced-phase rounds
        #[arg(long, default_value_t = 10)]
        max_rounds: u32,

        /// Top comments included in the summary
        #[arg(long, default_value_t = 20)]
        top: usize,
    },

    /// Show today's budget usage
    Quota {
        #[command(flatten)]
        store: StoreArgs,

        /// Videos per channel used for the affordability estimate
        #[arg(long, default_value_t = 50)]
        videos_per_channel: u64,
    },

    /// Inspect the deduplication ledger
    Ledger {
        #[command(flatten)]
        store: StoreArgs,

        /// Show the status of a single comment id
        #[arg(long)]
        item: Option<String>,

        /// Most re-observed ids to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("quarry=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            channels,
            priority,
            api_key,
            store,
            max_videos,
            max_rounds,
            top,
        } => {
            let config = HarvestConfig::default()
                .with_max_children(max_videos)
                .with_max_rounds(max_rounds);
            cmd_harvest(&channels, &priority, &api_key, &store, config, top).await?;
        }
        Commands::Quota {
            store,
            videos_per_channel,
        } => cmd_quota(&store, videos_per_channel)?,
        Commands::Ledger { store, item, top } => cmd_ledger(&store, item.as_deref(), top)?,
    }

    Ok(())
}

/// Every persisted handle a harvest run touches.
struct Stores {
    config: StoreConfig,
    budget: Arc<dyn SnapshotStore<BudgetSnapshot>>,
    history: Arc<dyn SnapshotStore<DedupSnapshot>>,
    resume: Arc<dyn SnapshotStore<ResumeBook>>,
    files: HarvestFiles,
}

impl Stores {
    fn open(args: &StoreArgs) -> Self {
        let config = StoreConfig::new(&args.data_dir);
        Self {
            budget: Arc::new(JsonSnapshotStore::new(config.quota_path())),
            history: Arc::new(JsonSnapshotStore::new(config.history_path())),
            resume: Arc::new(JsonSnapshotStore::new(config.resume_path())),
            files: HarvestFiles::new(config.raw_dir()),
            config,
        }
    }

    fn quota(&self, args: &StoreArgs) -> Result<QuotaLedger> {
        QuotaLedger::load_today(self.budget.clone(), QuotaConfig::new(args.daily_quota))
            .with_context(|| {
                format!(
                    "Failed to load budget from {}",
                    self.config.quota_path().display()
                )
            })
    }
}

/// Best-effort save of everything that must survive the process.
fn persist_all(stores: &Stores, quota: &QuotaLedger, ledger: &DedupLedger, book: &ResumeBook) {
    if let Err(e) = quota.persist() {
        tracing::error!(error = %e, "Failed to persist budget");
    }
    if let Err(e) = ledger.save() {
        tracing::error!(error = %e, "Failed to persist dedup ledger");
    }
    if let Err(e) = stores.resume.save(book) {
        tracing::warn!(error = %e, "Failed to persist resume state");
    }
}

fn emergency_dump(files: &HarvestFiles, batch: &HarvestBatch, label: &str, run: &RunStamp) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = files.dump(batch, label, run) {
        tracing::error!(error = %e, label, "Emergency dump failed");
    }
}

/// Write each resource's harvest file, dumping the ones that fail as `unwritten`.
fn write_fresh(files: &HarvestFiles, fresh: &HarvestBatch, run: &RunStamp) -> Vec<String> {
    let mut written = Vec::new();
    let mut unwritten = HarvestBatch::new();
    for (resource_id, resource_batch) in &fresh.resources {
        match files.write_resource(resource_batch, run) {
            Ok(path) => written.push(path),
            Err(e) => {
                tracing::error!(resource = %resource_id, error = %e, "Failed to write harvest file");
                unwritten
                    .resources
                    .insert(resource_id.clone(), resource_batch.clone());
            }
        }
    }
    emergency_dump(files, &unwritten, "unwritten", run);
    written
}

#[derive(Serialize)]
struct HarvestSummary {
    run_id: String,
    channels: Vec<String>,
    collection: CollectionReport,
    dedup: FilterStats,
    files: Vec<String>,
    quota: QuotaSummary,
    top_comments: Vec<TopComment>,
    keywords: std::collections::BTreeMap<String, KeywordSegment>,
}

async fn resolve_all(resolver: &ApiResolver, inputs: &[String]) -> Vec<Resource> {
    let mut resources: Vec<Resource> = Vec::new();
    for input in inputs {
        match resolver.resolve(input).await {
            Ok(Some(resource)) => {
                if !resources.iter().any(|r| r.id == resource.id) {
                    resources.push(resource);
                }
            }
            Ok(None) => {}
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!(error = %e, "Budget exhausted during channel resolution");
                break;
            }
            Err(e) => tracing::warn!(input = %input, error = %e, "Channel resolution failed"),
        }
    }
    resources
}

async fn cmd_harvest(
    channels: &[String],
    priority: &[String],
    api_key: &str,
    args: &StoreArgs,
    config: HarvestConfig,
    top: usize,
) -> Result<()> {
    let run = RunStamp::now();
    let stores = Stores::open(args);
    let quota = stores.quota(args)?;
    let mut ledger = DedupLedger::load(stores.history.clone(), &stores.files);
    let mut book = ResumeBook::load(stores.resume.as_ref(), Local::now().date_naive());

    tracing::info!(
        run_id = %run.run_id,
        remaining = quota.remaining(),
        known_items = ledger.len(),
        "Starting harvest"
    );

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current call");
            signal.cancel();
        }
    });

    let client = ApiClient::new(api_key).context("Failed to create API client")?;
    let caller = RetryingCaller::new(RetryPolicy::default());

    let mut inputs: Vec<String> = priority.to_vec();
    inputs.extend(channels.iter().cloned());
    let resolver = ApiResolver::new(client.clone(), quota.clone(), caller.clone());
    let resources = resolve_all(&resolver, &inputs).await;
    if resources.is_empty() {
        persist_all(&stores, &quota, &ledger, &book);
        anyhow::bail!("None of the {} channel(s) could be resolved", inputs.len());
    }

    let enumerator = ResourceEnumerator::new(client.clone(), quota.clone(), caller.clone())
        .with_page_size(config.listing_page_size);
    let plan = match enumerator.list_all(&resources, config.max_children_per_resource).await {
        Ok(plan) => plan,
        Err(e) => {
            persist_all(&stores, &quota, &ledger, &book);
            return Err(e).context("Video enumeration failed");
        }
    };

    let harvester = ThreadHarvester::new(client, quota.clone(), caller, config)
        .with_annotator(Arc::new(KeywordAnnotator::default()));
    let orchestrator = CollectionOrchestrator::new(
        harvester,
        Arc::new(PriorityAllowList::new(priority)),
        stores.resume.clone(),
    );

    let mut batch = HarvestBatch::new();
    let report = match orchestrator
        .run(&plan, &mut book, &mut batch, &cancel, &TracingHarvestReporter)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            emergency_dump(&stores.files, &batch, "failure", &run);
            persist_all(&stores, &quota, &ledger, &book);
            return Err(e).context("Harvest aborted");
        }
    };
    if report.interrupted {
        emergency_dump(&stores.files, &batch, "interrupted", &run);
    }

    // Ids are recorded before writing; anything that fails to write lands in a backup first.
    let (fresh, stats) = ledger.filter_new(&batch, &run);
    let written = write_fresh(&stores.files, &fresh, &run);
    persist_all(&stores, &quota, &ledger, &book);

    let summary = HarvestSummary {
        run_id: run.run_id.clone(),
        channels: resources.iter().map(|r| r.display_name.clone()).collect(),
        collection: report,
        dedup: stats,
        files: written,
        quota: quota.summary(),
        top_comments: views::top_comments(&fresh, top, 3),
        keywords: views::keyword_segments(&fresh),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct QuotaReport {
    #[serde(flatten)]
    summary: QuotaSummary,
    channels_affordable: u64,
    videos_per_channel: u64,
}

fn cmd_quota(args: &StoreArgs, videos_per_channel: u64) -> Result<()> {
    let stores = Stores::open(args);
    let quota = stores.quota(args)?;

    let report = QuotaReport {
        summary: quota.summary(),
        channels_affordable: quota.resources_remaining(videos_per_channel, 0),
        videos_per_channel,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_ledger(args: &StoreArgs, item: Option<&str>, top: usize) -> Result<()> {
    let stores = Stores::open(args);
    let ledger = DedupLedger::load(stores.history.clone(), &stores.files);

    let output = match item {
        Some(item_id) => serde_json::to_value(ledger.status(item_id))?,
        None => serde_json::json!({
            "source": format!("{:?}", ledger.history_source()),
            "stats": ledger.occurrence_stats(top),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
