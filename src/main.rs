//! blogforge - CLI entry point

use anyhow::{Context, Result};
use blogforge::agent::{Orchestrator, PipelineOutcome, PipelineStage};
use blogforge::cli::{Args, Commands, GenerateArgs};
use blogforge::config::ForgeConfig;
use blogforge::context::ContextWindow;
use blogforge::embedding::{self, Embedder};
use blogforge::gateway::{LlmGateway, OllamaClient, RetryPolicy};
use blogforge::ingest::IngestionPipeline;
use blogforge::store::{self, SharedStore};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = args.load_config().context("loading configuration")?;
    let embedder = embedding::from_config(&config, args.offline)
        .await
        .context("initializing embedder")?;
    let store = store::shared(
        store::open(&config, embedder.dimension())
            .await
            .context("opening vector store")?,
    );

    match &args.command {
        Commands::Ingest { force } => ingest(&config, store, embedder, *force).await,
        Commands::Generate(generate_args) => generate(&config, store, embedder, generate_args).await,
        Commands::Search { query, k } => search(&config, store, embedder, query, *k).await,
        Commands::Stats => stats(&config, store, embedder).await,
        Commands::Reset => reset(&config, store, embedder).await,
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} {prefix:.dim}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn gateway(config: &ForgeConfig) -> Result<LlmGateway> {
    let client = OllamaClient::from_config(&config.ollama)?;
    Ok(LlmGateway::new(
        Arc::new(client),
        RetryPolicy::from_config(&config.retry),
        ContextWindow::new(config.ollama.context_window),
    ))
}

async fn ingest(config: &ForgeConfig, store: SharedStore, embedder: Arc<dyn Embedder>, force: bool) -> Result<()> {
    let pipeline = IngestionPipeline::from_config(config, store, embedder)?;
    let pb = spinner(&format!("Indexing {}", config.paths.corpus_dir.display()))?;
    let result = pipeline.ingest(&config.paths.corpus_dir, force).await;
    pb.finish_and_clear();
    let report = result?;

    println!(
        "{} {} indexed, {} unchanged, {} pruned, {} chunks written ({} scanned)",
        "✓".green().bold(),
        report.indexed,
        report.skipped,
        report.pruned,
        report.chunks_written,
        report.scanned
    );
    if !report.failures.is_empty() {
        println!("{} {} file(s) failed:", "!".yellow().bold(), report.failures.len());
        for failure in &report.failures {
            println!("  {} {}", failure.source_id.yellow(), failure.reason.dimmed());
        }
    }
    Ok(())
}

async fn generate(
    config: &ForgeConfig,
    store: SharedStore,
    embedder: Arc<dyn Embedder>,
    args: &GenerateArgs,
) -> Result<()> {
    let request = args.to_request(config)?;

    let client = OllamaClient::from_config(&config.ollama)?;
    match client.list_models().await {
        Ok(models) if !models.iter().any(|m| m == client.model()) => {
            warn!(model = %client.model(), "Model is not installed; run `ollama pull {}`", client.model());
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not list Ollama models"),
    }

    let pb = spinner("Retrieving context")?;
    let (sink, mut tokens) = tokio::sync::mpsc::unbounded_channel::<String>();
    let token_pb = pb.clone();
    tokio::spawn(async move {
        let mut count = 0usize;
        while tokens.recv().await.is_some() {
            count += 1;
            token_pb.set_prefix(format!("{} tokens", count));
        }
    });

    let stage_pb = pb.clone();
    let orchestrator = Orchestrator::from_config(config, gateway(config)?.with_progress(sink), embedder, store)?
        .with_dry_run(args.dry_run)
        .with_observer(Arc::new(move |stage: PipelineStage, attempt: u32| {
            let label = if attempt > 1 {
                format!("{} (attempt {})", stage.display_name(), attempt)
            } else {
                stage.display_name().to_string()
            };
            stage_pb.set_prefix(String::new());
            stage_pb.set_message(label);
        }));

    let outcome = orchestrator.run(request).await;
    pb.finish_and_clear();

    match outcome? {
        PipelineOutcome::Published(run) => {
            match &run.path {
                Some(path) => println!("{} Published {}", "✓".green().bold(), path.display().to_string().bold()),
                None => println!("{} Dry run passed, nothing written", "✓".green().bold()),
            }
            println!("  title:   {}", run.post.title);
            println!("  slug:    {}", run.post.slug);
            println!("  words:   {}", run.report.word_count);
            println!("  sources: {}", run.state.context().sources.len());
            for warning in &run.report.warnings {
                println!("  {} {}: {}", "warning".yellow(), warning.code, warning.detail);
            }
            Ok(())
        }
        PipelineOutcome::Failed(report) => {
            println!(
                "{} Failed at {} after {} attempt(s): {}",
                "✗".red().bold(),
                report.stage.to_string().bold(),
                report.attempts,
                report.reason.red()
            );
            println!("  {}", report.last_error.dimmed());
            anyhow::bail!("generation failed at stage {}", report.stage)
        }
    }
}

async fn search(
    config: &ForgeConfig,
    store: SharedStore,
    embedder: Arc<dyn Embedder>,
    query: &str,
    k: usize,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config, gateway(config)?, embedder, store.clone())?;
    let guard = store.read().await;
    let hits = orchestrator.retrieval().search(&**guard, query, k).await?;

    if hits.is_empty() {
        println!("{}", "No results; run `blogforge ingest` first.".yellow());
    }
    for (i, hit) in hits.iter().enumerate() {
        let preview: String = hit.chunk.text.chars().take(160).collect();
        println!(
            "{}. {} {} {}",
            i + 1,
            hit.chunk.title.bold(),
            format!("[{}]", hit.chunk.id()).dimmed(),
            format!("{:.3}", hit.score).cyan()
        );
        println!("   {}", preview.replace('\n', " "));
    }
    Ok(())
}

async fn stats(config: &ForgeConfig, store: SharedStore, embedder: Arc<dyn Embedder>) -> Result<()> {
    let stats = IngestionPipeline::from_config(config, store, embedder)?.stats().await?;
    println!("{}", "Knowledge base".bold());
    println!("  documents:    {}", stats.documents);
    println!("  chunks:       {}", stats.chunks);
    println!(
        "  last updated: {}",
        stats
            .last_updated
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

async fn reset(config: &ForgeConfig, store: SharedStore, embedder: Arc<dyn Embedder>) -> Result<()> {
    IngestionPipeline::from_config(config, store, embedder)?.reset().await?;
    println!("{} Knowledge base cleared", "✓".green().bold());
    Ok(())
}
