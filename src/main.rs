use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use translate_keys::config::Config;
use translate_keys::{
    BulkTranslationOrchestrator, Document, JsonResourceAdapter, OpenAiTranslator, SavePolicy,
    TranslationOrchestrator, TranslationService, WorkflowHandle,
};

const USAGE: &str = "Usage: translate-keys <source-tag> [--to <target-tag>] <file.json>...";

#[derive(Debug, PartialEq)]
struct Args {
    source: String,
    /// Translate into this language only; all other languages when absent
    target: Option<String>,
    files: Vec<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let source = args.next().context(USAGE)?;
    let mut target = None;
    let mut files = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--to" => target = Some(args.next().context("--to needs a language tag")?),
            "-h" | "--help" => bail!(USAGE),
            _ => files.push(PathBuf::from(arg)),
        }
    }

    if files.is_empty() {
        bail!("No resource files given\n{}", USAGE);
    }
    Ok(Args {
        source,
        target,
        files,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when not present)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translate_keys=info".parse()?),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = Config::from_env()?;

    let document = Document::new();
    let adapter = JsonResourceAdapter::new();
    let languages = document.import_files(&adapter, &args.files)?;
    info!(
        "Loaded {} languages, {} keys",
        languages.len(),
        document.row_count()
    );

    let service: Arc<dyn TranslationService> = Arc::new(OpenAiTranslator::from_config(&config));
    let handle = start(&document, service, &config, &args)?;

    // Ctrl-C stops after the call in flight
    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current cell");
            token.cancel();
        }
    });

    let outcome = handle.wait().await;

    let saved = document.save_all(&adapter, SavePolicy::ContinueOnError)?;
    for e in &saved.failed {
        warn!("{}", e);
    }
    info!("Wrote {} files", saved.written.len());

    let report = outcome?;
    info!(
        "Finished ({:?}): {} translated, {} skipped, {} failed",
        report.state,
        report.translated,
        report.skipped_filled + report.skipped_blank_source,
        report.failed
    );
    Ok(())
}

fn start(
    document: &Document,
    service: Arc<dyn TranslationService>,
    config: &Config,
    args: &Args,
) -> Result<WorkflowHandle> {
    let handle = match &args.target {
        Some(target) => {
            let orchestrator =
                TranslationOrchestrator::new(document.clone(), service).with_policy(config.policy());
            orchestrator.set_source(&args.source)?;
            orchestrator.set_target(target)?;
            orchestrator.start()?
        }
        None => {
            let orchestrator = BulkTranslationOrchestrator::new(document.clone(), service)
                .with_policy(config.policy());
            orchestrator.set_source(&args.source)?;
            orchestrator.start()?
        }
    };
    Ok(handle)
}
