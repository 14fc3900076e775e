//! marketagent CLI entry point

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use marketagent::cli::{Cli, Command, DEFAULT_REPORT_QUERY};
use marketagent::config::Config;
use marketagent::llm::{LlmClient, create_client};
use marketagent::prompts::PromptLoader;
use marketagent::receipt::CommandConverter;
use marketagent::state::WorkflowState;
use marketagent::store::StoreManager;
use marketagent::workflow::{Checkpointer, InvoiceGraph, LlmInvoiceSteps, ReportGraph, StoreCheckpointer, Termination};
use spendstore::CartItem;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marketagent")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("marketagent.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Token cancelled by Ctrl-C or when the configured deadline elapses
fn cancellation(deadline: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();

    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    if let Some(deadline) = deadline {
        let on_deadline = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!(?deadline, "Deadline elapsed, cancelling");
            on_deadline.cancel();
        });
    }

    token
}

fn prompt_loader() -> Result<Arc<PromptLoader>> {
    let root = std::env::current_dir().context("Failed to read current directory")?;
    Ok(Arc::new(PromptLoader::new(root)))
}

fn gateway(config: &Config) -> Result<Arc<dyn LlmClient>> {
    config.validate()?;
    Ok(create_client(&config.llm)?)
}

fn invoice_graph(config: &Config, store: &StoreManager) -> Result<InvoiceGraph> {
    let steps = LlmInvoiceSteps::new(
        gateway(config)?,
        prompt_loader()?,
        Arc::new(CommandConverter::from_config(&config.receipts)),
        store.clone(),
        config.agents.top_k,
    )
    .with_max_tokens(config.llm.max_tokens);
    Ok(InvoiceGraph::new(Arc::new(steps)))
}

async fn cmd_ingest(config: &Config, store: &StoreManager, path: PathBuf) -> Result<()> {
    debug!(path = %path.display(), "cmd_ingest: called");
    let graph = invoice_graph(config, store)?;
    let cancel = cancellation(config.deadline());

    let state = graph
        .invoke(WorkflowState::for_receipt(path.display().to_string()), &cancel)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;

    println!("{} {}", "✓".green(), state.answer.unwrap_or_default());
    Ok(())
}

async fn cmd_ask(config: &Config, store: &StoreManager, question: String) -> Result<()> {
    debug!(%question, "cmd_ask: called");
    let graph = invoice_graph(config, store)?;
    let cancel = cancellation(config.deadline());

    let state = graph
        .invoke(WorkflowState::for_question(question), &cancel)
        .await
        .context("Failed to answer the question")?;

    if let Some(query) = &state.query {
        println!("{}", query.dimmed());
    }
    println!("{}", state.answer.unwrap_or_default());
    Ok(())
}

async fn cmd_report(
    config: &Config,
    store: &StoreManager,
    query: Option<String>,
    thread: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let thread_id = thread.unwrap_or_else(|| Uuid::now_v7().to_string());
    debug!(%thread_id, "cmd_report: called");

    let prompts = prompt_loader()?;
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
    let graph = ReportGraph::build(
        gateway(config)?,
        Arc::new(store.clone()),
        store,
        &prompts,
        &config.agents,
        config.llm.max_tokens,
        &today,
    )
    .await?;

    let checkpointer = StoreCheckpointer::new(store.clone());
    let cancel = cancellation(config.deadline());
    let user_query = query.unwrap_or_else(|| DEFAULT_REPORT_QUERY.to_string());

    let run = graph
        .invoke_in_thread(&thread_id, WorkflowState::for_report(user_query), &checkpointer, &cancel)
        .await
        .context("Report generation failed")?;

    eprintln!("{} thread {} ({} steps)", "→".cyan(), thread_id.yellow(), run.steps);

    if let Some(report) = run.state.report_text() {
        match &output {
            Some(path) => {
                fs::write(path, report).with_context(|| format!("Failed to write {}", path.display()))?;
                println!("{} Report written to {}", "✓".green(), path.display().to_string().cyan());
            }
            None => println!("{}", report),
        }
    }

    if run.termination.is_success() {
        return Ok(());
    }

    let reason = match run.termination {
        Termination::StepLimit => format!("step limit of {} reached", config.agents.max_steps),
        _ => run.state.terminal_error().unwrap_or("unknown failure").to_string(),
    };
    eprintln!("{} {}", "✗".red(), reason);
    Err(eyre!("Report run ended with {:?}", run.termination))
}

async fn cmd_show(store: &StoreManager, thread: String) -> Result<()> {
    debug!(%thread, "cmd_show: called");
    let checkpointer = StoreCheckpointer::new(store.clone());
    match checkpointer.load(&thread).await? {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        None => println!("No checkpoint for thread {}", thread),
    }
    Ok(())
}

async fn cmd_cart(store: &StoreManager, items: Vec<CartItem>) -> Result<()> {
    debug!(items = items.len(), "cmd_cart: called");
    let quote = store.price_cart(items).await?;

    for t in &quote.per_supermarket {
        let missing = if t.missing.is_empty() {
            String::new()
        } else {
            format!(" (missing: {})", t.missing.join(", ")).dimmed().to_string()
        };
        println!("  {:<30} {:>10.2}{}", t.supermarket, t.total, missing);
    }
    for line in &quote.cheapest {
        println!(
            "  {} x {} at {} = {:.2}",
            line.quantity,
            line.product,
            line.supermarket.yellow(),
            line.estimated_cost
        );
    }
    for p in &quote.unpriced {
        println!("  {:<30} {}", p, "no price history".red());
    }
    println!("{} Cheapest total: {:.2}", "✓".green(), quote.cheapest_total);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    info!(db = %config.store.db_path.display(), "marketagent starting");

    let store = StoreManager::spawn(&config.store.db_path)
        .with_context(|| format!("Failed to open {}", config.store.db_path.display()))?;

    debug!(command = ?cli.command, "main: dispatching command");
    let result = match cli.command {
        Command::Ingest { path } => cmd_ingest(&config, &store, path).await,
        Command::Ask { question } => cmd_ask(&config, &store, question).await,
        Command::Report { query, thread, output } => cmd_report(&config, &store, query, thread, output).await,
        Command::Show { thread } => cmd_show(&store, thread).await,
        Command::Schema => {
            let schema = store.describe_schema().await?;
            print!("{}", schema);
            Ok(())
        }
        Command::Cart { items } => cmd_cart(&store, items).await,
    };

    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "main: store shutdown failed");
    }
    result
}
