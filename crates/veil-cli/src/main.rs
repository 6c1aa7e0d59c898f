//! Veil CLI - tool-calling assistant that never shows email addresses to the model
//!
//! Emails in queries and tool results are swapped for tokens before they
//! reach the model, and restored in tool arguments and final answers.

mod demo;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use veil_core::invoker::mcp::connect_all;
use veil_core::{
    Config, ConfigManager, GenAIGateway, LoopState, ModelGateway, ProviderType, Session,
    SessionManager, ToolInvoker, TurnEvent, TurnOutcome,
};
use veil_mcp::McpServer;

const CHAT_SESSION: &str = "cli-chat";

#[derive(Parser)]
#[command(name = "veil")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tool-calling assistant with email redaction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to <config dir>/veil/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// LLM Provider (openai, anthropic, gemini, ...) - defaults to config setting
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use (defaults to the configured or provider's default)
    #[arg(short, long)]
    model: Option<String>,

    /// Execute a single query and exit (non-interactive mode)
    #[arg(long)]
    one_shot: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat mode
    Chat,

    /// Show tools offered by the configured MCP servers
    Tools,

    /// Show configuration
    Config,

    /// Serve the demo ticket tools over MCP stdio
    ServeDemo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Provider keys may live in a local .env file
    let _ = dotenvy::dotenv();

    // Logs go to stderr: stdout belongs to the chat, or to MCP in serve-demo.
    // RUST_LOG overrides both defaults.
    let default_filter = if cli.verbose {
        "info,veil_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(Commands::ServeDemo) = cli.command {
        return serve_demo().await;
    }

    let config_manager = load_config(&cli)?;
    let config = config_manager.config();

    if let Some(query) = cli.one_shot.as_deref() {
        return run_one_shot(config, query).await;
    }

    match cli.command {
        Some(Commands::Tools) => show_tools(config).await?,
        Some(Commands::Config) => show_config(&config_manager),
        _ => run_chat(config).await?,
    }

    Ok(())
}

/// Load the config file and apply command line overrides
fn load_config(cli: &Cli) -> anyhow::Result<ConfigManager> {
    let mut config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };

    let provider = &mut config_manager.config_mut().provider;
    if let Some(name) = &cli.provider {
        let provider_type: ProviderType = name.parse().map_err(anyhow::Error::msg)?;
        provider.provider_type = provider_type.as_str().to_string();
        provider.model = provider_type.default_model().to_string();
    }
    if let Some(model) = &cli.model {
        provider.model = model.clone();
    }

    config_manager.config().validate()?;
    Ok(config_manager)
}

/// Build the session manager: one genai gateway and one tool router shared by
/// all sessions. Progress events of every session go to `events`.
async fn build_manager(
    config: &Config,
    events: Option<mpsc::Sender<TurnEvent>>,
) -> anyhow::Result<SessionManager> {
    let gateway: Arc<dyn ModelGateway> = Arc::new(GenAIGateway::from_config(&config.provider)?);
    let invoker: Arc<dyn ToolInvoker> = Arc::new(connect_all(config).await);
    let orchestration = config.orchestration.clone();

    Ok(SessionManager::new(config.redaction.clone(), move |codec| {
        let session = Session::new(gateway.clone(), invoker.clone(), codec)
            .with_config(orchestration.clone());
        match &events {
            Some(events) => session.with_events(events.clone()),
            None => session,
        }
    }))
}

async fn run_one_shot(config: &Config, query: &str) -> anyhow::Result<()> {
    let manager = build_manager(config, None).await?;
    let outcome = manager.run_turn("cli-oneshot", query).await?;
    println!("{}", outcome.render());
    Ok(())
}

async fn run_chat(config: &Config) -> anyhow::Result<()> {
    let (events_tx, mut events) = mpsc::channel(64);
    let manager = build_manager(config, Some(events_tx)).await?;

    println!("{}", style("Veil chat").bold().cyan());
    println!(
        "{}",
        style(format!(
            "Model: {} ({}). Type your queries or 'quit' to exit.",
            config.provider.model, config.provider.provider_type
        ))
        .dim()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{} ", style("Query:").bold().green());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }

        match run_chat_turn(&manager, query, &mut events).await {
            Ok(outcome) => println!("\n{}", outcome.render()),
            // The session survives a failed turn
            Err(e) => println!("\n{}", style(format!("Error: {}", e)).red()),
        }
    }

    Ok(())
}

/// Run one chat turn with a progress spinner. Ctrl-C cancels the turn.
async fn run_chat_turn(
    manager: &SessionManager,
    query: &str,
    events: &mut mpsc::Receiver<TurnEvent>,
) -> veil_core::Result<TurnOutcome> {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.blue} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let cancel = CancellationToken::new();
    let turn = manager.run_turn_with_cancel(CHAT_SESSION, query, cancel.clone());
    tokio::pin!(turn);

    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(event) = events.recv() => show_progress(&spinner, &event),
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                spinner.set_message("Cancelling...");
                cancel.cancel();
            }
        }
    };

    spinner.finish_and_clear();
    // Drop events left over from the finished turn
    while events.try_recv().is_ok() {}
    result
}

fn show_progress(spinner: &ProgressBar, event: &TurnEvent) {
    match event {
        TurnEvent::StateChanged {
            state: LoopState::AwaitingModel,
        } => spinner.set_message("Thinking..."),
        TurnEvent::ToolStarted { name, .. } => {
            spinner.set_message(format!("Calling {}...", style(name).yellow()))
        }
        TurnEvent::ToolFinished {
            name,
            is_error: true,
            ..
        } => spinner.println(format!("  {} {}", style("✗").red(), style(format!("{} failed", name)).dim())),
        _ => {}
    }
}

async fn show_tools(config: &Config) -> anyhow::Result<()> {
    let router = connect_all(config).await;
    let tools = router.list_tools().await?;

    println!("{}", style("Available Tools:").bold());
    if tools.is_empty() {
        println!("  {}", style("No tools. Add servers under [mcp_servers] in the config.").dim());
        return Ok(());
    }

    for tool in tools {
        let source = router.source_of(&tool.name).unwrap_or_default();
        println!(
            "  {} {} {}",
            style("•").cyan(),
            style(&tool.name).bold(),
            style(format!("[{}]", source)).dim()
        );
        if !tool.description.is_empty() {
            println!("    {}", style(&tool.description).dim());
        }
    }
    Ok(())
}

fn show_config(config_manager: &ConfigManager) {
    let config = config_manager.config();

    println!("{}", style("Configuration:").bold());
    println!("  File: {}", style(config_manager.path().display()).green());
    println!(
        "  Provider: {} ({})",
        style(&config.provider.provider_type).cyan(),
        config.provider.model
    );
    println!(
        "  API key: {}",
        if config.provider.get_api_key().is_some() {
            style("configured").green()
        } else {
            style("missing").red()
        }
    );
    println!("  Redaction scope: {:?}", config.redaction.scope);
    println!(
        "  Max round trips: {}",
        config.orchestration.max_round_trips
    );

    println!("{}", style("MCP servers:").bold());
    if config.mcp_servers.is_empty() {
        println!("  {}", style("none").dim());
    }
    for (name, server) in &config.mcp_servers {
        let target = match (&server.command, &server.url) {
            (Some(command), _) => format!("{} {}", command, server.args.join(" ")),
            (None, Some(url)) => url.clone(),
            (None, None) => "(incomplete)".to_string(),
        };
        let state = if server.enabled {
            style("enabled").green()
        } else {
            style("disabled").red()
        };
        println!("  {} {} {} {}", style("•").cyan(), style(name).bold(), state, style(target).dim());
    }
}

async fn serve_demo() -> anyhow::Result<()> {
    McpServer::new(Arc::new(demo::DemoJira))
        .with_name("jira MCP Server")
        .serve_stdio()
        .await?;
    Ok(())
}
