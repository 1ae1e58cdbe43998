#![forbid(unsafe_code)]

//! `mcp-inspector`: drive an MCP server over stdio from the command line.
//!
//! Results are printed to stdout as pretty JSON; logs, prompts and history
//! dumps go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Map, Value};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_inspector::client::McpClient;
use mcp_inspector::config::InspectorSettings;
use mcp_inspector::observer::session_log::SessionLog;
use mcp_inspector::observer::{Fanout, Observer, TracingObserver};
use mcp_inspector::rpc::history::Histories;
use mcp_inspector::rpc::orchestrator::CallOutcome;
use mcp_inspector::rpc::policy::{DeadlinePolicy, NoExtension, TerminalPrompt};
use mcp_inspector::schema::{build_arguments, parse_key_value};
use mcp_inspector::servers::ServerRegistry;
use mcp_inspector::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "mcp-inspector",
    about = "Debugging client for stdio MCP servers",
    version,
    long_about = None
)]
struct Cli {
    /// Path to an `mcp.json` server config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the inspector's TOML settings file.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Server to connect to; defaults to the first configured one.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Never offer to extend a timed-out handshake.
    #[arg(long, global = true)]
    no_extend: bool,

    /// After the command, print the last N lines of stdout and stderr.
    #[arg(long, value_name = "N", global = true)]
    history: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the configured servers.
    Servers,
    /// Run the handshake and print the server's `initialize` result.
    Init,
    /// List the server's tools.
    Tools,
    /// Call a tool with `key=value` arguments.
    Call {
        /// Tool name.
        name: String,
        /// Arguments, coerced against the tool's input schema.
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
    /// List the server's resources.
    Resources,
    /// Read a resource.
    Read {
        /// Resource URI.
        uri: String,
    },
    /// List the server's prompts.
    Prompts,
    /// Get a prompt with `key=value` arguments.
    Prompt {
        /// Prompt name.
        name: String,
        /// Prompt arguments, passed as strings.
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    // ── Load configuration ──────────────────────────────
    let settings = match &args.settings {
        Some(path) => InspectorSettings::load_from_path(path)?,
        None => InspectorSettings::default(),
    };
    let cwd = std::env::current_dir()?;
    let registry = ServerRegistry::load(args.config.as_deref(), &cwd);

    if matches!(args.command, Command::Servers) {
        print_json(&servers_json(&registry));
        return Ok(ExitCode::SUCCESS);
    }

    // ── Observers and policy ────────────────────────────
    let server_name = registry.select(args.server.as_deref())?.name.clone();
    let mut fanout = Fanout::new().with(Arc::new(TracingObserver::new(server_name.clone())));
    if let Some(log_dir) = &settings.log_dir {
        let log = SessionLog::create(log_dir, server_name.clone())?;
        info!(path = %log.path().display(), "session log enabled");
        fanout = fanout.with(Arc::new(log));
    }
    let observer: Arc<dyn Observer> = Arc::new(fanout);
    let policy: Arc<dyn DeadlinePolicy> = if args.no_extend {
        Arc::new(NoExtension)
    } else {
        Arc::new(TerminalPrompt)
    };

    // ── Connect and run the command ─────────────────────
    let mut client = McpClient::connect(
        registry,
        args.server.as_deref(),
        settings,
        observer,
        policy,
    )
    .await?;

    let result = execute(&client, &args.command).await;
    if let Some(lines) = args.history {
        print_history(client.session().histories(), lines);
    }
    client.shutdown().await;

    let outcome = result?;
    Ok(report(&outcome))
}

async fn execute(client: &McpClient, command: &Command) -> Result<CallOutcome> {
    match command {
        Command::Servers => Err(AppError::Config("servers needs no connection".into())),
        Command::Init => Ok(CallOutcome::Resolved(client.server_info().clone())),
        Command::Tools => client.list_tools().await,
        Command::Call { name, args } => {
            let tool = client.find_tool(name).await?;
            let schema = tool.get("inputSchema").cloned().unwrap_or(Value::Null);
            let arguments = build_arguments(&schema, args);
            client.call_tool(name, arguments).await
        }
        Command::Resources => client.list_resources().await,
        Command::Read { uri } => client.read_resource(uri).await,
        Command::Prompts => client.list_prompts().await,
        Command::Prompt { name, args } => {
            let arguments: Map<String, Value> = args
                .iter()
                .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
                .collect();
            client.get_prompt(name, arguments).await
        }
    }
}

fn report(outcome: &CallOutcome) -> ExitCode {
    match outcome {
        CallOutcome::Resolved(result) => {
            print_json(result);
            ExitCode::SUCCESS
        }
        CallOutcome::ProtocolError(err) => {
            print_json(&json!({ "error": err }));
            ExitCode::FAILURE
        }
        CallOutcome::TimedOut => {
            error!("no response before the deadline");
            ExitCode::FAILURE
        }
        CallOutcome::Abandoned => {
            error!("gave up waiting for a response");
            ExitCode::FAILURE
        }
    }
}

fn servers_json(registry: &ServerRegistry) -> Value {
    let servers: Vec<Value> = registry
        .entries()
        .iter()
        .map(|entry| {
            json!({
                "name": entry.name,
                "command": entry.command,
                "working_dir": entry.working_dir.display().to_string(),
                "env": entry.env,
            })
        })
        .collect();
    json!({
        "source": registry.source().map(|path| path.display().to_string()),
        "servers": servers,
    })
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => error!(%err, "failed to render result"),
    }
}

fn print_history(histories: &Histories, lines: usize) {
    eprintln!("── stdout (last {lines}) ──");
    for line in histories.replies.tail(lines) {
        eprintln!("{line}");
    }
    eprintln!("── stderr (last {lines}) ──");
    for line in histories.diagnostics.tail(lines) {
        eprintln!("{line}");
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
