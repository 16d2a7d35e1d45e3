//! SkillForge - Entry Point
//!
//! Modes:
//! - Default / serve: HTTP API server
//! - scan <file>: scan a SKILL.md and print the report
//! - generate <description> [--template <id>]: run the pipeline, NDJSON to stdout

use anyhow::{bail, Context};
use futures_util::StreamExt;
use skillforge::{
    ApiServer, Config, GenerateRequest, OpenAiClient, Orchestrator, PipelineConfig, RuleCatalog,
    SecurityScanner,
};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

enum Mode {
    Serve,
    Scan(String),
    Generate(GenerateRequest),
    Help,
}

fn parse_args(args: &[String]) -> anyhow::Result<Mode> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(Mode::Help);
    }

    match args.first().map(String::as_str) {
        None | Some("serve") => Ok(Mode::Serve),
        Some("scan") => match args.get(1) {
            Some(path) => Ok(Mode::Scan(path.clone())),
            None => bail!("scan requires a file path"),
        },
        Some("generate") => {
            let mut description = None;
            let mut template = None;
            let mut rest = args[1..].iter();
            while let Some(arg) = rest.next() {
                if arg == "--template" {
                    template = Some(rest.next().context("--template requires an id")?.clone());
                } else if description.is_none() {
                    description = Some(arg.clone());
                } else {
                    bail!("unexpected argument: {}", arg);
                }
            }
            let description = description.context("generate requires a description")?;
            Ok(Mode::Generate(GenerateRequest {
                description,
                template_id: template,
            }))
        }
        Some(other) => bail!("unknown command: {} (see --help)", other),
    }
}

fn print_help() {
    println!("SkillForge v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: skillforge [COMMAND]");
    println!();
    println!("Commands:");
    println!("  serve                                   Run the HTTP API (default)");
    println!("  scan <file>                             Scan a SKILL.md file");
    println!("  generate <description> [--template ID]  Generate a SKILL.md (NDJSON output)");
    println!();
    println!("Options:");
    println!("  --help, -h         Show this help");
    println!();
    println!("Environment variables:");
    println!("  LLM_API_KEY                  API key for the LLM endpoint");
    println!("  LLM_BASE_URL                 OpenAI-compatible base URL");
    println!("  LLM_MODEL                    Model name (default: deepseek-chat)");
    println!("  SKILLFORGE_MAX_TOKENS        Completion token cap (default: 4096)");
    println!("  SKILLFORGE_LLM_TIMEOUT_SECS  Per-call timeout (default: 120)");
    println!("  SKILLFORGE_TEMPLATES_DIR     Template directory (default: templates)");
    println!("  SKILLFORGE_BIND_ADDR         Bind address (default: 127.0.0.1)");
    println!("  SKILLFORGE_PORT              Port (default: 8000)");
    println!("  SKILLFORGE_CORS_ORIGINS      Comma-separated allowed origins");
    println!("  SKILLFORGE_LOG_REQUESTS      Trace HTTP requests (true/false)");
    println!("  SKILLFORGE_RATE_SWEEP_SECS   Idle rate-limit sweep interval (default: 300)");
}

fn init_logging(serve_mode: bool) -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(if serve_mode { Level::INFO } else { Level::WARN });

    if serve_mode {
        // Server mode - JSON logs
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // CLI modes - stdout carries output, logs go to stderr
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let client = OpenAiClient::from_config(config);
    if !client.is_available() {
        warn!("LLM_API_KEY not set; generation requests will fail");
    }

    let catalog = RuleCatalog::builtin().context("Failed to compile scanner rules")?;
    let scanner = SecurityScanner::new(Arc::new(catalog));
    let pipeline = PipelineConfig {
        generation_timeout: config.generation_timeout(),
        ..PipelineConfig::default()
    };
    Ok(Orchestrator::new(Arc::new(client), scanner, pipeline))
}

async fn run_scan(path: &str) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;

    let catalog = RuleCatalog::builtin().context("Failed to compile scanner rules")?;
    let report = SecurityScanner::new(Arc::new(catalog)).scan(&content);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_generate(config: &Config, request: GenerateRequest) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let mut events = orchestrator.start(request);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(event) = events.next().await {
        out.write_all(event.to_ndjson_line().as_bytes())?;
        out.flush()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = parse_args(&args)?;

    if let Mode::Help = mode {
        print_help();
        return Ok(());
    }

    init_logging(matches!(mode, Mode::Serve))?;

    match mode {
        Mode::Serve => {
            info!("SkillForge v{}", env!("CARGO_PKG_VERSION"));

            let config = Config::from_env()?;
            let orchestrator = build_orchestrator(&config)?;
            ApiServer::new(config, orchestrator).run().await?;
        }
        Mode::Scan(path) => run_scan(&path).await?,
        Mode::Generate(request) => {
            let config = Config::from_env()?;
            run_generate(&config, request).await?;
        }
        Mode::Help => {}
    }

    Ok(())
}
