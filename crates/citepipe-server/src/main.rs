use anyhow::{Context, Result};
use citepipe::envelope::ApiError;
use citepipe::http::{self, AppState, DEFAULT_MAX_RESULTS};
use citepipe_core::ResearchQuery;
use citepipe_local::{Config, ConfigStatus, ResearchPipeline};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "citepipe")]
#[command(about = "Search the web, read the sources, answer with citations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (`POST /research`, `GET /health`).
    Serve(ServeCmd),
    /// Run one query and print the result (json).
    Research(ResearchCmd),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Address to listen on.
    #[arg(long, env = "CITEPIPE_BIND", default_value = "0.0.0.0:8000")]
    bind: String,
    /// Abandon a request after this many ms (504). Unset means no deadline.
    #[arg(long, env = "CITEPIPE_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct ResearchCmd {
    /// The question to research.
    query: String,
    /// Upper bound on discovered URLs (clamped to 1..=20).
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    max_results: usize,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    // stdout carries JSON results; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn pipeline_from_env() -> Result<(Config, ResearchPipeline)> {
    let cfg = Config::from_env().context("refusing to start")?;
    let pipeline = ResearchPipeline::from_config(&cfg).context("building pipeline")?;
    Ok((cfg, pipeline))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Opt-in; never overrides variables already in the environment.
    if let Ok(p) = std::env::var("CITEPIPE_ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() {
            citepipe::load_env_file(std::path::Path::new(p))
                .with_context(|| format!("reading CITEPIPE_ENV_FILE {p}"))?;
        }
    }

    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve(args) => {
            let (cfg, pipeline) = pipeline_from_env()?;
            let status = ConfigStatus::from_config(&cfg);
            let request_timeout = args.request_timeout_ms.map(Duration::from_millis);
            let app = http::router(AppState::new(pipeline, status, request_timeout));

            let listener = tokio::net::TcpListener::bind(&args.bind)
                .await
                .with_context(|| format!("failed to bind {}", args.bind))?;
            let addr = listener.local_addr().context("reading bound address")?;
            tracing::info!(%addr, searxng = %cfg.searxng_base_url, model = %cfg.gemini_model, "citepipe listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server error")?;
        }
        Commands::Research(args) => {
            let (_cfg, pipeline) = pipeline_from_env()?;
            let out = match ResearchQuery::new(args.query, args.max_results) {
                Ok(q) => pipeline.research(&q).await,
                Err(e) => Err(e),
            };
            match out {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    println!("{}", ApiError::from(e).to_json());
                    std::process::exit(1);
                }
            }
        }
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();
            let status = ConfigStatus::from_env();
            let config_check = Config::from_env().map(|_| ()).map_err(|e| e.to_string());
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": status.ready(),
                "name": "citepipe",
                "version": env!("CARGO_PKG_VERSION"),
                "elapsed_ms": t0.elapsed().as_millis() as u64,
                "configured": &status,
                "checks": [{
                    "name": "config",
                    "ok": config_check.is_ok(),
                    "error": config_check.err(),
                }],
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("citepipe {}", env!("CARGO_PKG_VERSION"));
                    println!("- searxng: {}", status.searxng_base_url);
                    for (name, ok) in [
                        ("gemini", status.generation_configured),
                        ("apify", status.crawl_configured),
                        ("google_cse", status.google_search_configured),
                    ] {
                        println!("- {}: {}", name, if ok { "configured" } else { "missing" });
                    }
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "citepipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("citepipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
