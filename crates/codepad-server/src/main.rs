//! Web server exposing the snippet runner over HTTP

use anyhow::Result;
use clap::Parser;
use codepad_core::{CodeRunner, ConfigLoader, EngineKind};
use codepad_server::{shutdown_signal, CodepadServer, ServerConfig};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Codepad Server - run practice snippets over HTTP")]
struct Cli {
    #[clap(
        long,
        short,
        default_value = "codepad.yaml",
        help = "Configuration file; defaults apply when it does not exist"
    )]
    config: PathBuf,

    #[clap(long, help = "Bind address, overrides the configuration file")]
    bind_addr: Option<String>,

    #[clap(long, short, help = "Log level, overrides the configuration file")]
    log_level: Option<String>,

    #[clap(long, help = "Evaluation engine: boa or node")]
    engine: Option<EngineKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::from_optional_file(&cli.config).await?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    if let Some(bind_addr) = cli.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    if let Some(engine) = cli.engine {
        config.runner.engine = engine;
    }
    config.validate()?;

    let runner = CodeRunner::from_config(&config)?;
    let server_config = ServerConfig::from_settings(&config.server)?;
    log::info!("Starting codepad server on {}", server_config.bind_addr);

    CodepadServer::with_config(Arc::new(runner), server_config)
        .serve_with_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
