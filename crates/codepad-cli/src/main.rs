//! Command-line front end for running practice snippets outside the browser
//!
//! `codepad run` validates and evaluates a snippet and prints what it logged
//! (or its error on stderr, exiting with status 1). `codepad validate` only
//! applies the denylist screen. Logs go to stderr so stdout carries nothing
//! but the snippet's output.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use codepad_core::{CodeRunner, CodeValidator, ConfigLoader, EngineKind};
use log::LevelFilter;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[clap(name = "codepad", author, version, about = "Run JavaScript practice snippets under a time budget")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        short,
        default_value = "codepad.yaml",
        help = "Configuration file; defaults apply when it does not exist"
    )]
    config: PathBuf,

    #[clap(long, short, help = "Log level, overrides the configuration file")]
    log_level: Option<String>,
}

#[derive(Args, Debug)]
struct SourceArgs {
    #[clap(long, short, conflicts_with = "code", help = "Read the snippet from a file")]
    file: Option<PathBuf>,

    #[clap(long, help = "Snippet text; stdin is read when neither --file nor --code is given")]
    code: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and run a snippet
    Run {
        #[clap(flatten)]
        source: SourceArgs,

        #[clap(long, help = "Print the full result as JSON")]
        json: bool,

        #[clap(long, help = "Evaluation engine: boa or node")]
        engine: Option<EngineKind>,

        #[clap(long, help = "Time budget in milliseconds")]
        timeout_ms: Option<u64>,
    },
    /// Check a snippet against the denylist without running it
    Validate {
        #[clap(flatten)]
        source: SourceArgs,
    },
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

    match cli.command {
        Commands::Run {
            source,
            json,
            engine,
            timeout_ms,
        } => {
            if let Some(engine) = engine {
                config.runner.engine = engine;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.runner.timeout_ms = timeout_ms;
            }
            config.validate()?;

            let code = read_source(&source).await?;
            let runner = CodeRunner::from_config(&config)?;
            let result = runner.run_code(&code).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let Some(error) = &result.error {
                eprintln!("Error: {}", error);
            } else if !result.output.is_empty() {
                println!("{}", result.output);
            }

            if let Some(elapsed) = result.execution_time {
                log::info!("Finished in {} ms", elapsed);
            }
            if result.error.is_some() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Validate { source } => {
            let code = read_source(&source).await?;
            let result = CodeValidator::new(config.runner.max_code_length).validate(&code);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_valid {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn read_source(args: &SourceArgs) -> Result<String> {
    if let Some(path) = &args.file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snippet from {}", path.display()));
    }

    if let Some(code) = &args.code {
        return Ok(code.clone());
    }

    log::debug!("Reading snippet from stdin");
    let mut code = String::new();
    tokio::io::stdin()
        .read_to_string(&mut code)
        .await
        .context("Failed to read snippet from stdin")?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "codepad",
            "run",
            "--code",
            "console.log(1)",
            "--engine",
            "node",
            "--timeout-ms",
            "750",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                source,
                json,
                engine,
                timeout_ms,
            } => {
                assert_eq!(source.code.as_deref(), Some("console.log(1)"));
                assert!(json);
                assert_eq!(engine, Some(EngineKind::Node));
                assert_eq!(timeout_ms, Some(750));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("codepad.yaml"));
    }

    #[test]
    fn test_file_and_code_conflict() {
        let result = Cli::try_parse_from([
            "codepad", "validate", "--file", "a.js", "--code", "1",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_read_source_prefers_file() {
        let dir = std::env::temp_dir().join(format!("codepad-cli-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("snippet.js");
        tokio::fs::write(&path, "console.log('from file')").await.unwrap();

        let args = SourceArgs {
            file: Some(path.clone()),
            code: None,
        };
        assert_eq!(read_source(&args).await.unwrap(), "console.log('from file')");

        let args = SourceArgs {
            file: None,
            code: Some("inline".to_string()),
        };
        assert_eq!(read_source(&args).await.unwrap(), "inline");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
