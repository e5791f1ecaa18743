use clap::{Parser, Subcommand};
use std::path::PathBuf;

use warden_config::ConfigLoader;
use warden_core::Result;

mod inspect;
mod spawn;
mod tick;

/// Model health monitoring and fallback spawning for agent runtimes
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one health monitoring pass (always exits 0; problems go to the notifier)
    Tick {
        /// Print the tick outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Spawn a session, retrying and falling back across models
    Spawn {
        /// Task text (or use --task-file)
        #[arg(conflicts_with = "task_file")]
        task: Option<String>,

        /// Read the task text from a file
        #[arg(long)]
        task_file: Option<PathBuf>,

        /// Model to try first (default: models.primary)
        #[arg(short, long)]
        model: Option<String>,

        /// Session label (default: generated)
        #[arg(long)]
        label: Option<String>,

        /// Comma-separated fallback chain (default: models.fallback_chain)
        #[arg(long, value_delimiter = ',')]
        fallback: Option<Vec<String>>,

        /// Attempts per model while it keeps rate-limiting
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seconds between attempts on the same model
        #[arg(long)]
        retry_delay: Option<u64>,

        /// Print the spawn result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Spawn a JSON list of {task, model, label} in parallel
    Batch {
        /// JSON file with the task list
        file: PathBuf,

        /// Comma-separated fallback chain (default: models.fallback_chain)
        #[arg(long, value_delimiter = ',')]
        fallback: Option<Vec<String>>,

        /// Retry failing tasks on their own model only
        #[arg(long)]
        no_partial: bool,

        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the persisted health snapshot
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent fallback decisions
    Decisions {
        /// Number of records to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log level and format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        let log_level = resolve_log_level(
            self.verbose,
            self.quiet,
            self.log_level.as_deref(),
            &config.logging.level,
        );
        init_tracing(log_level, &config.logging.format);

        match self.command {
            Commands::Tick { json } => tick::cmd_tick(config, json).await,
            Commands::Spawn {
                task,
                task_file,
                model,
                label,
                fallback,
                max_retries,
                retry_delay,
                json,
            } => {
                let args = spawn::SpawnArgs {
                    task,
                    task_file,
                    model,
                    label,
                    fallback,
                    max_retries,
                    retry_delay,
                };
                spawn::cmd_spawn(config, args, json).await
            }
            Commands::Batch {
                file,
                fallback,
                no_partial,
                json,
            } => spawn::cmd_batch(config, &file, fallback, no_partial, json).await,
            Commands::Status { json } => inspect::cmd_status(config, json),
            Commands::Decisions { limit, json } => inspect::cmd_decisions(config, limit, json),
            Commands::Config { json } => {
                inspect::cmd_config(config, config_loader.path(), json)
            }
        }
    }
}

/// --verbose > --quiet > --log-level > configured level. `RUST_LOG` still
/// wins over all of them in [`init_tracing`].
fn resolve_log_level<'a>(
    verbose: bool,
    quiet: bool,
    flag: Option<&'a str>,
    configured: &'a str,
) -> &'a str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        flag.unwrap_or(configured)
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
/// A subscriber installed earlier (tests run several commands per process)
/// is left in place.
fn init_tracing(log_level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        "json" => builder.json().with_target(true).try_init(),
        "compact" => builder.compact().with_target(false).try_init(),
        _ => builder.with_target(false).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_precedence() {
        assert_eq!(resolve_log_level(true, false, Some("warn"), "info"), "debug");
        assert_eq!(resolve_log_level(false, true, Some("warn"), "info"), "error");
        assert_eq!(resolve_log_level(false, false, Some("warn"), "info"), "warn");
        assert_eq!(resolve_log_level(false, false, None, "trace"), "trace");
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["warden", "-v", "-q", "tick"]).is_err());
    }

    #[test]
    fn test_spawn_parses_fallback_list() {
        let cli = Cli::try_parse_from([
            "warden",
            "spawn",
            "write the report",
            "--model",
            "openai/gpt-5",
            "--fallback",
            "gemini/gemini-2.5-pro,ollama/llama3",
        ])
        .unwrap();
        match cli.command {
            Commands::Spawn {
                task,
                model,
                fallback,
                ..
            } => {
                assert_eq!(task.as_deref(), Some("write the report"));
                assert_eq!(model.as_deref(), Some("openai/gpt-5"));
                assert_eq!(
                    fallback.unwrap(),
                    vec!["gemini/gemini-2.5-pro", "ollama/llama3"]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_task_and_task_file_conflict() {
        assert!(
            Cli::try_parse_from(["warden", "spawn", "inline", "--task-file", "t.txt"]).is_err()
        );
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["warden", "status", "-c", "/tmp/w.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.toml")));
    }
}
