use console::style;
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden_config::WardenConfig;
use warden_core::{Result, WardenError};
use warden_spawn::{FallbackSpawner, ParallelResult, ParallelTask, SpawnRequest, SpawnResult};

/// Flags of `warden spawn` other than output format.
pub(super) struct SpawnArgs {
    pub task: Option<String>,
    pub task_file: Option<PathBuf>,
    pub model: Option<String>,
    pub label: Option<String>,
    pub fallback: Option<Vec<String>>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<u64>,
}

impl SpawnArgs {
    fn into_request(self, config: &WardenConfig) -> Result<SpawnRequest> {
        let task = match (self.task, self.task_file) {
            (Some(task), _) => task,
            (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                WardenError::InvalidRequest(format!("cannot read {}: {e}", path.display()))
            })?,
            (None, None) => {
                return Err(WardenError::InvalidRequest(
                    "no task given (pass it inline or with --task-file)".into(),
                ));
            }
        };
        let model = self.model.unwrap_or_else(|| config.models.primary.clone());
        let label = self.label.unwrap_or_else(generated_label);

        let mut request = SpawnRequest::new(task, model, label);
        if let Some(chain) = self.fallback {
            request = request.with_fallback_chain(chain);
        }
        if let Some(n) = self.max_retries {
            request = request.with_max_retries(n);
        }
        if let Some(secs) = self.retry_delay {
            request = request.with_retry_delay(Duration::from_secs(secs));
        }
        Ok(request)
    }
}

fn generated_label() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("task-{}", &id[..8])
}

/// Exit 0 with a session, or `AllFailed` naming every model tried.
pub(super) async fn cmd_spawn(config: WardenConfig, args: SpawnArgs, json: bool) -> Result<()> {
    let request = args.into_request(&config)?;
    let spawner = FallbackSpawner::from_config(&config);
    let result = spawner.spawn_with_fallback(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    result.into_session().map(|_| ())
}

pub(super) async fn cmd_batch(
    config: WardenConfig,
    file: &Path,
    fallback: Option<Vec<String>>,
    no_partial: bool,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| WardenError::InvalidRequest(format!("cannot read {}: {e}", file.display())))?;
    let tasks: Vec<ParallelTask> = serde_json::from_str(&raw)?;
    if tasks.is_empty() {
        return Err(WardenError::InvalidRequest(format!(
            "{} contains no tasks",
            file.display()
        )));
    }

    let partial = config.spawn.partial_substitution && !no_partial;
    let spawner = FallbackSpawner::from_config(&config);
    let result = spawner
        .spawn_parallel_with_fallback(&tasks, fallback, partial)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_batch(&result);
    }

    // Non-zero exit carries the first failure; the rest were printed above.
    match result.failed.into_iter().next() {
        Some(first) => first.into_session().map(|_| ()),
        None => Ok(()),
    }
}

fn print_result(result: &SpawnResult) {
    match (&result.session, result.success) {
        (Some(session), true) => {
            let via = if result.fell_back() {
                format!(" (fell back from {})", result.initial_model)
            } else {
                String::new()
            };
            println!(
                "{} {} on {}{}",
                style("spawned").green().bold(),
                session.session_id,
                session.model,
                via
            );
            println!(
                "  label {}  attempts {}  tried {}",
                result.label,
                result.attempts,
                result.chain_tried.join(" -> ")
            );
        }
        _ => {
            println!(
                "{} {} after {} attempts",
                style("failed").red().bold(),
                result.label,
                result.attempts
            );
            if let Some(ref e) = result.error {
                let kind = result.error_type.map(|t| t.to_string()).unwrap_or_default();
                println!("  [{kind}] {e}");
            }
        }
    }
}

fn print_batch(result: &ParallelResult) {
    println!(
        "{} {} spawned, {} failed, {} on a fallback model",
        style("Batch:").bold(),
        result.workers.len(),
        result.failed.len(),
        result.fallback_applied
    );
    for r in result.workers.iter().chain(&result.failed) {
        print_result(r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SpawnArgs {
        SpawnArgs {
            task: None,
            task_file: None,
            model: None,
            label: None,
            fallback: None,
            max_retries: None,
            retry_delay: None,
        }
    }

    #[test]
    fn test_request_defaults_to_primary_and_generated_label() {
        let config = WardenConfig::default();
        let request = SpawnArgs {
            task: Some("summarise".into()),
            ..args()
        }
        .into_request(&config)
        .unwrap();
        assert_eq!(request.initial_model, config.models.primary);
        assert!(request.label.starts_with("task-"));
        assert_eq!(request.label.len(), "task-".len() + 8);
        assert!(request.fallback_chain.is_none());
    }

    #[test]
    fn test_task_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.txt");
        std::fs::write(&path, "from a file").unwrap();
        let request = SpawnArgs {
            task_file: Some(path),
            max_retries: Some(5),
            ..args()
        }
        .into_request(&WardenConfig::default())
        .unwrap();
        assert_eq!(request.task, "from a file");
        assert_eq!(request.max_retries, Some(5));
    }

    #[test]
    fn test_missing_task_is_invalid() {
        let err = args().into_request(&WardenConfig::default()).unwrap_err();
        assert!(matches!(err, WardenError::InvalidRequest(_)));
    }
}
