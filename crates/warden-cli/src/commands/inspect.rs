use console::style;
use std::path::Path;

use warden_config::{WardenConfig, WarningSeverity};
use warden_core::{HealthState, Result, WardenError};
use warden_health::{JsonStateStore, StateStore};
use warden_spawn::DecisionLog;

pub(super) fn cmd_status(config: WardenConfig, json: bool) -> Result<()> {
    let store = JsonStateStore::new(config.state.state_path());
    let Some(state) = store.load()? else {
        println!("No health state at {} yet. Run `warden tick` first.", store.path().display());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let health = match state.health_state {
        HealthState::Healthy => style(state.health_state.to_string()).green(),
        HealthState::Degraded => style(state.health_state.to_string()).yellow(),
        HealthState::Critical => style(state.health_state.to_string()).red(),
    };
    println!("{} {}", style("Health:").bold(), health);
    println!("{} {}", style("Quota risk:").bold(), state.quota_risk);
    println!(
        "{} {}",
        style("Recommended:").bold(),
        state.recommended_model.as_deref().unwrap_or("none")
    );
    println!("{} {}", style("Available:").bold(), list(&state.available_models));
    println!("{} {}", style("Cooling down:").bold(), list(&state.cooldown_models));
    println!(
        "{} {} (last alerted: {})",
        style("Checked:").bold(),
        state.timestamp.to_rfc3339(),
        state.last_alert_state
    );
    Ok(())
}

fn list(models: &[String]) -> String {
    if models.is_empty() {
        "none".into()
    } else {
        models.join(", ")
    }
}

pub(super) fn cmd_decisions(config: WardenConfig, limit: usize, json: bool) -> Result<()> {
    let log = DecisionLog::new(config.state.decision_log_path());
    let records = log.tail(limit)?;

    if json {
        for r in &records {
            println!("{}", serde_json::to_string(r)?);
        }
        return Ok(());
    }
    if records.is_empty() {
        println!("No fallback decisions in {}", log.path().display());
        return Ok(());
    }

    println!("{} ({} records)", style("Fallback decisions").bold(), records.len());
    println!("{}", "-".repeat(80));
    for r in &records {
        let outcome = if r.success {
            style("ok  ").green()
        } else {
            style("FAIL").red()
        };
        let used = r.model_used.as_deref().unwrap_or("-");
        let error = r.error_type.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{}  {}  {:<20} {} -> {}  attempts {}  last error {}",
            style(r.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            outcome,
            r.task_label,
            r.original_model,
            used,
            r.attempt_number,
            error
        );
    }
    Ok(())
}

pub(super) fn cmd_config(config: WardenConfig, path: &Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("{}", style(format!("# {}", path.display())).dim());
    println!(
        "{}",
        toml::to_string_pretty(&config).map_err(|e| WardenError::Config(e.to_string()))?
    );

    // Load already rejected hard errors; what is left is advisory.
    if let Ok(warnings) = config.validate()
        && !warnings.is_empty()
    {
        println!("{}", style("Config notes:").bold());
        for w in &warnings {
            let line = w.to_string();
            match w.severity {
                WarningSeverity::Error => println!("  {}", style(line).red()),
                WarningSeverity::Warning => println!("  {}", style(line).yellow()),
                WarningSeverity::Info => println!("  {}", style(line).dim()),
            }
        }
    }
    Ok(())
}
