use console::style;

use warden_config::WardenConfig;
use warden_core::{Health, HealthState, Result};
use warden_health::{TickOutcome, TickReport, TickRunner};

/// One monitoring pass. Health problems are reported through the notifier,
/// never through the exit code; only a failure to persist the snapshot
/// makes this return `Err`.
pub(super) async fn cmd_tick(config: WardenConfig, json: bool) -> Result<()> {
    let runner = TickRunner::from_config(&config)?;
    match runner.run().await? {
        TickReport::Skipped => {
            if json {
                println!("{}", serde_json::json!({ "skipped": true }));
            } else {
                println!("{} another tick is already running", style("skipped:").yellow());
            }
        }
        TickReport::Completed(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &TickOutcome) {
    let state = &outcome.state;
    let label = match state.health_state {
        HealthState::Healthy => style(state.health_state.to_string()).green(),
        HealthState::Degraded => style(state.health_state.to_string()).yellow(),
        HealthState::Critical => style(state.health_state.to_string()).red(),
    };
    println!("{} {}  (quota risk: {})", style("Health:").bold(), label, state.quota_risk);
    println!(
        "{} {}",
        style("Recommended:").bold(),
        state.recommended_model.as_deref().unwrap_or("none")
    );

    for p in &outcome.providers {
        let health = match p.health.health {
            Health::Healthy => style(p.health.health.as_str()).green(),
            Health::Degraded => style(p.health.health.as_str()).yellow(),
            Health::Down => style(p.health.health.as_str()).red(),
            Health::Unknown => style(p.health.health.as_str()).dim(),
        };
        println!(
            "  {:<12} {:<9} quota {} ({})",
            p.provider_id,
            health,
            p.health.quota_status.as_str(),
            p.health.quota_source.as_str()
        );
    }

    for (name, reason) in &outcome.degraded_collectors {
        println!("  {} {name}: {reason}", style("collector unavailable:").dim());
    }

    if let Some(ref alert) = outcome.alert {
        println!(
            "{} {} -> {} ({})",
            style("Alert:").bold().red(),
            alert.previous_state,
            alert.new_state,
            alert.severity
        );
    }
}
