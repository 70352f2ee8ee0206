//! Registered job executors and the simulated-duration wrapper
//!
//! Every job in this service pretends to take a fixed nominal duration so
//! that progress reporting and cooperative cancellation have something to
//! chew on; the real body runs once the simulated time has elapsed. The
//! wrapper publishes remaining-time progress on every tick and checks the
//! record's cancellation flag at the same boundary.

use chrono::Utc;
use serde_json::{json, Map, Value};
use shared::api::{ProgressInfo, TaskStatus};
use std::future::Future;
use tokio::time::{Duration, Instant};
use tracing::info;

use crate::task_manager::JobContext;

/// Nominal durations, in seconds, for each registered job type.
pub const COMPUTE_SUM_DURATION: u64 = 30;
pub const GENERATE_REPORT_DURATION: u64 = 25;
pub const LUCKY_JOB_DURATION: u64 = 20;
pub const BATCH_EMAIL_DURATION: u64 = 15;

/// Period between progress updates and cancellation checkpoints.
pub const PROGRESS_TICK: Duration = Duration::from_secs(1);

/// Terminal classification of one executor invocation.
///
/// The worker maps each tag onto a terminal record state; cancellation and
/// failure are values here, never control flow.
#[derive(Debug, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Cancelled,
    Failed(String),
    Unexpected(String),
}

/// Business failure signalled by a job body; recorded as `failed` with the
/// reason exposed to observers as-is.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{0}")]
pub struct TaskFailed(pub String);

/// Runs the executor registered for `task_type` against the given record.
pub async fn execute(ctx: &JobContext, task_type: &str, parameters: Map<String, Value>) -> JobOutcome {
    match task_type {
        "compute_sum" => {
            with_simulated_duration(ctx, COMPUTE_SUM_DURATION, PROGRESS_TICK, parameters, compute_sum)
                .await
        }
        "generate_report" => {
            with_simulated_duration(
                ctx,
                GENERATE_REPORT_DURATION,
                PROGRESS_TICK,
                parameters,
                generate_report,
            )
            .await
        }
        "batch_email" => {
            with_simulated_duration(ctx, BATCH_EMAIL_DURATION, PROGRESS_TICK, parameters, batch_email)
                .await
        }
        "lucky_job" => {
            with_simulated_duration(ctx, LUCKY_JOB_DURATION, PROGRESS_TICK, parameters, lucky_job)
                .await
        }
        other => JobOutcome::Unexpected(format!("no executor registered for task type '{other}'")),
    }
}

enum TickState {
    Continue,
    Cancelled,
}

/// Wraps a job body with a simulated processing phase.
///
/// For `duration_seconds` the wrapper loops on `tick`, publishing
/// remaining-time progress and honouring `cancel_requested` at every
/// boundary. Once the simulated time has elapsed the body runs with the
/// task's parameters and its result becomes the outcome.
pub async fn with_simulated_duration<F, Fut>(
    ctx: &JobContext,
    duration_seconds: u64,
    tick: Duration,
    parameters: Map<String, Value>,
    body: F,
) -> JobOutcome
where
    F: FnOnce(Map<String, Value>) -> Fut,
    Fut: Future<Output = Result<Value, TaskFailed>>,
{
    let total = duration_seconds.max(1);
    let entered = Instant::now();
    let started_at = Utc::now();

    let seeded = ctx
        .with_record(|rec| {
            rec.est_total_seconds = Some(total);
            let anchor = *rec.started_monotonic.get_or_insert(entered);
            rec.info.progress = 0;
            rec.info.progress_info = Some(ProgressInfo {
                message: "100% remaining".to_string(),
                started_at: Some(started_at),
                eta_seconds: Some(total),
            });
            rec.updated_at = Utc::now();
            rec.notify_change();
            anchor
        })
        .await;
    let Some(anchor) = seeded else {
        // The record vanished before the job could start.
        return JobOutcome::Cancelled;
    };

    loop {
        let elapsed = anchor.elapsed().as_secs();
        let remaining = total.saturating_sub(elapsed);
        let percent_completed = ((elapsed * 100) / total).min(100) as u8;
        let percent_remaining = 100 - percent_completed;

        let tick_state = ctx
            .with_record(|rec| {
                if rec.cancel_requested {
                    rec.info.status = TaskStatus::Cancelled;
                    rec.info.error = Some("Cancelled during processing".to_string());
                    rec.info.progress = percent_completed;
                    rec.info.progress_info = Some(ProgressInfo {
                        message: "Cancelled on request".to_string(),
                        started_at: Some(started_at),
                        eta_seconds: None,
                    });
                    rec.updated_at = Utc::now();
                    rec.notify_change();
                    return TickState::Cancelled;
                }
                rec.info.progress = percent_completed;
                rec.info.progress_info = Some(ProgressInfo {
                    message: format!("{percent_remaining}% remaining"),
                    started_at: Some(started_at),
                    eta_seconds: Some(remaining),
                });
                rec.updated_at = Utc::now();
                rec.notify_change();
                TickState::Continue
            })
            .await;
        match tick_state {
            None | Some(TickState::Cancelled) => return JobOutcome::Cancelled,
            Some(TickState::Continue) => {}
        }

        if remaining == 0 {
            break;
        }
        tokio::time::sleep(tick).await;
    }

    // Simulated time is up; run the actual (fast) body.
    match body(parameters).await {
        Ok(value) => JobOutcome::Completed(value),
        Err(TaskFailed(reason)) => JobOutcome::Failed(reason),
    }
}

async fn compute_sum(parameters: Map<String, Value>) -> Result<Value, TaskFailed> {
    let Some(numbers) = parameters.get("numbers").and_then(Value::as_array) else {
        return Err(TaskFailed(
            "Invalid 'numbers' parameter; expected list of numbers.".to_string(),
        ));
    };

    if numbers.iter().all(|n| n.is_i64()) {
        let mut sum: i64 = 0;
        for number in numbers {
            sum += number.as_i64().unwrap_or_default();
        }
        return Ok(json!(sum));
    }

    let mut sum: f64 = 0.0;
    for number in numbers {
        match number.as_f64() {
            Some(value) => sum += value,
            None => {
                return Err(TaskFailed(
                    "Invalid 'numbers' parameter; expected list of numbers.".to_string(),
                ))
            }
        }
    }
    Ok(json!(sum))
}

async fn generate_report(parameters: Map<String, Value>) -> Result<Value, TaskFailed> {
    let title = parameters
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let sections: Vec<&str> = parameters
        .get("sections")
        .and_then(Value::as_array)
        .map(|sections| sections.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    Ok(json!(format!("{title}: {}", sections.join(", "))))
}

async fn batch_email(parameters: Map<String, Value>) -> Result<Value, TaskFailed> {
    let emails = parameters.get("emails").cloned().unwrap_or(Value::Null);
    info!(emails = %emails, "Sending emails");
    // Simulated send with a transient provider failure.
    if rand::random::<f64>() < 0.2 {
        return Err(TaskFailed("Email provider temporary failure.".to_string()));
    }
    Ok(Value::Bool(true))
}

async fn lucky_job(_parameters: Map<String, Value>) -> Result<Value, TaskFailed> {
    if rand::random::<f64>() < 0.5 {
        return Err(TaskFailed("Unstable task failed randomly.".to_string()));
    }
    Ok(json!({ "ok": true }))
}
