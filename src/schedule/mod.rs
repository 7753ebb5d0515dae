//! Cron-driven job runner.
//!
//! A job is a tokio task that sleeps until the next time its expression
//! matches (UTC), spawns the callback, and repeats until cancelled. Every
//! fire runs as its own task, so a slow callback never delays the next fire
//! and the scheduler itself does no overlap suppression.
//!
//! Expressions use the `cron` crate's six or seven field form:
//!
//! ```text
//! sec  min  hour  day-of-month  month  day-of-week  [year]
//! ```
//!
//! Classic five-field crontab expressions are accepted too; they fire at
//! second zero.
//!
//! Day-of-week numbers follow crontab: `0` through `6` are Sunday through
//! Saturday and `7` is Sunday again. The `cron` crate numbers days from 1, so
//! numeric day-of-week fields are rewritten to day names before parsing.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression {expression:?}: {source}")]
    InvalidExpression {
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let normalized = normalize(expression);
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|source| ScheduleError::InvalidExpression {
                expression: expression.to_string(),
                source,
            })?;
        Ok(CronSchedule {
            expression: expression.trim().to_string(),
            schedule,
        })
    }

    /// The expression as written, before normalization.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Position of the day-of-week field once a seconds field is present.
const DAY_OF_WEEK_FIELD: usize = 5;

fn normalize(expression: &str) -> String {
    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    if fields.len() == 5 {
        fields.insert(0, "0".to_string());
    }
    if let Some(field) = fields.get_mut(DAY_OF_WEEK_FIELD) {
        if let Some(names) = weekday_names(field) {
            *field = names;
        }
    }
    fields.join(" ")
}

/// Rewrites a numeric day-of-week field as a list of day names.
///
/// Returns `None` for fields without digits and for anything malformed, which
/// are left for the `cron` crate to accept or reject.
fn weekday_names(field: &str) -> Option<String> {
    if !field.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut days = [false; 7];
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
            None => (part, 1),
        };
        let (start, end) = match range {
            "*" | "?" => (0, 7),
            _ => match range.split_once('-') {
                Some((start, end)) => (weekday_number(start)?, weekday_number(end)?),
                // `N/S` runs from N to the end of the week.
                None if part.contains('/') => (weekday_number(range)?, 7),
                None => {
                    let day = weekday_number(range)?;
                    (day, day)
                }
            },
        };
        if start > end {
            return None;
        }
        for day in (start..=end).step_by(step) {
            days[day % 7] = true;
        }
    }

    let names: Vec<&str> = WEEKDAYS
        .iter()
        .zip(days)
        .filter_map(|(name, set)| set.then_some(*name))
        .collect();
    Some(names.join(","))
}

/// A crontab day number (0-7) or a three-letter day name.
fn weekday_number(token: &str) -> Option<usize> {
    if let Ok(n) = token.parse::<usize>() {
        return (n <= 7).then_some(n);
    }
    WEEKDAYS.iter().position(|name| name.eq_ignore_ascii_case(token))
}

/// Owner of a running job. Dropping it cancels the job.
#[derive(Debug)]
pub struct JobHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Stops future fires. A callback that is already running finishes.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the job and waits for its timer task to exit. Once this
    /// returns the job starts no further runs.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                warn!(error = %e, "Job timer task panicked");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the timer task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Parses `expression` and starts a job firing `callback` on it.
///
/// The job also stops when `parent` is cancelled.
pub fn schedule<F, Fut>(
    expression: &str,
    parent: &CancellationToken,
    callback: F,
) -> Result<JobHandle, ScheduleError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Ok(spawn_job(CronSchedule::parse(expression)?, parent, callback))
}

/// Starts a job for an already parsed schedule.
pub fn spawn_job<F, Fut>(schedule: CronSchedule, parent: &CancellationToken, callback: F) -> JobHandle
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = parent.child_token();
    let task = tokio::spawn(run_job(schedule, token.clone(), callback));
    JobHandle { token, task }
}

async fn run_job<F, Fut>(schedule: CronSchedule, token: CancellationToken, callback: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        // The sleep clock and the wall clock can disagree slightly; never
        // look for a fire time at or before the one just taken.
        let now = Utc::now();
        let from = match last_fire {
            Some(last) if last > now => last,
            _ => now,
        };

        let Some(next) = schedule.next_after(from) else {
            debug!(cron = %schedule.expression(), "Schedule has no further fire times");
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        trace!(cron = %schedule.expression(), %next, ?wait, "Sleeping until next fire");

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(cron = %schedule.expression(), "Job cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        last_fire = Some(next);
        fire(&token, &callback);
    }
}

/// Spawns one run of `callback`. The run is dropped unstarted if the job has
/// been cancelled by the time the task is polled.
fn fire<F, Fut>(token: &CancellationToken, callback: &F) -> JoinHandle<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let run = callback();
    let token = token.clone();
    tokio::spawn(async move {
        if token.is_cancelled() {
            trace!("Dropping fire of a cancelled job");
            return;
        }
        run.await;
    })
}
