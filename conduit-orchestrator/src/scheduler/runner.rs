//! Cron runner
//!
//! Standard 5-field cron expressions are run at second 0 of every matching
//! minute in the configured timezone.

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use conduit_core::domain::pipeline::Pipeline;
use cron::Schedule;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::FireHandler;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Scheduling error type
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid cron spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

impl ScheduleError {
    fn invalid(spec: &str, reason: impl Into<String>) -> Self {
        ScheduleError::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Spec parsing
// =============================================================================

/// Parse a standard 5-field cron expression.
///
/// A literal seconds field is prepended and numeric days of week are
/// rewritten as day names, because the underlying parser counts Sunday as 1
/// where standard cron counts it as 0 (or 7).
pub fn parse_spec(spec: &str) -> Result<Schedule, ScheduleError> {
    let fields: Vec<&str> = spec.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(ScheduleError::invalid(
            spec,
            format!("expected 5 fields, found {}", fields.len()),
        ));
    }

    let day_of_week = normalize_day_of_week(spec, fields[4])?;
    let expression = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    );

    Schedule::from_str(&expression).map_err(|e| ScheduleError::invalid(spec, e.to_string()))
}

fn normalize_day_of_week(spec: &str, field: &str) -> Result<String, ScheduleError> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(field.to_string());
    }

    let parse_day = |raw: &str| -> Result<usize, ScheduleError> {
        match raw.parse::<usize>() {
            Ok(day) if day <= 7 => Ok(day),
            _ => Err(ScheduleError::invalid(
                spec,
                format!("invalid day of week '{raw}'"),
            )),
        }
    };

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => match step.parse::<usize>() {
                Ok(step) if step > 0 => (base, Some(step)),
                _ => return Err(ScheduleError::invalid(spec, format!("invalid step '{step}'"))),
            },
            None => (item, None),
        };

        let (start, end) = if base == "*" {
            (0, 6)
        } else if let Some((start, end)) = base.split_once('-') {
            (parse_day(start)?, parse_day(end)?)
        } else {
            let day = parse_day(base)?;
            (day, if step.is_some() { 6 } else { day })
        };

        if start > end {
            return Err(ScheduleError::invalid(
                spec,
                format!("day of week range '{base}' is reversed"),
            ));
        }

        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days.insert(day % 7);
        }
    }

    Ok(days
        .into_iter()
        .map(|day| DAY_NAMES[day])
        .collect::<Vec<_>>()
        .join(","))
}

// =============================================================================
// Timezones
// =============================================================================

/// Timezone a schedule is evaluated in
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CronTimezone {
    Named(Tz),
    Local,
}

impl CronTimezone {
    /// Resolve an IANA name; an empty name means UTC
    pub fn parse(name: &str) -> Result<Self, ScheduleError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(CronTimezone::Named(Tz::UTC));
        }
        name.parse::<Tz>()
            .map(CronTimezone::Named)
            .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))
    }

    /// Resolve an IANA name, falling back to the local timezone
    pub fn resolve_or_local(name: &str) -> Self {
        match Self::parse(name) {
            Ok(tz) => tz,
            Err(e) => {
                tracing::warn!("{}, falling back to local time", e);
                CronTimezone::Local
            }
        }
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CronTimezone::Named(tz) => schedule
                .after(&after.with_timezone(tz))
                .next()
                .map(|t| t.with_timezone(&Utc)),
            CronTimezone::Local => schedule
                .after(&after.with_timezone(&Local))
                .next()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Next scheduled run of `pipeline` in milliseconds since epoch.
///
/// Returns 0 when the pipeline is deactivated, unscheduled, or its spec or
/// timezone cannot be resolved.
pub fn next_run_time(pipeline: &Pipeline) -> i64 {
    next_run_time_at(pipeline, Utc::now())
}

pub fn next_run_time_at(pipeline: &Pipeline, now: DateTime<Utc>) -> i64 {
    if !pipeline.is_scheduled() {
        return 0;
    }

    let trigger = &pipeline.cron_trigger;
    let timezone = match CronTimezone::parse(&trigger.timezone) {
        Ok(tz) => tz,
        Err(e) => {
            tracing::error!("Pipeline {}: {}", pipeline.id, e);
            return 0;
        }
    };
    let schedule = match parse_spec(&trigger.spec) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::error!("Pipeline {}: {}", pipeline.id, e);
            return 0;
        }
    };

    timezone
        .next_after(&schedule, now)
        .map(|t| t.timestamp_millis())
        .unwrap_or(0)
}

// =============================================================================
// Runner
// =============================================================================

/// Start and stop counters of a runner
#[derive(Debug, Default)]
pub struct RunnerStats {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl RunnerStats {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Fires a job for one pipeline whenever its cron schedule is due
pub struct CronRunner {
    pipeline_id: Uuid,
    spec: String,
    timezone: CronTimezone,
    /// `None` for an empty spec, which never fires
    schedule: Option<Schedule>,
    job: Option<Arc<dyn FireHandler>>,
    cancel: Option<CancellationToken>,
    stats: Arc<RunnerStats>,
}

impl CronRunner {
    /// Build a runner for `spec` evaluated in `timezone`.
    ///
    /// An unresolvable timezone falls back to local time; an invalid spec is
    /// rejected. An empty spec yields a runner that never fires.
    pub fn new(pipeline_id: Uuid, spec: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let spec = spec.trim();
        let schedule = if spec.is_empty() {
            None
        } else {
            Some(parse_spec(spec)?)
        };

        Ok(Self {
            pipeline_id,
            spec: spec.to_string(),
            timezone: CronTimezone::resolve_or_local(timezone),
            schedule,
            job: None,
            cancel: None,
            stats: Arc::new(RunnerStats::default()),
        })
    }

    /// Runner for the pipeline's cron trigger
    pub fn for_pipeline(pipeline: &Pipeline) -> Result<Self, ScheduleError> {
        Self::new(
            pipeline.id,
            &pipeline.cron_trigger.spec,
            &pipeline.cron_trigger.timezone,
        )
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn timezone(&self) -> CronTimezone {
        self.timezone
    }

    pub fn is_empty(&self) -> bool {
        self.schedule.is_none()
    }

    pub fn is_running(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    pub fn stats(&self) -> Arc<RunnerStats> {
        self.stats.clone()
    }

    /// Set the job run on every fire
    pub fn add_job(&mut self, job: Arc<dyn FireHandler>) {
        self.job = Some(job);
    }

    /// Begin firing. No-op while already running or when the spec is empty.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let Some(schedule) = self.schedule.clone() else {
            return;
        };

        let token = CancellationToken::new();
        self.stats.starts.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(fire_loop(
            self.pipeline_id,
            schedule,
            self.timezone,
            self.job.clone(),
            token.clone(),
        ));
        self.cancel = Some(token);

        tracing::debug!("Cron runner started for pipeline {} ({})", self.pipeline_id, self.spec);
    }

    /// Cancel future fires. A job already running is left to finish.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
            self.stats.stops.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Cron runner stopped for pipeline {}", self.pipeline_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn with_raw_schedule(pipeline_id: Uuid, expression: &str) -> Self {
        Self {
            pipeline_id,
            spec: expression.to_string(),
            timezone: CronTimezone::Named(Tz::UTC),
            schedule: Some(Schedule::from_str(expression).unwrap()),
            job: None,
            cancel: None,
            stats: Arc::new(RunnerStats::default()),
        }
    }
}

impl Drop for CronRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CronRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronRunner")
            .field("pipeline_id", &self.pipeline_id)
            .field("spec", &self.spec)
            .field("timezone", &self.timezone)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn fire_loop(
    pipeline_id: Uuid,
    schedule: Schedule,
    timezone: CronTimezone,
    job: Option<Arc<dyn FireHandler>>,
    token: CancellationToken,
) {
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        // Never fire the same instant twice when the timer wakes slightly early
        let from = last_fire.map_or(now, |last| last.max(now));
        let Some(next) = timezone.next_after(&schedule, from) else {
            tracing::debug!("Schedule of pipeline {} has no upcoming fire", pipeline_id);
            break;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        last_fire = Some(next);

        match &job {
            Some(job) => {
                let job = job.clone();
                tokio::spawn(async move { job.fire(pipeline_id).await });
            }
            None => tracing::debug!("Cron runner for pipeline {} has no job", pipeline_id),
        }
    }
}
