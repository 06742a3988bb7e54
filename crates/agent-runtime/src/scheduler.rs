//! Recurring-job scheduler
//!
//! Runs tool invocations on date, interval or cron triggers. Each started job
//! gets its own tokio task that sleeps until the next fire time, invokes the
//! tool through the bound [`ToolDispatcher`] and reschedules itself.
//!
//! Jobs live in memory only. The dispatcher is held weakly: a scheduler is
//! usually itself reachable from the registry (through the scheduler tool),
//! so a strong handle would keep both alive forever.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, Weak};

use agent_core::error::ToolError;
use agent_core::tool::{InvocationRequest, Parameters, ToolDispatcher};
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scheduler failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler has no tool dispatcher bound")]
    NotBound,

    #[error("scheduler already has a tool dispatcher bound")]
    AlreadyBound,

    #[error("tool '{name}' not found; available tools: [{}]", available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("unknown trigger '{0}'; expected date, interval or cron")]
    UnknownTrigger(String),

    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("invalid job arguments: {0}")]
    InvalidArguments(String),

    #[error("job '{0}' already exists")]
    DuplicateJob(String),

    #[error("no job with id '{0}'")]
    JobNotFound(String),

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,
}

impl From<SchedulerError> for ToolError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::UnknownTool { .. }
            | SchedulerError::UnknownTrigger(_)
            | SchedulerError::InvalidTrigger(_)
            | SchedulerError::InvalidArguments(_) => ToolError::invalid(err.to_string()),
            other => ToolError::execution(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

// ============================================================================
// Triggers
// ============================================================================

/// When a job fires
#[derive(Clone, Debug)]
pub enum Trigger {
    /// Once, at the given instant
    Date(DateTime<Utc>),
    /// Repeatedly, with a fixed period
    Interval(TimeDelta),
    /// On every match of a cron schedule
    Cron {
        expression: String,
        schedule: Box<cron::Schedule>,
    },
}

/// Cron fields in order of the seconds-first expression, with the value used
/// for an unspecified field finer than the finest one given.
const CRON_FIELDS: [(&str, &str); 5] = [
    ("second", "0"),
    ("minute", "0"),
    ("hour", "0"),
    ("day", "1"),
    ("month", "1"),
];

/// Longest accepted interval: one hundred years
const MAX_INTERVAL_SECONDS: f64 = 100.0 * 365.0 * 86_400.0;

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// How numeric weekdays are written in a day-of-week field
#[derive(Clone, Copy, Debug)]
enum WeekdayNumbering {
    /// crontab lines: 0 and 7 are Sunday, 1 is Monday
    Crontab,
    /// per-field trigger arguments: 0 is Monday, 6 is Sunday
    MondayFirst,
}

impl WeekdayNumbering {
    fn highest(self) -> usize {
        match self {
            WeekdayNumbering::Crontab => 7,
            WeekdayNumbering::MondayFirst => 6,
        }
    }

    fn name(self, day: usize) -> Result<&'static str> {
        if day > self.highest() {
            return Err(SchedulerError::InvalidTrigger(format!(
                "day of week {day} is out of range 0-{}",
                self.highest()
            )));
        }
        let index = match self {
            WeekdayNumbering::Crontab => day % 7,
            WeekdayNumbering::MondayFirst => (day + 1) % 7,
        };
        Ok(WEEKDAY_NAMES[index])
    }
}

/// Rewrite the numeric weekdays of a day-of-week field as day names.
///
/// Names and a bare `*` pass through. Numeric ranges and steps expand to an
/// explicit list, so `5-7` in crontab numbering becomes `Fri,Sat,Sun` rather
/// than a range that wraps past Saturday.
fn weekday_names(field: &str, numbering: WeekdayNumbering) -> Result<String> {
    let items = field
        .split(',')
        .map(|item| weekday_item(item.trim(), numbering))
        .collect::<Result<Vec<_>>>()?;
    Ok(items.join(","))
}

fn weekday_item(item: &str, numbering: WeekdayNumbering) -> Result<String> {
    let invalid = || SchedulerError::InvalidTrigger(format!("day of week '{item}' is not valid"));
    let number = |s: &str| s.trim().parse::<usize>().ok();
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(number(step).filter(|s| *s > 0).ok_or_else(invalid)?)),
        None => (item, None),
    };

    let (first, last) = match (range, range.split_once('-')) {
        ("*", _) if step.is_none() => return Ok(item.to_string()),
        ("*", _) => (0, 6),
        (_, Some((first, last))) => match (number(first), number(last)) {
            (Some(first), Some(last)) => (first, last),
            // Named range, possibly with one numeric end
            _ => {
                let suffix = item.find('/').map_or("", |at| &item[at..]);
                return Ok(format!(
                    "{}-{}{suffix}",
                    weekday_end(first, numbering)?,
                    weekday_end(last, numbering)?
                ));
            }
        },
        (_, None) => match (number(range), step) {
            (Some(day), None) => return numbering.name(day).map(str::to_string),
            (Some(day), Some(_)) => (day, 6),
            (None, _) => return Ok(item.to_string()),
        },
    };
    if first > last {
        return Err(invalid());
    }

    let mut names: Vec<&str> = Vec::new();
    for day in (first..=last).step_by(step.unwrap_or(1)) {
        let name = numbering.name(day)?;
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names.join(","))
}

fn weekday_end(end: &str, numbering: WeekdayNumbering) -> Result<&str> {
    match end.trim().parse::<usize>() {
        Ok(day) => numbering.name(day),
        Err(_) => Ok(end.trim()),
    }
}

impl Trigger {
    /// Build a trigger from its kind and argument map
    ///
    /// - `date`: `{run_date}` as RFC 3339, or `YYYY-MM-DD HH:MM:SS` local time
    /// - `interval`: any of `{weeks, days, hours, minutes, seconds}`
    /// - `cron`: `{expression}` or per-field `{second, minute, hour, day, month, day_of_week, year}`
    pub fn from_args(kind: &str, args: &Map<String, Value>) -> Result<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "date" => Self::date_from_args(args),
            "interval" => Self::interval_from_args(args),
            "cron" => Self::cron_from_args(args),
            other => Err(SchedulerError::UnknownTrigger(other.to_string())),
        }
    }

    /// Cron trigger from a seconds-first expression (6 or 7 fields, where
    /// numeric weekdays follow the `cron` crate: 1 is Sunday) or a standard
    /// 5-field crontab line (0 or 7 is Sunday, 1 is Monday).
    pub fn cron(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let expression = if let [minute, hour, day, month, day_of_week] = fields.as_slice() {
            let day_of_week = weekday_names(day_of_week, WeekdayNumbering::Crontab)?;
            format!("0 {minute} {hour} {day} {month} {day_of_week}")
        } else {
            fields.join(" ")
        };
        let schedule = cron::Schedule::from_str(&expression)
            .map_err(|e| SchedulerError::InvalidTrigger(format!("cron expression '{expression}': {e}")))?;
        Ok(Trigger::Cron {
            expression,
            schedule: Box::new(schedule),
        })
    }

    fn date_from_args(args: &Map<String, Value>) -> Result<Self> {
        let raw = args
            .get("run_date")
            .and_then(Value::as_str)
            .ok_or_else(|| SchedulerError::InvalidTrigger("date trigger requires 'run_date'".into()))?;
        parse_run_date(raw).map(Trigger::Date)
    }

    fn interval_from_args(args: &Map<String, Value>) -> Result<Self> {
        const UNITS: [(&str, f64); 5] = [
            ("weeks", 604_800.0),
            ("days", 86_400.0),
            ("hours", 3_600.0),
            ("minutes", 60.0),
            ("seconds", 1.0),
        ];

        let mut total_seconds = 0.0;
        for (key, value) in args {
            let factor = UNITS
                .iter()
                .find(|(unit, _)| *unit == key.as_str())
                .map(|(_, factor)| *factor)
                .ok_or_else(|| SchedulerError::InvalidTrigger(format!("unknown interval field '{key}'")))?;
            let amount = value
                .as_f64()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| SchedulerError::InvalidTrigger(format!("'{key}' must be a non-negative number")))?;
            total_seconds += amount * factor;
        }

        if !total_seconds.is_finite() || total_seconds > MAX_INTERVAL_SECONDS {
            return Err(SchedulerError::InvalidTrigger(format!(
                "interval must not exceed {} days",
                MAX_INTERVAL_SECONDS / 86_400.0
            )));
        }
        #[allow(clippy::cast_possible_truncation)]
        let millis = (total_seconds * 1000.0).round() as i64;
        if millis <= 0 {
            return Err(SchedulerError::InvalidTrigger("interval must be longer than zero".into()));
        }
        TimeDelta::try_milliseconds(millis)
            .map(Trigger::Interval)
            .ok_or_else(|| SchedulerError::InvalidTrigger(format!("interval of {millis}ms is out of range")))
    }

    fn cron_from_args(args: &Map<String, Value>) -> Result<Self> {
        if let Some(expression) = args.get("expression") {
            let expression = expression
                .as_str()
                .ok_or_else(|| SchedulerError::InvalidTrigger("'expression' must be a string".into()))?;
            return Self::cron(expression);
        }

        let field = |name: &str| -> Result<Option<String>> {
            match args.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
                Some(Value::Number(n)) => Ok(Some(n.to_string())),
                Some(other) => Err(SchedulerError::InvalidTrigger(format!(
                    "cron field '{name}' must be a string or number, got {other}"
                ))),
            }
        };

        let known = ["second", "minute", "hour", "day", "month", "day_of_week", "year"];
        if let Some(unknown) = args.keys().find(|k| !known.contains(&k.as_str())) {
            return Err(SchedulerError::InvalidTrigger(format!("unknown cron field '{unknown}'")));
        }

        let given: Vec<Option<String>> = CRON_FIELDS
            .iter()
            .map(|&(name, _)| field(name))
            .collect::<Result<_>>()?;
        let day_of_week = field("day_of_week")?;
        let year = field("year")?;

        // Unspecified fields finer than the finest given one take their
        // minimum, coarser ones match everything.
        let finest = given.iter().position(Option::is_some);
        if finest.is_none() && day_of_week.is_none() && year.is_none() {
            return Err(SchedulerError::InvalidTrigger(
                "cron trigger requires 'expression' or at least one field".into(),
            ));
        }
        // With only day_of_week or year given, fire at midnight of matching days.
        let finest = finest.unwrap_or(3);

        let mut parts: Vec<String> = given
            .into_iter()
            .zip(CRON_FIELDS)
            .enumerate()
            .map(|(idx, (value, (_, minimum)))| {
                value.unwrap_or_else(|| if idx < finest { minimum.to_string() } else { "*".into() })
            })
            .collect();
        let day_of_week = match day_of_week {
            Some(days) => weekday_names(&days, WeekdayNumbering::MondayFirst)?,
            None => "*".into(),
        };
        parts.push(day_of_week);
        if let Some(year) = year {
            parts.push(year);
        }

        Self::cron(&parts.join(" "))
    }

    /// Next fire time given the previous one (`None` for a fresh job);
    /// `None` once the trigger is spent.
    pub fn next_fire(&self, previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Date(at) => previous.is_none().then_some(*at),
            // Measured from the end of the previous run so slow runs never pile up.
            Trigger::Interval(every) => now.checked_add_signed(*every),
            Trigger::Cron { schedule, .. } => {
                let from = previous.map_or(now, |p| p.max(now));
                schedule.after(&from).next()
            }
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Date(at) => write!(f, "date[{}]", at.to_rfc3339()),
            Trigger::Interval(every) => write!(f, "interval[{}s]", every.num_milliseconds() as f64 / 1000.0),
            Trigger::Cron { expression, .. } => write!(f, "cron[{expression}]"),
        }
    }
}

fn parse_run_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| SchedulerError::InvalidTrigger(format!("run_date '{raw}': {e}")))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| SchedulerError::InvalidTrigger(format!("run_date '{raw}' is ambiguous in local time")))
}

// ============================================================================
// Jobs
// ============================================================================

/// Request to add a job
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub tool_name: String,
    pub trigger: Trigger,
    pub job_id: Option<String>,
    /// Bound to the tool's parameters in declaration order
    pub args: Vec<Value>,
    pub kwargs: Parameters,
}

impl JobSpec {
    pub fn new(tool_name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            tool_name: tool_name.into(),
            trigger,
            job_id: None,
            args: Vec::new(),
            kwargs: Parameters::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Parameters) -> Self {
        self.kwargs = kwargs;
        self
    }
}

/// Listing entry for one job
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub tool_name: String,
    pub next_run_time: Option<DateTime<Utc>>,
    pub trigger: String,
}

struct Job {
    tool_name: String,
    parameters: Parameters,
    trigger: Trigger,
    next_run: Option<DateTime<Utc>>,
    task: Option<JoinHandle<()>>,
}

impl Job {
    fn info(&self, id: &str) -> JobInfo {
        JobInfo {
            id: id.to_string(),
            tool_name: self.tool_name.clone(),
            next_run_time: self.next_run,
            trigger: self.trigger.to_string(),
        }
    }
}

#[derive(Default)]
struct State {
    running: bool,
    jobs: HashMap<String, Job>,
}

struct Inner {
    dispatcher: OnceLock<Weak<dyn ToolDispatcher>>,
    state: Mutex<State>,
}

/// In-memory job scheduler; cheap to clone, clones share jobs
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher: OnceLock::new(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Attach the dispatcher jobs run through. Can be done once.
    pub fn bind(&self, dispatcher: &Arc<dyn ToolDispatcher>) -> Result<()> {
        self.inner
            .dispatcher
            .set(Arc::downgrade(dispatcher))
            .map_err(|_| SchedulerError::AlreadyBound)
    }

    fn dispatcher(&self) -> Result<Arc<dyn ToolDispatcher>> {
        self.inner
            .dispatcher
            .get()
            .and_then(Weak::upgrade)
            .ok_or(SchedulerError::NotBound)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    /// Register a job; it starts firing immediately when the scheduler is
    /// running, otherwise on [`start`](Self::start).
    pub async fn add(&self, spec: JobSpec) -> Result<JobInfo> {
        let parameters = self.resolve_parameters(&spec)?;
        let now = Utc::now();
        if let Trigger::Date(at) = &spec.trigger {
            if *at < now {
                return Err(SchedulerError::InvalidTrigger(format!(
                    "run_date {} is in the past",
                    at.to_rfc3339()
                )));
            }
        }

        let id = spec
            .job_id
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let next_run = spec
            .trigger
            .next_fire(None, now)
            .ok_or_else(|| SchedulerError::InvalidTrigger(format!("{} has no future fire time", spec.trigger)))?;

        let mut state = self.inner.state.lock().await;
        if state.jobs.contains_key(&id) {
            return Err(SchedulerError::DuplicateJob(id));
        }

        let mut job = Job {
            tool_name: spec.tool_name,
            parameters,
            trigger: spec.trigger,
            next_run: Some(next_run),
            task: None,
        };
        if state.running {
            job.task = Some(self.spawn_job(id.clone()));
        }
        let info = job.info(&id);
        state.jobs.insert(id, job);

        info!(job_id = %info.id, tool = %info.tool_name, trigger = %info.trigger, "Job added");
        Ok(info)
    }

    /// Remove a job, cancelling its task
    pub async fn remove(&self, id: &str) -> Result<()> {
        let job = self
            .inner
            .state
            .lock()
            .await
            .jobs
            .remove(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        if let Some(task) = job.task {
            task.abort();
        }
        info!(job_id = %id, "Job removed");
        Ok(())
    }

    /// All jobs ordered by next run time
    pub async fn list(&self) -> Vec<JobInfo> {
        let state = self.inner.state.lock().await;
        let mut jobs: Vec<JobInfo> = state.jobs.iter().map(|(id, job)| job.info(id)).collect();
        jobs.sort_by(|a, b| {
            // Jobs without a next run sort last.
            let key = |j: &JobInfo| (j.next_run_time.is_none(), j.next_run_time, j.id.clone());
            key(a).cmp(&key(b))
        });
        jobs
    }

    /// Start firing jobs
    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.running {
            return Err(SchedulerError::AlreadyRunning);
        }
        state.running = true;
        let ids: Vec<String> = state.jobs.keys().cloned().collect();
        for id in ids {
            let task = self.spawn_job(id.clone());
            if let Some(job) = state.jobs.get_mut(&id) {
                job.task = Some(task);
            }
        }
        info!(jobs = state.jobs.len(), "Scheduler started");
        Ok(())
    }

    /// Stop firing jobs; registered jobs stay and resume on the next start
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !state.running {
            return Err(SchedulerError::NotRunning);
        }
        state.running = false;
        for job in state.jobs.values_mut() {
            if let Some(task) = job.task.take() {
                task.abort();
            }
        }
        info!("Scheduler shut down");
        Ok(())
    }

    /// Merge positional and keyword arguments into named parameters
    fn resolve_parameters(&self, spec: &JobSpec) -> Result<Parameters> {
        let directory = self.dispatcher()?.directory();
        let info = directory.get(&spec.tool_name).ok_or_else(|| SchedulerError::UnknownTool {
            name: spec.tool_name.clone(),
            available: directory.names().map(str::to_string).collect(),
        })?;

        if spec.args.len() > info.parameters.len() {
            return Err(SchedulerError::InvalidArguments(format!(
                "{} takes at most {} positional argument(s), got {}",
                spec.tool_name,
                info.parameters.len(),
                spec.args.len()
            )));
        }

        let mut parameters = Parameters::new();
        for (name, value) in info.parameters.iter().zip(&spec.args) {
            parameters.insert(name.clone(), value.clone());
        }
        for (name, value) in &spec.kwargs {
            if parameters.contains_key(name) {
                return Err(SchedulerError::InvalidArguments(format!(
                    "{} got multiple values for '{name}'",
                    spec.tool_name
                )));
            }
            parameters.insert(name.clone(), value.clone());
        }
        Ok(parameters)
    }

    fn spawn_job(&self, id: String) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(run_job(inner, id))
    }
}

/// Body of one job's task
async fn run_job(inner: Weak<Inner>, id: String) {
    loop {
        let Some(scheduled) = next_run(&inner, &id).await else {
            return;
        };
        let wait = (scheduled - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let Some(scheduler) = inner.upgrade() else {
            return;
        };
        let request = {
            let state = scheduler.state.lock().await;
            let Some(job) = state.jobs.get(&id) else {
                return;
            };
            InvocationRequest::new(&job.tool_name, job.parameters.clone()).with_reason(format!("scheduled job {id}"))
        };

        match scheduler.dispatcher.get().and_then(Weak::upgrade) {
            Some(dispatcher) => {
                debug!(job_id = %id, tool = %request.tool_name, "Running scheduled job");
                let outcome = dispatcher.execute(&request).await;
                if outcome.is_success() {
                    info!(job_id = %id, tool = %request.tool_name, result = %outcome.render(), "Scheduled job finished");
                } else {
                    warn!(job_id = %id, tool = %request.tool_name, error = outcome.error().unwrap_or_default(), "Scheduled job failed");
                }
            }
            None => warn!(job_id = %id, "Tool dispatcher is gone, skipping scheduled run"),
        }

        let mut state = scheduler.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };
        job.next_run = job.trigger.next_fire(Some(scheduled), Utc::now());
        if job.next_run.is_none() {
            state.jobs.remove(&id);
            debug!(job_id = %id, "Job finished its schedule");
            return;
        }
    }
}

async fn next_run(inner: &Weak<Inner>, id: &str) -> Option<DateTime<Utc>> {
    let scheduler = inner.upgrade()?;
    let state = scheduler.state.lock().await;
    state.jobs.get(id).and_then(|job| job.next_run)
}
