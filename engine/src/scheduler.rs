//! Daily job scheduler.
//!
//! A low-frequency polling loop compares the clock against each job's next
//! trigger instant. Due jobs run on their own worker thread so polling never
//! waits on a transfer. A job whose previous execution is still running when
//! it comes due again is skipped for that trigger, and missed triggers are
//! never backfilled: after any firing the next trigger is simply the next
//! occurrence of the time of day.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use crossbeam_channel::{select, tick, Receiver};

use crate::error::ConfigError;

// A wall-clock time missing on several consecutive days does not happen in
// practice; the bound only keeps next_after total.
const MAX_LOOKAHEAD_DAYS: usize = 8;

/// Parse a 24-hour `HH:MM` or `HH:MM:SS` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ConfigError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ConfigError::InvalidTimeOfDay(value.to_string()))
}

/// Once-per-day trigger at a fixed local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    at: NaiveTime,
}

impl Schedule {
    pub fn daily(at: NaiveTime) -> Self {
        Schedule { at }
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// The first instant strictly after `now` whose wall-clock time is the
    /// trigger time. Days on which that time does not exist (DST gap) are
    /// skipped; an ambiguous time resolves to its earlier instant.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut date = now.date_naive();
        for _ in 0..MAX_LOOKAHEAD_DAYS {
            if let Some(candidate) = tz.from_local_datetime(&date.and_time(self.at)).earliest() {
                if candidate > *now {
                    return candidate;
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        now.clone() + chrono::Duration::days(1)
    }
}

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Identifies a job registered with a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle(usize);

/// What a poll did with a due job.
#[derive(Debug)]
pub enum Firing {
    /// The job was started on `worker`.
    Started {
        job: JobHandle,
        worker: thread::JoinHandle<()>,
    },
    /// The previous execution was still running, so this trigger was dropped.
    SkippedBusy { job: JobHandle },
}

type Job = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    name: String,
    schedule: Schedule,
    job: Job,
    next_run: DateTime<Local>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the worker ends, even by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fires registered jobs once per day at their configured time.
pub struct JobScheduler {
    entries: Vec<Entry>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl JobScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self::with_clock(poll_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(poll_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        JobScheduler {
            entries: Vec::new(),
            clock,
            poll_interval,
        }
    }

    /// Register `job` to run every day at the schedule's time of day. The
    /// first run is the next occurrence after registration.
    pub fn schedule<F>(&mut self, name: impl Into<String>, schedule: Schedule, job: F) -> JobHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let next_run = schedule.next_after(&self.clock.now());
        tracing::info!(job = %name, at = %schedule.at(), next_run = %next_run, "job scheduled");

        self.entries.push(Entry {
            name,
            schedule,
            job: Arc::new(job),
            next_run,
            running: Arc::new(AtomicBool::new(false)),
        });
        JobHandle(self.entries.len() - 1)
    }

    pub fn next_run(&self, handle: JobHandle) -> Option<DateTime<Local>> {
        self.entries.get(handle.0).map(|e| e.next_run)
    }

    pub fn is_running(&self, handle: JobHandle) -> bool {
        self.entries
            .get(handle.0)
            .is_some_and(|e| e.running.load(Ordering::Acquire))
    }

    /// Start every job due at `now`. Each due job fires at most once per
    /// call, and its next trigger moves to the next occurrence after `now`.
    pub fn poll(&mut self, now: DateTime<Local>) -> Vec<Firing> {
        let mut firings = Vec::new();

        for (index, entry) in self.entries.iter_mut().enumerate() {
            if now < entry.next_run {
                continue;
            }
            let job = JobHandle(index);
            entry.next_run = entry.schedule.next_after(&now);

            if entry
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::warn!(
                    job = %entry.name,
                    next_run = %entry.next_run,
                    "previous run still in progress, skipping this trigger"
                );
                firings.push(Firing::SkippedBusy { job });
                continue;
            }

            let guard = RunningGuard(Arc::clone(&entry.running));
            let task = Arc::clone(&entry.job);
            let spawned = thread::Builder::new()
                .name(format!("job-{}", entry.name))
                .spawn(move || {
                    let _guard = guard;
                    task();
                });

            match spawned {
                Ok(worker) => {
                    tracing::info!(job = %entry.name, next_run = %entry.next_run, "job triggered");
                    firings.push(Firing::Started { job, worker });
                }
                Err(e) => {
                    // the closure (and its guard) was dropped, so the flag is clear again
                    tracing::error!(job = %entry.name, error = %e, "failed to start job worker");
                }
            }
        }

        firings
    }

    /// Poll at the configured interval until `shutdown` receives a value or
    /// is disconnected. Running jobs are not interrupted.
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        let ticker = tick(self.poll_interval);
        tracing::info!(jobs = self.entries.len(), "scheduler started");

        loop {
            select! {
                recv(ticker) -> _ => {
                    let now = self.clock.now();
                    self.poll(now);
                }
                recv(shutdown) -> _ => {
                    tracing::info!("scheduler stopping");
                    break;
                }
            }
        }
    }
}
