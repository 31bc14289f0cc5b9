//! ftp-relay - Command-line front end for the relay engine.
//!
//! Runs the relay job every day at a fixed local time (or once with `--once`),
//! logging every event to a file and narrating progress on stderr.

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::Receiver;
use engine::config::{
    DEFAULT_DESTINATION_DIR, DEFAULT_HOST, DEFAULT_REMOTE_DIR, DEFAULT_RUN_AT, DEFAULT_STAGING_DIR,
};
use engine::remote::DEFAULT_PORT;
use engine::{
    parse_time_of_day, Credentials, FileItem, FileState, FtpSource, JobHandle, JobRun, JobScheduler,
    ProgressCallback, RelayConfig, RelayJob, RunOutcome, Schedule, ServerAddress,
};

/// ftp-relay - move daily partner files from an FTP server to a shared directory
#[derive(Parser, Debug)]
#[command(name = "ftp-relay")]
#[command(version)]
#[command(about = "Download files from an FTP server every day and relocate them into a shared directory")]
struct Args {
    /// FTP server host name or IP address
    #[arg(long, env = "FTP_SERVER", default_value = DEFAULT_HOST)]
    host: String,

    /// FTP control port
    #[arg(long, env = "FTP_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory on the server holding the daily files
    #[arg(long, env = "FTP_REMOTE_DIRECTORY", default_value = DEFAULT_REMOTE_DIR)]
    remote_dir: String,

    /// FTP user (anonymous login when absent)
    #[arg(long, env = "FTP_USER")]
    user: Option<String>,

    /// FTP password (falls back to the PASS environment variable)
    #[arg(long, env = "FTP_PASS", hide_env_values = true)]
    password: Option<String>,

    /// Local staging directory for downloads
    #[arg(long, env = "RELAY_STAGING_DIR", value_name = "PATH", default_value = DEFAULT_STAGING_DIR)]
    staging_dir: PathBuf,

    /// Shared destination directory
    #[arg(long, env = "RELAY_DESTINATION_DIR", value_name = "PATH", default_value = DEFAULT_DESTINATION_DIR)]
    destination_dir: PathBuf,

    /// Daily trigger time, 24-hour local clock
    #[arg(long, env = "RELAY_AT", value_name = "HH:MM", default_value = DEFAULT_RUN_AT)]
    at: String,

    /// Event log file (appended)
    #[arg(long, env = "RELAY_LOG_FILE", value_name = "PATH", default_value = "events.log")]
    log_file: PathBuf,

    /// Read timeout on the FTP control connection in seconds (0 disables)
    #[arg(long, env = "RELAY_READ_TIMEOUT_SECS", default_value_t = 60)]
    read_timeout_secs: u64,

    /// How often the scheduler checks the clock, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Run the job once immediately and exit
    #[arg(long)]
    once: bool,

    /// Print the run report as JSON on stdout (with --once)
    #[arg(long, requires = "once")]
    json: bool,

    /// Narrate every file on stderr
    #[arg(long)]
    verbose: bool,
}

/// Console implementation of ProgressCallback, narrating a run on stderr
struct ConsoleProgress {
    verbose: bool,
    start_time: Instant,
}

impl ConsoleProgress {
    fn new(verbose: bool) -> Self {
        ConsoleProgress {
            verbose,
            start_time: Instant::now(),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_job_started(&self, run: &JobRun) {
        eprintln!("Task has started ({})", run.id);
    }

    fn on_download_started(&self, _run: &JobRun, file_index: usize, file: &FileItem) {
        if self.verbose {
            eprintln!("[{:3}] Downloading: {}", file_index, file.name);
        }
    }

    fn on_download_completed(&self, _run: &JobRun, file_index: usize, file: &FileItem) {
        if self.verbose {
            match (file.state, file.bytes_staged) {
                (FileState::Staged, Some(bytes)) => {
                    eprintln!("[{:3}] Staged: {} ({})", file_index, file.name, Self::format_bytes(bytes))
                }
                _ => eprintln!("[{:3}] Download failed: {}", file_index, file.name),
            }
        }
    }

    fn on_relocation_started(&self, _run: &JobRun, file_index: usize, file: &FileItem) {
        if self.verbose {
            eprintln!("[{:3}] Moving: {}", file_index, file.name);
        }
    }

    fn on_relocation_completed(&self, _run: &JobRun, file_index: usize, file: &FileItem) {
        if self.verbose {
            let status = match file.state {
                FileState::Relocated => "Moved",
                FileState::Failed => "Move failed",
                _ => "Unknown",
            };
            eprintln!("[{:3}] {}: {}", file_index, status, file.name);
        }
    }

    fn on_job_completed(&self, run: &JobRun) {
        let relocated = run.relocated().count();
        let failed = run.failed().count();
        let bytes: u64 = run.files.iter().filter_map(|f| f.bytes_staged).sum();

        match run.outcome {
            Some(RunOutcome::Success) => eprintln!("Task finished successfully"),
            Some(RunOutcome::PartialFailure) => eprintln!("Task finished with failures"),
            Some(RunOutcome::FatalFailure) | None => eprintln!("Task aborted"),
        }
        eprintln!("Summary: {} moved, {} failed", relocated, failed);
        eprintln!("Bytes downloaded: {}", Self::format_bytes(bytes));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));

        if let Some(error) = &run.error {
            eprintln!("Error during {}: {}", error.state, error.message);
            if run.requires_operator() {
                eprintln!("Login was rejected; check FTP_USER/FTP_PASS before the next run.");
            }
        }

        if failed > 0 {
            eprintln!();
            eprintln!("Failed files:");
            for file in run.failed() {
                let message = file.error_message.as_deref().unwrap_or("(unknown error)");
                eprintln!("  {}: {}", file.name, message);
            }
        }
    }
}

/// Parse and validate command-line arguments, then run
fn main() {
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<i32, String> {
    let config = build_config(args)?;
    logging::init_logging(&args.log_file)?;

    let source = Arc::new(FtpSource::new(config.read_timeout));
    let job = RelayJob::new(config, source);

    if args.once {
        let run = execute(&job, args.verbose);
        if args.json {
            let report = serde_json::to_string_pretty(&run)
                .map_err(|e| format!("Failed to serialize run report: {}", e))?;
            println!("{}", report);
        }
        return Ok(exit_code(&run));
    }

    run_scheduled(job, args.verbose);
    Ok(0)
}

/// Password variable read when neither --password nor FTP_PASS is given
const FALLBACK_PASSWORD_ENV: &str = "PASS";

fn resolve_password(explicit: Option<String>, fallback: Option<String>) -> String {
    explicit.or(fallback).unwrap_or_default()
}

/// Turn parsed arguments into a validated engine configuration
fn build_config(args: &Args) -> Result<RelayConfig, String> {
    let run_at = parse_time_of_day(&args.at).map_err(|e| e.to_string())?;

    let credentials = match &args.user {
        Some(user) => {
            let password = resolve_password(
                args.password.clone(),
                std::env::var(FALLBACK_PASSWORD_ENV).ok(),
            );
            Credentials::new(user.clone(), password)
        }
        None => Credentials::anonymous(),
    };

    let read_timeout = match args.read_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let config = RelayConfig {
        address: ServerAddress::new(args.host.clone(), args.port),
        credentials,
        remote_dir: args.remote_dir.clone(),
        staging_dir: args.staging_dir.clone(),
        destination_dir: args.destination_dir.clone(),
        run_at,
        read_timeout,
        poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// One run with console narration
fn execute(job: &RelayJob, verbose: bool) -> JobRun {
    let progress = ConsoleProgress::new(verbose);
    job.run(Some(&progress))
}

fn exit_code(run: &JobRun) -> i32 {
    match run.outcome {
        Some(RunOutcome::Success) => 0,
        Some(RunOutcome::PartialFailure) => 1,
        Some(RunOutcome::FatalFailure) | None => 2,
    }
}

/// Fire the job every day until Ctrl-C
fn run_scheduled(job: RelayJob, verbose: bool) {
    let config = job.config().clone();
    let mut scheduler = JobScheduler::new(config.poll_interval);
    let handle = scheduler.schedule("ftp-relay", Schedule::daily(config.run_at), move || {
        execute(&job, verbose);
    });

    if let Some(next) = scheduler.next_run(handle) {
        eprintln!(
            "Relaying {}/{} to {} daily at {} (next run {})",
            config.address,
            config.remote_dir,
            config.destination_dir.display(),
            config.run_at.format("%H:%M:%S"),
            next.format("%Y-%m-%d %H:%M:%S")
        );
    }
    tracing::info!(
        server = %config.address,
        remote_dir = %config.remote_dir,
        destination = %config.destination_dir.display(),
        "relay service started"
    );

    // First Ctrl-C stops scheduling, a second one exits immediately.
    let (stop, shutdown) = crossbeam_channel::bounded::<()>(1);
    let mut requested = false;
    let handler = ctrlc::set_handler(move || {
        if requested {
            std::process::exit(130);
        }
        requested = true;
        let _ = stop.try_send(());
    });
    if let Err(e) = handler {
        tracing::warn!(error = %e, "cannot install the Ctrl-C handler");
    }

    serve(&mut scheduler, handle, &shutdown, WAIT_POLL_INTERVAL);
    tracing::info!("relay service stopped");
}

/// How often shutdown checks whether the in-flight run has finished
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run the scheduler until `shutdown` fires, then let an in-flight run finish
fn serve(
    scheduler: &mut JobScheduler,
    handle: JobHandle,
    shutdown: &Receiver<()>,
    wait_interval: Duration,
) {
    scheduler.run(shutdown);

    if scheduler.is_running(handle) {
        eprintln!("Waiting for the running transfer to finish...");
        tracing::info!("waiting for the running transfer to finish");
        while scheduler.is_running(handle) {
            std::thread::sleep(wait_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::MemorySource;
    use tempfile::TempDir;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["ftp-relay", "--host", "ftp.partner.test", "--user", "partner"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_build_config_from_arguments() {
        let args = parse(&["--password", "secret", "--at", "06:30", "--port", "2121"])
            .expect("arguments should parse");

        let config = build_config(&args).expect("config should build");
        assert_eq!(config.address.to_string(), "ftp.partner.test:2121");
        assert_eq!(config.credentials, Credentials::new("partner", "secret"));
        assert_eq!(config.run_at, chrono::NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert_eq!(config.read_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let args = parse(&["--read-timeout-secs", "0"]).expect("arguments should parse");
        let config = build_config(&args).expect("config should build");
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn test_rejects_invalid_time() {
        let args = parse(&["--at", "7pm"]).expect("arguments should parse");
        assert!(build_config(&args).is_err(), "CLI should reject an invalid time");
    }

    #[test]
    fn test_rejects_same_directories() {
        let args = parse(&["--staging-dir", "/data/x", "--destination-dir", "/data/x"])
            .expect("arguments should parse");
        assert!(build_config(&args).is_err(), "CLI should reject identical directories");
    }

    #[test]
    fn test_json_requires_once() {
        assert!(parse(&["--json"]).is_err());
        assert!(parse(&["--json", "--once"]).is_ok());
    }

    #[test]
    fn test_execute_and_exit_codes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let args = parse(&[
            "--password",
            "secret",
            "--remote-dir",
            "outbound",
            "--staging-dir",
            temp_dir.path().join("staging").to_str().unwrap(),
            "--destination-dir",
            temp_dir.path().join("shared").to_str().unwrap(),
        ])
        .expect("arguments should parse");
        let config = build_config(&args).expect("config should build");

        let source = MemorySource::new()
            .with_credentials(Credentials::new("partner", "secret"))
            .with_file("outbound", "a.csv", "1")
            .with_file("outbound", "b.csv", "2");
        let run = execute(&RelayJob::new(config.clone(), Arc::new(source)), true);
        assert_eq!(exit_code(&run), 0);
        assert!(temp_dir.path().join("shared").join("a.csv").exists());

        let broken = MemorySource::new()
            .with_credentials(Credentials::new("partner", "secret"))
            .with_file("outbound", "c.csv", "3333")
            .with_broken_file("c.csv", 1);
        let run = execute(&RelayJob::new(config.clone(), Arc::new(broken)), false);
        assert_eq!(exit_code(&run), 1);

        let locked_out = MemorySource::new().with_credentials(Credentials::new("partner", "other"));
        let run = execute(&RelayJob::new(config, Arc::new(locked_out)), false);
        assert_eq!(exit_code(&run), 2);
    }

    #[test]
    fn test_run_report_serializes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = RelayConfig {
            staging_dir: temp_dir.path().join("staging"),
            destination_dir: temp_dir.path().join("shared"),
            remote_dir: "outbound".to_string(),
            ..RelayConfig::default()
        };
        let source = MemorySource::new().with_file("outbound", "a.csv", "1");

        let run = RelayJob::new(config, Arc::new(source)).run(None);
        let json: serde_json::Value =
            serde_json::to_value(&run).expect("run report should serialize");

        assert_eq!(json["outcome"], "success");
        assert_eq!(json["files"][0]["name"], "a.csv");
        assert_eq!(json["files"][0]["state"], "relocated");
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(ConsoleProgress::format_bytes(512), "512.00 B");
        assert_eq!(ConsoleProgress::format_bytes(2048), "2.00 KB");
        assert_eq!(ConsoleProgress::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(ConsoleProgress::format_duration(Duration::from_secs(42)), "42s");
    }

    #[test]
    fn test_password_falls_back_to_pass_variable() {
        assert_eq!(resolve_password(Some("flag".to_string()), Some("env".to_string())), "flag");
        assert_eq!(resolve_password(None, Some("env".to_string())), "env");
        assert_eq!(resolve_password(None, None), "");
    }

    #[test]
    fn test_serve_waits_for_running_transfer() {
        let mut scheduler = JobScheduler::new(Duration::from_millis(10));
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let at = chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let handle = scheduler.schedule("relay", Schedule::daily(at), move || {
            let _ = release_rx.recv();
        });
        let due = scheduler.next_run(handle).expect("job should have a next run");
        scheduler.poll(due);
        assert!(scheduler.is_running(handle));

        let (stop, shutdown) = crossbeam_channel::bounded::<()>(1);
        stop.send(()).unwrap();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let server = std::thread::spawn(move || {
            serve(&mut scheduler, handle, &shutdown, Duration::from_millis(5));
            let _ = done_tx.send(());
            scheduler
        });

        assert!(
            done_rx.recv_timeout(Duration::from_millis(200)).is_err(),
            "shutdown must wait for the running transfer"
        );
        release_tx.send(()).unwrap();
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("serve should return once the transfer ends");
        let scheduler = server.join().unwrap();
        assert!(!scheduler.is_running(handle));
    }
}
