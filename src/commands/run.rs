//! Run command implementation.
//!
//! The run command:
//! 1. Loads profiler configuration
//! 2. Starts a session against a synthetic capture source
//! 3. Waits for the session duration to elapse
//! 4. Lets the session write its profile through a file transport

use anyhow::{Context, Result};
use log::{debug, info};
use stackprof_core::model::{ClassMethodNames, FunctionId, StackSnapshot, ThreadStackResult};
use stackprof_core::output::{read_profiles, FileTransport};
use stackprof_core::sampler::CaptureSource;
use stackprof_core::utils::error::CaptureError;
use stackprof_core::{ProfilerConfig, SessionController};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Arguments for the run command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Session id reported with the profile
    pub session_id: i32,

    /// Sampling interval in milliseconds
    pub frequency_ms: u64,

    /// Session length in milliseconds
    pub duration_ms: u64,

    /// Optional JSON config file
    pub config: Option<PathBuf>,

    /// Node budget override
    pub budget: Option<usize>,

    /// Output path for the profile JSON
    pub output: PathBuf,

    /// Number of simulated threads
    pub threads: u64,

    /// Print text summary to stdout
    pub print_summary: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            session_id: 1,
            frequency_ms: 10,
            duration_ms: 2_000,
            config: None,
            budget: None,
            output: PathBuf::from("profile.json"),
            threads: 4,
            print_summary: false,
        }
    }
}

/// Execute the run command
///
/// **Public** - main entry point called from main.rs
pub fn execute_run(args: RunArgs) -> Result<()> {
    let start_time = Instant::now();

    info!("Step 1/3: Loading configuration...");
    let mut config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProfilerConfig::default(),
    };
    if let Some(budget) = args.budget {
        config.max_aggregated_nodes = budget;
    }
    debug!("Effective config: {:?}", config);

    info!("Step 2/3: Sampling {} threads for {}ms...", args.threads, args.duration_ms);
    let controller = SessionController::new(
        Arc::new(SyntheticCapture::new(args.threads)),
        Arc::new(synthetic_names),
        Arc::new(FileTransport::new(&args.output)),
        config,
    );

    if !controller.start(
        args.session_id,
        Duration::from_millis(args.frequency_ms),
        Duration::from_millis(args.duration_ms),
    ) {
        anyhow::bail!("Failed to start profiling session {}", args.session_id);
    }

    // The session reports itself once its duration elapses
    while controller.is_sampling() {
        thread::sleep(Duration::from_millis(args.frequency_ms.max(10)));
    }

    info!("Step 3/3: Reading back {}...", args.output.display());
    let profiles = read_profiles(&args.output).context("Session did not produce a profile")?;

    if args.print_summary {
        for profile in &profiles {
            println!("\n{}", "=".repeat(80));
            println!("PROFILE SUMMARY");
            println!("{}", "=".repeat(80));
            println!("Session:       {}", profile.session_id);
            println!("Samples:       {}", profile.sample_count);
            println!("Threads:       {}", profile.thread_count);
            println!("Nodes:         {}", profile.node_count());
            for root in profile.roots() {
                println!(
                    "  {:>6}  {}:{}",
                    root.runnable_count, root.class_name, root.method_name
                );
            }
            println!("{}", "=".repeat(80));
        }
    }

    info!("Run completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// Validate run arguments
///
/// **Public** - can be called before execute_run for early validation
pub fn validate_args(args: &RunArgs) -> Result<()> {
    if args.session_id == 0 {
        anyhow::bail!("session id must be non-zero");
    }
    if args.frequency_ms == 0 {
        anyhow::bail!("frequency must be greater than 0");
    }
    if args.duration_ms < args.frequency_ms {
        anyhow::bail!("duration must be at least one sampling interval");
    }
    if args.threads == 0 {
        anyhow::bail!("threads must be greater than 0");
    }
    if args.budget == Some(0) {
        anyhow::bail!("budget must be greater than 0");
    }
    Ok(())
}

// Function ids used by the synthetic source
const FRAME_MAIN: u64 = 1;
const FRAME_DISPATCH: u64 = 2;
const FRAME_HANDLERS: [u64; 4] = [10, 11, 12, 13];
const FRAME_WAIT: u64 = 20;
const FRAME_UNNAMED: u64 = 99;

/// Capture source producing repeatable fake stacks
///
/// Every thread walks a fixed rotation of handler paths; every seventh
/// round one thread reports a failure and another overflows.
pub struct SyntheticCapture {
    threads: u64,
    round: AtomicU64,
}

impl SyntheticCapture {
    pub fn new(threads: u64) -> Self {
        Self {
            threads,
            round: AtomicU64::new(0),
        }
    }

    fn stack_for(round: u64, thread: u64) -> Vec<FunctionId> {
        let handler = FRAME_HANDLERS[((round + thread) % FRAME_HANDLERS.len() as u64) as usize];
        // Innermost first
        let mut frames = match (round + thread) % 5 {
            0 => vec![FRAME_WAIT, handler],
            1 => vec![0, FRAME_UNNAMED, handler],
            _ => vec![handler],
        };
        frames.extend([FRAME_DISPATCH, FRAME_MAIN]);
        frames.into_iter().map(FunctionId).collect()
    }
}

impl CaptureSource for SyntheticCapture {
    fn request_snapshot(&self) -> Result<Vec<ThreadStackResult>, CaptureError> {
        let round = self.round.fetch_add(1, Ordering::SeqCst);

        Ok((0..self.threads)
            .map(|thread| {
                let thread_id = 1000 + thread;
                match (round % 7, thread) {
                    (6, 0) => ThreadStackResult::Failure {
                        thread_id,
                        error_code: 0x8013_1362,
                    },
                    (6, 1) => ThreadStackResult::LargeStackOverflow { thread_id },
                    _ => ThreadStackResult::Success(StackSnapshot::new(
                        thread_id,
                        Self::stack_for(round, thread),
                    )),
                }
            })
            .collect())
    }
}

/// Names for the synthetic frames; `FRAME_UNNAMED` is left unresolved
pub fn synthetic_names(ids: &HashSet<FunctionId>) -> HashMap<FunctionId, ClassMethodNames> {
    ids.iter()
        .filter_map(|id| {
            let names = match id.0 {
                FRAME_MAIN => ClassMethodNames::new("Demo.Program", "Main"),
                FRAME_DISPATCH => ClassMethodNames::new("Demo.Dispatcher", "Dispatch"),
                FRAME_WAIT => ClassMethodNames::new("System.Threading.WaitHandle", "WaitOne"),
                n if FRAME_HANDLERS.contains(&n) => {
                    ClassMethodNames::new("Demo.Handlers", format!("Handle{}", n))
                }
                _ => return None,
            };
            Some((*id, names))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_args_valid() {
        assert!(validate_args(&RunArgs::default()).is_ok());
    }

    #[test]
    fn test_validate_args_zero_session() {
        let args = RunArgs {
            session_id: 0,
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_duration_shorter_than_frequency() {
        let args = RunArgs {
            frequency_ms: 100,
            duration_ms: 50,
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_synthetic_capture_rounds() {
        let capture = SyntheticCapture::new(3);
        let first = capture.request_snapshot().unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|r| matches!(r, ThreadStackResult::Success(_))));

        for _ in 0..5 {
            capture.request_snapshot().unwrap();
        }
        let seventh = capture.request_snapshot().unwrap();
        assert!(matches!(seventh[0], ThreadStackResult::Failure { .. }));
        assert!(matches!(seventh[1], ThreadStackResult::LargeStackOverflow { .. }));
    }

    #[test]
    fn test_synthetic_names_skip_unnamed() {
        let ids: HashSet<FunctionId> = [FunctionId(1), FunctionId(FRAME_UNNAMED)].into_iter().collect();
        let names = synthetic_names(&ids);
        assert_eq!(names.len(), 1);
        assert_eq!(names[&FunctionId(1)].method_name, "Main");
    }
}
