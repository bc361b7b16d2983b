use anyhow::Result;
use stackprof_core::output::{profiles_to_string, read_profiles};
use stackprof_core::utils::config::SCHEMA_VERSION;
use std::path::PathBuf;

/// Validate a profile JSON file
pub fn validate_profile_file(file_path: PathBuf) -> Result<()> {
    println!("Validating profile: {}", file_path.display());

    let profiles = read_profiles(&file_path)?;
    let encoded = profiles_to_string(&profiles)?;

    println!("✓ Valid profile JSON ({} profile(s))", profiles.len());
    println!("  Encoded size: {} bytes", encoded.len());
    for profile in &profiles {
        println!("  Session: {}", profile.session_id);
        println!("  Started: {}", profile.start_time.to_rfc3339());
        println!("  Stopped: {}", profile.stop_time.to_rfc3339());
        println!("  Samples: {}", profile.sample_count);
        println!("  Threads: {}", profile.thread_count);
        println!("  Nodes:   {}", profile.node_count());
    }

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Stackprof Thread Profile Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Profile (positional array):");
        println!("  [0] session_id: number       - Collector-supplied session id");
        println!("  [1] start_ms: number         - Session start, ms since epoch");
        println!("  [2] stop_ms: number          - Session stop, ms since epoch");
        println!("  [3] sample_count: number     - Polling rounds recorded");
        println!("  [4] samples: object          - {{\"OTHER\": [node, ...]}} or {{}}");
        println!("  [5] thread_count: number     - Distinct threads observed");
        println!("  [6] runnable_threads: number - Same as thread_count");
        println!("Node (positional array):");
        println!("  [0] [class, method, 0]       - Resolved names");
        println!("  [1] runnable_count: number   - Runnable samples at this position");
        println!("  [2] 0                        - Reserved");
        println!("  [3] children: array          - Child nodes");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Stackprof v{}", env!("CARGO_PKG_VERSION"));
    println!("Profile Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Call-tree aggregation core for an in-process sampling profiler.");
}
