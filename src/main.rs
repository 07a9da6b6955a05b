//! fibonacci-cm CLI: checkpointed verification of the Fibonacci
//! character-sum / CM trace identity.
//!
//! Modes:
//!   --mode=restart            Clear existing data and recompute from scratch
//!   --mode=resume             Continue from the last checkpointed prime (default)
//!   --mode=replay             Skip computation; reload the existing dataset
//!
//! Options:
//!   --max-p=<N>               Inclusive upper bound on the prime range (default: 100000)
//!   --output-dir=<path>       Directory for dataset and report files (default: results)
//!   --threads=<N>             Worker threads (default: available cores - 1)

use std::path::PathBuf;

use fibonacci_cm::pipeline::{self, Mode};
use fibonacci_cm::report;

struct CliConfig {
    mode: Mode,
    max_p: u64,
    output_dir: PathBuf,
    threads: usize,
}

fn parse_args() -> Result<CliConfig, String> {
    let args: Vec<String> = std::env::args().collect();

    let mode = match args.iter().find_map(|a| a.strip_prefix("--mode=")) {
        Some(value) => value.parse::<Mode>().map_err(|e| e.to_string())?,
        None => Mode::Resume,
    };

    let max_p = match args.iter().find_map(|a| a.strip_prefix("--max-p=")) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| format!("invalid --max-p value {:?} (need an integer)", value))?,
        None => 100_000,
    };

    let output_dir = args
        .iter()
        .find_map(|a| a.strip_prefix("--output-dir="))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("results"));

    let threads = match args.iter().find_map(|a| a.strip_prefix("--threads=")) {
        Some(value) => {
            let n = value
                .parse::<usize>()
                .map_err(|_| format!("invalid --threads value {:?} (need an integer)", value))?;
            if n == 0 {
                return Err("--threads must be at least 1".to_string());
            }
            n
        }
        None => pipeline::worker_threads(),
    };

    Ok(CliConfig { mode, max_p, output_dir, threads })
}

fn main() {
    env_logger::init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("==============================================");
    println!("  fibonacci-cm: CM trace verification");
    println!("==============================================");
    println!("  Mode    : {:?}", config.mode);
    println!("  Range   : primes in [3, {}]", config.max_p);
    println!("  Workers : {}", config.threads);
    println!("  Output  : {}", config.output_dir.display());
    println!();

    let records =
        match pipeline::run_with_threads(&config.output_dir, config.max_p, config.mode, config.threads)
        {
            Ok(records) => records,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        };

    if records.is_empty() {
        eprintln!("[Error] Dataset is empty - nothing to report.");
        return;
    }

    let summary = report::summarize(&records);
    report::print_summary(&summary);

    // The dataset is already durable; a report failure is not a run failure.
    let report_path = config.output_dir.join("analysis_summary.json");
    match report::write_summary_json(&summary, &report_path) {
        Ok(()) => println!("\n[Success] Report saved: {}", report_path.display()),
        Err(e) => eprintln!("\n[Warning] Report export failed: {}", e),
    }
}
