//! Checkpointed parallel computation pipeline.
//!
//! Execution modes:
//!   Restart - clear existing data and recompute the full range [3, max_p].
//!   Resume  - continue above the last durably recorded prime.
//!   Replay  - skip computation and reload the existing dataset.
//!
//! Work distribution: primes are dispatched to the kernel in fixed-size
//! batches over a rayon pool sized to one less than the available cores.
//! Batch results come back in submission order, so rows stream to the
//! checkpoint store monotonically in p and the resume position stays valid
//! at every instant. Each row is flushed before the next batch starts; a
//! kill at any point loses at most the row being written.

use std::path::Path;
use std::str::FromStr;

use rayon::prelude::*;

use crate::arith::{compute_record, KernelError, PrimeRecord};
use crate::sieve::primes_in_range;
use crate::store::{CheckpointStore, StoreError, DATASET_FILENAME};

/// Primes per dispatched batch. Large enough to amortize dispatch overhead,
/// small enough that a kill wastes little work.
pub const CHUNK_SIZE: usize = 512;

/// First prime of the verification domain. p = 2 has bad reduction for the
/// curve and stays out of the dataset.
const DOMAIN_START: u64 = 3;

/// Pipeline entry mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Restart,
    Resume,
    Replay,
}

impl FromStr for Mode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restart" => Ok(Mode::Restart),
            "resume" => Ok(Mode::Resume),
            "replay" | "plot" => Ok(Mode::Replay),
            other => Err(PipelineError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid mode {0:?} (expected restart, resume, or replay)")]
    InvalidMode(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

/// Worker count for the compute pool: all available cores minus one, which
/// stays reserved for the orchestrating thread.
pub fn worker_threads() -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cores.saturating_sub(1).max(1)
}

/// Run the pipeline and return the consolidated dataset, sorted by p.
///
/// `max_p` is the inclusive upper bound of the prime range; Replay ignores
/// it. The dataset lives at `<output_dir>/prime_traces.csv`.
pub fn run(output_dir: &Path, max_p: u64, mode: Mode) -> Result<Vec<PrimeRecord>, PipelineError> {
    run_with_threads(output_dir, max_p, mode, worker_threads())
}

/// [`run`] with an explicit worker count.
pub fn run_with_threads(
    output_dir: &Path,
    max_p: u64,
    mode: Mode,
    threads: usize,
) -> Result<Vec<PrimeRecord>, PipelineError> {
    std::fs::create_dir_all(output_dir)?;
    let store = CheckpointStore::new(output_dir.join(DATASET_FILENAME));

    let mut mode = mode;
    if mode == Mode::Replay {
        if store.has_records() {
            return consolidate(&store);
        }
        log::warn!("no dataset found for replay, switching to restart");
        mode = Mode::Restart;
    }

    if mode == Mode::Restart {
        store.truncate()?;
        log::info!("existing dataset removed, starting fresh");
    }

    if mode == Mode::Resume && store.needs_migration() {
        // Rewrite the old layout before appending rows in the current one.
        log::info!("upgrading dataset to the current layout before resuming");
        consolidate(&store)?;
    }

    let start_p = if mode == Mode::Resume {
        let last = store.last_checkpointed_prime();
        if last > 1 {
            log::info!("resuming from p > {}", last);
        }
        (last + 1).max(DOMAIN_START)
    } else {
        DOMAIN_START
    };

    let primes = primes_in_range(start_p, max_p);
    if !primes.is_empty() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| PipelineError::Pool(e.to_string()))?;

        // A resumed run appends below an existing header; everything else
        // starts a fresh file.
        let fresh = !(mode == Mode::Resume && store.has_records());
        let mut writer = store.open_appender(fresh)?;

        let total = primes.len();
        eprintln!("[Compute] {} primes on {} worker(s) ...", total, threads.max(1));

        let mut done = 0usize;
        for batch in primes.chunks(CHUNK_SIZE) {
            let records: Vec<PrimeRecord> =
                pool.install(|| batch.par_iter().map(|&p| compute_record(p)).collect::<Result<_, _>>())?;
            for rec in &records {
                writer.append(rec)?;
            }
            done += batch.len();
            eprint!("\r  computed {}/{} (p <= {})", done, total, batch[batch.len() - 1]);
        }
        eprintln!();
    }

    consolidate(&store)
}

/// Load everything, rewrite the store in canonical sorted form, and return
/// the dataset. Reading the rewritten store again yields the same content.
fn consolidate(store: &CheckpointStore) -> Result<Vec<PrimeRecord>, PipelineError> {
    let records = store.load_all()?;
    store.rewrite_sorted(&records)?;
    Ok(records)
}
