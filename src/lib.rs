//! Numerical verification of a Fibonacci character-sum identity against the
//! Frobenius trace of the CM elliptic curve y^2 = x^3 - 4x.
//!
//! For every prime p in a configurable range the crate evaluates the
//! character sum S_p = sum_{t in F_p} chi(t^3 - 4t), derives the trace
//! a_p = -S_p, classifies p by its splitting behavior mod 4 and mod 5, and
//! records the Pisano period of the Fibonacci recurrence mod p. Each result
//! is appended to a durable on-disk dataset as soon as it is computed, so an
//! interrupted run resumes from its last flushed record.
//!
//! Module layout:
//! - [`arith`]    - pure per-prime arithmetic (the unit of parallel work)
//! - [`sieve`]    - segmented prime enumeration for the requested range
//! - [`store`]    - append-only checkpointed dataset with tail-read resume
//! - [`pipeline`] - restart/resume/replay orchestration over a worker pool
//! - [`report`]   - aggregate statistics, console summary, JSON report

pub mod arith;
pub mod pipeline;
pub mod report;
pub mod sieve;
pub mod store;
