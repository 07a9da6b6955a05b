//! Per-prime arithmetic for the CM trace verification.
//!
//! All functions here are pure u64 computations with u128 intermediates and
//! no I/O, so they are safe to run concurrently without coordination. Each
//! prime is an independent unit of work.
//!
//! Mathematical background: for E : y^2 = x^3 - 4x over F_p the Frobenius
//! trace satisfies a_p = -sum_{t in F_p} chi(t^3 - 4t), where chi is the
//! Legendre symbol. For p ≡ 3 (mod 4) the curve is supersingular and
//! a_p = 0 exactly. The Pisano period pi(p) divides p - 1 when 5 is a
//! square mod p and 2(p + 1) otherwise [Wall 1960].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors raised by the kernel. All of them indicate either invalid input
/// or an internal logic defect; none are transient, so callers must treat
/// every variant as fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("invalid kernel input p = {0} (need a prime >= 2)")]
    InvalidPrime(u64),

    #[error("Pisano period search for p = {p} exceeded {limit} iterations")]
    PeriodSearchOverflow { p: u64, limit: u64 },

    #[error("Hasse bound violated for p = {p}: |a_p| = |{trace}| > 2*sqrt(p)")]
    HasseBoundViolated { p: u64, trace: i64 },

    #[error("CM property violated for p = {p}: a_p = {trace}, expected 0")]
    CmViolation { p: u64, trace: i64 },
}

/// Splitting behavior of a prime in a quadratic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitClass {
    Inert,
    Split,
}

impl SplitClass {
    /// Parse the on-disk string tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "inert" => Some(SplitClass::Inert),
            "split" => Some(SplitClass::Split),
            _ => None,
        }
    }
}

impl fmt::Display for SplitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitClass::Inert => write!(f, "inert"),
            SplitClass::Split => write!(f, "split"),
        }
    }
}

/// All arithmetic quantities computed for a single prime.
///
/// The record is immutable once written to the checkpoint store; the
/// derived float fields use standard f64 sqrt and are approximate, so
/// downstream equality checks on them need a tolerance (1e-9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeRecord {
    /// The prime.
    pub p: u64,
    /// Inert iff p ≡ 3 (mod 4). Governs whether the trace must vanish.
    pub class_mod4: SplitClass,
    /// Split iff 5 is a quadratic residue mod p (Euler's criterion).
    pub class_mod5: SplitClass,
    /// Pisano period pi(p) of the Fibonacci recurrence mod p.
    pub pisano_period: u64,
    /// Raw signed character sum S_p over F_p.
    pub char_sum: i64,
    /// Frobenius trace a_p = -S_p. Zero for every inert (mod 4) prime.
    pub trace: i64,
    /// trace / sqrt(p), in [-2, 2].
    pub norm_trace: f64,
    /// |trace| / (2 sqrt(p)), in [0, 1).
    pub weil_ratio: f64,
}

/// Modular exponentiation: base^exp mod m using the binary method.
pub fn mod_pow(base: u64, mut exp: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let m = m as u128;
    let mut result = 1u128;
    let mut b = base as u128 % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        exp >>= 1;
        b = b * b % m;
    }
    result as u64
}

/// Pisano period pi(p): smallest k > 0 with (F_k, F_{k+1}) ≡ (0, 1) mod p.
///
/// Special-cased for p = 2 and p = 5; the general search is bounded at
/// 2(p + 1) iterations, the theoretical maximum for odd primes other
/// than 5. Exceeding the bound means the iteration itself is broken.
pub fn pisano_period(p: u64) -> Result<u64, KernelError> {
    if p < 2 {
        return Err(KernelError::InvalidPrime(p));
    }
    if p == 2 {
        return Ok(3);
    }
    if p == 5 {
        return Ok(20);
    }
    let limit = 2 * (p + 1);
    let mut prev = 0u64;
    let mut curr = 1u64;
    for k in 1..=limit {
        let next = (prev + curr) % p;
        prev = curr;
        curr = next;
        if prev == 0 && curr == 1 {
            return Ok(k);
        }
    }
    Err(KernelError::PeriodSearchOverflow { p, limit })
}

/// Quadratic residue lookup table mod p.
///
/// table[v] is true iff v is a nonzero square mod p; index 0 stays false.
/// Built in O(p) by squaring every element of (Z/pZ)*, which replaces the
/// O(log p) Euler-criterion exponentiation inside the O(p) sum loop.
pub fn build_qr_table(p: u64) -> Vec<bool> {
    let m = p as u128;
    let mut table = vec![false; p as usize];
    for x in 1..p {
        let sq = (x as u128 * x as u128 % m) as usize;
        table[sq] = true;
    }
    table
}

/// Character sum S_p = sum_{t in F_p} chi(t^3 - 4t) via table lookup.
///
/// Terms with t^3 - 4t ≡ 0 contribute nothing (chi(0) = 0). The result is
/// bounded by 2*sqrt(p) in absolute value; `compute_record` rejects any
/// value outside that bound as a kernel defect.
pub fn character_sum(p: u64, qr_table: &[bool]) -> i64 {
    let m = p as u128;
    let mut sum = 0i64;
    for t in 0..p {
        let t = t as u128;
        let cube = t * t % m * t % m;
        let val = (cube + m - 4 * t % m) % m;
        if val == 0 {
            continue;
        }
        sum += if qr_table[val as usize] { 1 } else { -1 };
    }
    sum
}

/// Classify p by whether 5 is a quadratic residue mod p.
///
/// Split iff 5^((p-1)/2) ≡ 1 (mod p). The criterion evaluates to 0 for
/// p = 5 itself (ramified), which lands on `Inert` under this rule.
pub fn five_split_class(p: u64) -> SplitClass {
    if mod_pow(5 % p, (p - 1) / 2, p) == 1 {
        SplitClass::Split
    } else {
        SplitClass::Inert
    }
}

/// Compute the full record for one prime.
///
/// Rejects p < 2; behavior on composite p is undefined. The Hasse bound
/// and the CM zero-trace property for inert (mod 4) primes are enforced
/// here so a logic defect can never reach the checkpoint store.
pub fn compute_record(p: u64) -> Result<PrimeRecord, KernelError> {
    if p < 2 {
        return Err(KernelError::InvalidPrime(p));
    }

    let qr_table = build_qr_table(p);
    let char_sum = character_sum(p, &qr_table);
    let trace = -char_sum;
    let sqrt_p = (p as f64).sqrt();

    if trace.unsigned_abs() as f64 > 2.0 * sqrt_p + 1e-9 {
        return Err(KernelError::HasseBoundViolated { p, trace });
    }

    let class_mod4 = if p % 4 == 3 {
        SplitClass::Inert
    } else {
        SplitClass::Split
    };
    if class_mod4 == SplitClass::Inert && trace != 0 {
        return Err(KernelError::CmViolation { p, trace });
    }

    Ok(PrimeRecord {
        p,
        class_mod4,
        class_mod5: five_split_class(p),
        pisano_period: pisano_period(p)?,
        char_sum,
        trace,
        norm_trace: trace as f64 / sqrt_p,
        weil_ratio: trace.unsigned_abs() as f64 / (2.0 * sqrt_p),
    })
}
