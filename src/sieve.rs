//! Prime enumeration for the verification range.
//!
//! A segmented sieve of Eratosthenes: only the base primes up to sqrt(hi)
//! and one fixed-size segment are resident at a time, so enumerating a
//! range like [3, 10^6] never allocates an array sized to the bound.

/// Residency of the marking array, in numbers per segment.
const SEGMENT_SIZE: u64 = 1 << 16;

/// Generate all primes up to `bound` (inclusive) with a plain sieve.
///
/// Used for the base primes of the segmented sieve; fine on its own for
/// small bounds.
pub fn primes_up_to(bound: u64) -> Vec<u64> {
    if bound < 2 {
        return Vec::new();
    }
    let limit = bound as usize;
    let mut is_prime = vec![true; limit + 1];
    is_prime[0] = false;
    is_prime[1] = false;
    let mut p = 2;
    while p * p <= limit {
        if is_prime[p] {
            let mut multiple = p * p;
            while multiple <= limit {
                is_prime[multiple] = false;
                multiple += p;
            }
        }
        p += 1;
    }
    (2..=limit).filter(|&i| is_prime[i]).map(|i| i as u64).collect()
}

/// Integer square root, rounded down.
fn integer_sqrt(n: u64) -> u64 {
    let mut r = (n as f64).sqrt() as u64;
    while r > 0 && (r as u128) * (r as u128) > n as u128 {
        r -= 1;
    }
    while ((r + 1) as u128) * ((r + 1) as u128) <= n as u128 {
        r += 1;
    }
    r
}

/// Generate all primes in [lo, hi] (both inclusive) with a segmented sieve.
pub fn primes_in_range(lo: u64, hi: u64) -> Vec<u64> {
    if hi < 2 || lo > hi {
        return Vec::new();
    }
    let lo = lo.max(2);
    let base = primes_up_to(integer_sqrt(hi));
    let mut out = Vec::new();

    let mut seg_start = lo;
    loop {
        let seg_end = hi.min(seg_start + SEGMENT_SIZE - 1);
        let len = (seg_end - seg_start + 1) as usize;
        let mut is_prime = vec![true; len];

        for &q in &base {
            let q2 = q * q;
            if q2 > seg_end {
                break;
            }
            // First multiple of q inside the segment, but never q itself.
            let mut multiple = q2.max((seg_start + q - 1) / q * q);
            while multiple <= seg_end {
                is_prime[(multiple - seg_start) as usize] = false;
                multiple += q;
            }
        }

        for (i, &flag) in is_prime.iter().enumerate() {
            if flag {
                out.push(seg_start + i as u64);
            }
        }

        if seg_end == hi {
            break;
        }
        seg_start = seg_end + 1;
    }
    out
}
