//! `(min, max, mean, variance)` summary tuples, the parallel combine
//! formula, and the per-level accumulator the writer drives bottom-up.
//!
//! Variance is always the population variance (divisor N, not N-1) — see
//! design note in §9: mixing sample variance into this scheme is a silent
//! correctness bug the writer must not introduce.

/// One precomputed statistics tuple over a block of consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryEntry {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub variance: f32,
}

/// Summarize a block of raw samples. NaN samples propagate into `mean`/
/// `variance` as NaN, but `min`/`max` are taken over the non-NaN subset.
pub fn summarize(samples: &[f32]) -> SummaryEntry {
    assert!(!samples.is_empty(), "cannot summarize an empty block");

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut has_nan = false;
    let mut has_finite = false;

    for &s in samples {
        if s.is_nan() {
            has_nan = true;
            continue;
        }
        has_finite = true;
        if s < min {
            min = s;
        }
        if s > max {
            max = s;
        }
    }
    if !has_finite {
        min = f32::NAN;
        max = f32::NAN;
    }

    if has_nan {
        return SummaryEntry {
            min,
            max,
            mean: f32::NAN,
            variance: f32::NAN,
        };
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = samples.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;

    SummaryEntry {
        min,
        max,
        mean: mean as f32,
        variance: variance as f32,
    }
}

/// Combine two child summaries of sizes `n1`/`n2` using the standard
/// parallel-variance formula. NaN propagates if either child is NaN.
pub fn combine(a: SummaryEntry, n1: u64, b: SummaryEntry, n2: u64) -> (SummaryEntry, u64) {
    let n1f = n1 as f64;
    let n2f = n2 as f64;
    let total = n1f + n2f;

    let min = nan_safe_min(a.min, b.min);
    let max = nan_safe_max(a.max, b.max);

    if a.mean.is_nan() || b.mean.is_nan() {
        return (
            SummaryEntry {
                min,
                max,
                mean: f32::NAN,
                variance: f32::NAN,
            },
            n1 + n2,
        );
    }

    let mu1 = a.mean as f64;
    let mu2 = b.mean as f64;
    let mean = (n1f * mu1 + n2f * mu2) / total;
    let variance = (n1f * (a.variance as f64 + (mu1 - mean).powi(2))
        + n2f * (b.variance as f64 + (mu2 - mean).powi(2)))
        / total;

    (
        SummaryEntry {
            min,
            max,
            mean: mean as f32,
            variance: variance as f32,
        },
        n1 + n2,
    )
}

fn nan_safe_min(a: f32, b: f32) -> f32 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => f32::NAN,
        (true, false) => b,
        (false, true) => a,
        (false, false) => a.min(b),
    }
}

fn nan_safe_max(a: f32, b: f32) -> f32 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => f32::NAN,
        (true, false) => b,
        (false, true) => a,
        (false, false) => a.max(b),
    }
}

/// Per-level accumulator driven by the writer's summarization cascade.
/// Entries, their raw-sample weights, and the offset of the child chunk
/// each entry descended from are kept in lockstep so that when the
/// accumulator fills, both the SUMMARY chunk (entries) and the INDEX
/// chunk (child offsets) can be emitted from the same drain.
#[derive(Debug, Default)]
pub struct LevelAccumulator {
    pub entries: Vec<SummaryEntry>,
    pub weights: Vec<u64>,
    pub child_offsets: Vec<u64>,
    pub first_sample_id: Option<i64>,
}

impl LevelAccumulator {
    pub fn push(&mut self, entry: SummaryEntry, weight: u64, child_offset: u64, sample_id: i64) {
        if self.first_sample_id.is_none() {
            self.first_sample_id = Some(sample_id);
        }
        self.entries.push(entry);
        self.weights.push(weight);
        self.child_offsets.push(child_offset);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return everything accumulated so far, resetting for the
    /// next cycle.
    pub fn drain(&mut self) -> (i64, Vec<SummaryEntry>, Vec<u64>, Vec<u64>) {
        let first = self.first_sample_id.take().unwrap_or(0);
        (
            first,
            std::mem::take(&mut self.entries),
            std::mem::take(&mut self.weights),
            std::mem::take(&mut self.child_offsets),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_summary() {
        let s = summarize(&[3.0]);
        assert_eq!(s.min, 3.0);
        assert_eq!(s.max, 3.0);
        assert_eq!(s.mean, 3.0);
        assert_eq!(s.variance, 0.0);
    }

    #[test]
    fn uniform_block_variance() {
        // [-1, 1] alternating: mean 0, variance 1.
        let samples: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { -1.0 } else { 1.0 }).collect();
        let s = summarize(&samples);
        assert!((s.mean).abs() < 1e-6);
        assert!((s.variance - 1.0).abs() < 1e-6);
        assert_eq!(s.min, -1.0);
        assert_eq!(s.max, 1.0);
    }

    #[test]
    fn nan_propagates_to_mean_variance_but_not_minmax() {
        let s = summarize(&[1.0, f32::NAN, 3.0, -2.0]);
        assert!(s.mean.is_nan());
        assert!(s.variance.is_nan());
        assert_eq!(s.min, -2.0);
        assert_eq!(s.max, 3.0);
    }

    #[test]
    fn combine_matches_direct_summary() {
        let samples: Vec<f32> = (0..2000).map(|i| (i % 997) as f32 * 0.01).collect();
        let direct = summarize(&samples);

        let a = summarize(&samples[..1000]);
        let b = summarize(&samples[1000..]);
        let (combined, n) = combine(a, 1000, b, 1000);

        assert_eq!(n, 2000);
        let tol = direct.mean.abs().max(1.0) * 1e-6;
        assert!((combined.mean - direct.mean).abs() < tol);
        assert!((combined.variance - direct.variance).abs() < tol);
        assert_eq!(combined.min, direct.min);
        assert_eq!(combined.max, direct.max);
    }
}
