use crate::{InvalidSampleSize, Origin, SampleSet};
use serde::Serialize;
use std::fmt;

/// The outcome of comparing an observed split against an expected one.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub expected: f64,
    pub actual: f64,
    pub tolerance: f64,
    pub samples: usize,
    pub majority: Origin,
    pub count_a: usize,
    pub count_b: usize,
    pub passed: bool,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error(
    "load balancing ratio does not match the expected: expected {expected}, actual {actual} (tolerance {tolerance})"
)]
pub struct RatioMismatch {
    pub expected: f64,
    pub actual: f64,
    pub tolerance: f64,
}

/// Returns the percentage of samples attributed to the majority origin.
pub fn split_ratio(samples: &SampleSet) -> Result<f64, InvalidSampleSize> {
    let (_, majority) = samples.majority().ok_or(InvalidSampleSize(0))?;
    // Multiply first so that whole percentages stay exact.
    Ok((majority as f64 * 100.0) / samples.len() as f64)
}

/// Checks that the majority split lies within `tolerance` percentage points
/// of `expected`.
pub fn evaluate_ratio(
    samples: &SampleSet,
    expected: f64,
    tolerance: f64,
) -> Result<Verdict, InvalidSampleSize> {
    let actual = split_ratio(samples)?;
    let (majority, _) = samples.majority().ok_or(InvalidSampleSize(0))?;
    Ok(Verdict {
        expected,
        actual,
        tolerance,
        samples: samples.len(),
        majority,
        count_a: samples.count(Origin::A),
        count_b: samples.count(Origin::B),
        passed: (expected - actual).abs() <= tolerance,
    })
}

// === impl Verdict ===

impl Verdict {
    #[inline]
    pub fn is_pass(&self) -> bool {
        self.passed
    }

    pub fn ensure(&self) -> Result<(), RatioMismatch> {
        if self.passed {
            return Ok(());
        }
        Err(RatioMismatch {
            expected: self.expected,
            actual: self.actual,
            tolerance: self.tolerance,
        })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}%, actual {}% (tolerance {} points; {} samples, A={}, B={})",
            if self.passed { "pass" } else { "fail" },
            self.expected,
            self.actual,
            self.tolerance,
            self.samples,
            self.count_a,
            self.count_b,
        )
    }
}
