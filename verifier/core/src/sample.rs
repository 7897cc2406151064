use crate::Origin;
use serde::Serialize;
use std::{num::NonZeroUsize, str::FromStr};

/// A strictly positive number of samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SampleSize(NonZeroUsize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("sample size must be positive, got {0}")]
pub struct InvalidSampleSize(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseSampleSizeError {
    #[error(transparent)]
    Invalid(#[from] InvalidSampleSize),

    #[error("invalid sample size: {0}")]
    NotANumber(#[from] std::num::ParseIntError),
}

/// The classified outcomes of a sampling run, in the order they were taken.
///
/// Only successful samples are ever recorded, so the per-origin counts always
/// add up to the number of samples.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleSet {
    origins: Vec<Origin>,
    a: usize,
    b: usize,
}

// === impl SampleSize ===

impl SampleSize {
    pub fn new(n: usize) -> Result<Self, InvalidSampleSize> {
        NonZeroUsize::new(n).map(Self).ok_or(InvalidSampleSize(0))
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl From<NonZeroUsize> for SampleSize {
    fn from(n: NonZeroUsize) -> Self {
        Self(n)
    }
}

impl TryFrom<i64> for SampleSize {
    type Error = InvalidSampleSize;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        let n = usize::try_from(n).map_err(|_| InvalidSampleSize(n))?;
        NonZeroUsize::new(n)
            .map(Self)
            .ok_or(InvalidSampleSize(0))
    }
}

impl FromStr for SampleSize {
    type Err = ParseSampleSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n = s.trim().parse::<i64>()?;
        Ok(Self::try_from(n)?)
    }
}

// === impl SampleSet ===

impl SampleSet {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            origins: Vec::with_capacity(n),
            a: 0,
            b: 0,
        }
    }

    pub fn push(&mut self, origin: Origin) {
        match origin {
            Origin::A => self.a += 1,
            Origin::B => self.b += 1,
        }
        self.origins.push(origin);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn count(&self, origin: Origin) -> usize {
        match origin {
            Origin::A => self.a,
            Origin::B => self.b,
        }
    }

    /// Returns the most frequently observed origin and its count. Ties are
    /// reported as A.
    pub fn majority(&self) -> Option<(Origin, usize)> {
        if self.is_empty() {
            return None;
        }
        if self.b > self.a {
            Some((Origin::B, self.b))
        } else {
            Some((Origin::A, self.a))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Origin> + '_ {
        self.origins.iter().copied()
    }

    /// Appends another run's samples after this one's.
    pub fn append(&mut self, other: SampleSet) {
        self.a += other.a;
        self.b += other.b;
        self.origins.extend(other.origins);
    }
}

impl Extend<Origin> for SampleSet {
    fn extend<I: IntoIterator<Item = Origin>>(&mut self, iter: I) {
        for origin in iter {
            self.push(origin);
        }
    }
}

impl FromIterator<Origin> for SampleSet {
    fn from_iter<I: IntoIterator<Item = Origin>>(iter: I) -> Self {
        let mut set = Self::default();
        set.extend(iter);
        set
    }
}
