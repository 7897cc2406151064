use crate::fetch::{Failure, Fetch};
use bytes::Bytes;
use futures::future;
use http::{StatusCode, Uri};
use mesh_split_core::{Discriminator, RetryPolicy, SampleSet, SampleSize};
use std::{num::NonZeroUsize, ops::Range};
use tokio::time;
use tracing::{debug, trace, Instrument};

/// Takes repeated samples from an endpoint and attributes each response to
/// the backend version that served it.
#[derive(Clone, Debug)]
pub struct Sampler<F, D> {
    fetch: F,
    discriminator: D,
    retry: RetryPolicy,
    concurrency: NonZeroUsize,
}

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// A sample exhausted its retry budget. The whole run is abandoned.
    #[error("sample {sample} failed after {attempts} attempts: {last}")]
    TransientBackendFailure {
        sample: usize,
        attempts: u32,
        last: Failure,
    },

    #[error("sample {sample} could not be attributed to a backend: {body:?}")]
    Unclassified { sample: usize, body: String },
}

// === impl SampleError ===

impl SampleError {
    /// The status of the last failed attempt, when the backend answered.
    pub fn last_status(&self) -> Option<StatusCode> {
        match self {
            Self::TransientBackendFailure { last, .. } => last.status(),
            Self::Unclassified { .. } => None,
        }
    }
}

// === impl Sampler ===

impl<F, D> Sampler<F, D>
where
    F: Fetch,
    D: Discriminator,
{
    pub fn new(fetch: F, discriminator: D) -> Self {
        Self {
            fetch,
            discriminator,
            retry: RetryPolicy::default(),
            concurrency: NonZeroUsize::MIN,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Spreads the samples over `concurrency` workers. Each worker records
    /// its own samples; they are merged in worker order once all succeed.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn fetch(&self) -> &F {
        &self.fetch
    }

    /// Takes `n` samples from `endpoint`.
    ///
    /// Fails on the first sample that cannot be obtained within the retry
    /// policy or cannot be classified, so a returned set always holds exactly
    /// `n` origins.
    pub async fn sample(&self, endpoint: &Uri, n: SampleSize) -> Result<SampleSet, SampleError> {
        let n = n.get();
        let workers = self.concurrency.get().min(n);
        debug!(%endpoint, n, workers, "Sampling");
        if workers == 1 {
            return self.run(endpoint, 0..n).await;
        }

        let runs = partition(n, workers).into_iter().enumerate().map(|(worker, samples)| {
            self.run(endpoint, samples)
                .instrument(tracing::debug_span!("worker", worker))
        });
        let sets = future::try_join_all(runs).await?;

        let mut merged = SampleSet::with_capacity(n);
        for set in sets {
            merged.append(set);
        }
        Ok(merged)
    }

    async fn run(&self, endpoint: &Uri, samples: Range<usize>) -> Result<SampleSet, SampleError> {
        let mut set = SampleSet::with_capacity(samples.len());
        for sample in samples {
            let body = self.fetch_with_retries(endpoint, sample).await?;
            let body = String::from_utf8_lossy(&body);
            match self.discriminator.classify(&body) {
                Some(origin) => {
                    trace!(sample, %origin, "Classified");
                    set.push(origin);
                }
                None => {
                    return Err(SampleError::Unclassified {
                        sample,
                        body: body.into_owned(),
                    })
                }
            }
        }
        Ok(set)
    }

    async fn fetch_with_retries(&self, endpoint: &Uri, sample: usize) -> Result<Bytes, SampleError> {
        let attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match self.fetch.get(endpoint).await {
                Ok(reply) if reply.status == StatusCode::OK => return Ok(reply.body),
                Ok(reply) => Failure::Status(reply.status),
                Err(error) => Failure::Fetch(error),
            };
            debug!(sample, attempt, %failure, "Attempt failed");
            if attempt >= attempts {
                return Err(SampleError::TransientBackendFailure {
                    sample,
                    attempts: attempt,
                    last: failure,
                });
            }
            time::sleep(self.retry.delay).await;
        }
    }
}

/// Splits `0..n` into `workers` contiguous ranges whose sizes differ by at
/// most one.
fn partition(n: usize, workers: usize) -> Vec<Range<usize>> {
    let base = n / workers;
    let extra = n % workers;
    let mut start = 0;
    (0..workers)
        .map(|worker| {
            let len = base + usize::from(worker < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}
