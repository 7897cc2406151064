use crate::fetch::{Failure, Fetch};
use http::{StatusCode, Uri};
use mesh_split_core::PollPolicy;
use tokio::time;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
#[error("{uri} not ready after {attempts} attempts: {last}")]
pub struct NotReady {
    pub uri: Uri,
    pub attempts: u32,
    pub last: Failure,
}

/// Polls `uri` until it answers 200, giving up after the policy's maximum
/// number of attempts. Returns the number of polls it took.
pub async fn await_ready<F>(fetch: &F, uri: &Uri, poll: PollPolicy) -> Result<u32, NotReady>
where
    F: Fetch + ?Sized,
{
    let attempts = poll.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let failure = match fetch.get(uri).await {
            Ok(reply) if reply.status == StatusCode::OK => {
                info!(%uri, attempt, "Ready");
                return Ok(attempt);
            }
            Ok(reply) => Failure::Status(reply.status),
            Err(error) => Failure::Fetch(error),
        };
        debug!(%uri, attempt, %failure, "Not ready");
        if attempt >= attempts {
            return Err(NotReady {
                uri: uri.clone(),
                attempts: attempt,
                last: failure,
            });
        }
        time::sleep(poll.interval).await;
    }
}
