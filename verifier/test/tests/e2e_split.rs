use mesh_split_core::{
    evaluate_ratio, Origin, PollPolicy, RetryPolicy, SampleSize, TokenDiscriminator,
};
use mesh_split_test::{
    backend::{self, Server},
    init_tracing,
};
use mesh_split_verifier::{await_ready, endpoint, HttpFetch, SampleError, Sampler};
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[tokio::test(flavor = "current_thread")]
async fn even_split_is_measured_as_half() {
    let _tracing = init_tracing();
    let mesh = Mesh::start(vec![0, 1], None).await;

    let set = sampler().sample(&mesh.request_data(), size(100)).await.unwrap();
    assert_eq!(set.count(Origin::A), 50);
    assert_eq!(set.count(Origin::B), 50);

    let verdict = evaluate_ratio(&set, 50.0, 5.0).unwrap();
    assert!(verdict.is_pass(), "{verdict}");
    assert_eq!(verdict.actual, 50.0);
}

#[tokio::test(flavor = "current_thread")]
async fn weighted_split_is_measured() {
    let _tracing = init_tracing();
    let mesh = Mesh::start(vec![0, 0, 0, 0, 1], None).await;

    let set = sampler().sample(&mesh.request_data(), size(100)).await.unwrap();
    let verdict = evaluate_ratio(&set, 80.0, 10.0).unwrap();
    assert!(verdict.is_pass(), "{verdict}");
    assert_eq!(verdict.actual, 80.0);
    assert_eq!(verdict.majority, Origin::A);

    let even = evaluate_ratio(&set, 50.0, 5.0).unwrap();
    let err = even.ensure().unwrap_err();
    assert!(
        err.to_string().contains("expected 50, actual 80"),
        "{err}"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn shed_load_is_absorbed_by_retries() {
    let _tracing = init_tracing();
    // Every third request through the mesh is rejected with a 503.
    let mesh = Mesh::start(vec![0, 1], Some(3)).await;

    let set = sampler().sample(&mesh.request_data(), size(60)).await.unwrap();
    assert_eq!(set.len(), 60, "every sample must eventually succeed");
    assert_eq!(set.count(Origin::A) + set.count(Origin::B), 60);
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_sampling_matches_sequential_counts() {
    let _tracing = init_tracing();
    let mesh = Mesh::start(vec![0, 1], None).await;

    let set = sampler()
        .with_concurrency(NonZeroUsize::new(4).unwrap())
        .sample(&mesh.request_data(), size(100))
        .await
        .unwrap();
    assert_eq!(set.len(), 100);
    assert_eq!(set.count(Origin::A), 50);
    assert_eq!(set.count(Origin::B), 50);
}

#[tokio::test(flavor = "current_thread")]
async fn unavailable_backend_fails_after_every_retry() {
    let _tracing = init_tracing();
    let hits = Arc::new(AtomicUsize::new(0));
    let server = backend::serve(backend::handler({
        let hits = hits.clone();
        move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            async { backend::status(http::StatusCode::SERVICE_UNAVAILABLE) }
        }
    }))
    .await
    .unwrap();

    let err = sampler()
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .sample(&endpoint(&server.base(), "request-data").unwrap(), size(100))
        .await
        .unwrap_err();
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(err.last_status(), Some(http::StatusCode::SERVICE_UNAVAILABLE));
    assert!(
        matches!(
            err,
            SampleError::TransientBackendFailure {
                sample: 0,
                attempts: 4,
                ..
            }
        ),
        "{err}"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn refused_connections_are_transient_failures() {
    let _tracing = init_tracing();
    // Bind and immediately release a port so nothing is listening on it.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let uri = format!("http://{addr}/request-data").parse().unwrap();

    let err = sampler()
        .with_retry(RetryPolicy::new(2, Duration::ZERO))
        .sample(&uri, size(10))
        .await
        .unwrap_err();
    match err {
        SampleError::TransientBackendFailure { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.status(), None, "no backend answered");
        }
        err => panic!("unexpected error: {err}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn waits_for_a_warming_client() {
    let _tracing = init_tracing();
    let data = backend::serve(backend::data("A", Duration::ZERO)).await.unwrap();
    let client = backend::serve(backend::warming(3, backend::client(data.authority())))
        .await
        .unwrap();
    let fetch = HttpFetch::default();

    let polls = await_ready(
        &fetch,
        &client.base(),
        PollPolicy::new(10, Duration::from_millis(1)),
    )
    .await
    .unwrap();
    assert_eq!(polls, 4);

    let err = await_ready(
        &fetch,
        &endpoint(&client.base(), "nowhere").unwrap(),
        PollPolicy::new(2, Duration::from_millis(1)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.attempts, 2);
    assert_eq!(err.last.status(), Some(http::StatusCode::NOT_FOUND));
}

#[tokio::test(flavor = "current_thread")]
async fn data_service_reports_its_version() {
    let _tracing = init_tracing();
    let data = backend::serve(backend::data("B", Duration::from_millis(5)))
        .await
        .unwrap();
    let reply = mesh_split_verifier::Fetch::get(
        &HttpFetch::default(),
        &endpoint(&data.base(), "data").unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(reply.status, http::StatusCode::OK);
    let body = String::from_utf8(reply.body.to_vec()).unwrap();
    assert!(body.starts_with("Hello from Service B! Operation completed in "), "{body}");
    assert!(body.ends_with("ms."), "{body}");
}

// === helpers ===

/// Two data services behind an in-process splitter, fronted by the client
/// service, mirroring ingress -> client -> mesh -> data.
struct Mesh {
    _data: [Server; 2],
    _split: Server,
    client: Server,
}

impl Mesh {
    async fn start(pattern: Vec<usize>, shed_every: Option<usize>) -> Self {
        let a = backend::serve(backend::data("A", Duration::from_millis(2)))
            .await
            .unwrap();
        let b = backend::serve(backend::data("B", Duration::from_millis(2)))
            .await
            .unwrap();
        let mut split = backend::split(vec![a.authority(), b.authority()], pattern);
        if let Some(every) = shed_every {
            split = backend::shed(every, split);
        }
        let split = backend::serve(split).await.unwrap();
        let client = backend::serve(backend::client(split.authority()))
            .await
            .unwrap();
        Self {
            _data: [a, b],
            _split: split,
            client,
        }
    }

    fn request_data(&self) -> http::Uri {
        endpoint(&self.client.base(), "request-data").unwrap()
    }
}

fn sampler() -> Sampler<HttpFetch, TokenDiscriminator> {
    Sampler::new(
        HttpFetch::new(Duration::from_secs(5)),
        TokenDiscriminator::default(),
    )
    .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
}

fn size(n: usize) -> SampleSize {
    SampleSize::new(n).unwrap()
}
