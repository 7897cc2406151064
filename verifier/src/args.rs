use crate::{
    await_ready, endpoint, ingress_url, with_rules, HttpFetch, KubeRules, RouteRef, RuleSet,
    Sampler,
};
use anyhow::{anyhow, ensure, Context, Result};
use clap::{Parser, Subcommand};
use http::Uri;
use mesh_split_core::{
    evaluate_ratio, GoDuration, PollPolicy, RetryPolicy, SampleSize, TokenDiscriminator, Verdict,
};
use std::{num::NonZeroUsize, path::PathBuf};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "mesh-split",
    about = "Measures how a service mesh splits traffic between two backend versions"
)]
pub struct Args {
    #[clap(long, default_value = "mesh_split=info,warn", env = "MESH_SPLIT_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "MESH_SPLIT_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Samples the ingress and checks the observed split against an expected
    /// ratio.
    Verify(Verify),
}

#[derive(Debug, clap::Args)]
struct Verify {
    /// Base URL of the mesh ingress. When unset, it is read from the
    /// `--ingress-route` OpenShift route.
    #[clap(long, env = "MESH_SPLIT_INGRESS_URL")]
    ingress_url: Option<Uri>,

    #[clap(long, default_value = "istio-system/istio-ingress")]
    ingress_route: RouteRef,

    /// Path, relative to the ingress, that is sampled.
    #[clap(long, default_value = "example/request-data")]
    path: String,

    /// Path, relative to the ingress, that must answer 200 before sampling.
    #[clap(long, default_value = "example/")]
    ready_path: String,

    /// Expected share of the majority backend, in percent.
    #[clap(long)]
    expected: f64,

    /// Allowed difference between the expected and observed share, in
    /// percentage points.
    #[clap(long)]
    tolerance: f64,

    #[clap(long, default_value = "100")]
    samples: SampleSize,

    /// Additional attempts for a sample whose request fails.
    #[clap(long, default_value = "3")]
    max_retries: u32,

    #[clap(long, default_value = "100ms")]
    retry_delay: GoDuration,

    #[clap(long, default_value = "10s")]
    timeout: GoDuration,

    #[clap(long, default_value = "1")]
    concurrency: NonZeroUsize,

    /// Token that identifies responses from backend A.
    #[clap(long, default_value = TokenDiscriminator::DEFAULT_A_TOKEN)]
    origin_a_token: String,

    /// Token that identifies responses from backend B. When unset, every
    /// response without the A token is attributed to B.
    #[clap(long)]
    origin_b_token: Option<String>,

    #[clap(long, default_value = "60")]
    ready_attempts: u32,

    #[clap(long, default_value = "1s")]
    ready_interval: GoDuration,

    /// Rule manifests to deploy for the duration of the verification.
    #[clap(long = "rules")]
    rules: Vec<PathBuf>,

    /// Namespace for namespaced rules that do not name one.
    #[clap(long, default_value = "default")]
    rules_namespace: String,

    /// Time to wait after deploying rules before sampling.
    #[clap(long, default_value = "0s")]
    settle: GoDuration,

    /// Print the verdict as JSON.
    #[clap(long)]
    json: bool,
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            command,
        } = self;

        log_format
            .try_init(log_level)
            .map_err(|error| anyhow!("failed to initialize logging: {error}"))?;

        match command {
            Command::Verify(verify) => verify.run().await,
        }
    }
}

// === impl Verify ===

impl Verify {
    fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=100.0).contains(&self.expected),
            "--expected must be a percentage, got {}",
            self.expected
        );
        ensure!(
            self.tolerance >= 0.0,
            "--tolerance must not be negative, got {}",
            self.tolerance
        );
        Ok(())
    }

    fn discriminator(&self) -> TokenDiscriminator {
        let discriminator = TokenDiscriminator::new(self.origin_a_token.clone());
        match &self.origin_b_token {
            Some(b) => discriminator.with_b_token(b.clone()),
            None => discriminator,
        }
    }

    async fn run(self) -> Result<()> {
        self.validate()?;

        let rules = self
            .rules
            .iter()
            .map(|path| RuleSet::load(path))
            .collect::<Result<Vec<_>>>()?;

        // A cluster client is only needed to look up the ingress or to deploy
        // rules.
        let (client, base) = match self.ingress_url.clone() {
            Some(url) if rules.is_empty() => (None, url),
            url => {
                let client = kube::Client::try_default()
                    .await
                    .context("failed to initialize Kubernetes client")?;
                let base = match url {
                    Some(url) => url,
                    None => ingress_url(&client, &self.ingress_route).await?,
                };
                (Some(client), base)
            }
        };
        let target = endpoint(&base, &self.path)?;
        let ready = endpoint(&base, &self.ready_path)?;
        info!(%target, expected = self.expected, tolerance = self.tolerance, "Verifying split");

        let fetch = HttpFetch::new(self.timeout.into());
        let sampler = Sampler::new(fetch.clone(), self.discriminator())
            .with_retry(RetryPolicy::new(self.max_retries, self.retry_delay.into()))
            .with_concurrency(self.concurrency);
        let poll = PollPolicy::new(self.ready_attempts, self.ready_interval.into());
        let (settle, samples, expected, tolerance) =
            (self.settle, self.samples, self.expected, self.tolerance);

        let verify = async move {
            if !settle.is_zero() {
                info!(%settle, "Waiting for rules to take effect");
                tokio::time::sleep(settle.into()).await;
            }
            await_ready(&fetch, &ready, poll).await?;
            let set = sampler.sample(&target, samples).await?;
            let verdict = evaluate_ratio(&set, expected, tolerance)?;
            Ok::<_, anyhow::Error>(verdict)
        };

        let verdict = match client {
            Some(client) if !rules.is_empty() => {
                let deployer = KubeRules::new(client, self.rules_namespace.clone());
                with_rules(&deployer, &rules, move || verify).await??
            }
            _ => verify.await?,
        };

        report(&verdict, self.json)?;
        verdict.ensure()?;
        Ok(())
    }
}

fn report(verdict: &Verdict, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(verdict)?);
    } else {
        println!("{verdict}");
    }
    Ok(())
}
