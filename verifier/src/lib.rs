#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
mod fetch;
mod ingress;
mod ready;
mod rules;
mod sampler;

pub use self::{
    args::Args,
    fetch::{Failure, Fetch, FetchError, HttpFetch, Reply},
    ingress::{endpoint, ingress_url, RouteRef},
    ready::{await_ready, NotReady},
    rules::{with_rules, Applied, KubeRules, RuleDeployer, RuleSet},
    sampler::{SampleError, Sampler},
};
