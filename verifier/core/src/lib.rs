#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod duration;
mod origin;
mod policy;
mod ratio;
mod sample;

pub use self::{
    duration::{GoDuration, ParseDurationError},
    origin::{Discriminator, Origin, TokenDiscriminator},
    policy::{PollPolicy, RetryPolicy},
    ratio::{evaluate_ratio, split_ratio, RatioMismatch, Verdict},
    sample::{InvalidSampleSize, ParseSampleSizeError, SampleSet, SampleSize},
};
