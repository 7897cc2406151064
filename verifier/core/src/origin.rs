use serde::{Deserialize, Serialize};
use std::fmt;

/// The backend version that produced a response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    A,
    B,
}

/// Maps a response body to the backend version that produced it.
///
/// Returning `None` means the body cannot be attributed to either version;
/// samplers treat that as fatal rather than guessing.
pub trait Discriminator {
    fn classify(&self, body: &str) -> Option<Origin>;
}

/// Classifies bodies by looking for version-identifying tokens.
///
/// A body containing the origin A token is attributed to A. Without an
/// origin B token every other body is attributed to B; with one, a body must
/// contain it to be attributed to B.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenDiscriminator {
    a: String,
    b: Option<String>,
}

// === impl Origin ===

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

// === impl Discriminator ===

impl<F> Discriminator for F
where
    F: Fn(&str) -> Option<Origin>,
{
    #[inline]
    fn classify(&self, body: &str) -> Option<Origin> {
        (self)(body)
    }
}

// === impl TokenDiscriminator ===

impl TokenDiscriminator {
    pub const DEFAULT_A_TOKEN: &'static str = "A!";

    pub fn new(a: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: None,
        }
    }

    #[must_use]
    pub fn with_b_token(mut self, b: impl Into<String>) -> Self {
        self.b = Some(b.into());
        self
    }
}

impl Default for TokenDiscriminator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_A_TOKEN)
    }
}

impl Discriminator for TokenDiscriminator {
    fn classify(&self, body: &str) -> Option<Origin> {
        if body.contains(self.a.as_str()) {
            return Some(Origin::A);
        }
        match &self.b {
            None => Some(Origin::B),
            Some(b) if body.contains(b.as_str()) => Some(Origin::B),
            Some(_) => None,
        }
    }
}
