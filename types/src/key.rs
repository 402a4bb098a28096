use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Opaque cache identifier: a resource kind plus a discriminator.
///
/// Reference collections that are cached whole use [`CacheKey::collection`],
/// which fixes the discriminator to `all`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    kind: Cow<'static, str>,
    discriminator: String,
}

impl CacheKey {
    pub const COLLECTION: &'static str = "all";

    pub fn new(kind: impl Into<Cow<'static, str>>, discriminator: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            discriminator: discriminator.into(),
        }
    }

    /// Key for a whole collection of `kind`.
    pub fn collection(kind: impl Into<Cow<'static, str>>) -> Self {
        Self::new(kind, Self::COLLECTION)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.discriminator)
    }
}
