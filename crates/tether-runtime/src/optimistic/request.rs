#![forbid(unsafe_code)]

//! Update requests: a patch plus the metadata that follows it through the
//! optimistic protocol.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one update request.
///
/// The reducer and the backend both key on this ID to match a completion to
/// the speculative patch it confirms or reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestId(pub u64);

impl RequestId {
    /// Allocate a fresh, process-unique ID.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who or what issued an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RequestSource {
    /// Direct user action (form submit, key press).
    #[default]
    User,
    /// Issued by application code.
    Programmatic,
    /// Re-sent after an earlier attempt failed.
    Retry,
}

/// Metadata attached to every update request for tracing and display.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub id: RequestId,
    /// Human-readable description (e.g., "Update tagline").
    pub description: String,
    pub issued_at: Instant,
    pub source: RequestSource,
}

impl RequestMetadata {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: RequestId::next(),
            description: description.into(),
            issued_at: Instant::now(),
            source: RequestSource::User,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: RequestSource) -> Self {
        self.source = source;
        self
    }

    /// Time since the request was issued.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.issued_at.elapsed()
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new("Update")
    }
}

/// A desired mutation plus its metadata.
#[derive(Debug, Clone)]
pub struct UpdateRequest<P> {
    patch: P,
    metadata: RequestMetadata,
}

impl<P> UpdateRequest<P> {
    /// A user-issued request with a default description.
    #[must_use]
    pub fn new(patch: P) -> Self {
        Self {
            patch,
            metadata: RequestMetadata::default(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: RequestSource) -> Self {
        self.metadata.source = source;
        self
    }

    /// A new request carrying the same patch, marked as a retry.
    #[must_use]
    pub fn retry(&self) -> Self
    where
        P: Clone,
    {
        Self {
            patch: self.patch.clone(),
            metadata: RequestMetadata::new(self.metadata.description.clone())
                .with_source(RequestSource::Retry),
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.metadata.id
    }

    #[must_use]
    pub fn patch(&self) -> &P {
        &self.patch
    }

    #[must_use]
    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn into_patch(self) -> P {
        self.patch
    }
}
