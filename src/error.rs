//! Error types.
//!
//! Every failure that can happen after some upstream data was already
//! gathered carries that data along, so callers can tell "empty but
//! successful" (`Ok` with nothing in it) from "failed with partial data" and
//! "failed with no data" (`Err` with a non-empty or empty `partial()`).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::data::{ContinuationToken, Identifier};
use crate::resolver::ResolutionResult;

/// What a single upstream call can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Too many requests; resend unchanged after waiting.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection reset, timeout, 5xx and the like.
    #[error("transient failure: {cause}")]
    Transient { cause: String },

    /// Invalid id, authorization denied. Never retried.
    #[error("permanent failure: {cause}")]
    Permanent { cause: String },
}

impl FetchError {
    pub fn transient(cause: impl fmt::Display) -> Self {
        FetchError::Transient {
            cause: cause.to_string(),
        }
    }

    pub fn permanent(cause: impl fmt::Display) -> Self {
        FetchError::Permanent {
            cause: cause.to_string(),
        }
    }
}

/// Failure of a paginated collection for one seed.
#[derive(Debug, Error)]
pub enum CollectionError<T = Identifier>
where
    T: fmt::Debug,
{
    #[error("collecting {seed} failed after {attempts} attempts (token {}): {cause}", fmt_token(.last_token))]
    Failed {
        seed: Identifier,
        last_token: Option<ContinuationToken>,
        attempts: u32,
        cause: FetchError,
        partial: Vec<T>,
    },

    #[error("collecting {seed} rejected (token {}): {cause}", fmt_token(.last_token))]
    Rejected {
        seed: Identifier,
        last_token: Option<ContinuationToken>,
        cause: FetchError,
    },

    #[error("upstream handed back already consumed token {token} while collecting {seed}")]
    RepeatedToken {
        seed: Identifier,
        token: ContinuationToken,
        partial: Vec<T>,
    },

    #[error("collecting {seed} cancelled")]
    Cancelled { seed: Identifier, partial: Vec<T> },
}

impl<T: fmt::Debug> CollectionError<T> {
    pub fn seed(&self) -> &Identifier {
        match self {
            CollectionError::Failed { seed, .. }
            | CollectionError::Rejected { seed, .. }
            | CollectionError::RepeatedToken { seed, .. }
            | CollectionError::Cancelled { seed, .. } => seed,
        }
    }

    /// Items accumulated before the failure, in collection order.
    pub fn partial(&self) -> &[T] {
        match self {
            CollectionError::Failed { partial, .. }
            | CollectionError::RepeatedToken { partial, .. }
            | CollectionError::Cancelled { partial, .. } => partial,
            CollectionError::Rejected { .. } => &[],
        }
    }

    pub fn into_partial(self) -> Vec<T> {
        match self {
            CollectionError::Failed { partial, .. }
            | CollectionError::RepeatedToken { partial, .. }
            | CollectionError::Cancelled { partial, .. } => partial,
            CollectionError::Rejected { .. } => Vec::new(),
        }
    }
}

fn fmt_token(token: &Option<ContinuationToken>) -> String {
    match token {
        Some(token) => token.to_string(),
        None => "<first page>".to_owned(),
    }
}

/// Failure of a batched resolution.
#[derive(Debug, Error)]
pub enum ResolutionError<K = usize>
where
    K: fmt::Debug,
{
    #[error("batch size must be between 1 and {max}, got {batch_size}")]
    InvalidBatchSize { batch_size: usize, max: usize },

    #[error("resolving batch {batch_index} failed after {attempts} attempts: {cause}")]
    Failed {
        batch_index: usize,
        attempts: u32,
        cause: FetchError,
        partial: ResolutionResult<K>,
    },

    #[error("resolving batch {batch_index} rejected: {cause}")]
    Rejected { batch_index: usize, cause: FetchError },

    #[error("resolution cancelled before batch {batch_index}")]
    Cancelled {
        batch_index: usize,
        partial: ResolutionResult<K>,
    },
}

impl<K: fmt::Debug> ResolutionError<K> {
    /// Rows merged from batches that completed before the failure.
    pub fn partial(&self) -> Option<&ResolutionResult<K>> {
        match self {
            ResolutionError::Failed { partial, .. } | ResolutionError::Cancelled { partial, .. } => {
                Some(partial)
            }
            ResolutionError::InvalidBatchSize { .. } | ResolutionError::Rejected { .. } => None,
        }
    }
}

/// I/O or encoding failure inside an edge sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("writing edges failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding edge failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration that could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {message}")]
    Invalid { message: String },
}
