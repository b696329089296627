use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use tracing::{debug, debug_span, trace};

use crate::data::Identifier;
use crate::error::{FetchError, ResolutionError};
use crate::retry::{self, CancelToken, RetryFailure, RetryPolicy, Sleeper, ThreadSleeper};

/// Ordered rows to resolve, each tagged with a caller-chosen key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest<K = usize> {
    rows: Vec<(K, Identifier)>,
}

impl<K> Default for ResolutionRequest<K> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<K> ResolutionRequest<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row_key: K, source_id: impl Into<Identifier>) {
        self.rows.push((row_key, source_id.into()));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[(K, Identifier)] {
        &self.rows
    }
}

impl ResolutionRequest<usize> {
    /// Keys each source id by its position.
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Identifier>,
    {
        sources.into_iter().enumerate().collect()
    }
}

impl<K, I: Into<Identifier>> FromIterator<(K, I)> for ResolutionRequest<K> {
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().map(|(k, id)| (k, id.into())).collect(),
        }
    }
}

/// What one source id resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub object: Identifier,
    pub author: Option<Identifier>,
}

impl Resolution {
    pub fn with_author(mut self, author: impl Into<Identifier>) -> Self {
        self.author = Some(author.into());
        self
    }
}

impl From<Identifier> for Resolution {
    fn from(object: Identifier) -> Self {
        Resolution { object, author: None }
    }
}

/// A resolved row: `subject` is the source id, `object` what it resolved to.
///
/// A source with nothing to resolve resolves to itself, so
/// `subject == object` there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub subject: Identifier,
    pub object: Identifier,
    pub author: Option<Identifier>,
}

impl ResolvedRow {
    pub fn is_self_reference(&self) -> bool {
        self.subject == self.object
    }
}

/// Resolved rows keyed by row key, iterated in request order.
///
/// A row key that is absent means "no result", never an error.
#[derive(Debug, Clone)]
pub struct ResolutionResult<K = usize> {
    rows: Vec<(K, ResolvedRow)>,
    index: HashMap<K, usize>,
}

impl<K> Default for ResolutionResult<K> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> ResolutionResult<K> {
    pub fn get(&self, row_key: &K) -> Option<&ResolvedRow> {
        self.index.get(row_key).map(|&i| &self.rows[i].1)
    }

    pub fn contains(&self, row_key: &K) -> bool {
        self.index.contains_key(row_key)
    }

    fn insert(&mut self, row_key: K, row: ResolvedRow) {
        match self.index.get(&row_key) {
            Some(&i) => self.rows[i].1 = row,
            None => {
                self.index.insert(row_key.clone(), self.rows.len());
                self.rows.push((row_key, row));
            }
        }
    }
}

impl<K> ResolutionResult<K> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &ResolvedRow)> {
        self.rows.iter().map(|(k, row)| (k, row))
    }

    pub fn into_rows(self) -> Vec<(K, ResolvedRow)> {
        self.rows
    }
}

/// Resolves ids in fixed-size batches and joins the answers back by row key.
#[derive(Debug, Clone)]
pub struct BatchResolver<S = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
    cancel: CancelToken,
    max_batch_size: usize,
}

impl BatchResolver {
    pub fn new(policy: RetryPolicy, max_batch_size: usize) -> Self {
        Self {
            policy,
            sleeper: ThreadSleeper,
            cancel: CancelToken::new(),
            max_batch_size,
        }
    }
}

impl<S: Sleeper> BatchResolver<S> {
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> BatchResolver<S2> {
        BatchResolver {
            policy: self.policy,
            sleeper,
            cancel: self.cancel,
            max_batch_size: self.max_batch_size,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Splits `requests` into contiguous batches of at most `batch_size`
    /// rows and calls `resolve_batch` once per batch with that batch's source
    /// ids in order.
    ///
    /// `resolve_batch` may answer for only some of the ids; rows whose id got
    /// no answer are left out of the result. Every row carrying an answered
    /// id receives the answer, so repeated source ids resolve together.
    pub fn resolve<K, F>(
        &self,
        requests: &ResolutionRequest<K>,
        batch_size: usize,
        mut resolve_batch: F,
    ) -> Result<ResolutionResult<K>, ResolutionError<K>>
    where
        K: Clone + Eq + Hash + fmt::Debug,
        F: FnMut(&[Identifier]) -> Result<HashMap<Identifier, Resolution>, FetchError>,
    {
        if batch_size == 0 || batch_size > self.max_batch_size {
            return Err(ResolutionError::InvalidBatchSize {
                batch_size,
                max: self.max_batch_size,
            });
        }

        let span = debug_span!("resolve", rows = requests.len(), batch_size);
        let _enter = span.enter();

        let mut result = ResolutionResult::default();
        for (batch_index, batch) in requests.rows().chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                return Err(ResolutionError::Cancelled {
                    batch_index,
                    partial: result,
                });
            }

            let sources: Vec<Identifier> = batch.iter().map(|(_, id)| id.clone()).collect();
            let resolved = match retry::run(&self.policy, &self.sleeper, &self.cancel, || resolve_batch(&sources)) {
                Ok(resolved) => resolved,
                Err(RetryFailure::Exhausted { attempts, cause }) => {
                    return Err(ResolutionError::Failed {
                        batch_index,
                        attempts,
                        cause,
                        partial: result,
                    })
                }
                Err(RetryFailure::Permanent(cause)) => {
                    return Err(ResolutionError::Rejected { batch_index, cause })
                }
                Err(RetryFailure::Cancelled) => {
                    return Err(ResolutionError::Cancelled {
                        batch_index,
                        partial: result,
                    })
                }
            };

            let before = result.len();
            for (row_key, source) in batch {
                if let Some(resolution) = resolved.get(source) {
                    result.insert(
                        row_key.clone(),
                        ResolvedRow {
                            subject: source.clone(),
                            object: resolution.object.clone(),
                            author: resolution.author.clone(),
                        },
                    );
                }
            }
            trace!(batch_index, len = batch.len(), merged = result.len() - before, "batch resolved");
        }

        debug!(resolved = result.len(), "resolution complete");
        Ok(result)
    }
}
