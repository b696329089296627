//! Builds user → author engagement edge lists.
//!
//! Sampled tweets are first resolved to the tweets they retweet (a tweet that
//! retweets nothing stands for itself), then every retweeter or liker of each
//! original becomes an edge towards the original's author.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::collector::PaginatedCollector;
use crate::config::HarvestConfig;
use crate::data::{ContinuationToken, EdgeRecord, Engagement, Identifier, Page, Seed};
use crate::error::{CollectionError, FetchError, ResolutionError, SinkError};
use crate::resolver::{BatchResolver, Resolution, ResolutionRequest, ResolutionResult};
use crate::retry::{CancelToken, Sleeper, ThreadSleeper};
use crate::sink::EdgeSink;

/// Most tweets the upstream lookup endpoint accepts per request.
pub const MAX_LOOKUP_BATCH: usize = 100;

/// A looked-up tweet and what it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetRef {
    pub id: Identifier,
    pub author_id: Option<Identifier>,
    /// The retweeted tweet, if this one is a retweet.
    pub referenced: Option<Identifier>,
    pub referenced_author_id: Option<Identifier>,
}

impl TweetRef {
    pub fn original(id: impl Into<Identifier>, author_id: impl Into<Identifier>) -> Self {
        TweetRef {
            id: id.into(),
            author_id: Some(author_id.into()),
            referenced: None,
            referenced_author_id: None,
        }
    }

    pub fn retweet_of(id: impl Into<Identifier>, original: impl Into<Identifier>, original_author: impl Into<Identifier>) -> Self {
        TweetRef {
            id: id.into(),
            author_id: None,
            referenced: Some(original.into()),
            referenced_author_id: Some(original_author.into()),
        }
    }

    /// The original tweet and its author; a tweet referencing nothing is its own original.
    pub fn resolution(self) -> Resolution {
        match self.referenced {
            Some(original) => Resolution {
                object: original,
                author: self.referenced_author_id,
            },
            None => Resolution {
                object: self.id,
                author: self.author_id,
            },
        }
    }
}

/// The upstream engagement endpoints.
pub trait EngagementApi {
    /// One page of users who retweeted or liked `tweet`.
    fn engagers(&self, kind: Engagement, tweet: &Identifier, token: Option<&ContinuationToken>) -> Result<Page, FetchError>;

    /// Looks up at most [`MAX_LOOKUP_BATCH`] tweets. Unknown ids are left out.
    fn lookup_tweets(&self, ids: &[Identifier]) -> Result<Vec<TweetRef>, FetchError>;
}

impl<A: EngagementApi + ?Sized> EngagementApi for &A {
    fn engagers(&self, kind: Engagement, tweet: &Identifier, token: Option<&ContinuationToken>) -> Result<Page, FetchError> {
        (**self).engagers(kind, tweet, token)
    }

    fn lookup_tweets(&self, ids: &[Identifier]) -> Result<Vec<TweetRef>, FetchError> {
        (**self).lookup_tweets(ids)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Seeds whose engagers were fully collected.
    pub seeds: usize,
    /// Edges handed to the sink, including those of a failed seed.
    pub edges: usize,
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("harvest stopped at seed {seed_index}: {source}")]
    Collection {
        seed_index: usize,
        written: HarvestSummary,
        #[source]
        source: CollectionError,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

pub struct Harvester<A, S = ThreadSleeper> {
    api: A,
    collector: PaginatedCollector<S>,
    resolver: BatchResolver<S>,
    batch_size: usize,
}

impl<A: EngagementApi> Harvester<A> {
    pub fn new(api: A, config: &HarvestConfig) -> Self {
        let batch_size = config.batch_size.min(MAX_LOOKUP_BATCH);
        let max_batch_size = config.max_batch_size.min(MAX_LOOKUP_BATCH);
        Self {
            api,
            collector: PaginatedCollector::new(config.retry.clone()),
            resolver: BatchResolver::new(config.retry.clone(), max_batch_size),
            batch_size,
        }
    }
}

impl<A: EngagementApi, S: Sleeper + Clone> Harvester<A, S> {
    pub fn with_sleeper<S2: Sleeper + Clone>(self, sleeper: S2) -> Harvester<A, S2> {
        Harvester {
            api: self.api,
            collector: self.collector.with_sleeper(sleeper.clone()),
            resolver: self.resolver.with_sleeper(sleeper),
            batch_size: self.batch_size,
        }
    }

    /// Shares `cancel` between resolution and collection.
    pub fn with_cancel(self, cancel: CancelToken) -> Self {
        Harvester {
            api: self.api,
            collector: self.collector.with_cancel(cancel.clone()),
            resolver: self.resolver.with_cancel(cancel),
            batch_size: self.batch_size,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Resolves each row's tweet to the original it retweets.
    pub fn resolve_originals<K>(&self, requests: &ResolutionRequest<K>) -> Result<ResolutionResult<K>, ResolutionError<K>>
    where
        K: Clone + Eq + Hash + fmt::Debug,
    {
        self.resolver.resolve(requests, self.batch_size, |ids| {
            let tweets = self.api.lookup_tweets(ids)?;
            Ok(tweets
                .into_iter()
                .map(|tweet| (tweet.id.clone(), tweet.resolution()))
                .collect::<HashMap<_, _>>())
        })
    }

    /// All engagers of one tweet, in upstream order.
    pub fn engagers(&self, kind: Engagement, tweet: &Identifier) -> Result<Vec<Identifier>, CollectionError> {
        self.collector
            .collect_all(tweet, |tweet, token| self.api.engagers(kind, tweet, token))
    }

    /// Collects the engagers of every seed and writes one edge per engager
    /// to `sink`, seed by seed.
    ///
    /// A seed's edges reach the sink only once its collection ended. When a
    /// collection fails, the edges gathered for that seed so far are still
    /// written before the error is returned.
    pub fn harvest<O: EdgeSink + ?Sized>(&self, kind: Engagement, seeds: &[Seed], sink: &mut O) -> Result<HarvestSummary, HarvestError> {
        let span = info_span!("harvest", %kind, seeds = seeds.len());
        let _enter = span.enter();

        let mut summary = HarvestSummary::default();
        for (seed_index, seed) in seeds.iter().enumerate() {
            match self.engagers(kind, &seed.tweet_id) {
                Ok(users) => {
                    let edges = edges_for(users, seed);
                    sink.accept(kind, &edges)?;
                    summary.seeds += 1;
                    summary.edges += edges.len();
                    debug!(tweet = %seed.tweet_id, edges = edges.len(), "seed done");
                }
                Err(source) => {
                    let edges = edges_for(source.partial().to_vec(), seed);
                    sink.accept(kind, &edges)?;
                    summary.edges += edges.len();
                    sink.flush()?;
                    warn!(seed_index, %source, partial = edges.len(), "harvest stopped");
                    return Err(HarvestError::Collection {
                        seed_index,
                        written: summary,
                        source,
                    });
                }
            }
        }
        sink.flush()?;
        info!(seeds = summary.seeds, edges = summary.edges, "harvest complete");
        Ok(summary)
    }
}

fn edges_for(users: Vec<Identifier>, seed: &Seed) -> Vec<EdgeRecord> {
    users
        .into_iter()
        .map(|user| EdgeRecord {
            subject: user,
            object: seed.author_id.clone(),
        })
        .collect()
}

/// Seeds for every resolved row whose author is known, in row order.
pub fn seeds_from<K>(resolved: &ResolutionResult<K>) -> Vec<Seed> {
    let mut seeds = Vec::with_capacity(resolved.len());
    for (_, row) in resolved.iter() {
        match &row.author {
            Some(author) => seeds.push(Seed {
                tweet_id: row.object.clone(),
                author_id: author.clone(),
            }),
            None => debug!(tweet = %row.object, "no author, skipping"),
        }
    }
    seeds
}
