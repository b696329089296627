//! Deterministic synthetic engagement data served through [`EngagementApi`].
//!
//! Used by benchmarks, the demo and tests to exercise pagination, batching
//! and failure handling without a network.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};
use rand_wyrand::WyRand;

use crate::data::{ContinuationToken, Engagement, Identifier, Page};
use crate::error::{ConfigError, FetchError};
use crate::harvest::{EngagementApi, TweetRef, MAX_LOOKUP_BATCH};

const RETWEET_ID_BASE: u64 = 1 << 40;
const USER_ID_BASE: u64 = 1 << 50;

pub struct SyntheticConfig {
    pub seed: u64,
    /// Original tweets.
    pub tweets: usize,
    pub users: usize,
    pub page_size: usize,
    /// Share of sampled tweets that are retweets of an original.
    pub retweet_share: f64,
    /// Engager counts follow a Zipf law up to `max_engagers`.
    pub zipf_exponent: f64,
    pub max_engagers: usize,
}

impl Default for SyntheticConfig {
    fn default() -> SyntheticConfig {
        SyntheticConfig {
            seed: 123,
            tweets: 1_000,
            users: 50_000,
            page_size: 100,
            retweet_share: 0.5,
            zipf_exponent: 1.1,
            max_engagers: 2_000,
        }
    }
}

/// Periodic failures injected into upstream calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    /// Every n-th call is rate limited.
    pub rate_limit_every: Option<usize>,
    /// Every n-th call fails transiently.
    pub transient_every: Option<usize>,
}

struct OriginalTweet {
    author: u64,
    retweeters: Vec<u64>,
    likers: Vec<u64>,
}

pub struct SyntheticApi {
    originals: Vec<OriginalTweet>,
    /// Retweet index -> original index.
    retweets: Vec<usize>,
    sampled: Vec<Identifier>,
    page_size: usize,
    faults: Faults,
    calls: AtomicUsize,
}

impl SyntheticApi {
    pub fn new(config: &SyntheticConfig) -> Result<Self, ConfigError> {
        if config.tweets == 0 || config.users == 0 || config.page_size == 0 || config.max_engagers == 0 {
            return Err(ConfigError::Invalid {
                message: "synthetic tweets, users, page_size and max_engagers must be positive".into(),
            });
        }
        let zipf = Zipf::new(config.max_engagers as u64, config.zipf_exponent).map_err(|e| ConfigError::Invalid {
            message: format!("zipf_exponent: {e}"),
        })?;
        let retweet_share = config.retweet_share.clamp(0.0, 1.0);

        let mut rng = WyRand::from_seed(config.seed.to_le_bytes());
        let engagers = |rng: &mut WyRand| -> Vec<u64> {
            // Zipf samples start at 1, so a tweet may have no engagers at all
            let count = (zipf.sample(rng) as usize - 1).min(config.users);
            index::sample(rng, config.users, count)
                .into_iter()
                .map(|u| USER_ID_BASE + u as u64)
                .collect()
        };

        let originals: Vec<OriginalTweet> = (0..config.tweets)
            .map(|_| {
                let author = USER_ID_BASE + rng.gen_range(0..config.users) as u64;
                let retweeters = engagers(&mut rng);
                let likers = engagers(&mut rng);
                OriginalTweet {
                    author,
                    retweeters,
                    likers,
                }
            })
            .collect();

        let mut retweets = Vec::new();
        let mut sampled = Vec::with_capacity(config.tweets);
        for i in 0..config.tweets {
            if rng.gen_bool(retweet_share) {
                let original = rng.gen_range(0..config.tweets);
                sampled.push(Identifier::Num(RETWEET_ID_BASE + retweets.len() as u64));
                retweets.push(original);
            } else {
                sampled.push(Identifier::Num(i as u64));
            }
        }

        Ok(SyntheticApi {
            originals,
            retweets,
            sampled,
            page_size: config.page_size,
            faults: Faults::default(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// The tweets a dataset sample would contain, originals and retweets mixed.
    pub fn sampled_tweets(&self) -> &[Identifier] {
        &self.sampled
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Engagers of the original tweet `tweet`, unpaginated.
    pub fn expected_engagers(&self, kind: Engagement, tweet: &Identifier) -> Vec<Identifier> {
        self.original(tweet)
            .map(|t| self.listing(t, kind).iter().map(|&u| Identifier::Num(u)).collect())
            .unwrap_or_default()
    }

    pub fn total_engagements(&self, kind: Engagement) -> usize {
        self.originals.iter().map(|t| self.listing(t, kind).len()).sum()
    }

    fn original(&self, tweet: &Identifier) -> Option<&OriginalTweet> {
        match tweet {
            Identifier::Num(n) if *n < RETWEET_ID_BASE => self.originals.get(*n as usize),
            _ => None,
        }
    }

    fn listing<'a>(&self, tweet: &'a OriginalTweet, kind: Engagement) -> &'a [u64] {
        match kind {
            Engagement::Retweet => &tweet.retweeters,
            Engagement::Like => &tweet.likers,
        }
    }

    fn lookup(&self, id: &Identifier) -> Option<TweetRef> {
        let Identifier::Num(n) = *id else { return None };
        if n >= RETWEET_ID_BASE {
            let original = *self.retweets.get((n - RETWEET_ID_BASE) as usize)?;
            Some(TweetRef::retweet_of(n, original as u64, self.originals[original].author))
        } else {
            let tweet = self.originals.get(n as usize)?;
            Some(TweetRef::original(n, tweet.author))
        }
    }

    fn inject_fault(&self) -> Result<(), FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.faults.rate_limit_every {
            if call % n == 0 {
                return Err(FetchError::RateLimited { retry_after: None });
            }
        }
        if let Some(n) = self.faults.transient_every {
            if call % n == 0 {
                return Err(FetchError::transient(format!("injected failure on call {call}")));
            }
        }
        Ok(())
    }
}

impl EngagementApi for SyntheticApi {
    fn engagers(&self, kind: Engagement, tweet: &Identifier, token: Option<&ContinuationToken>) -> Result<Page, FetchError> {
        self.inject_fault()?;
        let original = self
            .original(tweet)
            .ok_or_else(|| FetchError::permanent(format!("unknown tweet {tweet}")))?;
        let offset = match token {
            None => 0,
            Some(token) => token
                .as_str()
                .strip_prefix('p')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| FetchError::permanent(format!("malformed token {token}")))?,
        };
        let listing = self.listing(original, kind);
        let start = offset.min(listing.len());
        let end = (start + self.page_size).min(listing.len());
        let items = listing[start..end].iter().map(|&u| Identifier::Num(u)).collect();
        let next = (end < listing.len()).then(|| ContinuationToken::new(format!("p{end}")));
        Ok(Page::new(items, next))
    }

    fn lookup_tweets(&self, ids: &[Identifier]) -> Result<Vec<TweetRef>, FetchError> {
        self.inject_fault()?;
        if ids.len() > MAX_LOOKUP_BATCH {
            return Err(FetchError::permanent(format!("{} ids exceed the lookup limit", ids.len())));
        }
        Ok(ids.iter().filter_map(|id| self.lookup(id)).collect())
    }
}
