//! Engagement graph harvesting: paginated collection of retweeters and
//! likers, batched resolution of retweets to their originals, and
//! user → author edge lists built from both.

pub mod collector;
pub mod config;
pub mod data;
pub mod error;
pub mod generate;
pub mod harvest;
pub mod logging;
pub mod resolver;
pub mod retry;
pub mod sink;

pub use collector::PaginatedCollector;
pub use config::HarvestConfig;
pub use data::{ContinuationToken, EdgeRecord, Engagement, Identifier, Page, Seed};
pub use error::{CollectionError, ConfigError, FetchError, ResolutionError, SinkError};
pub use harvest::{EngagementApi, HarvestError, HarvestSummary, Harvester, TweetRef};
pub use resolver::{BatchResolver, Resolution, ResolutionRequest, ResolutionResult, ResolvedRow};
pub use retry::{CancelToken, RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use sink::{EdgeList, EdgeSink, JsonLinesSink};
