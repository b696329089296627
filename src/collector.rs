use std::collections::HashSet;
use std::fmt;

use tracing::{debug, debug_span, trace};

use crate::data::{ContinuationToken, Identifier, Page};
use crate::error::{CollectionError, FetchError};
use crate::retry::{self, CancelToken, RetryFailure, RetryPolicy, Sleeper, ThreadSleeper};

/// Walks a paginated listing from its first page to its last.
///
/// Pages are appended in arrival order into one buffer. Nothing is
/// deduplicated: the same id may legitimately show up on several pages.
#[derive(Debug, Clone)]
pub struct PaginatedCollector<S = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
    cancel: CancelToken,
}

impl PaginatedCollector {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: ThreadSleeper,
            cancel: CancelToken::new(),
        }
    }
}

impl<S: Sleeper> PaginatedCollector<S> {
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> PaginatedCollector<S2> {
        PaginatedCollector {
            policy: self.policy,
            sleeper,
            cancel: self.cancel,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches every page for `seed` and returns the items in page order.
    ///
    /// The first request carries no token; each later one carries the token
    /// of the page before it. The walk ends on a page without a token or on
    /// a page with no items. A rate limited or transiently failing request
    /// is resent unchanged, so the token only moves forward after a page
    /// was actually received.
    pub fn collect_all<T, F>(&self, seed: &Identifier, mut fetch_page: F) -> Result<Vec<T>, CollectionError<T>>
    where
        T: fmt::Debug,
        F: FnMut(&Identifier, Option<&ContinuationToken>) -> Result<Page<T>, FetchError>,
    {
        let span = debug_span!("collect_all", %seed);
        let _enter = span.enter();

        let mut items: Vec<T> = Vec::new();
        let mut token: Option<ContinuationToken> = None;
        let mut consumed: HashSet<ContinuationToken> = HashSet::new();
        let mut pages = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                debug!(items = items.len(), "cancelled between pages");
                return Err(CollectionError::Cancelled {
                    seed: seed.clone(),
                    partial: items,
                });
            }

            let fetched = retry::run(&self.policy, &self.sleeper, &self.cancel, || {
                fetch_page(seed, token.as_ref())
            });
            let page = match fetched {
                Ok(page) => page,
                Err(RetryFailure::Exhausted { attempts, cause }) => {
                    return Err(CollectionError::Failed {
                        seed: seed.clone(),
                        last_token: token,
                        attempts,
                        cause,
                        partial: items,
                    })
                }
                Err(RetryFailure::Permanent(cause)) => {
                    return Err(CollectionError::Rejected {
                        seed: seed.clone(),
                        last_token: token,
                        cause,
                    })
                }
                Err(RetryFailure::Cancelled) => {
                    return Err(CollectionError::Cancelled {
                        seed: seed.clone(),
                        partial: items,
                    })
                }
            };
            pages += 1;

            let (page_items, next) = page.into_parts();
            trace!(page = pages, len = page_items.len(), has_more = next.is_some(), "page received");
            // an empty listing ends the walk even when a token came back with it
            if page_items.is_empty() {
                break;
            }
            items.extend(page_items);

            let Some(next) = next else { break };
            if let Some(prev) = token.take() {
                consumed.insert(prev);
            }
            if consumed.contains(&next) {
                return Err(CollectionError::RepeatedToken {
                    seed: seed.clone(),
                    token: next,
                    partial: items,
                });
            }
            token = Some(next);
        }

        debug!(pages, items = items.len(), "collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RecordingSleeper;
    use expect_test::{expect, Expect};
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn id(s: &str) -> Identifier {
        Identifier::from(s)
    }

    fn tok(s: &str) -> ContinuationToken {
        ContinuationToken::new(s)
    }

    fn ids_eq(items: &[Identifier], ex: Expect) {
        let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
        ex.assert_eq(&joined.join(","));
    }

    fn collector() -> (PaginatedCollector<Arc<RecordingSleeper>>, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let collector = PaginatedCollector::new(RetryPolicy::default()).with_sleeper(Arc::clone(&sleeper));
        (collector, sleeper)
    }

    /// Serves `pages` in order, then empty last pages.
    fn scripted(pages: Vec<Page>) -> impl FnMut(&Identifier, Option<&ContinuationToken>) -> Result<Page, FetchError> {
        let mut pages = pages.into_iter();
        move |_: &Identifier, _: Option<&ContinuationToken>| Ok(pages.next().unwrap_or(Page::Done { items: vec![] }))
    }

    #[test]
    fn two_pages() {
        let (collector, _) = collector();
        let mut seen_tokens = Vec::new();
        let mut pages = vec![
            Page::new(vec![id("u1"), id("u2")], Some(tok("A"))),
            Page::new(vec![id("u3")], None),
        ]
        .into_iter();
        let out = collector
            .collect_all(&id("T1"), |seed, token| {
                assert_eq!(seed, &id("T1"));
                seen_tokens.push(token.cloned());
                Ok(pages.next().unwrap())
            })
            .unwrap();
        ids_eq(&out, expect!["u1,u2,u3"]);
        assert_eq!(seen_tokens, vec![None, Some(tok("A"))]);
    }

    #[test]
    fn empty_listing_is_success() {
        let (collector, _) = collector();
        let out = collector.collect_all(&id("T1"), scripted(vec![Page::new(vec![], None)]));
        assert_eq!(out.unwrap(), Vec::<Identifier>::new());
    }

    #[test]
    fn empty_page_with_token_ends_walk() {
        let (collector, _) = collector();
        let mut calls = 0;
        let out = collector
            .collect_all(&id("T1"), |_, token| {
                calls += 1;
                Ok(match token {
                    None => Page::new(vec![id("u1")], Some(tok("A"))),
                    Some(_) => Page::new(vec![], Some(tok("B"))),
                })
            })
            .unwrap();
        ids_eq(&out, expect!["u1"]);
        assert_eq!(calls, 2);
    }

    #[test]
    fn non_empty_last_page_ends_walk() {
        let (collector, _) = collector();
        let out = collector
            .collect_all(&id("T1"), scripted(vec![Page::new(vec![id("u1"), id("u1")], None)]))
            .unwrap();
        // duplicates are kept
        ids_eq(&out, expect!["u1,u1"]);
    }

    #[test]
    fn rate_limit_once_is_invisible() {
        let (collector, sleeper) = collector();
        let mut limited = false;
        let mut tokens = Vec::new();
        let out = collector
            .collect_all(&id("T1"), |_, token| {
                tokens.push(token.cloned());
                match token {
                    None => Ok(Page::new(vec![id("u1"), id("u2")], Some(tok("A")))),
                    Some(_) if !limited => {
                        limited = true;
                        Err(FetchError::RateLimited {
                            retry_after: Some(Duration::from_secs(3)),
                        })
                    }
                    Some(_) => Ok(Page::new(vec![id("u3")], None)),
                }
            })
            .unwrap();
        ids_eq(&out, expect!["u1,u2,u3"]);
        // the limited request was resent with the same token
        assert_eq!(tokens, vec![None, Some(tok("A")), Some(tok("A"))]);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn transient_exhaustion_keeps_partial() {
        let (collector, sleeper) = collector();
        let err = collector
            .collect_all(&id("T1"), |_, token| match token {
                None => Ok(Page::new(vec![id("u1"), id("u2")], Some(tok("A")))),
                Some(_) => Err(FetchError::transient("connection reset")),
            })
            .unwrap_err();
        match &err {
            CollectionError::Failed {
                seed,
                last_token,
                attempts,
                partial,
                ..
            } => {
                assert_eq!(seed, &id("T1"));
                assert_eq!(last_token, &Some(tok("A")));
                assert_eq!(*attempts, 4);
                ids_eq(partial, expect!["u1,u2"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let delays: Vec<u128> = sleeper.slept().iter().map(Duration::as_millis).collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);
    }

    #[test]
    fn transient_recovery_within_budget() {
        let (collector, _) = collector();
        let mut failures = 0;
        let out = collector
            .collect_all(&id("T1"), |_, _| {
                if failures < 3 {
                    failures += 1;
                    Err(FetchError::transient("timeout"))
                } else {
                    Ok(Page::new(vec![id("u1")], None))
                }
            })
            .unwrap();
        ids_eq(&out, expect!["u1"]);
    }

    #[test]
    fn permanent_failure_carries_nothing() {
        let (collector, sleeper) = collector();
        let err = collector
            .collect_all(&id("T1"), |_, token| match token {
                None => Ok(Page::new(vec![id("u1")], Some(tok("A")))),
                Some(_) => Err(FetchError::permanent("unauthorized")),
            })
            .unwrap_err();
        assert!(matches!(err, CollectionError::Rejected { .. }));
        assert!(err.partial().is_empty());
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn repeated_token_is_an_error() {
        let (collector, _) = collector();
        let err = collector
            .collect_all(&id("T1"), |_, token| {
                Ok(match token {
                    None => Page::new(vec![id("u1")], Some(tok("A"))),
                    Some(_) => Page::new(vec![id("u2")], Some(tok("A"))),
                })
            })
            .unwrap_err();
        match err {
            CollectionError::RepeatedToken { token, partial, .. } => {
                assert_eq!(token, tok("A"));
                ids_eq(&partial, expect!["u1,u2"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancel_between_pages_returns_partial() {
        let (collector, _) = collector();
        let cancel = collector.cancel_token().clone();
        let err = collector
            .collect_all(&id("T1"), |_, token| {
                Ok(match token {
                    None => {
                        cancel.cancel();
                        Page::new(vec![id("u1")], Some(tok("A")))
                    }
                    Some(_) => panic!("fetched after cancellation"),
                })
            })
            .unwrap_err();
        assert!(matches!(err, CollectionError::Cancelled { .. }));
        ids_eq(err.partial(), expect!["u1"]);
    }

    proptest! {
        #[test]
        fn pages_concatenate_in_order(sizes in proptest::collection::vec(1usize..8, 1..12)) {
            let (collector, _) = collector();
            let mut next = 0u64;
            let mut expected = Vec::new();
            let mut pages = Vec::new();
            for (i, size) in sizes.iter().enumerate() {
                let items: Vec<Identifier> = (0..*size).map(|_| { next += 1; Identifier::from(next) }).collect();
                expected.extend(items.iter().cloned());
                let token = (i + 1 < sizes.len()).then(|| tok(&format!("p{i}")));
                pages.push(Page::new(items, token));
            }
            let out = collector.collect_all(&Identifier::from(0u64), scripted(pages)).unwrap();
            prop_assert_eq!(out.len(), sizes.iter().sum::<usize>());
            prop_assert_eq!(out, expected);
        }
    }
}
