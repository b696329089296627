use std::fmt;

use serde::{Deserialize, Serialize};
use static_assertions::assert_impl_all;

/// Opaque name of a remote entity, either a tweet or a user.
///
/// Numeric and textual ids never compare equal to each other, so `7` and
/// `"7"` are different identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Num(u64),
    Text(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Num(n) => write!(f, "{n}"),
            Identifier::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Identifier {
    fn from(n: u64) -> Self {
        Identifier::Num(n)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::Text(s.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier::Text(s)
    }
}

/// Upstream cursor pointing at the next page of a listing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        ContinuationToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a paginated listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Page<T = Identifier> {
    HasMore { items: Vec<T>, token: ContinuationToken },
    Done { items: Vec<T> },
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, token: Option<ContinuationToken>) -> Self {
        match token {
            Some(token) => Page::HasMore { items, token },
            None => Page::Done { items },
        }
    }

    pub fn items(&self) -> &[T] {
        match self {
            Page::HasMore { items, .. } | Page::Done { items } => items,
        }
    }

    pub fn token(&self) -> Option<&ContinuationToken> {
        match self {
            Page::HasMore { token, .. } => Some(token),
            Page::Done { .. } => None,
        }
    }

    pub fn into_parts(self) -> (Vec<T>, Option<ContinuationToken>) {
        match self {
            Page::HasMore { items, token } => (items, Some(token)),
            Page::Done { items } => (items, None),
        }
    }
}

/// Which engagement listing an edge came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engagement {
    Retweet,
    Like,
}

impl fmt::Display for Engagement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engagement::Retweet => f.write_str("retweet"),
            Engagement::Like => f.write_str("like"),
        }
    }
}

/// `subject` acted upon `object`, e.g. a user who retweeted an author.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub subject: Identifier,
    pub object: Identifier,
}

impl EdgeRecord {
    pub fn new(subject: impl Into<Identifier>, object: impl Into<Identifier>) -> Self {
        EdgeRecord {
            subject: subject.into(),
            object: object.into(),
        }
    }
}

/// An original tweet whose engagers get collected, with the author they engaged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub tweet_id: Identifier,
    pub author_id: Identifier,
}

impl Seed {
    pub fn new(tweet_id: impl Into<Identifier>, author_id: impl Into<Identifier>) -> Self {
        Seed {
            tweet_id: tweet_id.into(),
            author_id: author_id.into(),
        }
    }
}

// independent collections may run on separate threads
assert_impl_all!(Identifier: Send, Sync);
assert_impl_all!(Page: Send, Sync);
assert_impl_all!(EdgeRecord: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn numeric_and_text_ids_differ() {
        assert_ne!(Identifier::from(7u64), Identifier::from("7"));
        assert_eq!(Identifier::from("u1"), Identifier::Text("u1".to_owned()));
    }

    #[test]
    fn page_parts() {
        let page = Page::new(vec![Identifier::from("u1")], Some(ContinuationToken::new("A")));
        assert_eq!(page.token().map(ContinuationToken::as_str), Some("A"));
        let (items, token) = page.into_parts();
        assert_eq!(items, vec![Identifier::from("u1")]);
        assert!(token.is_some());

        let last: Page = Page::new(vec![], None);
        assert!(last.items().is_empty());
        assert!(last.token().is_none());
    }

    #[test]
    fn edge_serializes_ids_untagged() {
        let edge = EdgeRecord::new(42u64, "author");
        let json = serde_json::to_string(&edge).unwrap();
        expect![[r#"{"subject":42,"object":"author"}"#]].assert_eq(&json);
    }
}
