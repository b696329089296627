use std::collections::HashSet;
use std::io::Write;

use serde::Serialize;

use crate::data::{EdgeRecord, Engagement, Identifier};
use crate::error::SinkError;

/// Destination for harvested edges.
///
/// Each call receives the complete edge set of one seed, in collection order.
pub trait EdgeSink {
    fn accept(&mut self, kind: Engagement, edges: &[EdgeRecord]) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: EdgeSink + ?Sized> EdgeSink for &mut S {
    fn accept(&mut self, kind: Engagement, edges: &[EdgeRecord]) -> Result<(), SinkError> {
        (**self).accept(kind, edges)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Ordered in-memory edge list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeList {
    edges: Vec<EdgeRecord>,
}

impl EdgeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge: EdgeRecord) {
        self.edges.push(edge);
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EdgeRecord> {
        self.edges.iter()
    }

    pub fn as_slice(&self) -> &[EdgeRecord] {
        &self.edges
    }

    pub fn into_vec(self) -> Vec<EdgeRecord> {
        self.edges
    }

    /// Appends `other` after this list's edges.
    pub fn merge(&mut self, other: EdgeList) {
        self.edges.extend(other.edges);
    }

    /// Drops repeated (subject, object) pairs, keeping first occurrences.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::with_capacity(self.edges.len());
        self.edges.retain(|edge| seen.insert(edge.clone()));
    }

    pub fn unique_subjects(&self) -> usize {
        self.edges.iter().map(|e| &e.subject).collect::<HashSet<&Identifier>>().len()
    }

    pub fn unique_objects(&self) -> usize {
        self.edges.iter().map(|e| &e.object).collect::<HashSet<&Identifier>>().len()
    }
}

impl FromIterator<EdgeRecord> for EdgeList {
    fn from_iter<I: IntoIterator<Item = EdgeRecord>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}

impl Extend<EdgeRecord> for EdgeList {
    fn extend<I: IntoIterator<Item = EdgeRecord>>(&mut self, iter: I) {
        self.edges.extend(iter);
    }
}

impl<'a> IntoIterator for &'a EdgeList {
    type Item = &'a EdgeRecord;
    type IntoIter = std::slice::Iter<'a, EdgeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

impl EdgeSink for EdgeList {
    fn accept(&mut self, _kind: Engagement, edges: &[EdgeRecord]) -> Result<(), SinkError> {
        self.edges.extend_from_slice(edges);
        Ok(())
    }
}

#[derive(Serialize)]
struct EdgeLine<'a> {
    kind: Engagement,
    user_id: &'a Identifier,
    author_id: &'a Identifier,
}

/// Writes one JSON object per edge and line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EdgeSink for JsonLinesSink<W> {
    fn accept(&mut self, kind: Engagement, edges: &[EdgeRecord]) -> Result<(), SinkError> {
        for edge in edges {
            let line = EdgeLine {
                kind,
                user_id: &edge.subject,
                author_id: &edge.object,
            };
            serde_json::to_writer(&mut self.writer, &line)?;
            self.writer.write_all(b"\n")?;
            self.written += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
