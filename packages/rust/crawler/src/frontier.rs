//! Breadth-first crawl frontier.
//!
//! Holds the queue of URLs still to fetch and every URL ever enqueued.
//! No I/O happens here; the engine decides what gets pushed.

use std::collections::{HashSet, VecDeque};

use url::Url;

/// FIFO queue of `(url, depth)` with a visited-set guard and a depth bound.
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<(Url, u32)>,
    visited: HashSet<String>,
    max_depth: u32,
}

impl Frontier {
    pub fn new(max_depth: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            max_depth,
        }
    }

    /// Enqueue `url` unless it is too deep or was seen before.
    ///
    /// Returns `true` if the URL was added.
    pub fn push(&mut self, url: Url, depth: u32) -> bool {
        if depth > self.max_depth {
            return false;
        }
        if !self.visited.insert(normalize_url(&url)) {
            return false;
        }
        self.queue.push_back((url, depth));
        true
    }

    /// Record `url` as seen without queueing it (e.g. a redirect target).
    pub fn mark_visited(&mut self, url: &Url) {
        self.visited.insert(normalize_url(url));
    }

    /// Take up to `n` entries from the front of the queue.
    pub fn next_batch(&mut self, n: usize) -> Vec<(Url, u32)> {
        let count = self.queue.len().min(n.max(1));
        self.queue.drain(..count).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of distinct URLs ever accepted or marked.
    pub fn seen(&self) -> usize {
        self.visited.len()
    }
}

/// Normalize a URL for deduplication (strip fragment and trailing slash).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Keep the slash of a bare origin
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}
