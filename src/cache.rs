//! Per-explorer memo of working queries, keyed by the natural-language prompt.
//!
//! Entries are never evicted implicitly and are not checked against the page
//! they were synthesized on. Callers that navigate or expect large DOM changes
//! invalidate entries through [`SelectorCache::evict`] or
//! [`SelectorCache::clear`].

use std::collections::HashMap;

use crate::query::SynthesizedQuery;
use crate::vocabulary::SelectionMode;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    mode: SelectionMode,
    prompt: String,
}

#[derive(Debug, Clone, Default)]
pub struct SelectorCache {
    entries: HashMap<CacheKey, SynthesizedQuery>,
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match lookup; prompts are not normalised.
    pub fn get(&self, mode: SelectionMode, prompt: &str) -> Option<&SynthesizedQuery> {
        self.entries.get(&CacheKey {
            mode,
            prompt: prompt.to_string(),
        })
    }

    pub fn contains(&self, mode: SelectionMode, prompt: &str) -> bool {
        self.get(mode, prompt).is_some()
    }

    /// Store `query` for `prompt`, returning the entry it replaced.
    pub fn insert(
        &mut self,
        mode: SelectionMode,
        prompt: impl Into<String>,
        query: SynthesizedQuery,
    ) -> Option<SynthesizedQuery> {
        self.entries.insert(
            CacheKey {
                mode,
                prompt: prompt.into(),
            },
            query,
        )
    }

    /// Drop every entry recorded for `prompt`; returns how many were removed.
    pub fn evict(&mut self, prompt: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.prompt != prompt);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the cached entries, ordered by prompt then mode.
    pub fn entries(&self) -> Vec<(SelectionMode, &str, &SynthesizedQuery)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(key, query)| (key.mode, key.prompt.as_str(), query))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.label().cmp(b.0.label())));
        entries
    }
}
