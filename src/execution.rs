//! Running a synthesized query against a live element.

use crate::browser::{BrowserError, ElementBackend};
use crate::query::SynthesizedQuery;
use crate::vocabulary::SelectionMode;

/// Successful result of running a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution<H> {
    /// `None` when the query matched nothing.
    Single(Option<H>),
    /// Collection members in index order; may be empty.
    Multiple(Vec<H>),
}

impl<H> Execution<H> {
    pub fn len(&self) -> usize {
        match self {
            Execution::Single(handle) => usize::from(handle.is_some()),
            Execution::Multiple(handles) => handles.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Evaluates queries through an [`ElementBackend`] and resolves the outcome
/// into element handles.
pub struct ExecutionAdapter<'a, B: ElementBackend> {
    backend: &'a B,
}

impl<'a, B: ElementBackend> ExecutionAdapter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Run `query` with `element` as its context.
    ///
    /// For collection queries a missing result is an error: every multi-element
    /// operation returns a (possibly empty) collection when it succeeds.
    pub async fn evaluate(
        &self,
        element: &B::Handle,
        query: &SynthesizedQuery,
    ) -> Result<Execution<B::Handle>, BrowserError> {
        let expression = query.expression();
        let remote = self.backend.call_function_on(element, &expression).await?;

        match query.operation().mode() {
            SelectionMode::Single => match remote {
                Some(remote) => Ok(Execution::Single(Some(
                    self.backend.resolve_element(remote).await?,
                ))),
                None => Ok(Execution::Single(None)),
            },
            SelectionMode::Multiple => {
                let remote = remote.ok_or_else(|| {
                    BrowserError::Evaluation(format!("{query} returned no collection"))
                })?;
                let handles = self.collect_indexed(&remote).await?;
                Ok(Execution::Multiple(handles))
            }
        }
    }

    async fn collect_indexed(&self, remote: &B::Remote) -> Result<Vec<B::Handle>, BrowserError> {
        let mut indexed: Vec<(usize, B::Remote)> = self
            .backend
            .own_properties(remote)
            .await?
            .into_iter()
            .filter_map(|(key, value)| collection_index(&key).map(|index| (index, value)))
            .collect();
        indexed.sort_by_key(|(index, _)| *index);

        let mut handles = Vec::with_capacity(indexed.len());
        for (_, value) in indexed {
            handles.push(self.backend.resolve_element(value).await?);
        }
        Ok(handles)
    }
}

/// Canonical non-negative integer keys only, so `length`, `item`, `-1` and
/// `01` are all skipped.
fn collection_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}
