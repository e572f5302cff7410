//! Browser collaborator contract.
//!
//! The explorer never talks to a browser directly. Everything it needs from a
//! live page goes through [`ElementBackend`], which keeps the synthesis loop
//! testable with scripted backends and lets the chromiumoxide adapter in
//! [`crate::adapter`] supply the real implementation.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a browser backend.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The protocol round-trip itself failed (transport, closed target, bad params).
    #[error("cdp error: {0}")]
    Cdp(String),
    /// The page evaluated the expression and it threw.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    #[error("remote object is not an element: {0}")]
    NotAnElement(String),
    #[error("unexpected browser response: {0}")]
    Unexpected(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Operations the explorer needs from a live page.
///
/// `Handle` addresses an element the caller can keep using; `Remote` is any
/// object returned by an evaluation, which may or may not be an element.
#[async_trait]
pub trait ElementBackend: Send + Sync {
    type Handle: Clone + Send + Sync;
    type Remote: Send + Sync;

    /// Current serialized markup of `element`, including the element itself.
    async fn outer_html(&self, element: &Self::Handle) -> Result<String, BrowserError>;

    /// Invoke `declaration` with `element` bound to `this`.
    ///
    /// Returns `Ok(None)` when the function yields `null` or `undefined`.
    async fn call_function_on(
        &self,
        element: &Self::Handle,
        declaration: &str,
    ) -> Result<Option<Self::Remote>, BrowserError>;

    /// Turn an evaluation result into an element handle.
    async fn resolve_element(&self, remote: Self::Remote) -> Result<Self::Handle, BrowserError>;

    /// Own enumerable properties of `remote` as `(key, value)` pairs.
    ///
    /// Properties whose value is not an object are omitted.
    async fn own_properties(
        &self,
        remote: &Self::Remote,
    ) -> Result<Vec<(String, Self::Remote)>, BrowserError>;
}
