//! Browser backends for the explorer.

pub mod chromiumoxide;

pub use self::chromiumoxide::{ChromiumoxideBackend, RemoteElement, RemoteValue};
