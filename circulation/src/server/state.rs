//! Application state for the circulation HTTP server.

use crate::services::Library;

/// State shared across all HTTP handlers.
///
/// Cloned for each request; the service holds its store and runner behind
/// `Arc`s.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Library service
    pub library: Library,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(library: Library) -> Self {
        Self { library }
    }
}
