//! Registry configuration.

use crate::connector::Connector;
use std::fmt;
use std::sync::Arc;

/// Configuration shared by the models of a [`crate::Registry`].
#[derive(Clone, Default)]
pub struct Config {
    /// Connector used by models registered without one of their own.
    pub connector: Option<Arc<dyn Connector>>,

    /// Whether a [`crate::RequestScope`] saves every live entity when it
    /// ends cleanly.
    pub autosave: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("connector", &self.connector.as_ref().map(|_| ".."))
            .field("autosave", &self.autosave)
            .finish()
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default connector.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets whether request scopes autosave.
    #[must_use]
    pub const fn autosave(mut self, value: bool) -> Self {
        self.autosave = value;
        self
    }
}
