use std::collections::HashMap;
use std::sync::Arc;

use super::{Connector, ConnectorError};

/// Maps source channels to connectors.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector for a channel, replacing any previous one.
    pub fn register(&mut self, channel: impl Into<String>, connector: Arc<dyn Connector>) {
        self.connectors.insert(channel.into(), connector);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, channel: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        self.register(channel, connector);
        self
    }

    /// Look up the connector for a channel.
    pub fn get(&self, channel: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
        self.connectors
            .get(channel)
            .cloned()
            .ok_or_else(|| ConnectorError::UnsupportedChannel(channel.to_string()))
    }

    /// Registered channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.connectors.keys().cloned().collect();
        channels.sort();
        channels
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;

    #[test]
    fn test_lookup_by_channel() {
        let registry = ConnectorRegistry::new()
            .with("web", Arc::new(MockConnector::new()))
            .with("app", Arc::new(MockConnector::new()));

        assert_eq!(registry.channels(), vec!["app", "web"]);
        assert!(registry.get("web").is_ok());
        assert!(matches!(
            registry.get("print"),
            Err(ConnectorError::UnsupportedChannel(c)) if c == "print"
        ));
    }
}
