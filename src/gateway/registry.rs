//! Venue registry: maps a `VenueId` to its long-lived gateway.
//!
//! Gateways are constructed once, up front, from explicit configuration and
//! then shared. Name-based dynamic lookup and per-call reconnects are both
//! deliberately absent.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;

use super::rest::RestGateway;
use super::traits::ExchangeGateway;
use super::profile::VenueId;
use crate::config::Config;

/// Registry of constructed gateways, keyed by venue.
#[derive(Default)]
pub struct VenueRegistry {
    gateways: HashMap<VenueId, Arc<dyn ExchangeGateway>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one REST gateway per configured venue.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for (name, venue_config) in &config.venues {
            let venue: VenueId = name
                .parse()
                .map_err(|e: String| anyhow!(e))
                .with_context(|| format!("invalid venue name in config: {name}"))?;
            let gateway = RestGateway::new(venue, venue_config)
                .with_context(|| format!("failed to construct {venue} gateway"))?;
            registry.insert(Arc::new(gateway));
        }
        Ok(registry)
    }

    pub fn insert(&mut self, gateway: Arc<dyn ExchangeGateway>) {
        self.gateways.insert(gateway.venue(), gateway);
    }

    /// Gateway for a venue; an error here means the venue was never configured.
    pub fn get(&self, venue: VenueId) -> Result<Arc<dyn ExchangeGateway>> {
        self.gateways
            .get(&venue)
            .cloned()
            .ok_or_else(|| anyhow!("no gateway configured for venue {venue}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;

    #[test]
    fn test_registry_lookup() {
        let mut registry = VenueRegistry::new();
        registry.insert(Arc::new(MockGateway::new(VenueId::Bitget)));

        assert!(registry.get(VenueId::Bitget).is_ok());
        assert!(registry.get(VenueId::Bybit).is_err());
    }
}
