//! Ordered registry deciding which carrier adapter serves an endpoint URL.

use std::iter;
use std::sync::Arc;

use crate::model::AdapterMeta;
use crate::ports::CarrierAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Predicate on a carrier endpoint URL.
pub enum UrlSignature {
    /// URL contains this fragment, compared case-insensitively (e.g. `rtb56.com`).
    DomainFragment(String),
    /// Matches every URL.
    Any,
}

impl UrlSignature {
    /// Signature matching URLs that contain `fragment`.
    #[must_use]
    pub fn domain(fragment: impl Into<String>) -> Self {
        UrlSignature::DomainFragment(fragment.into().to_lowercase())
    }

    /// Whether the URL satisfies the signature.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlSignature::DomainFragment(fragment) => url.to_lowercase().contains(fragment.as_str()),
            UrlSignature::Any => true,
        }
    }
}

/// A carrier adapter together with the URLs it claims.
pub struct CarrierPlugin {
    /// Static metadata describing the adapter.
    pub meta: AdapterMeta,
    /// URLs served by this adapter.
    pub signature: UrlSignature,
    /// The adapter itself.
    pub adapter: Arc<dyn CarrierAdapter>,
}

/// Dispatch table evaluated top to bottom; the first matching signature wins
/// and the fallback serves everything else.
pub struct AdapterRegistry {
    plugins: Vec<CarrierPlugin>,
    fallback: CarrierPlugin,
}

impl AdapterRegistry {
    /// Build a registry from plugins in priority order plus the fallback.
    #[must_use]
    pub fn new(plugins: Vec<CarrierPlugin>, fallback: CarrierPlugin) -> Self {
        Self { plugins, fallback }
    }

    /// Metadata of all adapters in evaluation order, fallback last.
    #[must_use]
    pub fn adapters(&self) -> Vec<AdapterMeta> {
        self.plugins
            .iter()
            .chain(iter::once(&self.fallback))
            .map(|plugin| plugin.meta.clone())
            .collect()
    }

    /// Pick the plugin serving `base_url`.
    #[must_use]
    pub fn resolve(&self, base_url: &str) -> &CarrierPlugin {
        self.plugins
            .iter()
            .find(|plugin| plugin.signature.matches(base_url))
            .unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::model::{AdapterId, CarrierEndpoint, TrackingEvent, TrackingRequest};
    use crate::ports::TrackError;

    struct Named(AdapterMeta);

    #[async_trait]
    impl CarrierAdapter for Named {
        fn meta(&self) -> &AdapterMeta {
            &self.0
        }

        async fn fetch(
            &self,
            _endpoint: &CarrierEndpoint,
            _request: &TrackingRequest,
        ) -> Result<Vec<TrackingEvent>, TrackError> {
            Ok(Vec::new())
        }
    }

    fn plugin(id: &str, signature: UrlSignature) -> CarrierPlugin {
        let meta = AdapterMeta {
            id: AdapterId(id.to_owned()),
            name: id.to_owned(),
        };
        CarrierPlugin {
            meta: meta.clone(),
            signature,
            adapter: Arc::new(Named(meta)),
        }
    }

    fn registry() -> AdapterRegistry {
        AdapterRegistry::new(
            vec![
                plugin("first", UrlSignature::domain("example.com")),
                plugin("second", UrlSignature::domain("api.example.com")),
                plugin("nextsls", UrlSignature::domain("NextSLS.com")),
            ],
            plugin("generic", UrlSignature::Any),
        )
    }

    #[test]
    fn first_match_wins() {
        let registry = registry();
        let chosen = registry.resolve("https://api.example.com/track");
        assert_eq!(chosen.meta.id.0, "first");
    }

    #[test]
    fn matching_ignores_case() {
        let registry = registry();
        let chosen = registry.resolve("http://XMSDWL.nextsls.COM/api/v5/shipment/get_tracking");
        assert_eq!(chosen.adapter.meta().id.0, "nextsls");
    }

    #[test]
    fn unmatched_urls_fall_back() {
        let registry = registry();
        assert_eq!(registry.resolve("http://8.135.12.215:5001/api").meta.id.0, "generic");
        assert_eq!(registry.resolve("").meta.id.0, "generic");
    }

    #[test]
    fn table_lists_fallback_last() {
        let ids: Vec<String> = registry()
            .adapters()
            .into_iter()
            .map(|meta| meta.id.0)
            .collect();
        assert_eq!(ids, ["first", "second", "nextsls", "generic"]);
    }
}
