//! Aggregator: picks the carrier path for each number, merges carrier and
//! manual events, and applies the batch cap.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CoalescingCache, ResultCache, Selector};
use crate::manual::ManualEventSource;
use crate::model::{
    AgentId, CarrierConfig, CarrierEndpoint, CarrierId, ShipmentRef, TrackingEvent, TrackingHints,
    TrackingNumber, TrackingRequest, sort_newest_first,
};
use crate::plugin::AdapterRegistry;
use crate::ports::{ShipmentFilter, ShipmentStore, StoreError, TrackError};

/// Largest number of tracking numbers processed per request.
pub const DEFAULT_BATCH_CAP: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Which selection rule produced a result.
pub enum Route {
    /// Called the carrier through the shipment's (or hinted) agent.
    Agent(AgentId),
    /// Called an environment carrier.
    Carrier(CarrierId),
    /// No API call; manual events only.
    ManualOnly,
    /// Nothing could be resolved.
    Unconfigured,
}

impl fmt::Display for Route {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Agent(id) => write!(formatter, "agent:{id}"),
            Route::Carrier(id) => write!(formatter, "carrier:{id}"),
            Route::ManualOnly => formatter.write_str("manual"),
            Route::Unconfigured => formatter.write_str("unconfigured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Tracking outcome for one number.
///
/// Carrier failures are reported next to whatever manual events exist. An
/// empty event list without an error is a valid "no events yet" answer.
pub struct MergedResult {
    /// The number asked for.
    pub tracking_number: TrackingNumber,
    /// How the number was resolved.
    pub route: Route,
    /// Manual and carrier events, newest first.
    pub events: Vec<TrackingEvent>,
    /// Failure attached to this number only.
    pub error: Option<TrackError>,
}

impl MergedResult {
    /// User-visible error text, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Whether neither source produced an event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Notice that a batch was cut to the cap.
pub struct Truncation {
    /// Numbers submitted.
    pub submitted: usize,
    /// Numbers actually processed.
    pub processed: usize,
}

impl fmt::Display for Truncation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} submitted, first {} processed",
            self.submitted, self.processed
        )
    }
}

#[derive(Debug, Clone)]
/// Results of a batch query, in submission order.
pub struct BatchReport {
    /// One entry per processed number.
    pub results: Vec<MergedResult>,
    /// Present when numbers beyond the cap were dropped.
    pub truncation: Option<Truncation>,
}

#[derive(Debug, Clone, Default)]
/// A batch query.
pub struct TrackingQuery {
    /// Raw input lines; blanks are ignored.
    pub numbers: Vec<String>,
    /// Optional agent/carrier/customer hints.
    pub hints: TrackingHints,
}

impl TrackingQuery {
    /// Query from newline-delimited text.
    #[must_use]
    pub fn from_lines(text: &str, hints: TrackingHints) -> Self {
        Self {
            numbers: text.lines().map(str::to_owned).collect(),
            hints,
        }
    }
}

enum Plan {
    Call {
        route: Route,
        selector: Selector,
        endpoint: CarrierEndpoint,
    },
    ManualOnly,
    Unconfigured(String),
    Failed(TrackError),
}

/// Public entry point for tracking lookups.
pub struct TrackingService {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn ShipmentStore>,
    manual: ManualEventSource,
    cache: CoalescingCache,
    carriers: HashMap<CarrierId, CarrierConfig>,
    batch_cap: usize,
}

impl TrackingService {
    /// Create a service bound to the adapter registry, record store and cache.
    #[must_use]
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn ShipmentStore>,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        Self {
            registry,
            manual: ManualEventSource::new(Arc::clone(&store)),
            store,
            cache: CoalescingCache::new(cache),
            carriers: HashMap::new(),
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }

    /// Register environment-level carriers addressable by id.
    #[must_use]
    pub fn with_carriers(mut self, carriers: impl IntoIterator<Item = CarrierConfig>) -> Self {
        self.carriers
            .extend(carriers.into_iter().map(|carrier| (carrier.id.clone(), carrier)));
        self
    }

    /// Override the batch cap.
    #[must_use]
    pub fn with_batch_cap(mut self, cap: usize) -> Self {
        self.batch_cap = cap;
        self
    }

    /// Configured batch cap.
    #[must_use]
    pub fn batch_cap(&self) -> usize {
        self.batch_cap
    }

    /// Record store the service reads from.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ShipmentStore> {
        &self.store
    }

    /// Resolve a batch of numbers sequentially.
    ///
    /// Blank lines are dropped, then the cap is applied before any lookup. An
    /// empty list falls back to every shipment matching the customer/agent hints.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] only when that fallback listing fails; per-number
    /// failures are attached to their own result.
    pub async fn resolve_batch(&self, query: &TrackingQuery) -> Result<BatchReport, StoreError> {
        let mut numbers: Vec<TrackingNumber> = query
            .numbers
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(TrackingNumber::from)
            .collect();

        if numbers.is_empty() {
            let filter = ShipmentFilter {
                customer_id: query.hints.customer_id,
                agent_id: query.hints.agent_id,
                ..ShipmentFilter::default()
            };
            numbers = self
                .store
                .shipments_matching(&filter)
                .await?
                .into_iter()
                .map(|shipment| shipment.tracking_number)
                .collect();
        }

        let submitted = numbers.len();
        let truncation = (submitted > self.batch_cap).then_some(Truncation {
            submitted,
            processed: self.batch_cap,
        });
        numbers.truncate(self.batch_cap);

        if let Some(notice) = truncation {
            warn!(%notice, "batch_truncated");
        }

        let mut results = Vec::with_capacity(numbers.len());
        for number in &numbers {
            results.push(self.resolve_tracking(number, &query.hints).await);
        }

        let failed = results.iter().filter(|result| result.error.is_some()).count();
        info!(processed = results.len(), failed, "batch_resolved");

        Ok(BatchReport {
            results,
            truncation,
        })
    }

    /// Resolve one number: manual events first, then the carrier chosen by the
    /// selection rules, merged newest first. Never fails; errors are attached to
    /// the result.
    pub async fn resolve_tracking(
        &self,
        tracking_number: &TrackingNumber,
        hints: &TrackingHints,
    ) -> MergedResult {
        let shipment = match self.store.shipment_by_tracking_number(tracking_number).await {
            Ok(shipment) => shipment,
            Err(err) => {
                warn!(%tracking_number, error = %err, "shipment_lookup_failed");
                return MergedResult {
                    tracking_number: tracking_number.clone(),
                    route: Route::Unconfigured,
                    events: Vec::new(),
                    error: Some(err.into()),
                };
            }
        };

        let mut events = Vec::new();
        let mut error = None;

        if let Some(shipment) = &shipment {
            match self.manual.events(shipment).await {
                Ok(manual) => events.extend(manual),
                Err(err) => {
                    warn!(%tracking_number, error = %err, "manual_events_failed");
                    error = Some(TrackError::from(err));
                }
            }
        }

        let plan = self.plan(tracking_number, shipment.as_ref(), hints).await;
        let route = match plan {
            Plan::Call {
                route,
                selector,
                endpoint,
            } => {
                let request = TrackingRequest {
                    tracking_number: tracking_number.clone(),
                    carrier_shipment_id: shipment
                        .as_ref()
                        .and_then(|shipment| shipment.carrier_shipment_id.clone()),
                };
                let plugin = self.registry.resolve(&endpoint.base_url);
                let adapter = Arc::clone(&plugin.adapter);
                debug!(%tracking_number, adapter = %plugin.meta.id, %route, "carrier_selected");

                let outcome = self
                    .cache
                    .get_or_compute(CacheKey::new(selector, tracking_number.clone()), || {
                        async move { adapter.fetch(&endpoint, &request).await }
                    })
                    .await;

                match outcome {
                    Ok(api) => events.extend(api),
                    Err(err) => {
                        warn!(%tracking_number, %route, error = %err, "carrier_lookup_failed");
                        error = error.or(Some(err));
                    }
                }
                route
            }
            Plan::ManualOnly => Route::ManualOnly,
            Plan::Unconfigured(reason) => {
                error = error.or(Some(TrackError::NotConfigured(reason)));
                Route::Unconfigured
            }
            Plan::Failed(err) => {
                error = error.or(Some(err));
                Route::Unconfigured
            }
        };

        sort_newest_first(&mut events);

        MergedResult {
            tracking_number: tracking_number.clone(),
            route,
            events,
            error,
        }
    }

    async fn plan(
        &self,
        tracking_number: &TrackingNumber,
        shipment: Option<&ShipmentRef>,
        hints: &TrackingHints,
    ) -> Plan {
        match shipment {
            Some(shipment) => {
                if let Some(agent_id) = shipment.agent_id {
                    self.agent_plan(agent_id).await
                } else if let Some(carrier_id) = &shipment.carrier_id {
                    self.carrier_plan(carrier_id)
                } else {
                    Plan::ManualOnly
                }
            }
            None => {
                if let Some(agent_id) = hints.agent_id {
                    self.agent_plan(agent_id).await
                } else if let Some(carrier_id) = &hints.carrier_id {
                    self.carrier_plan(carrier_id)
                } else {
                    Plan::Unconfigured(format!(
                        "no shipment record or carrier hint for {tracking_number}"
                    ))
                }
            }
        }
    }

    async fn agent_plan(&self, agent_id: AgentId) -> Plan {
        let agent = match self.store.agent(agent_id).await {
            Ok(Some(agent)) => agent,
            Ok(None) => return Plan::Unconfigured(format!("agent {agent_id} not found")),
            Err(err) => return Plan::Failed(err.into()),
        };

        if !agent.supports_api {
            return Plan::ManualOnly;
        }
        if !agent.api_enabled() {
            return Plan::Unconfigured(format!("agent {agent_id} has no usable API endpoint"));
        }

        Plan::Call {
            route: Route::Agent(agent_id),
            selector: Selector::Agent(agent_id),
            endpoint: CarrierEndpoint::from(&agent),
        }
    }

    fn carrier_plan(&self, carrier_id: &CarrierId) -> Plan {
        match self.carriers.get(carrier_id) {
            Some(carrier) => Plan::Call {
                route: Route::Carrier(carrier_id.clone()),
                selector: Selector::Carrier(carrier_id.clone()),
                endpoint: CarrierEndpoint::from(carrier),
            },
            None => Plan::Unconfigured(format!("carrier {carrier_id} is not configured")),
        }
    }
}
