//! Test doubles shared by the unit tests of this crate.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

use crate::model::{
    AdapterId, AdapterMeta, CarrierEndpoint, EventKey, MirrorRecord, TrackingEvent,
    TrackingNumber, TrackingRequest,
};
use crate::plugin::{AdapterRegistry, CarrierPlugin, UrlSignature};
use crate::ports::{CarrierAdapter, FetchOutcome, MirrorError, MirrorPort, TrackError};

pub(crate) fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .expect("valid test time")
}

/// Adapter returning a canned outcome and recording every call.
pub(crate) struct FakeAdapter {
    meta: AdapterMeta,
    outcome: FetchOutcome,
    calls: AtomicUsize,
    pub(crate) seen: Mutex<Vec<(String, TrackingRequest)>>,
}

impl FakeAdapter {
    pub(crate) fn new(outcome: FetchOutcome) -> Arc<Self> {
        Arc::new(Self {
            meta: AdapterMeta {
                id: AdapterId("fake".to_owned()),
                name: "Fake".to_owned(),
            },
            outcome,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Registry where this adapter serves every URL.
    pub(crate) fn registry(self: &Arc<Self>) -> AdapterRegistry {
        let plugin = CarrierPlugin {
            meta: self.meta.clone(),
            signature: UrlSignature::Any,
            adapter: Arc::clone(self) as Arc<dyn CarrierAdapter>,
        };
        AdapterRegistry::new(Vec::new(), plugin)
    }
}

#[async_trait]
impl CarrierAdapter for FakeAdapter {
    fn meta(&self) -> &AdapterMeta {
        &self.meta
    }

    async fn fetch(
        &self,
        endpoint: &CarrierEndpoint,
        request: &TrackingRequest,
    ) -> Result<Vec<TrackingEvent>, TrackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .push((endpoint.base_url.clone(), request.clone()));
        self.outcome.clone()
    }
}

/// Mirror keeping rows in memory; descriptions in `broken` fail to insert.
#[derive(Default)]
pub(crate) struct FakeMirror {
    pub(crate) rows: Mutex<Vec<MirrorRecord>>,
    pub(crate) keys: Mutex<HashSet<EventKey>>,
    pub(crate) broken: HashSet<String>,
    pub(crate) statuses: Mutex<Vec<String>>,
}

#[async_trait]
impl MirrorPort for FakeMirror {
    async fn contains(&self, key: &EventKey) -> Result<bool, MirrorError> {
        Ok(self.keys.lock().contains(key))
    }

    async fn insert(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        if self.broken.contains(&record.description) {
            return Err(MirrorError::Status(500));
        }
        if !self.keys.lock().insert(record.key()) {
            return Err(MirrorError::Conflict);
        }
        self.rows.lock().push(record.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        _tracking_number: &TrackingNumber,
        status: &str,
    ) -> Result<(), MirrorError> {
        self.statuses.lock().push(status.to_owned());
        Ok(())
    }
}
