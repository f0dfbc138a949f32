//! Connection join — correlates metadata, auth, and lifecycle events on the
//! connection id to produce per-driver connection counts and lifetimes.
//!
//! State is bounded three ways: only a p-sampled subset of connections is
//! tracked for lifetime, a soft cap triggers emergency eviction, and
//! `selective_cleanup` folds accumulated lifetimes into batch means.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use mongolog_core::{connection_id, ClientMetadata, ConnectionEvent, DriverKey, FxHashSet, PipelineCounters};

/// Age threshold for the first eviction pass: connections untouched for an
/// hour of log time are presumed leaked.
const EVICT_AGE_MS: i64 = 3_600_000;

/// Per-connection correlation state. At most one per connection id.
#[derive(Debug)]
struct ConnectionInfo {
    username: Option<String>,
    start_ms: Option<i64>,
    driver_key: Option<DriverKey>,
    last_touched_ms: i64,
    sampled_for_lifetime: bool,
    sample_auth: Option<String>,
}

impl ConnectionInfo {
    fn new(sampled_for_lifetime: bool, now_ms: i64) -> Self {
        Self {
            username: None,
            start_ms: None,
            driver_key: None,
            last_touched_ms: now_ms,
            sampled_for_lifetime,
            sample_auth: None,
        }
    }
}

/// Per-driver aggregate.
#[derive(Debug, Default)]
struct DriverEntry {
    connection_count: u64,
    remote_hosts: FxHashSet<String>,
    /// Lifetimes observed since the last cleanup batch.
    lifetimes_ms: Vec<i64>,
    /// Equal-weight means of previously folded batches.
    batch_means: Vec<f64>,
    /// Total lifetime samples ever folded, including batched ones.
    lifetime_samples: u64,
    sample_metadata: Option<String>,
    sample_auth: Option<String>,
}

impl DriverEntry {
    fn push_lifetime(&mut self, lifetime_ms: i64) {
        self.lifetimes_ms.push(lifetime_ms);
        self.lifetime_samples += 1;
    }

    /// Equal-weight average across folded batches and the current batch.
    fn lifetime_mean_ms(&self) -> Option<f64> {
        let mut means: Vec<f64> = self.batch_means.clone();
        if !self.lifetimes_ms.is_empty() {
            let sum: i64 = self.lifetimes_ms.iter().sum();
            means.push(sum as f64 / self.lifetimes_ms.len() as f64);
        }
        if means.is_empty() {
            return None;
        }
        Some(means.iter().sum::<f64>() / means.len() as f64)
    }
}

/// The connection-join accumulator.
pub struct ConnectionJoin {
    connections: DashMap<i64, ConnectionInfo>,
    drivers: DashMap<DriverKey, DriverEntry>,
    rng: Mutex<SmallRng>,
    counters: Arc<PipelineCounters>,
    soft_cap: usize,
    sample_rate: f64,
    /// Latest event timestamp seen; drives age-based eviction and stands in
    /// for events that carry no timestamp.
    clock_ms: AtomicI64,
}

impl ConnectionJoin {
    pub fn new(
        counters: Arc<PipelineCounters>,
        soft_cap: usize,
        sample_rate: f64,
        rng_seed: Option<u64>,
    ) -> Self {
        let rng = match rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            connections: DashMap::new(),
            drivers: DashMap::new(),
            rng: Mutex::new(rng),
            counters,
            soft_cap: soft_cap.max(1),
            sample_rate: sample_rate.clamp(0.0, 1.0),
            clock_ms: AtomicI64::new(0),
        }
    }

    /// Route one extracted event to the matching record method.
    pub fn handle_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Metadata(meta) => self.record_metadata(meta, None),
            ConnectionEvent::Auth {
                ctx,
                username,
                db,
                mechanism,
                timestamp,
            } => self.record_auth(
                ctx,
                username,
                db.as_deref(),
                mechanism.as_deref(),
                *timestamp,
                None,
            ),
            ConnectionEvent::Started { ctx, timestamp } => {
                self.record_conn_start(ctx, *timestamp);
            }
            ConnectionEvent::Ended { ctx, timestamp } => {
                self.record_conn_end(ctx, *timestamp);
            }
        }
    }

    /// Record a successful authentication for a connection.
    pub fn record_auth(
        &self,
        ctx: &str,
        username: &str,
        _db: Option<&str>,
        _mechanism: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
        sample: Option<&str>,
    ) {
        let Some(id) = connection_id(ctx) else { return };
        let now = self.advance_clock(timestamp);
        {
            let mut info = self.get_or_create(id, now);
            info.last_touched_ms = now;
            info.username = Some(username.to_string());
            if info.sample_auth.is_none() {
                info.sample_auth = sample.map(String::from);
            }
        }
        self.maybe_evict();
    }

    /// Record client metadata for a connection and fold it into the driver
    /// aggregate. The driver key includes the (possibly still unknown)
    /// username.
    pub fn record_metadata(&self, meta: &ClientMetadata, sample: Option<&str>) {
        if is_excluded_driver(meta.driver_name.as_deref()) {
            return;
        }
        let Some(id) = connection_id(&meta.ctx) else { return };
        let now = self.advance_clock(meta.timestamp);
        {
            let mut info = self.get_or_create(id, now);
            info.last_touched_ms = now;

            let key = DriverKey {
                driver_name: meta.driver_name.clone(),
                driver_version: meta.driver_version.clone(),
                os_type: meta.os_type.clone(),
                platform: meta.platform.clone(),
                compressors: meta.compressors.clone(),
                username: info.username.clone(),
            };

            {
                let mut driver = self.drivers.entry(key.clone()).or_default();
                driver.connection_count += 1;
                if let Some(host) = &meta.remote_host {
                    driver.remote_hosts.insert(host.clone());
                }
                if driver.sample_metadata.is_none() {
                    driver.sample_metadata = sample.map(String::from);
                }
                if driver.sample_auth.is_none() {
                    driver.sample_auth = info.sample_auth.clone();
                }
            }

            info.driver_key = Some(key);
            if info.sampled_for_lifetime && info.start_ms.is_none() {
                info.start_ms = meta.timestamp.map(|t| t.timestamp_millis());
            }
        }
        self.maybe_evict();
    }

    /// Record a connection-opened event.
    pub fn record_conn_start(&self, ctx: &str, timestamp: Option<DateTime<Utc>>) {
        let Some(id) = connection_id(ctx) else { return };
        let now = self.advance_clock(timestamp);
        {
            let mut info = self.get_or_create(id, now);
            info.last_touched_ms = now;
            if info.sampled_for_lifetime && info.start_ms.is_none() {
                info.start_ms = timestamp.map(|t| t.timestamp_millis());
            }
        }
        self.maybe_evict();
    }

    /// Record a connection-closed event: compute the lifetime for sampled
    /// connections with a known driver and a start timestamp, then drop the
    /// correlation state in all cases.
    pub fn record_conn_end(&self, ctx: &str, timestamp: Option<DateTime<Utc>>) {
        let Some(id) = connection_id(ctx) else { return };
        self.advance_clock(timestamp);
        let Some((_, info)) = self.connections.remove(&id) else {
            return;
        };
        if !info.sampled_for_lifetime {
            return;
        }
        let (Some(key), Some(start_ms), Some(end)) = (info.driver_key, info.start_ms, timestamp)
        else {
            return;
        };
        let lifetime = end.timestamp_millis() - start_ms;
        if lifetime >= 0 {
            self.drivers.entry(key).or_default().push_lifetime(lifetime);
        }
    }

    /// Fold every driver's accumulated lifetimes into a batch mean, freeing
    /// the per-sample buffers. Later samples merge with these batches by
    /// equal-weight averaging.
    pub fn selective_cleanup(&self) {
        for mut kv in self.drivers.iter_mut() {
            let entry = kv.value_mut();
            if entry.lifetimes_ms.is_empty() {
                continue;
            }
            let sum: i64 = entry.lifetimes_ms.iter().sum();
            let mean = sum as f64 / entry.lifetimes_ms.len() as f64;
            entry.batch_means.push(mean);
            entry.lifetimes_ms.clear();
        }
    }

    /// End of run: connections still open contribute nothing (censored
    /// observations would bias lifetimes short), and the map empties.
    pub fn finish(&self) -> usize {
        let still_open = self.connections.len();
        if still_open > 0 {
            tracing::debug!(still_open, "dropping still-open connections at end of run");
        }
        self.connections.clear();
        still_open
    }

    /// Live correlation entries (one per connection id).
    pub fn live_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    /// The retained sample messages for a driver entry, as (metadata, auth).
    /// At most one of each is ever kept per entry; renderers get these
    /// handles, never the event stream.
    pub fn sample_messages(&self, key: &DriverKey) -> (Option<String>, Option<String>) {
        self.drivers
            .get(key)
            .map(|e| (e.sample_metadata.clone(), e.sample_auth.clone()))
            .unwrap_or_default()
    }

    /// Per-driver aggregates, most-connected first.
    pub fn report(&self) -> Vec<DriverReport> {
        let mut rows: Vec<DriverReport> = self
            .drivers
            .iter()
            .map(|kv| {
                let key = kv.key();
                let entry = kv.value();
                let mut remote_hosts: Vec<String> = entry.remote_hosts.iter().cloned().collect();
                remote_hosts.sort();
                DriverReport {
                    driver_name: key.driver_name.clone(),
                    driver_version: key.driver_version.clone(),
                    os_type: key.os_type.clone(),
                    platform: key.platform.clone(),
                    compressors: key.compressors.to_vec(),
                    username: key.username.clone(),
                    connection_count: entry.connection_count,
                    remote_hosts,
                    lifetime_samples: entry.lifetime_samples,
                    lifetime_mean_ms: entry.lifetime_mean_ms(),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.connection_count
                .cmp(&a.connection_count)
                .then_with(|| a.driver_name.cmp(&b.driver_name))
        });
        rows
    }

    fn get_or_create(
        &self,
        id: i64,
        now_ms: i64,
    ) -> dashmap::mapref::one::RefMut<'_, i64, ConnectionInfo> {
        self.connections
            .entry(id)
            .or_insert_with(|| ConnectionInfo::new(self.flip_sample_coin(), now_ms))
    }

    fn flip_sample_coin(&self) -> bool {
        if self.sample_rate >= 1.0 {
            return true;
        }
        if self.sample_rate <= 0.0 {
            return false;
        }
        self.rng
            .lock()
            .map(|mut rng| rng.gen::<f64>() < self.sample_rate)
            .unwrap_or(false)
    }

    fn advance_clock(&self, timestamp: Option<DateTime<Utc>>) -> i64 {
        match timestamp {
            Some(ts) => self.clock_ms.fetch_max(ts.timestamp_millis(), Ordering::Relaxed).max(ts.timestamp_millis()),
            None => self.clock_ms.load(Ordering::Relaxed),
        }
    }

    /// Emergency eviction when correlation state outgrows the soft cap:
    /// first by age, then by structure (entries that never saw metadata).
    fn maybe_evict(&self) {
        if self.connections.len() <= self.soft_cap {
            return;
        }
        let now = self.clock_ms.load(Ordering::Relaxed);
        let before = self.connections.len();
        self.connections
            .retain(|_, info| now.saturating_sub(info.last_touched_ms) <= EVICT_AGE_MS);

        if self.connections.len() > self.soft_cap {
            self.connections.retain(|_, info| info.driver_key.is_some());
        }

        let evicted = before.saturating_sub(self.connections.len());
        if evicted > 0 {
            self.counters.bump_evictions(evicted as u64);
            tracing::warn!(
                evicted,
                remaining = self.connections.len(),
                soft_cap = self.soft_cap,
                "connection state over soft cap, evicted"
            );
        }
    }
}

fn is_excluded_driver(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with("NetworkInterface") || n == "MongoDB Internal Client")
}

/// Per-driver output row.
#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    pub driver_name: Option<String>,
    pub driver_version: Option<String>,
    pub os_type: Option<String>,
    pub platform: Option<String>,
    pub compressors: Vec<String>,
    pub username: Option<String>,
    pub connection_count: u64,
    pub remote_hosts: Vec<String>,
    pub lifetime_samples: u64,
    pub lifetime_mean_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use smallvec::SmallVec;

    fn ts(ms: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms).single()
    }

    fn join(sample_rate: f64) -> ConnectionJoin {
        ConnectionJoin::new(Arc::new(PipelineCounters::new()), 1_000_000, sample_rate, Some(7))
    }

    fn metadata(ctx: &str, ms: i64) -> ClientMetadata {
        ClientMetadata {
            ctx: ctx.to_string(),
            driver_name: Some("driver-x".into()),
            driver_version: Some("1.2.3".into()),
            compressors: SmallVec::new(),
            os_type: Some("linux".into()),
            os_name: None,
            platform: None,
            server_version: None,
            remote_host: Some("10.0.0.5:50432".into()),
            timestamp: ts(ms),
        }
    }

    #[test]
    fn three_stream_join_produces_lifetime() {
        let join = join(1.0);
        join.record_auth("conn42", "alice", Some("admin"), None, ts(900), None);
        join.record_conn_start("conn42", ts(1000));
        join.record_metadata(&metadata("conn42", 1005), None);
        join.record_conn_end("conn42", ts(2500));

        assert_eq!(join.live_connections(), 0);
        let report = join.report();
        assert_eq!(report.len(), 1);
        let row = &report[0];
        assert_eq!(row.driver_name.as_deref(), Some("driver-x"));
        assert_eq!(row.username.as_deref(), Some("alice"));
        assert_eq!(row.connection_count, 1);
        assert_eq!(row.lifetime_samples, 1);
        assert_eq!(row.lifetime_mean_ms, Some(1500.0));
    }

    #[test]
    fn unsampled_connections_count_but_no_lifetime() {
        let join = join(0.0);
        join.record_conn_start("conn1", ts(0));
        join.record_metadata(&metadata("conn1", 5), None);
        join.record_conn_end("conn1", ts(100));
        let report = join.report();
        assert_eq!(report[0].connection_count, 1);
        assert_eq!(report[0].lifetime_samples, 0);
        assert_eq!(report[0].lifetime_mean_ms, None);
    }

    #[test]
    fn internal_drivers_excluded() {
        let join = join(1.0);
        let mut meta = metadata("conn1", 0);
        meta.driver_name = Some("NetworkInterfaceTL".into());
        join.record_metadata(&meta, None);
        let mut meta = metadata("conn2", 0);
        meta.driver_name = Some("MongoDB Internal Client".into());
        join.record_metadata(&meta, None);
        assert_eq!(join.driver_count(), 0);
    }

    #[test]
    fn end_without_state_is_harmless() {
        let join = join(1.0);
        join.record_conn_end("conn9", ts(10));
        assert_eq!(join.live_connections(), 0);
    }

    #[test]
    fn finish_drops_censored_connections() {
        let join = join(1.0);
        join.record_conn_start("conn1", ts(0));
        join.record_metadata(&metadata("conn1", 1), None);
        assert_eq!(join.live_connections(), 1);
        assert_eq!(join.finish(), 1);
        assert_eq!(join.live_connections(), 0);
        // No lifetime was recorded for the still-open connection.
        assert_eq!(join.report()[0].lifetime_samples, 0);
    }

    #[test]
    fn batch_means_merge_with_equal_weight() {
        let join = join(1.0);
        // Batch 1: lifetimes 100 and 300 → mean 200.
        for (ctx, start, end) in [("conn1", 0, 100), ("conn2", 0, 300)] {
            join.record_conn_start(ctx, ts(start));
            join.record_metadata(&metadata(ctx, start), None);
            join.record_conn_end(ctx, ts(end));
        }
        join.selective_cleanup();
        // Batch 2: lifetime 400 → mean 400. Merged: (200 + 400) / 2.
        join.record_conn_start("conn3", ts(0));
        join.record_metadata(&metadata("conn3", 0), None);
        join.record_conn_end("conn3", ts(400));

        let report = join.report();
        assert_eq!(report[0].lifetime_samples, 3);
        assert_eq!(report[0].lifetime_mean_ms, Some(300.0));
    }

    #[test]
    fn one_sample_message_per_driver_entry() {
        let join = join(1.0);
        join.record_auth("conn1", "alice", None, None, ts(0), Some("auth line 1"));
        join.record_metadata(&metadata("conn1", 1), Some("meta line 1"));
        join.record_auth("conn2", "alice", None, None, ts(2), Some("auth line 2"));
        join.record_metadata(&metadata("conn2", 3), Some("meta line 2"));

        let key = DriverKey {
            driver_name: Some("driver-x".into()),
            driver_version: Some("1.2.3".into()),
            os_type: Some("linux".into()),
            platform: None,
            compressors: SmallVec::new(),
            username: Some("alice".into()),
        };
        let (meta_sample, auth_sample) = join.sample_messages(&key);
        assert_eq!(meta_sample.as_deref(), Some("meta line 1"));
        assert_eq!(auth_sample.as_deref(), Some("auth line 1"));
    }

    #[test]
    fn eviction_under_soft_cap_pressure() {
        let counters = Arc::new(PipelineCounters::new());
        let join = ConnectionJoin::new(Arc::clone(&counters), 4, 0.0, Some(7));
        // Six connections with no driver key; the structural pass clears
        // them once the cap is crossed.
        for i in 0..6 {
            join.record_conn_start(&format!("conn{i}"), ts(i));
        }
        assert!(join.live_connections() <= 4);
        assert!(counters.snapshot().connection_evictions > 0);
    }

    #[test]
    fn deterministic_sampling_with_seed() {
        let a = ConnectionJoin::new(Arc::new(PipelineCounters::new()), 100, 0.1, Some(99));
        let b = ConnectionJoin::new(Arc::new(PipelineCounters::new()), 100, 0.1, Some(99));
        for i in 0..50 {
            let ctx = format!("conn{i}");
            a.record_conn_start(&ctx, ts(i));
            b.record_conn_start(&ctx, ts(i));
        }
        // Identical seeds make identical sampling decisions; ending every
        // connection must leave both joins empty either way.
        for i in 0..50 {
            let ctx = format!("conn{i}");
            a.record_conn_end(&ctx, ts(i + 1000));
            b.record_conn_end(&ctx, ts(i + 1000));
        }
        assert_eq!(a.live_connections(), 0);
        assert_eq!(b.live_connections(), 0);
    }
}
