use crate::models::address::{Destination, Origin, normalize_key};
use crate::models::duration::DurationRecord;
use crate::schedule::CacheEpoch;
use crate::storage::KeyValueStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const CACHE_KEY: &str = "transit_cache";

const NO_ROUTE: &str = "none";

/// Normalized origin -> travel time, for one destination.
pub type OriginDurations = BTreeMap<String, DurationRecord>;

/// Layout written to the key-value store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct PersistedCache {
    week: String,
    #[serde(default)]
    data: BTreeMap<String, String>,
    #[serde(default)]
    touched: BTreeMap<String, i64>,
}

/// Pipe-delimited `origin|seconds` lines; `none` marks a destination without a route.
pub fn encode_partition(durations: &OriginDurations) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for (origin, record) in durations {
        let value = match record {
            DurationRecord::Seconds(seconds) => seconds.to_string(),
            DurationRecord::NoRoute => NO_ROUTE.to_string(),
        };
        writer.write_record([origin.as_str(), value.as_str()])?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Lines that do not parse are dropped.
pub fn decode_partition(text: &str) -> OriginDurations {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut durations = OriginDurations::new();
    for record in reader.records().flatten() {
        let (Some(origin), Some(value)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let origin = normalize_key(origin);
        if origin.is_empty() {
            continue;
        }
        let value = value.trim();
        let duration = if value == NO_ROUTE {
            DurationRecord::NoRoute
        } else if let Ok(seconds) = value.parse::<u64>() {
            DurationRecord::Seconds(seconds)
        } else {
            continue;
        };
        durations.insert(origin, duration);
    }
    durations
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStore {
    epoch: CacheEpoch,
    partitions: BTreeMap<String, OriginDurations>,
    touched: BTreeMap<String, i64>,
}

impl CacheStore {
    pub fn empty(epoch: CacheEpoch) -> Self {
        CacheStore {
            epoch,
            partitions: BTreeMap::new(),
            touched: BTreeMap::new(),
        }
    }

    fn from_persisted(persisted: PersistedCache) -> Self {
        CacheStore {
            epoch: CacheEpoch::from(persisted.week.as_str()),
            partitions: persisted
                .data
                .iter()
                .map(|(destination, text)| (normalize_key(destination), decode_partition(text)))
                .collect(),
            touched: persisted.touched,
        }
    }

    fn to_persisted(&self) -> Result<PersistedCache> {
        let mut data = BTreeMap::new();
        for (destination, durations) in &self.partitions {
            data.insert(destination.clone(), encode_partition(durations)?);
        }
        Ok(PersistedCache {
            week: self.epoch.as_str().to_string(),
            data,
            touched: self
                .touched
                .iter()
                .filter(|(destination, _)| self.partitions.contains_key(*destination))
                .map(|(destination, at)| (destination.clone(), *at))
                .collect(),
        })
    }

    pub fn epoch(&self) -> &CacheEpoch {
        &self.epoch
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn lookup(&self, destination: &Destination, origin: &Origin) -> Option<DurationRecord> {
        self.partitions
            .get(&destination.key())?
            .get(&origin.key())
            .copied()
    }

    pub fn upsert(&mut self, destination: &Destination, origin: &Origin, record: DurationRecord) {
        self.partitions
            .entry(destination.key())
            .or_default()
            .insert(origin.key(), record);
    }

    /// Marks the destination as used for least-recently-used eviction.
    pub fn touch(&mut self, destination: &Destination, at: DateTime<Utc>) {
        self.touched.insert(destination.key(), at.timestamp());
    }

    pub fn serialized_size(&self) -> Result<usize> {
        Ok(serde_json::to_vec(&self.to_persisted()?)?.len())
    }

    fn least_recently_used(&self) -> Option<String> {
        self.partitions
            .keys()
            .min_by_key(|destination| self.touched.get(*destination).copied().unwrap_or(0))
            .cloned()
    }

    fn remove_partition(&mut self, destination: &str) {
        self.partitions.remove(destination);
        self.touched.remove(destination);
    }

    pub fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            week: self.epoch.to_string(),
            destinations: self
                .partitions
                .iter()
                .map(|(destination, durations)| PartitionStats {
                    destination: destination.clone(),
                    entries: durations.len(),
                })
                .collect(),
            bytes: self.serialized_size()?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionStats {
    pub destination: String,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub week: String,
    pub destinations: Vec<PartitionStats>,
    pub bytes: usize,
}

/// Drops whole destination partitions, least recently used first, until the
/// serialized store is below `threshold`. May end empty.
pub fn enforce_size_limit(mut store: CacheStore, threshold: usize) -> Result<CacheStore> {
    let mut size = store.serialized_size()?;
    if size < threshold {
        return Ok(store);
    }
    warn!(
        "cache is {} bytes, over the {} byte threshold; cleaning up",
        size, threshold
    );
    while size >= threshold {
        let Some(destination) = store.least_recently_used() else {
            break;
        };
        store.remove_partition(&destination);
        size = store.serialized_size()?;
        info!("removed cache for {:?} ({} bytes left)", destination, size);
    }
    Ok(store)
}

/// Weekly duration cache kept in the shared key-value store.
pub struct DurationCache {
    store: Arc<dyn KeyValueStore>,
    soft_limit: usize,
    hard_limit: usize,
}

impl DurationCache {
    pub fn new(store: Arc<dyn KeyValueStore>, soft_limit: usize, hard_limit: usize) -> Self {
        DurationCache {
            store,
            soft_limit,
            hard_limit,
        }
    }

    /// Absent, unreadable or last week's data all yield an empty store for `epoch`.
    pub async fn load(&self, epoch: &CacheEpoch) -> CacheStore {
        let raw = match self.store.get(&[CACHE_KEY]).await {
            Ok(mut values) => values.remove(CACHE_KEY),
            Err(e) => {
                warn!("failed to read duration cache: {:?}", e);
                None
            }
        };
        let Some(raw) = raw else {
            return CacheStore::empty(epoch.clone());
        };

        match serde_json::from_value::<PersistedCache>(raw) {
            Ok(persisted) if persisted.week == epoch.as_str() => {
                CacheStore::from_persisted(persisted)
            }
            Ok(persisted) => {
                info!(
                    "new week detected ({} -> {}), resetting cache",
                    persisted.week, epoch
                );
                CacheStore::empty(epoch.clone())
            }
            Err(e) => {
                warn!("discarding undecodable duration cache: {}", e);
                CacheStore::empty(epoch.clone())
            }
        }
    }

    pub fn enforce_size_limit(&self, store: CacheStore) -> CacheStore {
        let fallback = store.clone();
        match enforce_size_limit(store, self.soft_limit) {
            Ok(store) => store,
            Err(e) => {
                error!("cache size check failed: {:?}", e);
                fallback
            }
        }
    }

    /// Best effort: a failed write only means the next load recomputes.
    pub async fn persist(&self, store: &CacheStore) {
        let persisted = match store.to_persisted() {
            Ok(persisted) => persisted,
            Err(e) => {
                error!("failed to encode duration cache: {:?}", e);
                return;
            }
        };
        let value = match serde_json::to_value(&persisted) {
            Ok(value) => value,
            Err(e) => {
                error!("failed to serialize duration cache: {:?}", e);
                return;
            }
        };
        let bytes = value.to_string().len();
        if bytes >= self.hard_limit {
            warn!(
                "duration cache is {} bytes, over the {} byte limit; not saving",
                bytes, self.hard_limit
            );
            return;
        }

        let values: HashMap<String, Value> = HashMap::from([(CACHE_KEY.to_string(), value)]);
        match self.store.set(values).await {
            Ok(()) => {
                info!(
                    "cache saved: {} destination(s), {:.2} MB",
                    persisted.data.len(),
                    bytes as f64 / (1024.0 * 1024.0)
                );
                for (destination, durations) in &store.partitions {
                    debug!("cache for {:?} holds {} origin(s)", destination, durations.len());
                }
            }
            Err(e) => warn!("failed to persist duration cache: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn week(name: &str) -> CacheEpoch {
        CacheEpoch::from(name)
    }

    fn sol() -> Destination {
        Destination::parse("Puerta del Sol, Madrid").unwrap()
    }

    fn cache(store: Arc<MemoryStore>) -> DurationCache {
        DurationCache::new(store, 3_670_016, 4 * 1024 * 1024)
    }

    #[test]
    fn lookup_ignores_case_and_padding() {
        let mut store = CacheStore::empty(week("2026-W43"));
        store.upsert(
            &Destination::parse(" PUERTA DEL SOL, Madrid").unwrap(),
            &Origin::new("Calle Mayor 1, Madrid  "),
            DurationRecord::Seconds(1500),
        );
        assert_eq!(
            store.lookup(&sol(), &Origin::new("  calle mayor 1, MADRID")),
            Some(DurationRecord::Seconds(1500))
        );
        assert_eq!(store.lookup(&sol(), &Origin::new("Gran Vía 2")), None);
    }

    #[test]
    fn upsert_overwrites() {
        let mut store = CacheStore::empty(week("2026-W43"));
        let origin = Origin::new("Gran Vía 2");
        store.upsert(&sol(), &origin, DurationRecord::NoRoute);
        store.upsert(&sol(), &origin, DurationRecord::Seconds(900));
        assert_eq!(store.lookup(&sol(), &origin), Some(DurationRecord::Seconds(900)));
    }

    #[test]
    fn partition_round_trips_with_sentinel_and_pipes() {
        let durations = OriginDurations::from([
            ("calle mayor 1, madrid".to_string(), DurationRecord::Seconds(1500)),
            ("gran vía 2".to_string(), DurationRecord::NoRoute),
            ("bloque a | piso 3".to_string(), DurationRecord::Seconds(0)),
        ]);
        let encoded = encode_partition(&durations).unwrap();
        assert_eq!(decode_partition(&encoded), durations);
    }

    #[test]
    fn decode_skips_garbage_lines() {
        let decoded = decode_partition("calle mayor 1|1500\nbroken line\nsol|abc\nATOCHA|none\n");
        assert_eq!(
            decoded,
            OriginDurations::from([
                ("atocha".to_string(), DurationRecord::NoRoute),
                ("calle mayor 1".to_string(), DurationRecord::Seconds(1500)),
            ])
        );
    }

    #[tokio::test]
    async fn persisted_store_reloads_in_same_week() {
        let backing = Arc::new(MemoryStore::new());
        let cache = cache(backing.clone());
        let mut store = cache.load(&week("2026-W43")).await;
        store.upsert(&sol(), &Origin::new("Calle Mayor 1"), DurationRecord::Seconds(600));
        cache.persist(&store).await;

        let reloaded = cache.load(&week("2026-W43")).await;
        assert_eq!(reloaded, store);
    }

    #[tokio::test]
    async fn stale_epoch_yields_empty_store() {
        let backing = Arc::new(MemoryStore::new());
        let cache = cache(backing.clone());
        let mut store = cache.load(&week("2026-W42")).await;
        store.upsert(&sol(), &Origin::new("Calle Mayor 1"), DurationRecord::Seconds(600));
        cache.persist(&store).await;

        let current = cache.load(&week("2026-W43")).await;
        assert!(current.is_empty());
        assert_eq!(current.epoch().as_str(), "2026-W43");
        assert_eq!(current.lookup(&sol(), &Origin::new("Calle Mayor 1")), None);
    }

    #[tokio::test]
    async fn undecodable_blob_is_discarded() {
        let backing = Arc::new(MemoryStore::new());
        backing
            .set(HashMap::from([(CACHE_KEY.to_string(), json!("not an object"))]))
            .await
            .unwrap();
        assert!(cache(backing).load(&week("2026-W43")).await.is_empty());
    }

    #[tokio::test]
    async fn store_over_hard_limit_is_not_saved() {
        let backing = Arc::new(MemoryStore::new());
        let cache = DurationCache::new(backing.clone(), 16, 32);
        let mut store = CacheStore::empty(week("2026-W43"));
        store.upsert(&sol(), &Origin::new("Calle Mayor 1"), DurationRecord::Seconds(600));
        let mut writes = backing.subscribe();

        cache.persist(&store).await;

        assert!(writes.try_recv().is_err());
        assert!(backing.get(&[CACHE_KEY]).await.unwrap().is_empty());
    }

    #[test]
    fn touch_without_data_is_not_persisted() {
        let mut store = CacheStore::empty(week("2026-W43"));
        let empty_size = store.serialized_size().unwrap();
        store.touch(&sol(), Utc.timestamp_opt(100, 0).unwrap());
        store.touch(
            &Destination::parse("Atocha").unwrap(),
            Utc.timestamp_opt(200, 0).unwrap(),
        );
        assert_eq!(store.serialized_size().unwrap(), empty_size);

        store.upsert(&sol(), &Origin::new("Calle Mayor 1"), DurationRecord::Seconds(600));
        let persisted = store.to_persisted().unwrap();
        assert_eq!(
            persisted.touched.keys().cloned().collect::<Vec<_>>(),
            vec!["puerta del sol, madrid".to_string()]
        );
    }

    fn filled(destinations: &[(&str, i64)], origins: usize) -> CacheStore {
        let mut store = CacheStore::empty(week("2026-W43"));
        for (name, touched_at) in destinations {
            let destination = Destination::parse(name).unwrap();
            for i in 0..origins {
                store.upsert(
                    &destination,
                    &Origin::new(format!("Calle Número {}, Madrid", i)),
                    DurationRecord::Seconds(600 + i as u64),
                );
            }
            store.touch(&destination, Utc.timestamp_opt(*touched_at, 0).unwrap());
        }
        store
    }

    #[test]
    fn eviction_drops_least_recently_used_first() {
        let store = filled(&[("Atocha", 300), ("Sol", 100), ("Chamartín", 200)], 50);
        let full = store.serialized_size().unwrap();
        let threshold = full - 10;

        let trimmed = enforce_size_limit(store, threshold).unwrap();
        assert!(trimmed.serialized_size().unwrap() < threshold);
        assert_eq!(
            trimmed.partitions.keys().cloned().collect::<Vec<_>>(),
            vec!["atocha".to_string(), "chamartín".to_string()]
        );
    }

    #[test]
    fn eviction_leaves_small_store_alone() {
        let store = filled(&[("Atocha", 1)], 3);
        let before = store.clone();
        assert_eq!(enforce_size_limit(store, 1_000_000).unwrap(), before);
    }

    #[test]
    fn eviction_empties_store_that_cannot_fit() {
        let store = filled(&[("Atocha", 1), ("Sol", 2)], 10);
        let trimmed = enforce_size_limit(store, 1).unwrap();
        assert!(trimmed.is_empty());
    }

    #[test]
    fn stats_count_entries() {
        let stats = filled(&[("Atocha", 1), ("Sol", 2)], 4).stats().unwrap();
        assert_eq!(stats.week, "2026-W43");
        assert_eq!(stats.destinations.len(), 2);
        assert!(stats.destinations.iter().all(|p| p.entries == 4));
        assert!(stats.bytes > 0);
    }
}
