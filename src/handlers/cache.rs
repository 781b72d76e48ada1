use crate::cache::CacheStats;
use crate::handlers::AppState;
use crate::schedule::CacheEpoch;
use anyhow::Result;

pub async fn cache_stats(state: &AppState) -> Result<CacheStats> {
    let epoch = CacheEpoch::for_time(state.clock.now());
    state.cache.load(&epoch).await.stats()
}
