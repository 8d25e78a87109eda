//! Question cache: keyed store of generated questions with TTL freshness, at-most-once
//! serving and background replenishment.

pub mod entry;

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::join_all;
use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};

use crate::{
    generator::{QuestionGenerationClient, error::UpstreamResult},
    state::game::{Category, Difficulty, Question},
};

pub use self::entry::{CacheEntry, CacheKey};

/// Default lifetime of a cached question.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default number of unused entries below which a key is replenished.
pub const DEFAULT_LOW_WATER_MARK: usize = 3;
/// Shortest period the eviction sweeper may run at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Cache handle shared with spawned prefetch and sweeper tasks.
pub type SharedCache = Arc<QuestionCache>;

/// Tunables of the question cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum age of a servable entry.
    pub ttl: Duration,
    /// Replenish a key when fewer unused entries than this remain after a hit.
    pub low_water_mark: usize,
    /// Period of the background eviction sweep.
    pub sweep_interval: Duration,
}

impl CacheSettings {
    /// Settings with the given TTL, sweeping every half TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            sweep_interval: ttl / 2,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

/// Outcome of a prefetch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchReport {
    /// Questions generated and stored as unused entries.
    pub inserted: usize,
    /// Generations that failed and were skipped.
    pub failed: usize,
    /// Generations not attempted because the key was already being prefetched.
    pub skipped: usize,
}

impl std::ops::AddAssign for PrefetchReport {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
    }
}

/// Read-only view of the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries held, served or not.
    pub total_entries: usize,
    /// Entries never served.
    pub unused_entries: usize,
    /// Entries held per category id.
    pub per_category_counts: BTreeMap<String, usize>,
}

/// Keyed question store.
///
/// Buckets are sharded behind a [`DashMap`], so insert, serve, mark-used and evict on a
/// bucket are atomic relative to each other. Prefetches register an in-flight marker per
/// key; overlapping requests for the same key return without calling upstream.
pub struct QuestionCache {
    buckets: DashMap<CacheKey, Vec<CacheEntry>>,
    in_flight: DashMap<CacheKey, u64>,
    client: QuestionGenerationClient,
    settings: CacheSettings,
    epoch: AtomicU64,
    next_token: AtomicU64,
}

/// Removes the in-flight marker of a key when the prefetch holding it finishes.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<CacheKey, u64>,
    key: CacheKey,
    token: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // A clear() may have let a newer prefetch claim the key; leave its marker alone.
        self.in_flight
            .remove_if(&self.key, |_, token| *token == self.token);
    }
}

impl QuestionCache {
    /// Create an empty cache wrapped in an [`Arc`] so background tasks can hold it.
    pub fn new(client: QuestionGenerationClient, settings: CacheSettings) -> SharedCache {
        Arc::new(Self {
            buckets: DashMap::new(),
            in_flight: DashMap::new(),
            client,
            settings,
            epoch: AtomicU64::new(0),
            next_token: AtomicU64::new(0),
        })
    }

    /// Tunables the cache was built with.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Serve an unused, fresh question for the key, generating one on a miss.
    ///
    /// Generated questions are stored already used. After a hit that leaves the key below
    /// the low-water mark, a background prefetch tops it up without delaying the caller.
    pub async fn get_or_generate(
        self: &Arc<Self>,
        category: &Category,
        difficulty: Difficulty,
        points: u32,
    ) -> UpstreamResult<Question> {
        let key = CacheKey::new(category.id.clone(), difficulty, points);

        if let Some((question, remaining)) = self.take_available(&key) {
            debug!(%key, question_id = %question.id, remaining, "question cache hit");
            if remaining < self.settings.low_water_mark {
                let deficit = self.settings.low_water_mark - remaining;
                self.spawn_prefetch(category.clone(), difficulty, vec![points; deficit]);
            }
            return Ok(question);
        }

        debug!(%key, "question cache miss; generating");
        let epoch = self.epoch.load(Ordering::SeqCst);
        let question = self.client.generate(category, difficulty, points).await?;
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.insert(key, CacheEntry::used(question.clone(), Instant::now()));
        }
        Ok(question)
    }

    /// Generate one unused entry per point value (repeat a value to request several).
    ///
    /// Keys already being prefetched are skipped. Failed generations are logged and
    /// skipped; partial success is kept.
    pub async fn prefetch(
        &self,
        category: &Category,
        difficulty: Difficulty,
        point_values: &[u32],
    ) -> PrefetchReport {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.prefetch_in_epoch(epoch, category, difficulty, point_values)
            .await
    }

    /// Prefetch whose results are kept only if no clear() happened since `epoch`.
    async fn prefetch_in_epoch(
        &self,
        epoch: u64,
        category: &Category,
        difficulty: Difficulty,
        point_values: &[u32],
    ) -> PrefetchReport {
        let mut report = PrefetchReport::default();

        let mut wanted: BTreeMap<u32, usize> = BTreeMap::new();
        for points in point_values {
            *wanted.entry(*points).or_default() += 1;
        }

        let mut guards = Vec::with_capacity(wanted.len());
        let mut jobs = Vec::new();
        for (points, count) in wanted {
            let key = CacheKey::new(category.id.clone(), difficulty, points);
            match self.claim(&key) {
                Some(guard) => {
                    guards.push(guard);
                    jobs.extend(std::iter::repeat_n(key, count));
                }
                None => {
                    debug!(%key, "prefetch already in flight; skipping");
                    report.skipped += count;
                }
            }
        }

        if jobs.is_empty() {
            return report;
        }

        let results = join_all(
            jobs.iter()
                .map(|key| self.client.generate(category, difficulty, key.points)),
        )
        .await;

        let current = self.epoch.load(Ordering::SeqCst) == epoch;
        for (key, result) in jobs.into_iter().zip(results) {
            match result {
                Ok(question) if current => {
                    self.insert(key, CacheEntry::unused(question, Instant::now()));
                    report.inserted += 1;
                }
                Ok(question) => {
                    debug!(%key, question_id = %question.id, "cache cleared during prefetch; dropping question");
                }
                Err(err) => {
                    warn!(%key, error = %err, "prefetch generation failed; skipping");
                    report.failed += 1;
                }
            }
        }

        drop(guards);
        debug!(
            category = %category.id,
            %difficulty,
            inserted = report.inserted,
            failed = report.failed,
            skipped = report.skipped,
            "prefetch finished"
        );
        report
    }

    /// Prefetch every category × difficulty combination and wait for all of them.
    pub async fn warmup(
        &self,
        categories: &[Category],
        difficulties: &[Difficulty],
        point_values: &[u32],
    ) -> PrefetchReport {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.warmup_in_epoch(epoch, categories, difficulties, point_values)
            .await
    }

    async fn warmup_in_epoch(
        &self,
        epoch: u64,
        categories: &[Category],
        difficulties: &[Difficulty],
        point_values: &[u32],
    ) -> PrefetchReport {
        let runs = categories.iter().flat_map(|category| {
            difficulties.iter().map(move |difficulty| {
                self.prefetch_in_epoch(epoch, category, *difficulty, point_values)
            })
        });

        let mut total = PrefetchReport::default();
        for report in join_all(runs).await {
            total += report;
        }
        info!(
            categories = categories.len(),
            inserted = total.inserted,
            failed = total.failed,
            "question cache warmed up"
        );
        total
    }

    /// Launch a prefetch in the background without waiting for it.
    pub fn spawn_prefetch(
        self: &Arc<Self>,
        category: Category,
        difficulty: Difficulty,
        point_values: Vec<u32>,
    ) -> JoinHandle<PrefetchReport> {
        let cache = Arc::clone(self);
        let epoch = self.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            cache
                .prefetch_in_epoch(epoch, &category, difficulty, &point_values)
                .await
        })
    }

    /// Launch a warm-up in the background. A clear() issued before the task runs still
    /// discards its results.
    pub fn spawn_warmup(
        self: &Arc<Self>,
        categories: Vec<Category>,
        difficulties: Vec<Difficulty>,
        point_values: Vec<u32>,
    ) -> JoinHandle<PrefetchReport> {
        let cache = Arc::clone(self);
        let epoch = self.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            cache
                .warmup_in_epoch(epoch, &categories, &difficulties, &point_values)
                .await
        })
    }

    /// Flag a question as consumed wherever it is cached. No-op when it is not cached.
    pub fn mark_used(&self, question_id: &str) -> bool {
        for mut bucket in self.buckets.iter_mut() {
            if let Some(entry) = bucket
                .value_mut()
                .iter_mut()
                .find(|entry| entry.question().id == question_id)
            {
                entry.mark_used();
                return true;
            }
        }
        false
    }

    /// Remove every entry whose age reached the TTL, dropping emptied buckets.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.settings.ttl;
        let mut removed = 0;

        self.buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|entry| !entry.is_expired(now, ttl));
            removed += before - bucket.len();
            !bucket.is_empty()
        });

        removed
    }

    /// Drop every entry and forget in-flight prefetches; their results are discarded.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.buckets.clear();
        self.in_flight.clear();
    }

    /// Count entries per category and in total.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for bucket in self.buckets.iter() {
            let entries = bucket.value();
            stats.total_entries += entries.len();
            stats.unused_entries += entries.iter().filter(|entry| !entry.is_used()).count();
            *stats
                .per_category_counts
                .entry(bucket.key().category_id.clone())
                .or_default() += entries.len();
        }
        stats
    }

    /// Number of never-served entries for a key.
    pub fn unused_count(&self, key: &CacheKey) -> usize {
        self.buckets
            .get(key)
            .map(|bucket| bucket.iter().filter(|entry| !entry.is_used()).count())
            .unwrap_or(0)
    }

    /// Run [`Self::evict_expired`] periodically until the cache is dropped or the
    /// returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let period = self.settings.sweep_interval.max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.evict_expired();
                if removed > 0 {
                    info!(removed, "evicted expired questions");
                }
            }
        })
    }

    /// Serve the first available entry of a bucket, returning it with the number of
    /// available entries left.
    fn take_available(&self, key: &CacheKey) -> Option<(Question, usize)> {
        let now = Instant::now();
        let ttl = self.settings.ttl;
        let mut bucket = self.buckets.get_mut(key)?;

        let question = bucket
            .iter_mut()
            .find(|entry| entry.is_available(now, ttl))
            .and_then(CacheEntry::take)?;
        let remaining = bucket
            .iter()
            .filter(|entry| entry.is_available(now, ttl))
            .count();

        Some((question, remaining))
    }

    fn insert(&self, key: CacheKey, entry: CacheEntry) {
        self.buckets.entry(key).or_default().push(entry);
    }

    fn claim(&self, key: &CacheKey) -> Option<InFlightGuard<'_>> {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::SeqCst);
                slot.insert(token);
                Some(InFlightGuard {
                    in_flight: &self.in_flight,
                    key: key.clone(),
                    token,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::ScriptedService;
    use std::collections::HashSet;
    use tokio::time::{advance, sleep, timeout};

    const LADDER: [u32; 5] = [100, 200, 300, 400, 500];

    fn geo() -> Category {
        Category::new("geo", "Geography")
    }

    fn cache_with(service: &Arc<ScriptedService>, settings: CacheSettings) -> SharedCache {
        let client = QuestionGenerationClient::new(service.clone(), "Arabic");
        QuestionCache::new(client, settings)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn miss_generates_and_never_serves_the_same_question_twice() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::default());

        let first = cache
            .get_or_generate(&geo(), Difficulty::Medium, 300)
            .await
            .unwrap();
        let second = cache
            .get_or_generate(&geo(), Difficulty::Medium, 300)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.points, 300);
        assert_eq!(service.generation_calls(), 2);

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.unused_entries, 0);
    }

    #[tokio::test]
    async fn prefetch_of_the_ladder_adds_five_unused_entries() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::default());

        let report = cache.prefetch(&geo(), Difficulty::Medium, &LADDER).await;

        assert_eq!(report.inserted, 5);
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.unused_entries, 5);
        assert_eq!(stats.per_category_counts.get("geo"), Some(&5));
    }

    #[tokio::test]
    async fn prefetch_keeps_partial_success() {
        let service = ScriptedService::new();
        service.succeed_only(3);
        let cache = cache_with(&service, CacheSettings::default());

        let report = cache.prefetch(&geo(), Difficulty::Medium, &LADDER).await;

        assert_eq!(report.inserted, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(cache.stats().unused_entries, 3);
    }

    #[tokio::test]
    async fn hits_serve_prefetched_entries_without_upstream_calls() {
        let service = ScriptedService::new();
        let settings = CacheSettings {
            low_water_mark: 0,
            ..CacheSettings::default()
        };
        let cache = cache_with(&service, settings);
        cache
            .prefetch(&geo(), Difficulty::Medium, &[200, 200, 200])
            .await;
        assert_eq!(service.generation_calls(), 3);

        let mut served = HashSet::new();
        for _ in 0..3 {
            let question = cache
                .get_or_generate(&geo(), Difficulty::Medium, 200)
                .await
                .unwrap();
            assert!(served.insert(question.id));
        }

        assert_eq!(service.generation_calls(), 3);
        assert_eq!(cache.stats().unused_entries, 0);
    }

    #[tokio::test]
    async fn overlapping_prefetches_collapse_into_one_upstream_call() {
        let service = ScriptedService::gated();
        let cache = cache_with(&service, CacheSettings::default());

        let background = cache.spawn_prefetch(geo(), Difficulty::Medium, vec![100]);
        wait_until(|| service.generation_calls() == 1).await;

        let second = cache.prefetch(&geo(), Difficulty::Medium, &[100]).await;
        assert_eq!(second.skipped, 1);
        assert_eq!(second.inserted, 0);

        service.release(1);
        let first = background.await.unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(service.generation_calls(), 1);

        // The marker is gone once the first prefetch completes.
        service.release(1);
        let third = cache.prefetch(&geo(), Difficulty::Medium, &[100]).await;
        assert_eq!(third.skipped, 0);
    }

    #[tokio::test]
    async fn hit_below_low_water_mark_replenishes_in_background() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::default());
        cache.prefetch(&geo(), Difficulty::Easy, &[100]).await;

        cache
            .get_or_generate(&geo(), Difficulty::Easy, 100)
            .await
            .unwrap();

        let key = CacheKey::new("geo", Difficulty::Easy, 100);
        wait_until(|| cache.unused_count(&key) == DEFAULT_LOW_WATER_MARK).await;
        assert_eq!(service.generation_calls(), 1 + DEFAULT_LOW_WATER_MARK);
    }

    #[tokio::test]
    async fn low_water_mark_is_configurable() {
        let service = ScriptedService::new();
        let settings = CacheSettings {
            low_water_mark: 1,
            ..CacheSettings::default()
        };
        let cache = cache_with(&service, settings);
        cache.prefetch(&geo(), Difficulty::Easy, &[100, 100]).await;

        cache
            .get_or_generate(&geo(), Difficulty::Easy, 100)
            .await
            .unwrap();
        tokio::task::yield_now().await;

        // One unused entry left, not below a mark of 1: nothing is generated.
        assert_eq!(service.generation_calls(), 2);
    }

    #[tokio::test]
    async fn generation_failure_on_miss_propagates() {
        let service = ScriptedService::new();
        service.fail_generation(true);
        let cache = cache_with(&service, CacheSettings::default());

        let result = cache.get_or_generate(&geo(), Difficulty::Hard, 500).await;
        assert!(result.is_err());
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_drops_only_expired_entries() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::with_ttl(Duration::from_secs(10)));

        cache.prefetch(&geo(), Difficulty::Medium, &[100]).await;
        advance(Duration::from_secs(6)).await;
        cache
            .prefetch(&Category::new("sci", "Science"), Difficulty::Medium, &[100])
            .await;
        advance(Duration::from_secs(5)).await;

        assert_eq!(cache.evict_expired(), 1);
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert!(!stats.per_category_counts.contains_key("geo"));
        assert_eq!(stats.per_category_counts.get("sci"), Some(&1));
    }

    #[tokio::test]
    async fn zero_ttl_eviction_empties_the_cache() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::with_ttl(Duration::ZERO));

        cache.prefetch(&geo(), Difficulty::Medium, &LADDER).await;
        assert_eq!(cache.evict_expired(), 5);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_not_served() {
        let service = ScriptedService::new();
        let settings = CacheSettings {
            low_water_mark: 0,
            ..CacheSettings::with_ttl(Duration::from_secs(10))
        };
        let cache = cache_with(&service, settings);
        cache.prefetch(&geo(), Difficulty::Medium, &[100]).await;

        advance(Duration::from_secs(10)).await;
        cache
            .get_or_generate(&geo(), Difficulty::Medium, 100)
            .await
            .unwrap();

        assert_eq!(service.generation_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_in_the_background() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::with_ttl(Duration::from_secs(10)));
        let sweeper = cache.spawn_sweeper();

        cache.prefetch(&geo(), Difficulty::Medium, &LADDER).await;
        sleep(Duration::from_secs(11)).await;

        assert_eq!(cache.stats().total_entries, 0);
        sweeper.abort();
    }

    #[tokio::test]
    async fn mark_used_is_idempotent() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::default());
        cache.prefetch(&geo(), Difficulty::Medium, &[100, 200]).await;

        let id = cache
            .buckets
            .get(&CacheKey::new("geo", Difficulty::Medium, 100))
            .unwrap()[0]
            .question()
            .id
            .clone();

        assert!(cache.mark_used(&id));
        let once = cache.stats();
        assert!(cache.mark_used(&id));
        assert_eq!(cache.stats(), once);
        assert_eq!(once.unused_entries, 1);

        assert!(!cache.mark_used("unknown"));
    }

    #[tokio::test]
    async fn clear_discards_in_flight_prefetch_results() {
        let service = ScriptedService::gated();
        let cache = cache_with(&service, CacheSettings::default());

        let background = cache.spawn_prefetch(geo(), Difficulty::Medium, vec![100, 200]);
        wait_until(|| service.generation_calls() == 2).await;

        cache.clear();
        service.release(2);
        let report = background.await.unwrap();

        assert_eq!(report.inserted, 0);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn warmup_covers_every_category_and_difficulty() {
        let service = ScriptedService::new();
        let cache = cache_with(&service, CacheSettings::default());
        let categories = [geo(), Category::new("sci", "Science")];

        let report = cache
            .warmup(
                &categories,
                &[Difficulty::Easy, Difficulty::Hard],
                &LADDER,
            )
            .await;

        assert_eq!(report.inserted, 20);
        let stats = cache.stats();
        assert_eq!(stats.per_category_counts.get("geo"), Some(&10));
        assert_eq!(stats.per_category_counts.get("sci"), Some(&10));
    }
}
