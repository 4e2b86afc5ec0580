//! Validation cache
//!
//! Short-TTL cache of venue-reported facts (instrument metadata, quotes,
//! account state) so validation bursts do not hammer the gateway. Each
//! category has its own freshness window; an expired entry is never served.
//! Concurrent misses on one key are collapsed into a single gateway refresh.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::domain::{AccountInfo, InstrumentInfo, Quote};
use crate::gateway::{GatewayClient, GatewayResult};

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<T: Clone> Entry<T> {
    fn fresh(&self, now: DateTime<Utc>) -> Option<T> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

/// Cache performance counters
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub instrument_entries: usize,
    pub quote_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Per-category TTL cache over gateway lookups.
pub struct ValidationCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    instruments: DashMap<String, Entry<InstrumentInfo>>,
    quotes: DashMap<String, Entry<Quote>>,
    account: RwLock<Option<Entry<AccountInfo>>>,
    // Per-key refresh locks: concurrent misses queue here and re-check after
    // the winner has refreshed, so each key sees one in-flight gateway call.
    instrument_locks: DashMap<String, Arc<Mutex<()>>>,
    quote_locks: DashMap<String, Arc<Mutex<()>>>,
    account_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValidationCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            instruments: DashMap::new(),
            quotes: DashMap::new(),
            account: RwLock::new(None),
            instrument_locks: DashMap::new(),
            quote_locks: DashMap::new(),
            account_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Instrument metadata, refreshed from the gateway on expiry.
    pub async fn instrument(
        &self,
        gateway: &dyn GatewayClient,
        symbol: &str,
    ) -> GatewayResult<InstrumentInfo> {
        if let Some(info) = self.lookup(&self.instruments, symbol) {
            return Ok(info);
        }

        let lock = self.refresh_lock(&self.instrument_locks, symbol);
        let _guard = lock.lock().await;

        // The winner of the lock race may have refreshed while we queued.
        if let Some(info) = self.fresh_value(&self.instruments, symbol) {
            return Ok(info);
        }

        let info = gateway.instrument_info(symbol).await?;
        self.insert(&self.instruments, symbol, info.clone(), self.config.instrument_ttl());
        Ok(info)
    }

    /// Latest quote, refreshed from the gateway on expiry.
    pub async fn quote(&self, gateway: &dyn GatewayClient, symbol: &str) -> GatewayResult<Quote> {
        if let Some(quote) = self.lookup(&self.quotes, symbol) {
            return Ok(quote);
        }

        let lock = self.refresh_lock(&self.quote_locks, symbol);
        let _guard = lock.lock().await;

        if let Some(quote) = self.fresh_value(&self.quotes, symbol) {
            return Ok(quote);
        }

        let quote = gateway.quote(symbol).await?;
        self.insert(&self.quotes, symbol, quote.clone(), self.config.quote_ttl());
        Ok(quote)
    }

    /// Forced quote refresh, bypassing freshness. Used after price-related
    /// rejections where the cached quote is known to be wrong.
    pub async fn refresh_quote(
        &self,
        gateway: &dyn GatewayClient,
        symbol: &str,
    ) -> GatewayResult<Quote> {
        let lock = self.refresh_lock(&self.quote_locks, symbol);
        let _guard = lock.lock().await;

        let quote = gateway.quote(symbol).await?;
        self.insert(&self.quotes, symbol, quote.clone(), self.config.quote_ttl());
        debug!(symbol, bid = %quote.bid, ask = %quote.ask, "quote force-refreshed");
        Ok(quote)
    }

    /// Account state, refreshed from the gateway on expiry.
    pub async fn account(&self, gateway: &dyn GatewayClient) -> GatewayResult<AccountInfo> {
        let now = self.clock.now();
        if let Some(info) = self.account.read().await.as_ref().and_then(|e| e.fresh(now)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(info);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let _guard = self.account_lock.lock().await;
        let now = self.clock.now();
        if let Some(info) = self.account.read().await.as_ref().and_then(|e| e.fresh(now)) {
            return Ok(info);
        }

        let info = gateway.account_info().await?;
        let expires_at = now + ttl_chrono(self.config.account_ttl());
        *self.account.write().await = Some(Entry {
            value: info.clone(),
            inserted_at: now,
            expires_at,
        });
        Ok(info)
    }

    /// Evict expired entries and bound each category to `max_entries`
    /// (expired first, then oldest by insertion).
    pub async fn sweep(&self) {
        let now = self.clock.now();

        Self::sweep_map(&self.instruments, now, self.config.max_entries);
        Self::sweep_map(&self.quotes, now, self.config.max_entries);

        let mut account = self.account.write().await;
        if let Some(entry) = account.as_ref() {
            if entry.fresh(now).is_none() {
                *account = None;
            }
        }

        // Refresh locks for keys that no longer exist and are not in use.
        self.instrument_locks
            .retain(|key, lock| Arc::strong_count(lock) > 1 || self.instruments.contains_key(key));
        self.quote_locks
            .retain(|key, lock| Arc::strong_count(lock) > 1 || self.quotes.contains_key(key));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            instrument_entries: self.instruments.len(),
            quote_entries: self.quotes.len(),
        }
    }

    fn lookup<T: Clone>(&self, map: &DashMap<String, Entry<T>>, key: &str) -> Option<T> {
        let value = self.fresh_value(map, key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    fn fresh_value<T: Clone>(&self, map: &DashMap<String, Entry<T>>, key: &str) -> Option<T> {
        let now = self.clock.now();
        map.get(key).and_then(|entry| entry.fresh(now))
    }

    fn insert<T: Clone>(
        &self,
        map: &DashMap<String, Entry<T>>,
        key: &str,
        value: T,
        ttl: std::time::Duration,
    ) {
        let now = self.clock.now();
        map.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: now,
                expires_at: now + ttl_chrono(ttl),
            },
        );
    }

    fn refresh_lock(&self, locks: &DashMap<String, Arc<Mutex<()>>>, key: &str) -> Arc<Mutex<()>> {
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn sweep_map<T: Clone>(map: &DashMap<String, Entry<T>>, now: DateTime<Utc>, cap: usize) {
        map.retain(|_, entry| entry.fresh(now).is_some());

        if map.len() > cap {
            let mut by_age: Vec<(String, DateTime<Utc>)> = map
                .iter()
                .map(|e| (e.key().clone(), e.value().inserted_at))
                .collect();
            by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
            for (key, _) in by_age.into_iter().take(map.len() - cap) {
                map.remove(&key);
            }
        }
    }
}

fn ttl_chrono(ttl: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 1_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::{GatewayError, SubmitAck};
    use crate::domain::OrderRequest;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicU32;

    struct CountingGateway {
        quote_calls: AtomicU32,
        instrument_calls: AtomicU32,
        account_calls: AtomicU32,
        quote_delay: std::time::Duration,
    }

    impl CountingGateway {
        fn new() -> Self {
            Self {
                quote_calls: AtomicU32::new(0),
                instrument_calls: AtomicU32::new(0),
                account_calls: AtomicU32::new(0),
                quote_delay: std::time::Duration::ZERO,
            }
        }

        fn with_quote_delay(mut self, delay: std::time::Duration) -> Self {
            self.quote_delay = delay;
            self
        }
    }

    #[async_trait]
    impl GatewayClient for CountingGateway {
        async fn submit(&self, _request: &OrderRequest) -> GatewayResult<SubmitAck> {
            Err(GatewayError::Transport("not under test".to_string()))
        }

        async fn quote(&self, _instrument: &str) -> GatewayResult<Quote> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            if !self.quote_delay.is_zero() {
                tokio::time::sleep(self.quote_delay).await;
            }
            Ok(Quote {
                bid: dec!(2350.00),
                ask: dec!(2350.40),
                timestamp: Utc::now(),
            })
        }

        async fn instrument_info(&self, _instrument: &str) -> GatewayResult<InstrumentInfo> {
            self.instrument_calls.fetch_add(1, Ordering::SeqCst);
            Ok(InstrumentInfo {
                min_volume: dec!(0.01),
                max_volume: dec!(10),
                volume_step: dec!(0.01),
                trade_allowed: true,
            })
        }

        async fn account_info(&self) -> GatewayResult<AccountInfo> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccountInfo {
                trade_allowed: true,
                margin_level: dec!(350),
                free_margin: dec!(10_000),
            })
        }
    }

    fn cache_with_clock() -> (Arc<ValidationCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig {
            instrument_ttl_secs: 30,
            quote_ttl_ms: 2_000,
            account_ttl_secs: 60,
            max_entries: 100,
        };
        (
            Arc::new(ValidationCache::new(config, clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn quote_served_from_cache_until_ttl_expires() {
        let (cache, clock) = cache_with_clock();
        let gateway = CountingGateway::new();

        cache.quote(&gateway, "XAUUSD").await.expect("first fetch");
        cache.quote(&gateway, "XAUUSD").await.expect("cached");
        assert_eq!(gateway.quote_calls.load(Ordering::SeqCst), 1);

        // At exactly the TTL boundary the entry is expired, not served.
        clock.advance_millis(2_000);
        cache.quote(&gateway, "XAUUSD").await.expect("refetched");
        assert_eq!(gateway.quote_calls.load(Ordering::SeqCst), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn categories_expire_independently() {
        let (cache, clock) = cache_with_clock();
        let gateway = CountingGateway::new();

        cache.quote(&gateway, "XAUUSD").await.expect("quote");
        cache.instrument(&gateway, "XAUUSD").await.expect("instrument");
        cache.account(&gateway).await.expect("account");

        // 5s: quote (2s TTL) is stale, instrument (30s) and account (60s) are not.
        clock.advance_secs(5);
        cache.quote(&gateway, "XAUUSD").await.expect("quote refetch");
        cache.instrument(&gateway, "XAUUSD").await.expect("instrument cached");
        cache.account(&gateway).await.expect("account cached");

        assert_eq!(gateway.quote_calls.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.instrument_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.account_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_trigger_exactly_one_refresh() {
        let (cache, _clock) = cache_with_clock();
        let gateway = Arc::new(
            CountingGateway::new().with_quote_delay(std::time::Duration::from_millis(20)),
        );

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let gateway = gateway.clone();
            tasks.push(tokio::spawn(async move {
                cache.quote(gateway.as_ref(), "XAUUSD").await
            }));
        }

        for task in tasks {
            let quote = task.await.expect("task").expect("quote");
            assert_eq!(quote.bid, dec!(2350.00));
        }

        assert_eq!(gateway.quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_quote_bypasses_freshness() {
        let (cache, _clock) = cache_with_clock();
        let gateway = CountingGateway::new();

        cache.quote(&gateway, "XAUUSD").await.expect("first");
        cache.refresh_quote(&gateway, "XAUUSD").await.expect("forced");
        assert_eq!(gateway.quote_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sweep_evicts_expired_and_bounds_size() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig {
            instrument_ttl_secs: 30,
            quote_ttl_ms: 60_000,
            account_ttl_secs: 60,
            max_entries: 2,
        };
        let cache = ValidationCache::new(config, clock.clone());
        let gateway = CountingGateway::new();

        for symbol in ["A", "B", "C"] {
            cache.quote(&gateway, symbol).await.expect("fetch");
            clock.advance_millis(10);
        }
        assert_eq!(cache.stats().quote_entries, 3);

        // All fresh: the cap drops the oldest entry.
        cache.sweep().await;
        assert_eq!(cache.stats().quote_entries, 2);
        assert!(cache.quotes.get("A").is_none());

        clock.advance_secs(120);
        cache.sweep().await;
        assert_eq!(cache.stats().quote_entries, 0);
    }
}
