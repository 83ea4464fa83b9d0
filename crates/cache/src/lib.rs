//! Room-scoped deduplicating result caches
//!
//! Three TTL-bounded caches (STT, translation, TTS) guarantee at-most-one
//! concurrent computation per identical input within a room. Concurrent
//! callers with the same key either observe the cached result or await the
//! single in-flight computation through a per-key signal; a failed leader
//! still raises the signal so waiters can retry.
//!
//! The cache lock is held only for map operations, never across a compute
//! call.

mod keys;

pub use keys::{audio_hash, text_hash, SttKey, TranslationKey, TtsKey};

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;

use babelroom_core::{Error, Result, SynthesizedAudio, Transcription};

/// One cached value with its creation time
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// In-flight computation marker
///
/// The leader holds the `watch::Sender`; dropping it (on any exit path)
/// wakes every waiter holding a receiver clone. The generation guards
/// against a stale leader removing a successor's entry.
struct Pending {
    rx: watch::Receiver<()>,
    generation: u64,
}

#[derive(Default)]
struct Inner {
    stt: HashMap<SttKey, CacheEntry<Transcription>>,
    translation: HashMap<TranslationKey, CacheEntry<String>>,
    tts: HashMap<TtsKey, CacheEntry<SynthesizedAudio>>,
    /// room_id -> target_lang -> listener ids
    listeners: HashMap<String, HashMap<String, HashSet<String>>>,
    pending: HashMap<String, Pending>,
    next_generation: u64,
}

/// Process-wide room cache manager
pub struct RoomCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    cleanup_interval: Duration,
}

impl RoomCache {
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            cleanup_interval,
        }
    }

    /// Entry time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// STT result for one audio segment, computed at most once per key
    pub async fn get_or_create_stt<F, Fut>(
        &self,
        room_id: &str,
        speaker_id: &str,
        audio: &[u8],
        timeout: Duration,
        compute: F,
    ) -> Result<(Transcription, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Transcription>>,
    {
        let key = SttKey::new(room_id, speaker_id, audio);
        let pending_key = key.pending_key();
        let ttl = self.ttl;
        let store_key = key.clone();
        self.get_or_create(
            &pending_key,
            timeout,
            move |inner: &mut Inner| lookup_live(&mut inner.stt, &key, ttl),
            move |inner: &mut Inner, value: Transcription| {
                inner.stt.insert(store_key, CacheEntry::new(value));
            },
            compute,
        )
        .await
    }

    /// Translation for one (pair, text), computed at most once per key
    pub async fn get_or_create_translation<F, Fut>(
        &self,
        room_id: &str,
        source_lang: &str,
        target_lang: &str,
        text: &str,
        timeout: Duration,
        compute: F,
    ) -> Result<(String, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let key = TranslationKey::new(room_id, source_lang, target_lang, text);
        let pending_key = key.pending_key();
        let ttl = self.ttl;
        let store_key = key.clone();
        self.get_or_create(
            &pending_key,
            timeout,
            move |inner: &mut Inner| lookup_live(&mut inner.translation, &key, ttl),
            move |inner: &mut Inner, value: String| {
                inner.translation.insert(store_key, CacheEntry::new(value));
            },
            compute,
        )
        .await
    }

    /// Synthesized audio for one (target, text), computed at most once per key
    pub async fn get_or_create_tts<F, Fut>(
        &self,
        room_id: &str,
        target_lang: &str,
        text: &str,
        timeout: Duration,
        compute: F,
    ) -> Result<(SynthesizedAudio, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SynthesizedAudio>>,
    {
        let key = TtsKey::new(room_id, target_lang, text);
        let pending_key = key.pending_key();
        let ttl = self.ttl;
        let store_key = key.clone();
        self.get_or_create(
            &pending_key,
            timeout,
            move |inner: &mut Inner| lookup_live(&mut inner.tts, &key, ttl),
            move |inner: &mut Inner, value: SynthesizedAudio| {
                inner.tts.insert(store_key, CacheEntry::new(value));
            },
            compute,
        )
        .await
    }

    /// Deduplication protocol shared by the three caches
    async fn get_or_create<V, L, S, F, Fut>(
        &self,
        pending_key: &str,
        timeout: Duration,
        lookup: L,
        store: S,
        compute: F,
    ) -> Result<(V, bool)>
    where
        V: Clone,
        L: Fn(&mut Inner) -> Option<V>,
        S: FnOnce(&mut Inner, V),
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        // Steps 1-2: live entry wins; otherwise capture any in-flight signal
        let in_flight = {
            let mut inner = self.inner.lock();
            if let Some(value) = lookup(&mut inner) {
                tracing::debug!(target: "cache", key = pending_key, "cache hit");
                return Ok((value, true));
            }
            inner.pending.get(pending_key).map(|p| p.rx.clone())
        };

        // Step 3: wait for the leader, bounded by the operation timeout,
        // then re-check; a miss here means the leader failed or timed out
        if let Some(mut rx) = in_flight {
            let _ = tokio::time::timeout(timeout, rx.changed()).await;
            let mut inner = self.inner.lock();
            if let Some(value) = lookup(&mut inner) {
                tracing::debug!(target: "cache", key = pending_key, "cache hit after wait");
                return Ok((value, true));
            }
        }

        // Step 4: become the leader under a fresh signal
        let (tx, generation) = {
            let mut inner = self.inner.lock();
            if let Some(value) = lookup(&mut inner) {
                return Ok((value, true));
            }
            let generation = inner.next_generation;
            inner.next_generation += 1;
            let (tx, rx) = watch::channel(());
            inner
                .pending
                .insert(pending_key.to_string(), Pending { rx, generation });
            (tx, generation)
        };

        // Step 5: compute outside the lock, bounded by the operation timeout
        let outcome = tokio::time::timeout(timeout, compute()).await;
        let result = match outcome {
            Ok(Ok(value)) => {
                let mut inner = self.inner.lock();
                store(&mut inner, value.clone());
                tracing::debug!(target: "cache", key = pending_key, "cache store");
                Ok((value, false))
            }
            Ok(Err(e)) => {
                tracing::debug!(target: "cache", key = pending_key, error = %e, "compute failed");
                Err(e)
            }
            Err(_) => {
                tracing::debug!(target: "cache", key = pending_key, "compute timed out");
                Err(Error::Timeout(timeout))
            }
        };

        // Always clear the pending entry and raise the signal, success or not
        {
            let mut inner = self.inner.lock();
            let ours = inner
                .pending
                .get(pending_key)
                .map(|p| p.generation == generation)
                .unwrap_or(false);
            if ours {
                inner.pending.remove(pending_key);
            }
        }
        drop(tx);

        result
    }

    /// Register a listener under a target language.
    ///
    /// A listener belongs to at most one target-language set per room, so
    /// registration is a remove-then-insert.
    pub fn register_listener(&self, room_id: &str, listener_id: &str, target_lang: &str) {
        let mut inner = self.inner.lock();
        let langs = inner.listeners.entry(room_id.to_string()).or_default();
        for set in langs.values_mut() {
            set.remove(listener_id);
        }
        langs.retain(|_, set| !set.is_empty());
        let total = {
            let set = langs.entry(target_lang.to_string()).or_default();
            set.insert(listener_id.to_string());
            set.len()
        };
        tracing::debug!(
            target: "cache",
            room = room_id,
            listener = listener_id,
            target_lang,
            total_listeners = total,
            "listener registered"
        );
    }

    /// Remove a listener from every target-language set of the room
    pub fn unregister_listener(&self, room_id: &str, listener_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(langs) = inner.listeners.get_mut(room_id) {
            for set in langs.values_mut() {
                set.remove(listener_id);
            }
            langs.retain(|_, set| !set.is_empty());
            if langs.is_empty() {
                inner.listeners.remove(room_id);
            }
        }
    }

    /// Snapshot of listener ids for one target language (sorted, detached)
    pub fn listeners_for_language(&self, room_id: &str, target_lang: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let mut ids: Vec<String> = inner
            .listeners
            .get(room_id)
            .and_then(|langs| langs.get(target_lang))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop every cached result and listener entry for a room
    pub fn invalidate_room(&self, room_id: &str) {
        let mut inner = self.inner.lock();
        inner.stt.retain(|key, _| key.room_id != room_id);
        inner.translation.retain(|key, _| key.room_id != room_id);
        inner.tts.retain(|key, _| key.room_id != room_id);
        inner.listeners.remove(room_id);
        tracing::debug!(target: "cache", room = room_id, "room invalidated");
    }

    /// Discard expired entries across all three caches
    pub fn cleanup_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut inner = self.inner.lock();
        let before =
            inner.stt.len() + inner.translation.len() + inner.tts.len();
        inner.stt.retain(|_, entry| !entry.is_expired(ttl));
        inner.translation.retain(|_, entry| !entry.is_expired(ttl));
        inner.tts.retain(|_, entry| !entry.is_expired(ttl));
        let cleaned =
            before - (inner.stt.len() + inner.translation.len() + inner.tts.len());
        if cleaned > 0 {
            tracing::debug!(target: "cache", cleaned, "expired entries discarded");
        }
        cleaned
    }

    /// Start the periodic expiry sweeper.
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_sweeper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);
        let interval = cache.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.cleanup_expired();
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!(target: "cache", "sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

fn lookup_live<K, V>(
    map: &mut HashMap<K, CacheEntry<V>>,
    key: &K,
    ttl: Duration,
) -> Option<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    match map.get(key) {
        Some(entry) if !entry.is_expired(ttl) => Some(entry.value.clone()),
        Some(_) => {
            // Never serve past TTL; drop eagerly instead of waiting for the sweeper
            map.remove(key);
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> Arc<RoomCache> {
        Arc::new(RoomCache::new(
            Duration::from_secs(10),
            Duration::from_secs(30),
        ))
    }

    fn short_ttl_cache() -> Arc<RoomCache> {
        Arc::new(RoomCache::new(
            Duration::from_millis(50),
            Duration::from_secs(30),
        ))
    }

    #[tokio::test]
    async fn test_second_call_is_cached() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let audio = vec![7u8; 960];

        for expect_cached in [false, true] {
            let (result, was_cached) = cache
                .get_or_create_stt("r1", "s1", &audio, Duration::from_secs(1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Transcription {
                        text: "hello".into(),
                        confidence: 0.9,
                    })
                })
                .await
                .unwrap();
            assert_eq!(result.text, "hello");
            assert_eq!(was_cached, expect_cached);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = short_ttl_cache();

        let (_, cached) = cache
            .get_or_create_translation("r1", "ko", "en", "text", Duration::from_secs(1), || async {
                Ok("hello".to_string())
            })
            .await
            .unwrap();
        assert!(!cached);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let (_, cached) = cache
            .get_or_create_translation("r1", "ko", "en", "text", Duration::from_secs(1), || async {
                Ok("hello again".to_string())
            })
            .await
            .unwrap();
        assert!(!cached, "expired entry must not be served");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_compute() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let audio = Arc::new(vec![3u8; 32_000]);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let audio = Arc::clone(&audio);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create_stt("r1", "s1", &audio, Duration::from_secs(5), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(Transcription {
                            text: "once".into(),
                            confidence: 1.0,
                        })
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut cached_count = 0;
        for handle in handles {
            let (result, was_cached) = handle.await.unwrap();
            assert_eq!(result.text, "once");
            if was_cached {
                cached_count += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one compute may run");
        assert_eq!(cached_count, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiter_retries_after_leader_failure() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_create_translation(
                        "r1",
                        "ko",
                        "en",
                        "text",
                        Duration::from_secs(5),
                        || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Err(Error::Backend("translate exploded".into()))
                        },
                    )
                    .await
            })
        };

        // Give the leader time to install its signal
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_create_translation(
                        "r1",
                        "ko",
                        "en",
                        "text",
                        Duration::from_secs(5),
                        || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok("retried".to_string())
                        },
                    )
                    .await
            })
        };

        assert!(leader.await.unwrap().is_err());
        let (value, was_cached) = waiter.await.unwrap().unwrap();
        assert_eq!(value, "retried");
        assert!(!was_cached, "waiter became the next leader");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_leader_timeout_reported() {
        let cache = cache();
        let result = cache
            .get_or_create_tts("r1", "en", "text", Duration::from_millis(20), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(SynthesizedAudio::default())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_listener_registry_roundtrip() {
        let cache = RoomCache::new(Duration::from_secs(10), Duration::from_secs(30));

        cache.register_listener("r1", "alice", "en");
        cache.register_listener("r1", "bob", "en");
        cache.register_listener("r1", "carol", "ja");

        assert_eq!(cache.listeners_for_language("r1", "en"), vec!["alice", "bob"]);
        assert_eq!(cache.listeners_for_language("r1", "ja"), vec!["carol"]);
        assert!(cache.listeners_for_language("r2", "en").is_empty());

        cache.unregister_listener("r1", "alice");
        cache.unregister_listener("r1", "bob");
        cache.unregister_listener("r1", "carol");

        assert!(cache.listeners_for_language("r1", "en").is_empty());
        assert!(cache.listeners_for_language("r1", "ja").is_empty());
    }

    #[test]
    fn test_listener_retarget_is_remove_then_insert() {
        let cache = RoomCache::new(Duration::from_secs(10), Duration::from_secs(30));

        cache.register_listener("r1", "alice", "en");
        cache.register_listener("r1", "alice", "ja");

        assert!(cache.listeners_for_language("r1", "en").is_empty());
        assert_eq!(cache.listeners_for_language("r1", "ja"), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_expiry_sweep() {
        let cache = short_ttl_cache();
        cache
            .get_or_create_translation("r1", "ko", "en", "a", Duration::from_secs(1), || async {
                Ok("x".to_string())
            })
            .await
            .unwrap();

        assert_eq!(cache.cleanup_expired(), 0);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.cleanup_expired(), 1);
    }
}
