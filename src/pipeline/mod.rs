//! Priority-ordered derivative generation pipeline. One instance drives
//! thumbnails, a second drives previews; both are the same generic type
//! parameterized by [`DerivativeKind`] and a shared [`Decoder`].
//!
//! Cancellation and regeneration are expressed through a per-asset
//! generation counter: every call that invalidates an asset's derivative
//! bumps its generation, and a completing worker discards its result if the
//! generation it started with is no longer current — the same pattern the
//! spacedrive thumbnail actor uses to drop stale in-flight renders rather
//! than trying to cancel a task already mid-decode.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

use crate::cache::DerivativeCache;
use crate::collab::{BytesProducer, Decoder};
use crate::model::{AssetId, DerivativeHandle, DerivativeKind};
use crate::priority::{Entry, Priority, PriorityQueue};

/// Callback invoked when a derivative finishes rendering successfully.
pub type OnReady = Arc<dyn Fn(AssetId, DerivativeHandle) + Send + Sync>;
/// Callback invoked when a derivative fails to render.
pub type OnError = Arc<dyn Fn(AssetId, String) + Send + Sync>;

struct QueuedWork {
    bytes: BytesProducer,
    edit_payload: Option<Bytes>,
    generation: u64,
}

/// Removes this worker's in-flight entry on drop, so every exit path
/// (success, producer failure, decoder failure, stale-generation discard)
/// releases the slot without repeating the cleanup at each return. Only
/// removes the entry if it still matches the generation this worker was
/// dispatched with — a newer worker (dispatched after an intervening
/// invalidate/regenerate) may have already overwritten it, and this guard
/// must not clear that newer worker's claim.
struct InFlightGuard {
    id: AssetId,
    generation: u64,
    set: Arc<Mutex<HashMap<AssetId, u64>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock();
        if set.get(&self.id) == Some(&self.generation) {
            set.remove(&self.id);
        }
    }
}

/// Priority-driven pipeline producing one derivative kind.
pub struct DerivativePipeline<D: Decoder + 'static> {
    kind: DerivativeKind,
    decoder: Arc<D>,
    cache: Arc<DerivativeCache>,
    target_size_px: u32,
    queue: Arc<Mutex<PriorityQueue<QueuedWork>>>,
    generations: Arc<Mutex<HashMap<AssetId, u64>>>,
    /// Ids currently dispatched to a worker, mapped to the generation they
    /// were dispatched with. Guards the "at most one in-flight task per id"
    /// invariant for same-generation duplicate requests — but a request
    /// carrying a newer generation (the regenerate-after-invalidate case) is
    /// still allowed through even while a stale-generation worker is still
    /// running, since that worker's result is discarded on completion
    /// rather than relied upon.
    in_flight: Arc<Mutex<HashMap<AssetId, u64>>>,
    semaphore: Arc<Semaphore>,
    notify: Arc<Notify>,
    on_ready: Arc<RwLock<Option<OnReady>>>,
    on_error: Arc<RwLock<Option<OnError>>>,
}

impl<D: Decoder + 'static> DerivativePipeline<D> {
    /// Builds a pipeline and spawns its dispatch loop. `target_size_px` is
    /// the long-edge pixel size this pipeline asks the decoder to render at
    /// (`Config::thumbnail_target_px`/`preview_target_px`).
    pub fn new(
        kind: DerivativeKind,
        decoder: Arc<D>,
        cache: Arc<DerivativeCache>,
        concurrency: usize,
        target_size_px: u32,
    ) -> Self {
        let pipeline = Self {
            kind,
            decoder,
            cache,
            target_size_px,
            queue: Arc::new(Mutex::new(PriorityQueue::new())),
            generations: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            notify: Arc::new(Notify::new()),
            on_ready: Arc::new(RwLock::new(None)),
            on_error: Arc::new(RwLock::new(None)),
        };
        pipeline.spawn_dispatch_loop();
        pipeline
    }

    /// Installs (or clears, with `None`) the success callback.
    pub fn set_on_ready(&self, callback: Option<OnReady>) {
        *self.on_ready.write() = callback;
    }

    /// Installs (or clears, with `None`) the failure callback.
    pub fn set_on_error(&self, callback: Option<OnError>) {
        *self.on_error.write() = callback;
    }

    /// Requests a derivative at the given priority. If a ready value is
    /// already cached, the ready callback fires synchronously before this
    /// call returns; otherwise the request is queued (or re-prioritized, if
    /// already queued).
    pub fn request(&self, id: AssetId, bytes: BytesProducer, priority: Priority) {
        if let Some(cached) = self.cache.get(&id, self.kind) {
            self.fire_ready(id, cached);
            return;
        }
        let generation = self.current_generation(&id);
        self.enqueue(id, bytes, None, generation, priority);
    }

    /// Re-prioritizes a pending request. No-op if not queued.
    pub fn update_priority(&self, id: &AssetId, priority: Priority) {
        self.queue.lock().update_priority(id, priority);
        self.notify.notify_one();
    }

    /// Cancels a single pending request; has no effect on work already
    /// dispatched to a worker (the worker's result is simply discarded if
    /// the generation has since moved on).
    pub fn cancel(&self, id: &AssetId) {
        self.queue.lock().remove(id);
    }

    /// Cancels every pending request.
    pub fn cancel_all(&self) {
        let mut queue = self.queue.lock();
        *queue = PriorityQueue::new();
    }

    /// Cancels every pending request queued at background priority, used to
    /// shed load when the UI reprioritizes the visible viewport. Returns the
    /// number of entries removed.
    pub fn cancel_background(&self) -> usize {
        self.queue.lock().remove_priority(Priority::Background)
    }

    /// Invalidates a cached/in-flight derivative: evicts the cache entry
    /// and bumps the generation counter so any in-flight worker's result
    /// for the old generation is discarded on completion.
    pub fn invalidate(&self, id: &AssetId) {
        self.cache.invalidate(id, self.kind);
        self.bump_generation(id);
        self.queue.lock().remove(id);
    }

    /// Invalidates, then re-requests with an edit-state payload attached,
    /// so the decoder renders a derivative reflecting the edit. Implemented
    /// in terms of `invalidate` + `request` rather than a special-cased
    /// code path, so the generation-discard guarantee is inherited.
    pub fn regenerate(&self, id: AssetId, bytes: BytesProducer, edit_payload: Bytes, priority: Priority) {
        self.invalidate(&id);
        let generation = self.current_generation(&id);
        self.enqueue(id, bytes, Some(edit_payload), generation, priority);
    }

    /// Number of requests currently queued (not yet dispatched to a worker).
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Upserts a queue entry: if `id` is already queued, only its priority is
    /// updated (the existing producer/edit-payload/generation are kept — do
    /// not replace the producer). If `id` is already dispatched to a worker
    /// at this same generation, this is a no-op: that worker owns the one
    /// permitted in-flight slot for `id` and will deliver its own
    /// `on_ready`/`on_error` when it finishes. A newer generation (the
    /// regenerate-after-invalidate case) is not blocked by an older
    /// in-flight worker, since that worker's result is discarded on
    /// completion rather than relied upon.
    fn enqueue(&self, id: AssetId, bytes: BytesProducer, edit_payload: Option<Bytes>, generation: u64, priority: Priority) {
        if self.in_flight.lock().get(&id) == Some(&generation) {
            return;
        }
        let mut queue = self.queue.lock();
        if queue.contains(&id) {
            queue.update_priority(&id, priority);
        } else {
            queue.enqueue(Entry {
                id,
                priority,
                payload: QueuedWork {
                    bytes,
                    edit_payload,
                    generation,
                },
            });
        }
        drop(queue);
        self.notify.notify_one();
    }

    fn current_generation(&self, id: &AssetId) -> u64 {
        *self.generations.lock().entry(id.clone()).or_insert(0)
    }

    fn bump_generation(&self, id: &AssetId) {
        *self.generations.lock().entry(id.clone()).or_insert(0) += 1;
    }

    fn fire_ready(&self, id: AssetId, bytes: Bytes) {
        let handle = DerivativeHandle::new(format!("blob://{}/{}", self.kind.label(), id.as_str()));
        self.cache.put(&id, self.kind, bytes);
        if let Some(callback) = self.on_ready.read().as_ref() {
            callback(id, handle);
        }
    }

    fn spawn_dispatch_loop(&self) {
        let kind = self.kind;
        let target_size_px = self.target_size_px;
        let decoder = self.decoder.clone();
        let cache = self.cache.clone();
        let queue = self.queue.clone();
        let generations = self.generations.clone();
        let in_flight = self.in_flight.clone();
        let semaphore = self.semaphore.clone();
        let notify = self.notify.clone();
        let on_ready = self.on_ready.clone();
        let on_error = self.on_error.clone();

        tokio::spawn(async move {
            loop {
                let entry = loop {
                    if let Some(entry) = queue.lock().dequeue() {
                        break entry;
                    }
                    notify.notified().await;
                };

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                in_flight.lock().insert(entry.id.clone(), entry.payload.generation);

                let decoder = decoder.clone();
                let cache = cache.clone();
                let generations = generations.clone();
                let in_flight = in_flight.clone();
                let on_ready = on_ready.clone();
                let on_error = on_error.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let Entry { id, payload, .. } = entry;
                    let work = payload;
                    let _guard = InFlightGuard { id: id.clone(), generation: work.generation, set: in_flight };

                    let source = match (work.bytes)().await {
                        Ok(bytes) => Bytes::from(bytes),
                        Err(err) => {
                            warn!(%id, %err, "failed to read source bytes for derivative");
                            if let Some(callback) = on_error.read().as_ref() {
                                callback(id, err.to_string());
                            }
                            return;
                        }
                    };

                    let rendered = render(decoder.as_ref(), kind, source, work.edit_payload.clone(), target_size_px).await;

                    let still_current = generations.lock().get(&id).copied().unwrap_or(0) == work.generation;
                    if !still_current {
                        debug!(%id, "discarding stale derivative result after invalidate/regenerate");
                        return;
                    }

                    match rendered {
                        Ok(bytes) => {
                            let handle = DerivativeHandle::new(format!("blob://{}/{}", kind.label(), id.as_str()));
                            cache.put(&id, kind, bytes);
                            if let Some(callback) = on_ready.read().as_ref() {
                                callback(id, handle);
                            }
                        }
                        Err(err) => {
                            if let Some(callback) = on_error.read().as_ref() {
                                callback(id, err.to_string());
                            }
                        }
                    }
                });
            }
        });
    }
}

async fn render<D: Decoder + ?Sized>(
    decoder: &D,
    kind: DerivativeKind,
    source: Bytes,
    edit_payload: Option<Bytes>,
    target_size_px: u32,
) -> crate::error::Result<Bytes> {
    match (kind, edit_payload) {
        (DerivativeKind::Thumbnail, Some(edit)) => decoder.render_edited_thumbnail(source, edit, target_size_px).await,
        (DerivativeKind::Thumbnail, None) => decoder.render_thumbnail(source, target_size_px).await,
        (DerivativeKind::Preview, edit) => decoder.render_preview(source, edit, target_size_px).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use parking_lot::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeDecoder {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Decoder for FakeDecoder {
        async fn render_thumbnail(&self, source: Bytes, _target_size: u32) -> crate::error::Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(source)
        }

        async fn render_edited_thumbnail(&self, source: Bytes, _edit: Bytes, _target_size: u32) -> crate::error::Result<Bytes> {
            Ok(source)
        }

        async fn render_preview(&self, source: Bytes, _edit: Option<Bytes>, _target_size: u32) -> crate::error::Result<Bytes> {
            Ok(source)
        }
    }

    fn cache(dir: &std::path::Path) -> Arc<DerivativeCache> {
        Arc::new(
            DerivativeCache::open(CacheConfig {
                memory_shards: 1,
                memory_capacity: 16,
                persistent_root: dir.to_path_buf(),
            })
            .unwrap(),
        )
    }

    fn producer(payload: &'static [u8]) -> BytesProducer {
        Arc::new(move || Box::pin(async move { Ok(payload.to_vec()) }))
    }

    #[tokio::test]
    async fn request_delivers_ready_callback() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder { calls: AtomicUsize::new(0) });
        let pipeline = DerivativePipeline::new(DerivativeKind::Thumbnail, decoder, cache(dir.path()), 2, 512);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        pipeline.set_on_ready(Some(Arc::new(move |id, _handle| {
            seen_clone.lock().push(id);
        })));

        pipeline.request(AssetId("a1".into()), producer(b"bytes"), Priority::Visible);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_request_never_fires_callback() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder { calls: AtomicUsize::new(0) });
        // Zero concurrency slack: fill the one slot with a slow request so
        // the second stays queued long enough to cancel.
        let pipeline = DerivativePipeline::new(DerivativeKind::Thumbnail, decoder, cache(dir.path()), 1, 512);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        pipeline.set_on_ready(Some(Arc::new(move |id, _h| seen_clone.lock().push(id))));

        pipeline.request(AssetId("busy".into()), producer(b"1"), Priority::Background);
        let id = AssetId("a2".into());
        pipeline.request(id.clone(), producer(b"2"), Priority::Background);
        pipeline.cancel(&id);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!seen.lock().contains(&id));
    }

    #[tokio::test]
    async fn invalidate_bumps_generation_so_stale_result_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder { calls: AtomicUsize::new(0) });
        let pipeline = DerivativePipeline::new(DerivativeKind::Thumbnail, decoder, cache(dir.path()), 1, 512);
        let id = AssetId("a1".into());
        let ready_count = Arc::new(AtomicUsize::new(0));
        let ready_count_clone = ready_count.clone();
        pipeline.set_on_ready(Some(Arc::new(move |_id, _h| {
            ready_count_clone.fetch_add(1, Ordering::SeqCst);
        })));

        pipeline.request(id.clone(), producer(b"slow"), Priority::Visible);
        // Invalidate immediately, before the 5ms fake decode completes.
        pipeline.invalidate(&id);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ready_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn re_request_while_queued_updates_priority_not_payload() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder { calls: AtomicUsize::new(0) });
        // concurrency=1, with the slot held by a busy id so the next two
        // requests stay queued long enough to observe ordering.
        let pipeline = DerivativePipeline::new(DerivativeKind::Thumbnail, decoder, cache(dir.path()), 1, 512);
        let order = Arc::new(StdMutex::new(Vec::new()));
        let order_clone = order.clone();
        pipeline.set_on_ready(Some(Arc::new(move |id, _h| order_clone.lock().push(id))));

        pipeline.request(AssetId("busy".into()), producer(b"busy"), Priority::Background);
        pipeline.request(AssetId("low".into()), producer(b"low"), Priority::Background);
        let target = AssetId("target".into());
        pipeline.request(target.clone(), producer(b"first-producer"), Priority::Background);
        // Re-request at a higher priority: must promote the existing queue
        // entry (and keep its original producer) rather than silently
        // leaving it at Background.
        pipeline.request(target.clone(), producer(b"second-producer"), Priority::Visible);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let order = order.lock();
        let target_pos = order.iter().position(|id| *id == target).unwrap();
        let low_pos = order.iter().position(|id| *id == AssetId("low".into())).unwrap();
        assert!(target_pos < low_pos, "reprioritized id should be serviced before the still-background one");
    }
}
