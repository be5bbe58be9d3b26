//! The node-wide registry of published media.
//!
//! A [MediaSource] is the pull side of a publisher: the registry pump
//! drains it, carves the pulled bytes into (group, object, offset)
//! fragments, and inserts them into a fresh cache entry. Relays that
//! already receive fragmented data skip the pump and write through
//! [MediaSources::publish_cache] directly.
//!
//! Publishing wakes anybody blocked in [MediaSources::wait_for], which is
//! what drives SUBSCRIBE/NOTIFY signalling at the session layer.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use crate::clock::Clock;
use crate::coding::Url;
use crate::message::{EvictionPolicy, TransportMode};
use crate::watch::State;

use super::{CacheReader, CacheWriter, CachedFragment, FetchQueue, MediaCache, ServeError};

/// One pull from a media source.
pub enum Pull {
    /// The next fragment of the current object.
    Data {
        payload: Bytes,
        /// This object opens a new group.
        is_new_group: bool,
        /// This payload ends the object.
        is_last_fragment: bool,
    },

    /// Nothing to send yet; poll again at the given time (microseconds), or
    /// shortly if unknown.
    Blocked { until: Option<u64> },

    /// The media is over.
    Finished,
}

/// The pull side of a publisher. Dropped when the publication ends.
pub trait MediaSource: Send + 'static {
    /// Produce up to `max_len` bytes of the next fragment.
    fn pull(&mut self, now: u64, max_len: usize) -> Result<Pull, ServeError>;
}

#[derive(Default)]
struct SourcesState {
    routes: HashMap<Url, CacheReader>,

    // Pinged when a requested URL is not published here; a relay uses it to
    // open an upstream subscription on demand.
    fetch: Option<FetchQueue>,
}

/// Node-wide mapping of URL to published media.
#[derive(Clone, Default)]
pub struct MediaSources {
    state: State<SourcesState>,
}

impl MediaSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache entry fed directly by the caller; used by relays
    /// bridging fragments that arrive from upstream.
    pub fn publish_cache(
        &self,
        url: Url,
        policy: EvictionPolicy,
    ) -> Result<(CacheWriter, Publication), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;
        if state.routes.contains_key(&url) {
            return Err(ServeError::Duplicate);
        }

        let (mut writer, reader) = MediaCache::new(url.clone()).produce();
        writer.set_policy(policy)?;
        state.routes.insert(url.clone(), reader);

        Ok((
            writer.clone(),
            Publication {
                sources: self.clone(),
                url,
                writer: Some(writer),
                task: None,
            },
        ))
    }

    /// Register a source and spawn the pump that drains it into a cache
    /// entry. The returned guard unpublishes on drop.
    pub fn publish<S: MediaSource>(
        &self,
        url: Url,
        source: S,
        clock: Clock,
        policy: EvictionPolicy,
    ) -> Result<Publication, ServeError> {
        let (writer, mut publication) = self.publish_cache(url.clone(), policy)?;

        publication.task = Some(tokio::spawn(async move {
            if let Err(err) = pump(source, writer.clone(), clock).await {
                log::warn!("media source failed: url={} err={}", url, err);
                writer.close(err).ok();
            }
        }));

        Ok(publication)
    }

    pub fn route(&self, url: &Url) -> Option<CacheReader> {
        self.state.lock().routes.get(url).cloned()
    }

    /// Install the on-miss fetch hook.
    pub fn set_fetch(&self, hook: FetchQueue) {
        if let Some(mut state) = self.state.lock_mut() {
            state.fetch = Some(hook);
        }
    }

    /// Resolve a URL for an incoming request: an existing route, a fetch
    /// through the on-miss hook, or (when `wait` is set) a future publish.
    pub async fn resolve(
        &self,
        url: &Url,
        transport_mode: TransportMode,
        wait: bool,
    ) -> Result<CacheReader, ServeError> {
        let fetching = {
            let state = self.state.lock();
            if let Some(reader) = state.routes.get(url) {
                return Ok(reader.clone());
            }
            match &state.fetch {
                Some(hook) => hook
                    .clone()
                    .request(url.clone(), transport_mode)
                    .is_ok(),
                None => false,
            }
        };

        if fetching || wait {
            self.wait_for(url).await
        } else {
            Err(ServeError::NotFound)
        }
    }

    /// Wait until the URL is published somewhere on this node.
    pub async fn wait_for(&self, url: &Url) -> Result<CacheReader, ServeError> {
        loop {
            {
                let state = self.state.lock();
                if let Some(reader) = state.routes.get(url) {
                    return Ok(reader.clone());
                }
                match state.modified() {
                    Some(notify) => notify,
                    None => return Err(ServeError::Cancel),
                }
            }
            .await;
        }
    }
}

/// Keeps a publication alive; dropping it unpublishes the URL and releases
/// the cache entry once the remaining subscribers drain.
pub struct Publication {
    sources: MediaSources,
    url: Url,

    // Keepalive of the cache write half so late subscribers can attach.
    writer: Option<CacheWriter>,

    task: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for Publication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publication").field("url", &self.url).finish()
    }
}

impl Publication {
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Drop for Publication {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.writer.take();
        if let Some(mut state) = self.sources.state.lock_mut() {
            state.routes.remove(&self.url);
        }
    }
}

// Largest fragment the pump produces; sized so a fragment still fits a
// datagram after its header.
const PUMP_FRAGMENT_MAX: usize = 1120;

async fn pump<S: MediaSource>(
    mut source: S,
    mut writer: CacheWriter,
    clock: Clock,
) -> Result<(), ServeError> {
    let mut group_id: u64 = 0;
    let mut object_id: u64 = 0;
    let mut offset: u64 = 0;
    let mut prev_count: u64 = 0;
    let mut started = false;

    loop {
        let now = clock.now();
        match source.pull(now, PUMP_FRAGMENT_MAX)? {
            Pull::Data {
                payload,
                is_new_group,
                is_last_fragment,
            } => {
                // The first fragment of an object may open a new group.
                if offset == 0 && is_new_group && started {
                    prev_count = object_id;
                    group_id += 1;
                    object_id = 0;
                }

                let nb_objects_previous_group = match object_id == 0 && offset == 0 && group_id > 0
                {
                    true => prev_count,
                    false => 0,
                };

                let len = payload.len() as u64;
                writer.insert(CachedFragment {
                    group_id,
                    object_id,
                    offset,
                    is_last_fragment,
                    nb_objects_previous_group,
                    queue_delay: 0,
                    flags: 0,
                    payload,
                })?;
                started = true;

                if is_last_fragment {
                    object_id += 1;
                    offset = 0;
                } else {
                    offset += len;
                }
            }
            Pull::Blocked { until } => {
                let wait = match until {
                    Some(at) => Duration::from_micros(at.saturating_sub(now).max(1_000)),
                    None => Duration::from_millis(1),
                };
                tokio::time::sleep(wait).await;
            }
            Pull::Finished => {
                writer.set_final(group_id, object_id)?;
                return Ok(());
            }
        }
    }
}
