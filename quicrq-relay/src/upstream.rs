use std::collections::{HashMap, HashSet};

use futures::{stream::FuturesUnordered, StreamExt};
use url::Url;

use quicrq::clock::Clock;
use quicrq::message::{EvictionPolicy, Intent, TransportMode};
use quicrq::serve::{FetchQueue, MediaSources};
use quicrq::session::{self, CacheBridge, Session, SessionError, Subscriber};
use quicrq_native::quic;

/// Opens at most one upstream subscription per URL, bridging everything it
/// receives into the local caches so any number of downstream subscribers
/// share it.
pub struct Upstream {
    client: quic::Client,
    url: Url,
    sources: MediaSources,
    policies: HashMap<quicrq::coding::Url, EvictionPolicy>,
    config: session::Config,
    clock: Clock,

    requests: FetchQueue,
    hook: FetchQueue,
}

impl Upstream {
    pub fn new(
        client: quic::Client,
        url: Url,
        sources: MediaSources,
        policies: HashMap<quicrq::coding::Url, EvictionPolicy>,
        config: session::Config,
        clock: Clock,
    ) -> Self {
        let (hook, requests) = FetchQueue::default().split();

        Self {
            client,
            url,
            sources,
            policies,
            config,
            clock,
            requests,
            hook,
        }
    }

    /// The requesting half installed as the sources' on-miss fetch hook.
    pub fn hook(&self) -> FetchQueue {
        self.hook.clone()
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        // The next hop is dialed lazily, on the first miss.
        let mut subscriber: Option<Subscriber> = None;
        let mut active: HashSet<quicrq::coding::Url> = HashSet::new();
        let mut tasks = FuturesUnordered::new();

        loop {
            tokio::select! {
                req = self.requests.next() => {
                    let Some((media, transport_mode)) = req else { return Ok(()) };

                    // One upstream subscription per URL; concurrent
                    // downstream requests share it.
                    if active.contains(&media) {
                        continue;
                    }

                    let sub = match &subscriber {
                        Some(sub) => sub.clone(),
                        None => {
                            let conn = match self.client.connect(&self.url).await {
                                Ok(conn) => conn,
                                Err(err) => {
                                    log::warn!("failed to reach upstream {}: {}", self.url, err);
                                    continue;
                                }
                            };

                            let (session, _publisher, sub) = Session::connect(
                                conn,
                                self.sources.clone(),
                                self.config.clone(),
                                self.clock.clone(),
                            );
                            tokio::spawn(async move {
                                if let Err(err) = session.run().await {
                                    log::warn!("upstream session closed: {}", err);
                                }
                            });

                            subscriber = Some(sub.clone());
                            sub
                        }
                    };

                    let policy = self.policies.get(&media).copied().unwrap_or_default();
                    let (writer, publication) =
                        match self.sources.publish_cache(media.clone(), policy) {
                            Ok(entry) => entry,
                            // Lost a race with a local publish; nothing to do.
                            Err(_) => continue,
                        };

                    active.insert(media.clone());
                    let bridge = CacheBridge::new(writer, Some(publication));
                    let mut sub = sub;
                    let task_url = media.clone();

                    tasks.push(async move {
                        let res = match transport_mode {
                            TransportMode::SingleStream => {
                                sub.subscribe_stream(task_url.clone(), Intent::CurrentGroup, bridge).await
                            }
                            TransportMode::Datagram => {
                                sub.subscribe_datagram(task_url.clone(), Intent::CurrentGroup, bridge).await
                            }
                        };
                        (task_url, res)
                    });
                },

                res = tasks.next(), if !tasks.is_empty() => {
                    if let Some((media, res)) = res {
                        active.remove(&media);
                        if let Err(err) = res {
                            log::warn!("upstream subscription ended: url={} err={}", media, err);
                            // Force a fresh connection on the next miss.
                            if matches!(err, SessionError::Session(_) | SessionError::Write(_) | SessionError::Read(_)) {
                                subscriber = None;
                            }
                        }
                    }
                },
            }
        }
    }
}
