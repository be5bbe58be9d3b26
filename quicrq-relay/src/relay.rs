use std::collections::HashMap;
use std::net;

use anyhow::Context;
use futures::{stream::FuturesUnordered, StreamExt};
use url::Url;

use quicrq::clock::Clock;
use quicrq::message::EvictionPolicy;
use quicrq::serve::MediaSources;
use quicrq::session::{self, Session};
use quicrq_native::{quic, tls};

use crate::Upstream;

pub struct RelayConfig {
    pub tls: tls::Config,
    pub bind: net::SocketAddr,

    /// Next hop for URLs nobody publishes here.
    pub upstream: Option<Url>,

    /// Per-URL cache policy overrides for bridged media.
    pub policies: HashMap<quicrq::coding::Url, EvictionPolicy>,

    pub session: session::Config,
}

pub struct Relay {
    server: quic::Server,
    sources: MediaSources,
    session: session::Config,
    clock: Clock,
    upstream: Option<Upstream>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let endpoint = quic::Endpoint::new(quic::Config {
            bind: config.bind,
            tls: config.tls,
        })?;
        let server = endpoint.server.context("missing TLS certificate")?;

        let sources = MediaSources::new();
        let clock = Clock::wall();

        let upstream = config.upstream.map(|url| {
            let upstream = Upstream::new(
                endpoint.client.clone(),
                url,
                sources.clone(),
                config.policies.clone(),
                config.session.clone(),
                clock.clone(),
            );
            sources.set_fetch(upstream.hook());
            upstream
        });

        Ok(Self {
            server,
            sources,
            session: config.session,
            clock,
            upstream,
        })
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        log::info!("listening on {}", self.server.local_addr()?);

        if let Some(upstream) = self.upstream.take() {
            tokio::spawn(async move {
                if let Err(err) = upstream.run().await {
                    log::error!("upstream manager failed: {}", err);
                }
            });
        }

        let mut tasks = FuturesUnordered::new();

        loop {
            tokio::select! {
                res = self.server.accept() => {
                    let conn = res.context("endpoint closed")?;

                    let (session, _publisher, _subscriber) = Session::accept(
                        conn,
                        self.sources.clone(),
                        self.session.clone(),
                        self.clock.clone(),
                    );

                    tasks.push(async move {
                        if let Err(err) = session.run().await {
                            log::warn!("session closed: err={} code={:#x}", err, err.code());
                        }
                    });
                },
                _ = tasks.next(), if !tasks.is_empty() => {},
            }
        }
    }
}
