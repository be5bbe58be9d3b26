//! Per-connection protocol machinery.
//!
//! A [Session] owns one QUIC connection. Incoming bidirectional streams are
//! served by the [Publisher] role (requests, posts, subscribe/notify);
//! outgoing subscriptions and posts go through the [Subscriber] role.
//! Incoming datagrams are demultiplexed by media id. There is no handshake:
//! the ALPN label selects the protocol and both roles exist on every
//! connection.

mod consumer;
mod datagram;
mod error;
mod publisher;
mod reader;
mod repair;
mod stream;
mod subscriber;
mod writer;

pub use consumer::*;
pub use error::*;
pub use publisher::*;
pub use repair::*;
pub use stream::*;
pub use subscriber::*;

use datagram::Dispatcher;
use reader::*;
use writer::*;

use std::sync::Arc;

use futures::{stream::FuturesUnordered, StreamExt};

use crate::clock::Clock;
use crate::coding::Decode;
use crate::data;
use crate::serve::MediaSources;

/// Per-node tuning.
#[derive(Clone, Debug)]
pub struct Config {
    /// Proactively repeat each datagram once.
    pub extra_repeat: bool,

    /// Microseconds between a datagram and its repeat.
    pub extra_repeat_delay: u64,

    /// Microseconds a hole must age before a repair is requested. Stands in
    /// for twice the smoothed RTT, which the transport does not expose.
    pub repair_delay: u64,

    /// Hold requests for unpublished URLs until the URL appears, instead of
    /// failing them.
    pub wait_for_publish: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extra_repeat: false,
            extra_repeat_delay: 10_000,
            repair_delay: 50_000,
            wait_for_publish: false,
        }
    }
}

#[must_use = "run() must be called"]
pub struct Session {
    webtransport: web_transport::Session,
    publisher: Publisher,
    dispatch: Dispatcher,
}

impl Session {
    fn new(
        webtransport: web_transport::Session,
        sources: MediaSources,
        config: Config,
        clock: Clock,
    ) -> (Self, Publisher, Subscriber) {
        let config = Arc::new(config);
        let dispatch = Dispatcher::default();

        let publisher = Publisher::new(
            webtransport.clone(),
            sources,
            dispatch.clone(),
            config.clone(),
            clock.clone(),
        );
        let subscriber = Subscriber::new(webtransport.clone(), dispatch.clone(), config, clock);

        let session = Self {
            webtransport,
            publisher: publisher.clone(),
            dispatch,
        };

        (session, publisher, subscriber)
    }

    /// Wrap a freshly dialed connection.
    pub fn connect(
        webtransport: web_transport::Session,
        sources: MediaSources,
        config: Config,
        clock: Clock,
    ) -> (Self, Publisher, Subscriber) {
        Self::new(webtransport, sources, config, clock)
    }

    /// Wrap a freshly accepted connection.
    pub fn accept(
        webtransport: web_transport::Session,
        sources: MediaSources,
        config: Config,
        clock: Clock,
    ) -> (Self, Publisher, Subscriber) {
        Self::new(webtransport, sources, config, clock)
    }

    pub async fn run(self) -> Result<(), SessionError> {
        tokio::select! {
            res = Self::run_streams(self.webtransport.clone(), self.publisher) => res,
            res = Self::run_datagrams(self.webtransport, self.dispatch) => res,
        }
    }

    async fn run_streams(
        mut webtransport: web_transport::Session,
        publisher: Publisher,
    ) -> Result<(), SessionError> {
        let mut tasks = FuturesUnordered::new();

        loop {
            tokio::select! {
                res = webtransport.accept_bi() => {
                    let (send, recv) = res?;
                    let publisher = publisher.clone();

                    tasks.push(async move {
                        match publisher.recv_stream(send, recv).await {
                            // A stream error never tears down the
                            // connection, unless it is fatal.
                            Err(err) if err.is_fatal() => Some(err),
                            Err(err) => {
                                log::warn!(
                                    "failed to serve stream: err={} code={:#x}",
                                    err,
                                    err.code()
                                );
                                None
                            }
                            Ok(()) => None,
                        }
                    });
                },
                res = tasks.next(), if !tasks.is_empty() => {
                    if let Some(Some(err)) = res {
                        return Err(err);
                    }
                },
            };
        }
    }

    async fn run_datagrams(
        mut webtransport: web_transport::Session,
        dispatch: Dispatcher,
    ) -> Result<(), SessionError> {
        loop {
            let mut payload = webtransport.recv_datagram().await?;
            match data::Datagram::decode(&mut payload) {
                Ok(datagram) => dispatch.dispatch(datagram),
                Err(err) => log::warn!("malformed datagram: {}", err),
            }
        }
    }
}
