use std::{net, sync::Arc, time};

use anyhow::Context;
use clap::Parser;
use url::Url;

use crate::tls;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

/// Build a TransportConfig with our standard settings.
fn build_transport_config() -> quinn::TransportConfig {
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(time::Duration::from_secs(10).try_into().unwrap()));
    transport.keep_alive_interval(Some(time::Duration::from_secs(4)));
    transport.mtu_discovery_config(None); // Disable MTU discovery
    transport
}

#[derive(Parser, Clone)]
pub struct Args {
    /// Listen for UDP packets on the given address.
    #[arg(long, default_value = "[::]:0")]
    pub bind: net::SocketAddr,

    #[command(flatten)]
    pub tls: tls::Args,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            bind: "[::]:0".parse().unwrap(),
            tls: Default::default(),
        }
    }
}

impl Args {
    pub fn load(&self) -> anyhow::Result<Config> {
        let tls = self.tls.load()?;
        Ok(Config {
            bind: self.bind,
            tls,
        })
    }
}

pub struct Config {
    pub bind: net::SocketAddr,
    pub tls: tls::Config,
}

pub struct Endpoint {
    pub client: Client,
    pub server: Option<Server>,
}

impl Endpoint {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let transport = Arc::new(build_transport_config());

        let mut server_config = None;

        if let Some(mut config) = config.tls.server {
            config.alpn_protocols = vec![quicrq::ALPN.to_vec()];
            config.key_log = Arc::new(rustls::KeyLogFile::new());

            let config: quinn::crypto::rustls::QuicServerConfig = config.try_into()?;
            let mut config = quinn::ServerConfig::with_crypto(Arc::new(config));
            config.transport_config(transport.clone());

            server_config = Some(config);
        }

        // There's a bit more boilerplate to make a generic endpoint.
        let runtime = quinn::default_runtime().context("no async runtime")?;
        let endpoint_config = quinn::EndpointConfig::default();
        let socket = std::net::UdpSocket::bind(config.bind).context("failed to bind UDP socket")?;

        // Create the generic QUIC endpoint.
        let quic = quinn::Endpoint::new(endpoint_config, server_config.clone(), socket, runtime)
            .context("failed to create QUIC endpoint")?;

        let server = server_config.is_some().then(|| Server {
            quic: quic.clone(),
            accept: Default::default(),
        });

        let client = Client {
            quic,
            config: config.tls.client,
            transport,
        };

        Ok(Self { client, server })
    }
}

pub struct Server {
    quic: quinn::Endpoint,
    accept: FuturesUnordered<BoxFuture<'static, anyhow::Result<web_transport::Session>>>,
}

impl Server {
    pub async fn accept(&mut self) -> Option<web_transport::Session> {
        loop {
            tokio::select! {
                res = self.quic.accept() => {
                    let conn = res?;
                    self.accept.push(Self::accept_session(conn).boxed());
                },
                res = self.accept.next(), if !self.accept.is_empty() => {
                    match res? {
                        Ok(session) => return Some(session),
                        Err(err) => log::warn!("failed to accept QUIC connection: {}", err),
                    }
                }
            }
        }
    }

    async fn accept_session(conn: quinn::Incoming) -> anyhow::Result<web_transport::Session> {
        let mut conn = conn.accept()?;

        let handshake = conn
            .handshake_data()
            .await?
            .downcast::<quinn::crypto::rustls::HandshakeData>()
            .unwrap();

        let alpn = handshake.protocol.context("missing ALPN")?;
        anyhow::ensure!(
            alpn == quicrq::ALPN,
            "unsupported ALPN: {}",
            String::from_utf8_lossy(&alpn)
        );

        // Wait for the QUIC connection to be established.
        let conn = conn.await.context("failed to establish QUIC connection")?;

        log::debug!(
            "established QUIC connection: ip={} id={}",
            conn.remote_address(),
            conn.stable_id(),
        );

        let session: web_transport_quinn::Session = conn.into();
        Ok(session.into())
    }

    pub fn local_addr(&self) -> anyhow::Result<net::SocketAddr> {
        self.quic.local_addr().context("failed to get local address")
    }
}

#[derive(Clone)]
pub struct Client {
    quic: quinn::Endpoint,
    config: rustls::ClientConfig,
    transport: Arc<quinn::TransportConfig>,
}

impl Client {
    pub async fn connect(&self, url: &Url) -> anyhow::Result<web_transport::Session> {
        let mut config = self.config.clone();
        config.alpn_protocols = vec![quicrq::ALPN.to_vec()];
        config.key_log = Arc::new(rustls::KeyLogFile::new());

        let config: quinn::crypto::rustls::QuicClientConfig = config.try_into()?;
        let mut config = quinn::ClientConfig::new(Arc::new(config));
        config.transport_config(self.transport.clone());

        let host = url.host().context("invalid DNS name")?.to_string();
        let port = url.port().unwrap_or(443);

        // Look up the DNS entry.
        let addr = tokio::net::lookup_host((host.clone(), port))
            .await
            .context("failed DNS lookup")?
            .next()
            .context("no DNS entries")?;

        let conn = self.quic.connect_with(config, addr, &host)?.await?;

        let session: web_transport_quinn::Session = conn.into();
        Ok(session.into())
    }
}
