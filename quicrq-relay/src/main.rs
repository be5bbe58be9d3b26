use clap::Parser;

mod relay;
mod upstream;

pub use relay::*;
pub use upstream::*;

use std::collections::HashMap;
use std::net;

use quicrq::message::EvictionPolicy;
use url::Url;

#[derive(Parser, Clone)]
pub struct Cli {
    /// Listen on this address
    #[arg(long, default_value = "[::]:443")]
    pub bind: net::SocketAddr,

    /// The TLS configuration.
    #[command(flatten)]
    pub tls: quicrq_native::tls::Args,

    /// Fetch unknown URLs through this next-hop relay or origin.
    #[arg(long)]
    pub upstream: Option<Url>,

    /// Per-URL cache policy override, as media-url=retain or media-url=drop.
    #[arg(long = "cache-policy", value_parser = parse_policy)]
    pub cache_policy: Vec<(String, EvictionPolicy)>,

    /// Proactively repeat each datagram once.
    #[arg(long)]
    pub extra_repeat: bool,

    /// Microseconds between a datagram and its proactive repeat.
    #[arg(long, default_value = "10000")]
    pub extra_repeat_delay: u64,

    /// Microseconds a reception hole must age before repair is requested.
    #[arg(long, default_value = "50000")]
    pub repair_delay: u64,

    /// Hold requests for unknown URLs until a publisher appears, instead of
    /// failing them.
    #[arg(long)]
    pub wait_notify: bool,
}

fn parse_policy(arg: &str) -> Result<(String, EvictionPolicy), String> {
    let (url, policy) = arg
        .split_once('=')
        .ok_or("expected media-url=retain|drop")?;

    let policy = match policy {
        "retain" => EvictionPolicy::Retain,
        "drop" => EvictionPolicy::Drop,
        other => return Err(format!("unknown cache policy: {}", other)),
    };

    Ok((url.to_string(), policy))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Disable tracing so we don't get a bunch of Quinn spam.
    let tracer = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(tracer).unwrap();

    let cli = Cli::parse();
    let tls = cli.tls.load()?;

    if tls.server.is_none() {
        anyhow::bail!("missing TLS certificates");
    }

    let policies: HashMap<quicrq::coding::Url, EvictionPolicy> = cli
        .cache_policy
        .iter()
        .map(|(url, policy)| (quicrq::coding::Url::from(url.as_str()), *policy))
        .collect();

    let relay = Relay::new(RelayConfig {
        tls,
        bind: cli.bind,
        upstream: cli.upstream,
        policies,
        session: quicrq::session::Config {
            extra_repeat: cli.extra_repeat,
            extra_repeat_delay: cli.extra_repeat_delay,
            repair_delay: cli.repair_delay,
            wait_for_publish: cli.wait_notify,
        },
    })?;

    relay.run().await
}
