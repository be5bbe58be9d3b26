use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ring::aead;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

#[derive(Parser, Clone, Default)]
pub struct Args {
    /// Use the certificate chain in the provided PEM file.
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Use the private key in the provided PEM file.
    #[arg(long)]
    pub tls_key: Option<PathBuf>,

    /// Validate server certificates against this root store instead of the
    /// system roots.
    #[arg(long)]
    pub tls_root: Option<PathBuf>,

    /// Encrypt session tickets with the 32-byte key in this file, enabling
    /// session resumption across server restarts.
    #[arg(long)]
    pub tls_ticket_key: Option<PathBuf>,

    /// Danger: disable certificate verification, for development only.
    #[arg(long)]
    pub tls_disable_verify: bool,
}

pub struct Config {
    pub client: rustls::ClientConfig,
    pub server: Option<rustls::ServerConfig>,
}

impl Args {
    pub fn load(&self) -> anyhow::Result<Config> {
        let server = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => {
                let chain = load_certs(cert)?;
                let key = load_key(key)?;

                let mut config = rustls::ServerConfig::builder()
                    .with_no_client_auth()
                    .with_single_cert(chain, key)
                    .context("invalid certificate chain or key")?;

                if let Some(path) = &self.tls_ticket_key {
                    config.ticketer = Arc::new(StaticTicketer::load(path)?);
                }

                Some(config)
            }
            (None, None) => None,
            _ => anyhow::bail!("--tls-cert and --tls-key must be provided together"),
        };

        let builder = rustls::ClientConfig::builder();
        let client = if self.tls_disable_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerify))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            match &self.tls_root {
                Some(path) => {
                    for cert in load_certs(path)? {
                        roots.add(cert).context("invalid root certificate")?;
                    }
                }
                None => {
                    for cert in rustls_native_certs::load_native_certs()
                        .context("failed to load native roots")?
                    {
                        roots.add(cert).ok();
                    }
                }
            }

            builder
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        Ok(Config { client, server })
    }
}

fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = io::BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("invalid PEM certificate")?;
    anyhow::ensure!(!certs.is_empty(), "no certificates in {}", path.display());

    Ok(certs)
}

fn load_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = io::BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .context("invalid PEM key")?
        .with_context(|| format!("no private key in {}", path.display()))
}

/// Session-ticket encryption with a caller-provided 32-byte key, so
/// resumption survives restarts and works across a load-balanced fleet.
struct StaticTicketer {
    key: aead::LessSafeKey,
    rng: ring::rand::SystemRandom,
}

impl StaticTicketer {
    const NONCE_LEN: usize = 12;

    fn load(path: &Path) -> anyhow::Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .read_to_end(&mut bytes)?;
        anyhow::ensure!(
            bytes.len() == 32,
            "ticket key must be exactly 32 bytes, got {}",
            bytes.len()
        );

        let key = aead::UnboundKey::new(&aead::CHACHA20_POLY1305, &bytes)
            .map_err(|_| anyhow::anyhow!("invalid ticket key"))?;

        Ok(Self {
            key: aead::LessSafeKey::new(key),
            rng: ring::rand::SystemRandom::new(),
        })
    }
}

impl rustls::server::ProducesTickets for StaticTicketer {
    fn enabled(&self) -> bool {
        true
    }

    fn lifetime(&self) -> u32 {
        43_200 // 12 hours
    }

    fn encrypt(&self, plain: &[u8]) -> Option<Vec<u8>> {
        use ring::rand::SecureRandom;

        let mut nonce = [0u8; Self::NONCE_LEN];
        self.rng.fill(&mut nonce).ok()?;

        let mut data = plain.to_vec();
        self.key
            .seal_in_place_append_tag(
                aead::Nonce::assume_unique_for_key(nonce),
                aead::Aad::empty(),
                &mut data,
            )
            .ok()?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&data);
        Some(out)
    }

    fn decrypt(&self, cipher: &[u8]) -> Option<Vec<u8>> {
        if cipher.len() < Self::NONCE_LEN {
            return None;
        }

        let nonce: [u8; Self::NONCE_LEN] = cipher[..Self::NONCE_LEN].try_into().ok()?;
        let mut data = cipher[Self::NONCE_LEN..].to_vec();

        let plain = self
            .key
            .open_in_place(
                aead::Nonce::assume_unique_for_key(nonce),
                aead::Aad::empty(),
                &mut data,
            )
            .ok()?;

        Some(plain.to_vec())
    }
}

impl fmt::Debug for StaticTicketer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTicketer").finish_non_exhaustive()
    }
}

/// Accepts any certificate. Development only.
#[derive(Debug)]
struct NoVerify;

impl rustls::client::danger::ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
