//! Remote template fetching.
//!
//! Every address a remote template is fetched from passes through an
//! [`AddressValidator`]: hostnames via a validating DNS resolver, IP-literal
//! hosts and redirect targets before the request is made.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{Client, Url, header, redirect};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SourceError, StackplateError};

use super::kind::Encoding;

/// Message returned when an address is rejected by policy.
pub const BLOCKED_HOST: &str = "no such host";

/// Default fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Decides whether a resolved address may be contacted.
pub trait AddressValidator: Send + Sync + fmt::Debug {
    /// Returns true if `addr` may be contacted.
    fn allows(&self, addr: IpAddr) -> bool;
}

/// Allows every address.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassValidator;

impl AddressValidator for PassValidator {
    fn allows(&self, _addr: IpAddr) -> bool {
        true
    }
}

/// Rejects every address that is not globally routable unicast: loopback,
/// private, link-local, unspecified, CGNAT, multicast, documentation,
/// benchmarking, reserved and unique-local ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivateIpValidator;

impl PrivateIpValidator {
    const fn allows_v4(ip: Ipv4Addr) -> bool {
        let [a, b, ..] = ip.octets();
        let this_network = a == 0;
        let cgnat = a == 100 && (b & 0b1100_0000) == 64;
        let benchmarking = a == 198 && (b & 0xfe) == 18;
        let reserved = a >= 240;
        !(ip.is_loopback()
            || ip.is_private()
            || ip.is_link_local()
            || ip.is_unspecified()
            || ip.is_broadcast()
            || ip.is_multicast()
            || ip.is_documentation()
            || this_network
            || cgnat
            || benchmarking
            || reserved)
    }

    fn allows_v6(ip: Ipv6Addr) -> bool {
        if let Some(v4) = ip.to_ipv4_mapped() {
            return Self::allows_v4(v4);
        }
        let segments = ip.segments();
        // IPv4-compatible ::a.b.c.d
        if segments[..6].iter().all(|s| *s == 0) {
            let [.., hi, lo] = segments;
            let [a, b] = hi.to_be_bytes();
            let [c, d] = lo.to_be_bytes();
            return Self::allows_v4(Ipv4Addr::new(a, b, c, d));
        }
        let first = segments[0];
        let unique_local = (first & 0xfe00) == 0xfc00;
        let link_local = (first & 0xffc0) == 0xfe80;
        let documentation = first == 0x2001 && segments[1] == 0x0db8;
        !(ip.is_multicast() || unique_local || link_local || documentation)
    }
}

impl AddressValidator for PrivateIpValidator {
    fn allows(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(ip) => Self::allows_v4(ip),
            IpAddr::V6(ip) => Self::allows_v6(ip),
        }
    }
}

/// DNS resolver that drops addresses the validator rejects.
#[derive(Debug, Clone)]
struct ValidatingResolver {
    validator: Arc<dyn AddressValidator>,
}

impl Resolve for ValidatingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_allowed(
            Arc::clone(&self.validator),
            name.as_str().to_string(),
        ))
    }
}

async fn resolve_allowed(
    validator: Arc<dyn AddressValidator>,
    host: String,
) -> std::result::Result<Addrs, Box<dyn StdError + Send + Sync>> {
    let resolved = tokio::net::lookup_host((host.as_str(), 0)).await?;
    let allowed: Vec<SocketAddr> = resolved.filter(|a| validator.allows(a.ip())).collect();
    if allowed.is_empty() {
        debug!(host = %host, "all resolved addresses rejected");
        return Err(Box::new(io::Error::new(io::ErrorKind::NotFound, BLOCKED_HOST)));
    }
    Ok(Box::new(allowed.into_iter()))
}

/// Checks an IP-literal host against the validator. Hostnames pass through to
/// the resolver.
fn check_literal_host(url: &Url, validator: &dyn AddressValidator) -> std::result::Result<(), String> {
    let Some(host) = url.host_str() else {
        return Err(String::from("url has no host"));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(ip) if !validator.allows(ip) => Err(format!("lookup {host}: {BLOCKED_HOST}")),
        _ => Ok(()),
    }
}

/// Flattens an error and its sources into one line.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// A fetched remote template.
#[derive(Debug, Clone)]
pub struct RemoteTemplate {
    /// URL the template was fetched from.
    pub url: String,
    /// Raw body.
    pub bytes: Vec<u8>,
    /// Resolved encoding.
    pub encoding: Encoding,
}

/// Fetches templates over HTTP(S) under an address policy.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: Client,
    validator: Arc<dyn AddressValidator>,
}

impl RemoteFetcher {
    /// Creates a fetcher with the given policy and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(validator: Arc<dyn AddressValidator>, timeout: Duration) -> Result<Self> {
        let redirect_validator = Arc::clone(&validator);
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= 10 {
                return attempt.error("too many redirects");
            }
            match check_literal_host(attempt.url(), redirect_validator.as_ref()) {
                Ok(()) => attempt.follow(),
                Err(message) => attempt.error(message),
            }
        });

        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .redirect(policy)
            .dns_resolver(Arc::new(ValidatingResolver {
                validator: Arc::clone(&validator),
            }))
            .build()
            .map_err(|e| StackplateError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, validator })
    }

    /// Creates a fetcher with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_validator(validator: Arc<dyn AddressValidator>) -> Result<Self> {
        Self::new(validator, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    /// Fetches `url`, racing `cancel`.
    ///
    /// The encoding is the explicit `content_type` if it maps to one, else
    /// the URL suffix, else the response content type, else JSON.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Remote` for any fetch failure and
    /// `StackplateError::Cancelled` if the token fires first.
    pub async fn fetch(
        &self,
        url: &str,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RemoteTemplate> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StackplateError::Cancelled),
            result = self.fetch_once(url, content_type) => result.map_err(StackplateError::from),
        }
    }

    async fn fetch_once(
        &self,
        raw_url: &str,
        content_type: Option<&str>,
    ) -> std::result::Result<RemoteTemplate, SourceError> {
        let url = Url::parse(raw_url)
            .map_err(|e| SourceError::remote(raw_url, format!("invalid url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::remote(
                raw_url,
                format!("unsupported scheme \"{}\"", url.scheme()),
            ));
        }
        check_literal_host(&url, self.validator.as_ref())
            .map_err(|message| SourceError::remote(raw_url, message))?;

        info!(url = %url, "fetching remote template");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::remote(raw_url, error_chain(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::remote(
                raw_url,
                format!("unexpected response status {status}"),
            ));
        }

        let header_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::remote(raw_url, error_chain(&e)))?;

        let encoding = content_type
            .and_then(Encoding::from_content_type)
            .or_else(|| Encoding::from_suffix(url.path()))
            .or_else(|| header_type.as_deref().and_then(Encoding::from_content_type))
            .unwrap_or_default();

        debug!(url = %url, bytes = bytes.len(), encoding = %encoding, "fetched remote template");

        Ok(RemoteTemplate {
            url: raw_url.to_string(),
            bytes: bytes.to_vec(),
            encoding,
        })
    }
}
