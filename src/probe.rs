//! Single-site, single-family HTTP reachability probe.
//!
//! A probe resolves the target host, keeps only addresses of the requested
//! family, opens a fresh TCP (and, for `https`, TLS) connection and reads the
//! response head of a plain `GET`. There is never a fallback to the other
//! family and no connection is reused between probes.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{self, Instant};
use tokio_native_tls::TlsConnector;
use tracing::debug;
use url::{Host, Url};

use crate::error::ProbeError;
use crate::types::{Family, ProbeOutcome, Target};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_REDIRECTS: u8 = 3;

/// Upper bound on the status line plus headers we are willing to buffer.
const MAX_HEAD_BYTES: usize = 16 * 1024;
const USER_AGENT: &str = concat!("v6probe/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Bounds the whole attempt, redirects included.
    pub timeout: Duration,
    pub max_redirects: u8,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// One connectivity attempt against one target over one family.
///
/// Implementations must never panic on network failure: every failure is
/// reported through [`ProbeOutcome::failed`].
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, target: &Target, family: Family) -> ProbeOutcome;
}

/// Status line and the only header we act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub location: Option<String>,
}

/// HTTP(S) prober over family-restricted TCP connections.
#[derive(Clone)]
pub struct HttpProber {
    config: ProbeConfig,
    tls: TlsConnector,
}

impl HttpProber {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let tls = native_tls::TlsConnector::new()?;
        Ok(Self {
            config,
            tls: TlsConnector::from(tls),
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe `target` over `family`, bounded by the configured timeout.
    ///
    /// Latency runs from the start of the first connection to receipt of the
    /// final response head.
    pub async fn probe_site(&self, target: &Target, family: Family) -> ProbeOutcome {
        let start = Instant::now();
        match time::timeout(self.config.timeout, self.fetch(&target.url, family, start)).await {
            Ok(Ok(latency)) => ProbeOutcome::succeeded(family, latency),
            Ok(Err(e)) => ProbeOutcome::failed(family, e.to_string()),
            Err(_) => ProbeOutcome::failed(family, ProbeError::Timeout.to_string()),
        }
    }

    async fn fetch(&self, raw_url: &str, family: Family, start: Instant) -> Result<Duration, ProbeError> {
        let mut url = Url::parse(raw_url)?;
        let mut redirects = 0u8;
        loop {
            let head = self.request_head(&url, family).await?;
            let latency = start.elapsed();
            match head.status {
                200..=299 => return Ok(latency),
                300..=399 => match head.location {
                    None => return Ok(latency),
                    Some(_) if redirects >= self.config.max_redirects => {
                        return Err(ProbeError::TooManyRedirects)
                    }
                    Some(location) => {
                        let next = url.join(&location)?;
                        debug!(from = %url, to = %next, status = head.status, "following redirect");
                        url = next;
                        redirects += 1;
                    }
                },
                code => return Err(ProbeError::HttpStatus(code)),
            }
        }
    }

    async fn request_head(&self, url: &Url, family: Family) -> Result<ResponseHead, ProbeError> {
        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(ProbeError::UnsupportedScheme(other.to_string())),
        };
        let port = url.port_or_known_default().ok_or(ProbeError::MissingHost)?;

        let (candidates, server_name) = match url.host() {
            Some(Host::Domain(domain)) => (resolve(domain, port).await?, domain.to_string()),
            Some(Host::Ipv4(ip)) => (vec![SocketAddr::new(ip.into(), port)], ip.to_string()),
            Some(Host::Ipv6(ip)) => (vec![SocketAddr::new(ip.into(), port)], ip.to_string()),
            None => return Err(ProbeError::MissingHost),
        };
        let addrs: Vec<SocketAddr> = candidates
            .into_iter()
            .filter(|a| family.matches(&a.ip()))
            .collect();
        if addrs.is_empty() {
            return Err(ProbeError::NoAddress(family));
        }

        let stream = connect_any(&addrs).await?;
        let request = build_request(url);
        if secure {
            let mut tls = self.tls.connect(&server_name, stream).await?;
            exchange(&mut tls, request.as_bytes()).await
        } else {
            let mut stream = stream;
            exchange(&mut stream, request.as_bytes()).await
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &Target, family: Family) -> ProbeOutcome {
        self.probe_site(target, family).await
    }
}

async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ProbeError> {
    let addrs = lookup_host((host, port)).await.map_err(ProbeError::Resolve)?;
    Ok(addrs.collect())
}

/// Try each address in resolver order and keep the first that connects.
async fn connect_any(addrs: &[SocketAddr]) -> Result<TcpStream, ProbeError> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(ProbeError::Connect(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address to connect to")
    })))
}

fn build_request(url: &Url) -> String {
    let mut path = url.path().to_string();
    if let Some(q) = url.query() {
        path.push('?');
        path.push_str(q);
    }
    let host = url.host_str().unwrap_or_default();
    let host = match url.port() {
        Some(p) => format!("{host}:{p}"),
        None => host.to_string(),
    };
    format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nAccept: */*\r\nConnection: close\r\n\r\n"
    )
}

/// Send the request and read until the end of the final response head.
///
/// Interim `1xx` heads (`100 Continue`, `103 Early Hints`) are skipped;
/// `101 Switching Protocols` is final.
async fn exchange<S>(stream: &mut S, request: &[u8]) -> Result<ResponseHead, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request).await?;
    stream.flush().await?;

    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        while let Some(end) = find_head_end(&buf) {
            let head = parse_head(&buf[..end])?;
            if !is_interim(head.status) {
                return Ok(head);
            }
            debug!(status = head.status, "skipping interim response");
            buf.drain(..end + 4);
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(ProbeError::MalformedResponse);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            // Peer closed before a blank line; accept a head that at least has a status line.
            return parse_head(&buf);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn is_interim(status: u16) -> bool {
    (100..=199).contains(&status) && status != 101
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse `HTTP/1.x NNN reason` plus headers, keeping only `Location`.
pub fn parse_head(bytes: &[u8]) -> Result<ResponseHead, ProbeError> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines = text.lines();
    let status_line = lines.next().ok_or(ProbeError::MalformedResponse)?;

    let mut parts = status_line.split_whitespace();
    let version = parts.next().ok_or(ProbeError::MalformedResponse)?;
    if !version.starts_with("HTTP/") {
        return Err(ProbeError::MalformedResponse);
    }
    let status = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .filter(|c| (100..=999).contains(c))
        .ok_or(ProbeError::MalformedResponse)?;

    let location = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("location"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty());

    Ok(ResponseHead { status, location })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Loopback server answering every connection with `respond(request_path)`.
    async fn serve<F>(respond: F) -> SocketAddr
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let respond = Arc::new(respond);
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let respond = respond.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    let req = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = req.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let _ = sock.write_all(respond(&path).as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        addr
    }

    fn prober(timeout_ms: u64) -> HttpProber {
        HttpProber::new(ProbeConfig {
            timeout: Duration::from_millis(timeout_ms),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        })
        .unwrap()
    }

    fn target(addr: SocketAddr, path: &str) -> Target {
        Target::new("local", format!("http://{addr}{path}"))
    }

    #[tokio::test]
    async fn ok_status_succeeds_with_latency() {
        let addr = serve(|_| "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".into()).await;
        let out = prober(2000).probe_site(&target(addr, "/"), Family::V4).await;
        assert!(out.success, "{:?}", out.error);
        assert!(out.latency.is_some());
        assert_eq!(out.family, Family::V4);
    }

    #[tokio::test]
    async fn ipv6_probe_never_uses_ipv4_address() {
        let addr = serve(|_| "HTTP/1.1 200 OK\r\n\r\n".into()).await;
        let p = prober(2000);
        let t = target(addr, "/");
        let v6 = p.probe_site(&t, Family::V6).await;
        let v4 = p.probe_site(&t, Family::V4).await;
        assert!(!v6.success);
        assert_eq!(v6.error.as_deref(), Some("no IPv6 address for host"));
        assert!(v4.success);
    }

    #[tokio::test]
    async fn server_error_is_failure() {
        let addr = serve(|_| "HTTP/1.1 503 Service Unavailable\r\n\r\n".into()).await;
        let out = prober(2000).probe_site(&target(addr, "/"), Family::V4).await;
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("HTTP status 503"));
        assert!(out.latency.is_none());
    }

    #[tokio::test]
    async fn relative_redirects_are_followed() {
        let addr = serve(|path| match path {
            "/start" => "HTTP/1.1 301 Moved\r\nLocation: /next\r\n\r\n".into(),
            "/next" => "HTTP/1.1 302 Found\r\nlocation: /done\r\n\r\n".into(),
            _ => "HTTP/1.1 204 No Content\r\n\r\n".into(),
        })
        .await;
        let out = prober(2000).probe_site(&target(addr, "/start"), Family::V4).await;
        assert!(out.success, "{:?}", out.error);
    }

    #[tokio::test]
    async fn interim_heads_are_skipped() {
        let addr = serve(|_| {
            "HTTP/1.1 100 Continue\r\n\r\n\
             HTTP/1.1 103 Early Hints\r\nLink: </style.css>; rel=preload\r\n\r\n\
             HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"
                .into()
        })
        .await;
        let out = prober(2000).probe_site(&target(addr, "/"), Family::V4).await;
        assert!(out.success, "{:?}", out.error);
    }

    #[tokio::test]
    async fn interim_head_then_error_is_failure() {
        let addr = serve(|_| {
            "HTTP/1.1 103 Early Hints\r\n\r\nHTTP/1.1 500 Internal Server Error\r\n\r\n".into()
        })
        .await;
        let out = prober(2000).probe_site(&target(addr, "/"), Family::V4).await;
        assert_eq!(out.error.as_deref(), Some("HTTP status 500"));
    }

    #[tokio::test]
    async fn ipv6_loopback_succeeds_over_ipv6_only() {
        // Hosts without IPv6 loopback cannot run this.
        let Ok(listener) = TcpListener::bind("[::1]:0").await else {
            return;
        };
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let _ = sock.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        let p = prober(2000);
        let t = target(addr, "/");
        assert_eq!(t.url, format!("http://[::1]:{}/", addr.port()));
        let v6 = p.probe_site(&t, Family::V6).await;
        assert!(v6.success, "{:?}", v6.error);
        assert_eq!(v6.family, Family::V6);
        let v4 = p.probe_site(&t, Family::V4).await;
        assert_eq!(v4.error.as_deref(), Some("no IPv4 address for host"));
    }

    #[test]
    fn only_informational_non_upgrade_heads_are_interim() {
        assert!(is_interim(100));
        assert!(is_interim(103));
        assert!(!is_interim(101));
        assert!(!is_interim(200));
    }

    #[tokio::test]
    async fn redirect_loop_is_capped() {
        let addr = serve(|_| "HTTP/1.1 302 Found\r\nLocation: /again\r\n\r\n".into()).await;
        let out = prober(2000).probe_site(&target(addr, "/"), Family::V4).await;
        assert_eq!(out.error.as_deref(), Some("too many redirects"));
    }

    #[tokio::test]
    async fn redirect_without_location_counts_as_success() {
        let addr = serve(|_| "HTTP/1.1 304 Not Modified\r\n\r\n".into()).await;
        let out = prober(2000).probe_site(&target(addr, "/"), Family::V4).await;
        assert!(out.success);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });
        let out = prober(150).probe_site(&target(addr, "/"), Family::V4).await;
        assert_eq!(out.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn refused_connection_is_failure() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let out = prober(2000).probe_site(&target(addr, "/"), Family::V4).await;
        assert!(!out.success);
        assert!(out.error.unwrap().starts_with("connect failed"));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_failure() {
        let t = Target::new("ftp", "ftp://127.0.0.1/");
        let out = prober(500).probe_site(&t, Family::V4).await;
        assert_eq!(out.error.as_deref(), Some("unsupported URL scheme: ftp"));
    }

    #[test]
    fn parse_head_reads_status_and_location() {
        let head = parse_head(b"HTTP/1.1 301 Moved Permanently\r\nServer: x\r\nLOCATION:  https://example.com/ \r\n").unwrap();
        assert_eq!(head.status, 301);
        assert_eq!(head.location.as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn parse_head_rejects_garbage() {
        assert!(parse_head(b"").is_err());
        assert!(parse_head(b"SSH-2.0-OpenSSH_9.6\r\n").is_err());
        assert!(parse_head(b"HTTP/1.1 abc\r\n").is_err());
    }

    #[test]
    fn request_carries_host_port_and_query() {
        let url = Url::parse("http://example.com:8080/a/b?x=1").unwrap();
        let req = build_request(&url);
        assert!(req.starts_with("GET /a/b?x=1 HTTP/1.1\r\n"));
        assert!(req.contains("\r\nHost: example.com:8080\r\n"));
        assert!(req.contains("\r\nConnection: close\r\n"));
        assert!(req.ends_with("\r\n\r\n"));

        let url = Url::parse("https://example.com").unwrap();
        assert!(build_request(&url).contains("\r\nHost: example.com\r\n"));
    }
}
