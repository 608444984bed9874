use std::{
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use url::Url;

use crate::{
    backend_readiness::{HealthProbe, ProbeResult},
    http_response,
};

const MIN_TIMEOUT_MS: u64 = 50;

/// Probes the backend health route with a bare `GET` over loopback TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpHealthProbe;

impl HealthProbe for HttpHealthProbe {
    fn probe(&self, url: &Url, timeout: Duration) -> ProbeResult {
        match request_status_code(url, timeout) {
            Ok(status) => ProbeResult::from_status(status),
            Err(reason) => ProbeResult::Unreachable(reason),
        }
    }
}

fn resolve_addrs(url: &Url) -> Result<Vec<SocketAddr>, String> {
    let host = url
        .host_str()
        .ok_or_else(|| format!("url has no host: {url}"))?;
    // `host_str` keeps IPv6 brackets, which `to_socket_addrs` rejects.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port_or_known_default().unwrap_or(80);
    (host, port)
        .to_socket_addrs()
        .map(|addrs| addrs.collect())
        .map_err(|error| format!("failed to resolve {host}:{port}: {error}"))
}

fn connect(url: &Url, timeout: Duration) -> Result<TcpStream, String> {
    let addrs = resolve_addrs(url)?;
    let mut last_error = format!("no addresses for {url}");
    for address in addrs {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => last_error = format!("connect {address}: {error}"),
        }
    }
    Err(last_error)
}

/// True when something accepts TCP connections at the url's origin.
pub fn is_origin_reachable(url: &Url, timeout: Duration) -> bool {
    let timeout = timeout.max(Duration::from_millis(MIN_TIMEOUT_MS));
    connect(url, timeout).is_ok()
}

pub fn request_status_code(url: &Url, timeout: Duration) -> Result<u16, String> {
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme: {}", url.scheme()));
    }
    let timeout = timeout.max(Duration::from_millis(MIN_TIMEOUT_MS));
    let deadline = Instant::now() + timeout;

    let mut stream = connect(url, timeout)?;
    let _ = stream.set_write_timeout(Some(timeout));

    let mut request_target = url.path().to_string();
    if let Some(query) = url.query() {
        request_target.push('?');
        request_target.push_str(query);
    }
    if request_target.is_empty() {
        request_target = "/".to_string();
    }
    let host = url.host_str().unwrap_or("127.0.0.1");
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let request = format!(
        "GET {request_target} HTTP/1.1\r\n\
Host: {host_header}\r\n\
Accept: */*\r\n\
Connection: close\r\n\
\r\n"
    );
    stream
        .write_all(request.as_bytes())
        .map_err(|error| format!("failed to send request: {error}"))?;

    let raw = read_response_head(&mut stream, deadline)?;
    http_response::parse_http_status_code(&raw)
        .ok_or_else(|| "response has no valid HTTP status line".to_string())
}

/// Reads until the header block is complete, the peer closes, or `deadline`
/// passes. The body is never needed.
fn read_response_head(stream: &mut TcpStream, deadline: Instant) -> Result<Vec<u8>, String> {
    let mut response = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err("timed out waiting for response headers".to_string());
        }
        let _ = stream.set_read_timeout(Some(remaining));
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                response.extend_from_slice(&chunk[..read]);
                if http_response::header_end(&response).is_some() {
                    break;
                }
            }
            Err(error) if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err("timed out waiting for response headers".to_string());
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(format!("failed to read response: {error}")),
        }
    }

    if response.is_empty() {
        Err("connection closed without a response".to_string())
    } else {
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{net::TcpListener, thread};

    fn serve_once(reply: &'static [u8]) -> (Url, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let port = listener.local_addr().expect("listener addr").port();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("accept probe");
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf);
            if !reply.is_empty() {
                let _ = socket.write_all(reply);
            }
        });
        let url = Url::parse(&format!("http://127.0.0.1:{port}/api/health")).expect("url");
        (url, handle)
    }

    fn unused_port_url() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe port");
        let port = listener.local_addr().expect("listener addr").port();
        drop(listener);
        Url::parse(&format!("http://127.0.0.1:{port}/api/health")).expect("url")
    }

    #[test]
    fn health_probe_reports_ready_status() {
        let (url, server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        let result = HttpHealthProbe.probe(&url, Duration::from_millis(1_000));
        server.join().expect("server thread");
        assert_eq!(result, ProbeResult::Ready(200));
    }

    #[test]
    fn health_probe_treats_404_as_ready() {
        let (url, server) = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        let result = HttpHealthProbe.probe(&url, Duration::from_millis(1_000));
        server.join().expect("server thread");
        assert_eq!(result, ProbeResult::Ready(404));
    }

    #[test]
    fn health_probe_reports_server_error() {
        let (url, server) =
            serve_once(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n");
        let result = HttpHealthProbe.probe(&url, Duration::from_millis(1_000));
        server.join().expect("server thread");
        assert_eq!(result, ProbeResult::ServerError(503));
    }

    #[test]
    fn refused_connection_is_unreachable() {
        let url = unused_port_url();
        let result = HttpHealthProbe.probe(&url, Duration::from_millis(300));
        assert!(matches!(result, ProbeResult::Unreachable(_)));
        assert!(!is_origin_reachable(&url, Duration::from_millis(300)));
    }

    #[test]
    fn silent_listener_times_out_within_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind silent listener");
        let port = listener.local_addr().expect("listener addr").port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/api/health")).expect("url");

        let started = Instant::now();
        let result = request_status_code(&url, Duration::from_millis(200));
        let elapsed = started.elapsed();
        drop(listener);

        assert!(result.is_err());
        assert!(elapsed < Duration::from_millis(2_000));
    }

    #[test]
    fn non_http_reply_is_not_a_status() {
        let (url, server) = serve_once(b"SSH-2.0-OpenSSH\r\n\r\n");
        let result = request_status_code(&url, Duration::from_millis(1_000));
        server.join().expect("server thread");
        assert!(result.is_err());
    }

    #[test]
    fn https_urls_are_rejected() {
        let url = Url::parse("https://127.0.0.1:8000/api/health").expect("url");
        assert!(request_status_code(&url, Duration::from_millis(100)).is_err());
    }
}
