//! TCP connect probing

use futures::stream::{self, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Port range probed by the active stage
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 22..=443;

/// Maximum simultaneous connection attempts per host
pub const DEFAULT_PROBE_CONCURRENCY: usize = 128;

/// Whether a TCP handshake to `addr` completes within `timeout`
pub async fn probe_port(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Probe a port range concurrently, returning open ports in ascending order
pub async fn scan_ports(
    ip: IpAddr,
    ports: RangeInclusive<u16>,
    timeout: Duration,
    max_concurrent: usize,
) -> Vec<u16> {
    let mut open: Vec<u16> = stream::iter(ports)
        .map(|port| async move {
            let addr = SocketAddr::new(ip, port);
            probe_port(addr, timeout).await.then_some(port)
        })
        .buffer_unordered(max_concurrent.max(1))
        .filter_map(|x| async move { x })
        .collect()
        .await;

    open.sort_unstable();
    debug!("{} open ports on {}", open.len(), ip);
    open
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_scan_finds_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let open = scan_ports(ip, port..=port, Duration::from_secs(1), 4).await;
        assert_eq!(open, vec![port]);
    }

    #[tokio::test]
    async fn test_closed_port() {
        // Bind then drop to get a port that is very likely closed
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let addr = SocketAddr::new("127.0.0.1".parse().unwrap(), port);
        assert!(!probe_port(addr, Duration::from_millis(500)).await);
    }
}
