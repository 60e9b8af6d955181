//! 📡 MemcacheSink: the memcached text protocol, spoken over one lazily-opened TCP socket.
//!
//! We only ever say one sentence to memcached:
//!
//! ```text
//! set <key> 0 0 <bytes>\r\n
//! <data block>\r\n
//! ```
//!
//! and we only ever want to hear one word back: `STORED`.
//!
//! 🧠 Knowledge graph:
//! - The socket is opened on the first `set`, not at construction. A dead server shows up as a
//!   write failure on first use, which the retry loop upstream already knows how to count.
//! - An I/O error drops the socket. The next `set` dials again. A protocol-level refusal
//!   (`NOT_STORED`, `SERVER_ERROR ...`) keeps it, since the stream is still in sync.
//! - Connecting is bounded by `connect_timeout_ms`. The `set` round-trip is not. A stuck
//!   server can hold a worker hostage. Known. Accepted.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::backends::Sink;

/// 🔑 memcached refuses keys longer than this. So do we, but before the network round-trip.
const MAX_KEY_LENGTH: usize = 250;

// -- ⏱️ three seconds: long enough for a sleepy server, short enough for an impatient operator
fn default_connect_timeout_ms() -> u64 {
    3000
}

/// 🔧 Knobs for the memcached sink. There is exactly one. It is about patience.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MemcacheSinkConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for MemcacheSinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// 📡 One memcached server, one socket, shared by every worker that routes here.
#[derive(Debug)]
pub(crate) struct MemcacheSink {
    address: String,
    connect_timeout: Duration,
    // -- 🔒 None until first use, None again after an I/O error. The Mutex is load-bearing.
    connection: Mutex<Option<BufStream<TcpStream>>>,
}

impl MemcacheSink {
    /// 🏗️ No I/O here. Just remembering where to knock later.
    pub(crate) fn new(address: &str, config: &MemcacheSinkConfig) -> Self {
        Self {
            address: address.to_string(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            connection: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<BufStream<TcpStream>> {
        debug!(address = %self.address, "🔌 dialing memcached");
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .with_context(|| {
                format!(
                    "💀 memcached at '{}' did not pick up within {:?}. We let it ring. Nobody answered.",
                    self.address, self.connect_timeout
                )
            })?
            .with_context(|| {
                format!(
                    "💀 Could not connect to memcached at '{}'. Is it running? Is it on that port? Is it even a memcached?",
                    self.address
                )
            })?;
        stream.set_nodelay(true)?;
        Ok(BufStream::new(stream))
    }
}

#[async_trait]
impl Sink for MemcacheSink {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;

        let mut slot = self.connection.lock().await;
        // -- 🎣 take the socket out of the slot. it only goes back if it is still healthy.
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        let response = store(&mut stream, key, value).await.with_context(|| {
            format!(
                "💀 The conversation with memcached at '{}' broke down mid-sentence. The socket has been retired.",
                self.address
            )
        })?;
        *slot = Some(stream);

        if response != "STORED" {
            bail!(
                "💀 memcached at '{}' heard us out and replied '{}' for key '{}'. That is not 'STORED'.",
                self.address,
                response,
                key
            );
        }
        trace!(address = %self.address, key, bytes = value.len(), "✅ stored");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut stream) = self.connection.lock().await.take() {
            debug!(address = %self.address, "🗑️ closing memcached connection");
            stream
                .shutdown()
                .await
                .with_context(|| format!("💀 memcached at '{}' would not hang up politely", self.address))?;
        }
        Ok(())
    }
}

/// 📬 Write one `set` command and read the one-line reply.
async fn store(stream: &mut BufStream<TcpStream>, key: &str, value: &[u8]) -> Result<String> {
    let header = format!("set {} 0 0 {}\r\n", key, value.len());
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(value).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;

    let mut response = String::new();
    if stream.read_line(&mut response).await? == 0 {
        bail!("connection closed before memcached replied");
    }
    Ok(response.trim_end().to_string())
}

/// 🔑 memcached keys: non-empty, at most 250 bytes, no whitespace, no control characters.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        bail!(
            "💀 Key of {} bytes is not something memcached will accept (1..={} bytes)",
            key.len(),
            MAX_KEY_LENGTH
        );
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        bail!("💀 Key '{}' contains whitespace or control characters. memcached would choke on it.", key.escape_debug());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// 🧪 A memcached impersonator: reads one `set`, answers with `reply`, hands back what it heard.
    async fn fake_memcached_once(reply: &'static str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("💀 no port for the fake");
        let address = listener.local_addr().expect("💀 fake has no address").to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("💀 nobody called the fake");
            let mut heard = vec![0u8; 1024];
            let n = socket.read(&mut heard).await.expect("💀 the fake went deaf");
            heard.truncate(n);
            socket.write_all(reply.as_bytes()).await.expect("💀 the fake lost its voice");
            heard
        });
        (address, handle)
    }

    #[tokio::test]
    async fn the_one_where_memcached_says_stored() -> Result<()> {
        let (address, fake) = fake_memcached_once("STORED\r\n").await;
        let sink = MemcacheSink::new(&address, &MemcacheSinkConfig::default());

        sink.set("idfa:ID1", b"abc").await?;

        let heard = fake.await?;
        assert_eq!(heard, b"set idfa:ID1 0 0 3\r\nabc\r\n".to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_memcached_says_anything_else() {
        let (address, _fake) = fake_memcached_once("SERVER_ERROR out of memory\r\n").await;
        let sink = MemcacheSink::new(&address, &MemcacheSinkConfig::default());

        let err = sink.set("gaid:ID2", b"x").await.expect_err("💀 SERVER_ERROR is not success");
        assert!(err.to_string().contains("SERVER_ERROR"));
    }

    #[tokio::test]
    async fn the_one_where_nobody_is_listening() {
        // 🧪 bind, learn the port, then hang up so the port is (very likely) closed
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("💀 no port");
        let address = listener.local_addr().expect("💀 no address").to_string();
        drop(listener);

        let sink = MemcacheSink::new(&address, &MemcacheSinkConfig::default());
        assert!(sink.set("adid:ID3", b"x").await.is_err());
    }

    /// 🧪 A memcached that answers `STORED` once per connection, then hangs up. Counts who dialed.
    async fn fake_memcached_that_hangs_up() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("💀 no port for the fake");
        let address = listener.local_addr().expect("💀 fake has no address").to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut heard = vec![0u8; 1024];
                if socket.read(&mut heard).await.unwrap_or(0) > 0 {
                    let _ = socket.write_all(b"STORED\r\n").await;
                }
                // -- 📴 socket drops here: one reply per call, then the line goes dead
            }
        });
        (address, accepted)
    }

    #[tokio::test]
    async fn the_one_where_a_hung_up_socket_gets_redialed() -> Result<()> {
        let (address, accepted) = fake_memcached_that_hangs_up().await;
        let sink = MemcacheSink::new(&address, &MemcacheSinkConfig::default());

        sink.set("idfa:ID1", b"first").await?;
        // 🧪 the server hung up after the first reply; this one lands on a dead socket
        assert!(sink.set("idfa:ID1", b"second").await.is_err());
        // 🧪 the dead socket was retired, so this one dials a fresh connection
        sink.set("idfa:ID1", b"third").await?;

        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_refusal_keeps_the_socket() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?.to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                for reply in ["NOT_STORED\r\n", "STORED\r\n"] {
                    let mut heard = vec![0u8; 1024];
                    if socket.read(&mut heard).await.unwrap_or(0) == 0 {
                        break;
                    }
                    let _ = socket.write_all(reply.as_bytes()).await;
                }
            }
        });
        let sink = MemcacheSink::new(&address, &MemcacheSinkConfig::default());

        let err = sink.set("gaid:ID2", b"x").await.expect_err("💀 NOT_STORED is not success");
        assert!(err.to_string().contains("NOT_STORED"));
        sink.set("gaid:ID2", b"x").await?;

        // 🧪 the refusal was a polite one, so both calls rode the same connection
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn the_one_where_bad_keys_never_leave_the_building() {
        assert!(validate_key("idfa:ok").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("has space:x").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }
}
