//! Malware scanning of uploaded bytes
//!
//! `ClamdScanner` speaks the clamd `zINSTREAM` protocol over TCP:
//!
//! ```text
//! -> "zINSTREAM\0"
//! -> [u32 BE len][chunk] ... [0u32]
//! <- "stream: OK\0" | "stream: <threat> FOUND\0" | "<msg> ERROR\0"
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

const STREAM_CHUNK_SIZE: usize = 64 * 1024;
const SCAN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected { threat: String },
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    /// `Err` means the scan itself could not complete
    async fn scan(&self, data: &[u8]) -> EngineResult<ScanVerdict>;
}

/// Scanner used when clamd is not configured or unreachable. Reports everything clean.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpScanner;

#[async_trait]
impl MalwareScanner for NoOpScanner {
    async fn scan(&self, data: &[u8]) -> EngineResult<ScanVerdict> {
        warn!(size = data.len(), "Malware scanning disabled, accepting upload unscanned");
        Ok(ScanVerdict::Clean)
    }
}

#[derive(Debug, Clone)]
pub struct ClamdScanner {
    addr: String,
}

impl ClamdScanner {
    /// Accepts `host:port` or `tcp://host:port`
    pub fn new(addr: &str) -> Self {
        let addr = addr.strip_prefix("tcp://").unwrap_or(addr).to_string();
        Self { addr }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> EngineResult<TcpStream> {
        TcpStream::connect(&self.addr)
            .await
            .map_err(|e| EngineError::ScanFailure(format!("connect {}: {}", self.addr, e)))
    }

    /// Startup connectivity check
    pub async fn ping(&self) -> EngineResult<()> {
        let mut stream = self.connect().await?;
        stream.write_all(b"zPING\0").await.map_err(io_failure)?;
        let reply = read_reply(&mut stream).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(EngineError::ScanFailure(format!("unexpected ping reply: {}", reply)))
        }
    }

    async fn instream(&self, mut stream: TcpStream, data: &[u8]) -> EngineResult<String> {
        stream.write_all(b"zINSTREAM\0").await.map_err(io_failure)?;

        for chunk in data.chunks(STREAM_CHUNK_SIZE) {
            let len = u32::try_from(chunk.len())
                .map_err(|_| EngineError::ScanFailure("chunk too large".to_string()))?;
            stream.write_all(&len.to_be_bytes()).await.map_err(io_failure)?;
            stream.write_all(chunk).await.map_err(io_failure)?;
        }
        stream.write_all(&0u32.to_be_bytes()).await.map_err(io_failure)?;
        stream.flush().await.map_err(io_failure)?;

        read_reply(&mut stream).await
    }
}

#[async_trait]
impl MalwareScanner for ClamdScanner {
    /// An unreachable daemon counts as "scanning unavailable" and falls back to
    /// clean, like `NoOpScanner`. Once connected, any failure is a `ScanFailure`.
    async fn scan(&self, data: &[u8]) -> EngineResult<ScanVerdict> {
        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, size = data.len(), "clamd unavailable, accepting upload unscanned");
                return Ok(ScanVerdict::Clean);
            }
        };

        let reply = timeout(SCAN_TIMEOUT, self.instream(stream, data))
            .await
            .map_err(|_| EngineError::ScanFailure("clamd timed out".to_string()))??;

        debug!(reply = %reply, size = data.len(), "clamd replied");
        parse_reply(&reply)
    }
}

/// Pick the scanner for a configured clamd address.
///
/// No address, or a daemon that does not answer `zPING`, yields `NoOpScanner`.
pub async fn select_scanner(clamav_addr: Option<&str>) -> Arc<dyn MalwareScanner> {
    let Some(addr) = clamav_addr else {
        warn!("CLAMAV_ADDR not set: uploads are accepted without malware scanning");
        return Arc::new(NoOpScanner);
    };

    let scanner = ClamdScanner::new(addr);
    match scanner.ping().await {
        Ok(()) => {
            info!("clamd reachable at {}", scanner.addr());
            Arc::new(scanner)
        }
        Err(e) => {
            warn!(
                "clamd at {} not responding ({}), falling back to no-op scanning",
                scanner.addr(),
                e
            );
            Arc::new(NoOpScanner)
        }
    }
}

fn io_failure(e: std::io::Error) -> EngineError {
    EngineError::ScanFailure(format!("clamd io: {}", e))
}

async fn read_reply(stream: &mut TcpStream) -> EngineResult<String> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.map_err(io_failure)?;
    let text = String::from_utf8_lossy(&buf);
    Ok(text.trim_end_matches(['\0', '\n']).trim().to_string())
}

pub(crate) fn parse_reply(reply: &str) -> EngineResult<ScanVerdict> {
    let body = reply.strip_prefix("stream:").unwrap_or(reply).trim();

    if body == "OK" {
        return Ok(ScanVerdict::Clean);
    }
    if let Some(threat) = body.strip_suffix("FOUND") {
        return Ok(ScanVerdict::Infected {
            threat: threat.trim().to_string(),
        });
    }
    Err(EngineError::ScanFailure(format!("clamd: {}", body)))
}
