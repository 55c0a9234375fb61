use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

/// Lock-free counters for one external session, scoped to a cache identifier.
#[derive(Debug)]
pub struct SessionStats {
  identifier: String,

  // --- Connection ---
  pub(crate) connect_attempts: CachePadded<AtomicU64>,

  // --- Requests ---
  pub(crate) requests: CachePadded<AtomicU64>,
  pub(crate) failures: CachePadded<AtomicU64>,
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Payload ---
  pub(crate) bytes_sent: CachePadded<AtomicU64>,
  pub(crate) bytes_received: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl SessionStats {
  pub fn new(identifier: impl Into<String>) -> Self {
    Self {
      identifier: identifier.into(),
      connect_attempts: CachePadded::new(AtomicU64::new(0)),
      requests: CachePadded::new(AtomicU64::new(0)),
      failures: CachePadded::new(AtomicU64::new(0)),
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      bytes_sent: CachePadded::new(AtomicU64::new(0)),
      bytes_received: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }

  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  pub(crate) fn record_connect_attempt(&self) {
    self.connect_attempts.fetch_add(1, Ordering::Relaxed);
  }

  /// Counts one request and, on failure, one failure.
  pub(crate) fn record<T, E>(&self, result: &Result<T, E>) {
    self.requests.fetch_add(1, Ordering::Relaxed);
    if result.is_err() {
      self.failures.fetch_add(1, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_lookup(&self, value: Option<&[u8]>) {
    match value {
      Some(bytes) => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self
          .bytes_received
          .fetch_add(bytes.len() as u64, Ordering::Relaxed);
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
      }
    }
  }

  pub(crate) fn record_sent(&self, len: usize) {
    self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> SessionStatsSnapshot {
    SessionStatsSnapshot {
      connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
      requests: self.requests.load(Ordering::Relaxed),
      failures: self.failures.load(Ordering::Relaxed),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
      bytes_received: self.bytes_received.load(Ordering::Relaxed),
      uptime: self.created_at.elapsed(),
    }
  }
}

/// A point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatsSnapshot {
  pub connect_attempts: u64,
  pub requests: u64,
  pub failures: u64,
  pub hits: u64,
  pub misses: u64,
  pub bytes_sent: u64,
  pub bytes_received: u64,
  pub uptime: Duration,
}

impl fmt::Display for SessionStatsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Session Stats:")?;
    writeln!(f, "  Connect Attempts: {}", self.connect_attempts)?;
    writeln!(f, "  Requests: {} ({} failed)", self.requests, self.failures)?;
    writeln!(f, "  Hits / Misses: {} / {}", self.hits, self.misses)?;
    writeln!(
      f,
      "  Bytes Sent / Received: {} / {}",
      self.bytes_sent, self.bytes_received
    )?;
    write!(f, "  Uptime: {:?}", self.uptime)
  }
}
