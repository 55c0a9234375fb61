use crate::error::DispatchError;
use crate::listener::EventNotification;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fibre::mpsc;
use fibre::{RecvError, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

/// Counters describing the dispatcher's work so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
  pub submitted: u64,
  pub processed: u64,
  pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
  submitted: AtomicU64,
  processed: AtomicU64,
  failed: AtomicU64,
}

enum LaneSender {
  Unbounded(mpsc::UnboundedSender<EventNotification>),
  Bounded(mpsc::BoundedSender<EventNotification>),
}

impl LaneSender {
  fn try_send(&self, notification: EventNotification) -> Result<(), TrySendError<EventNotification>> {
    match self {
      LaneSender::Unbounded(tx) => tx.try_send(notification),
      LaneSender::Bounded(tx) => tx.try_send(notification),
    }
  }
}

enum LaneReceiver {
  Unbounded(mpsc::UnboundedReceiver<EventNotification>),
  Bounded(mpsc::BoundedReceiver<EventNotification>),
}

impl LaneReceiver {
  fn recv(&self) -> Result<EventNotification, RecvError> {
    match self {
      LaneReceiver::Unbounded(rx) => rx.recv(),
      LaneReceiver::Bounded(rx) => rx.recv(),
    }
  }
}

fn open_lane(capacity: Option<usize>) -> (LaneSender, LaneReceiver) {
  match capacity {
    None => {
      let (tx, rx) = mpsc::unbounded();
      (LaneSender::Unbounded(tx), LaneReceiver::Unbounded(rx))
    }
    Some(capacity) => {
      let (tx, rx) = mpsc::bounded(capacity.max(1));
      (LaneSender::Bounded(tx), LaneReceiver::Bounded(rx))
    }
  }
}

/// Runs listener callbacks on background worker threads.
///
/// Notifications are routed to a lane by hashing their key, and every lane is
/// served by one thread in FIFO order, so notifications for the same key are
/// delivered in submission order. Different keys may be delivered in any
/// order relative to each other.
///
/// Lanes are unbounded unless a capacity is given with
/// [`bounded`](Self::bounded); only a bounded lane can refuse a notification.
pub struct ListenerDispatcher {
  // `None` once stopped. Dropping the senders disconnects the lanes, which
  // lets each worker drain what is queued and exit.
  lanes: RwLock<Option<Box<[LaneSender]>>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  hasher: ahash::RandomState,
  counters: Arc<Counters>,
  lane_count: usize,
  lane_capacity: Option<usize>,
}

impl ListenerDispatcher {
  /// Spawns `lanes` worker threads with unbounded queues.
  pub fn new(lanes: usize) -> Self {
    Self::spawn(lanes, None)
  }

  /// Spawns `lanes` worker threads whose queues hold at most `lane_capacity`
  /// notifications. Submitting to a full lane fails with
  /// [`DispatchError::QueueFull`].
  pub fn bounded(lanes: usize, lane_capacity: usize) -> Self {
    Self::spawn(lanes, Some(lane_capacity))
  }

  /// One unbounded lane per CPU.
  pub fn with_default_lanes() -> Self {
    Self::new(num_cpus::get())
  }

  pub(crate) fn spawn(lanes: usize, lane_capacity: Option<usize>) -> Self {
    let lane_count = lanes.max(1);
    let counters = Arc::new(Counters::default());
    let mut senders = Vec::with_capacity(lane_count);
    let mut workers = Vec::with_capacity(lane_count);

    for lane in 0..lane_count {
      let (tx, rx) = open_lane(lane_capacity);
      let counters = counters.clone();

      // The loop ends when every sender is dropped.
      workers.push(thread::spawn(move || {
        while let Ok(notification) = rx.recv() {
          let key = notification.key().to_owned();
          let kind = notification.kind();
          match panic::catch_unwind(AssertUnwindSafe(move || notification.process())) {
            Ok(()) => {
              counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
              counters.failed.fetch_add(1, Ordering::Relaxed);
              error!(
                lane,
                key = %key,
                event = %kind,
                panic = panic_message(&*payload),
                "cache event listener panicked"
              );
            }
          }
        }
        debug!(lane, "listener dispatch lane stopped");
      }));
      senders.push(tx);
    }

    Self {
      lanes: RwLock::new(Some(senders.into_boxed_slice())),
      workers: Mutex::new(workers),
      hasher: ahash::RandomState::new(),
      counters,
      lane_count,
      lane_capacity,
    }
  }

  pub fn lane_count(&self) -> usize {
    self.lane_count
  }

  /// The per-lane bound, or `None` for unbounded lanes.
  pub fn lane_capacity(&self) -> Option<usize> {
    self.lane_capacity
  }

  /// Queues a notification without blocking.
  pub fn submit(&self, notification: EventNotification) -> Result<(), DispatchError> {
    let guard = self.lanes.read();
    let lanes = guard.as_ref().ok_or(DispatchError::Stopped)?;
    let lane = (self.hasher.hash_one(notification.key()) as usize) % lanes.len();

    match lanes[lane].try_send(notification) {
      Ok(()) => {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
      }
      Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull),
      Err(_) => Err(DispatchError::Stopped),
    }
  }

  pub fn stats(&self) -> DispatchStats {
    DispatchStats {
      submitted: self.counters.submitted.load(Ordering::Relaxed),
      processed: self.counters.processed.load(Ordering::Relaxed),
      failed: self.counters.failed.load(Ordering::Relaxed),
    }
  }

  pub fn is_stopped(&self) -> bool {
    self.lanes.read().is_none()
  }

  /// Stops accepting notifications, lets the workers drain their queues and
  /// waits for them to exit. Safe to call more than once.
  pub fn shutdown(&self) {
    drop(self.lanes.write().take());

    let workers = std::mem::take(&mut *self.workers.lock());
    let current = thread::current().id();
    for worker in workers {
      // A listener that shuts the dispatcher down cannot wait for itself.
      if worker.thread().id() == current {
        continue;
      }
      if worker.join().is_err() {
        error!("listener dispatch worker exited abnormally");
      }
    }
  }
}

impl Drop for ListenerDispatcher {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl std::fmt::Debug for ListenerDispatcher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ListenerDispatcher")
      .field("lane_count", &self.lane_count)
      .field("lane_capacity", &self.lane_capacity)
      .field("stopped", &self.is_stopped())
      .field("stats", &self.stats())
      .finish()
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message
  } else {
    "non-string panic payload"
  }
}
