use std::collections::{BTreeMap, HashMap, VecDeque};

use ipc::{Request, Response};
use tracing::{debug, warn};

/// Responses kept per kind before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Holds responses that arrived while waiting for something else.
///
/// Answers are keyed by the request hash they echo. Responses without a hash
/// are unsolicited data and are queued in arrival order for the next
/// receive. Both are bounded; past `capacity` the oldest entry goes.
#[derive(Debug)]
pub struct Correlator {
  pending: HashMap<String, VecDeque<(u64, Response)>>,
  /// Arrival sequence of buffered answers, oldest first.
  order: BTreeMap<u64, String>,
  unsolicited: VecDeque<Response>,
  next_seq: u64,
  capacity: usize,
}

impl Default for Correlator {
  fn default() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }
}

impl Correlator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      pending: HashMap::new(),
      order: BTreeMap::new(),
      unsolicited: VecDeque::new(),
      next_seq: 0,
      capacity: capacity.max(1),
    }
  }

  /// Keep `response` for a later [`take`](Self::take), or for
  /// [`pop_unsolicited`](Self::pop_unsolicited) if it carries no hash.
  pub fn offer(&mut self, response: Response) {
    let Some(hash) = response.hash().map(str::to_string) else {
      debug!(count = response.messages().len(), "Queueing unsolicited response");
      self.unsolicited.push_back(response);
      if self.unsolicited.len() > self.capacity
        && let Some(dropped) = self.unsolicited.pop_front()
      {
        warn!(
          capacity = self.capacity,
          count = dropped.messages().len(),
          "Dropping oldest unsolicited response"
        );
      }
      return;
    };

    debug!(hash = %hash, "Buffering unmatched response");
    let seq = self.next_seq;
    self.next_seq += 1;
    self.pending.entry(hash.clone()).or_default().push_back((seq, response));
    self.order.insert(seq, hash);

    if self.order.len() > self.capacity {
      self.evict_oldest();
    }
  }

  fn evict_oldest(&mut self) {
    let Some((seq, hash)) = self.order.pop_first() else {
      return;
    };
    if let Some(queue) = self.pending.get_mut(&hash) {
      queue.retain(|(s, _)| *s != seq);
      if queue.is_empty() {
        self.pending.remove(&hash);
      }
    }
    warn!(hash = %hash, capacity = self.capacity, "Dropping oldest unmatched response");
  }

  /// Oldest buffered response answering `request`.
  pub fn take(&mut self, request: &Request) -> Option<Response> {
    let hash = request.hash().ok()?;
    let queue = self.pending.get_mut(&hash)?;
    let (seq, response) = queue.pop_front()?;
    if queue.is_empty() {
      self.pending.remove(&hash);
    }
    self.order.remove(&seq);
    Some(response)
  }

  /// Oldest queued response that answered no request.
  pub fn pop_unsolicited(&mut self) -> Option<Response> {
    self.unsolicited.pop_front()
  }

  /// Buffered answers waiting for [`take`](Self::take).
  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn unsolicited_len(&self) -> usize {
    self.unsolicited.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty() && self.unsolicited.is_empty()
  }

  pub fn clear(&mut self) {
    self.pending.clear();
    self.order.clear();
    self.unsolicited.clear();
  }
}
