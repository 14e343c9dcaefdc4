use crate::{Message, RequestId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Callback invoked with the response to a request.
///
/// Receives the response message (envelope fields removed) and the id of
/// the request it answers. Runs on the requestor's listener task.
pub type ResponseCallback = Box<dyn FnOnce(Message, RequestId) + Send + 'static>;

struct PendingEntry {
    callback: ResponseCallback,
    registered_at: Instant,
}

/// Tracks requests waiting for their response
///
/// Maps request IDs to the callback awaiting the response. An entry is
/// consumed at most once: by [`take`](Self::take) when the response arrives,
/// or by [`remove`](Self::remove) / [`prune_older_than`](Self::prune_older_than)
/// when the caller gives up.
pub(super) struct PendingRequests {
    // ---
    requests: HashMap<RequestId, PendingEntry>,
}

impl PendingRequests {
    // ---

    /// Create a new empty pending requests tracker
    pub fn new() -> Self {
        // ---
        Self {
            requests: HashMap::new(),
        }
    }

    /// Register a new pending request
    pub fn register(&mut self, request_id: RequestId, callback: ResponseCallback) {
        // ---
        self.requests.insert(
            request_id,
            PendingEntry {
                callback,
                registered_at: Instant::now(),
            },
        );
    }

    /// Remove a pending request and hand back its callback
    ///
    /// Returns `None` for unknown or already resolved IDs.
    pub fn take(&mut self, request_id: &RequestId) -> Option<ResponseCallback> {
        // ---
        self.requests.remove(request_id).map(|entry| entry.callback)
    }

    /// Remove a pending request without delivering a response
    pub fn remove(&mut self, request_id: &RequestId) -> bool {
        // ---
        self.requests.remove(request_id).is_some()
    }

    /// Drop every request registered more than `age` ago
    ///
    /// Returns the number of requests removed.
    pub fn prune_older_than(&mut self, age: Duration) -> usize {
        // ---
        let before = self.requests.len();
        let now = Instant::now();
        self.requests
            .retain(|_, entry| now.duration_since(entry.registered_at) <= age);
        before - self.requests.len()
    }

    /// Drop every pending request; callbacks are never invoked
    pub fn clear(&mut self) -> usize {
        // ---
        let count = self.requests.len();
        self.requests.clear();
        count
    }

    /// Get the number of pending requests
    pub fn len(&self) -> usize {
        // ---
        self.requests.len()
    }
}
