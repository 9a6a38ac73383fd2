use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Identifies the upstream stream a `GET` reads from. The bytes are opaque to the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConsumerId(Bytes);

impl ConsumerId {
    pub fn new(id: impl Into<Bytes>) -> ConsumerId {
        ConsumerId(id.into())
    }
}

impl From<&'static str> for ConsumerId {
    fn from(id: &'static str) -> Self {
        ConsumerId(Bytes::from(id))
    }
}

impl From<Bytes> for ConsumerId {
    fn from(id: Bytes) -> Self {
        ConsumerId(id)
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Where messages come from. Sessions share one source and never lock it, so implementations do
/// their own synchronisation.
///
/// The returned stream yields the next deliverable payload for `id`. It may be dropped at any
/// point while waiting (the server does so on shutdown), and a payload must not be lost when that
/// happens.
pub trait MessageSource: Send + Sync + 'static {
    fn lookup(&self, id: &ConsumerId) -> BoxStream<'static, Bytes>;
}

type Queues = Arc<Mutex<HashMap<ConsumerId, Arc<Queue>>>>;

/// In-memory `MessageSource` with one FIFO queue per consumer id. Queues are created on first use
/// by either side. Consumers of the same id compete for payloads, each payload is delivered once.
/// An open queue with nothing queued and nobody waiting on it is forgotten.
///
/// The hub is cheap to clone, clones share the same queues.
#[derive(Clone, Default)]
pub struct Hub {
    queues: Queues,
}

struct Queue {
    sender: Mutex<Option<UnboundedSender<Bytes>>>,
    receiver: tokio::sync::Mutex<UnboundedReceiver<Bytes>>,
}

impl Queue {
    fn new() -> Queue {
        let (sender, receiver) = mpsc::unbounded_channel();
        Queue {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// Open, empty and not being received from. A closed queue is kept so that consumers keep
    /// seeing the end of the stream.
    fn is_idle(&self) -> bool {
        lock(&self.sender).is_some()
            && self
                .receiver
                .try_lock()
                .is_ok_and(|receiver| receiver.is_empty())
    }
}

/// A consumer's hold on a queue. Releasing the last hold on an idle queue removes it from the hub.
struct Lease {
    queues: Queues,
    id: ConsumerId,
    queue: Arc<Queue>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut queues = lock(&self.queues);

        // Holding the map lock, nobody can pick the queue up in the meantime. The two references
        // left are this lease's and the map's.
        let tracked = queues
            .get(&self.id)
            .is_some_and(|queue| Arc::ptr_eq(queue, &self.queue));
        if tracked && Arc::strong_count(&self.queue) == 2 && self.queue.is_idle() {
            queues.remove(&self.id);
        }
    }
}

impl Hub {
    pub fn new() -> Hub {
        Hub::default()
    }

    /// Queues `payload` for `id`. Returns `false` if the queue was closed.
    pub fn publish(&self, id: impl Into<ConsumerId>, payload: impl Into<Bytes>) -> bool {
        let queue = self.queue(id.into());
        let queued = match lock(&queue.sender).as_ref() {
            Some(sender) => sender.send(payload.into()).is_ok(),
            None => false,
        };
        queued
    }

    /// Ends the stream for `id`. Consumers drain what is already queued and then see the end of
    /// the stream.
    pub fn close(&self, id: impl Into<ConsumerId>) {
        let queue = self.queue(id.into());
        lock(&queue.sender).take();
    }

    fn queue(&self, id: ConsumerId) -> Arc<Queue> {
        lock(&self.queues)
            .entry(id)
            .or_insert_with(|| Arc::new(Queue::new()))
            .clone()
    }
}

impl MessageSource for Hub {
    fn lookup(&self, id: &ConsumerId) -> BoxStream<'static, Bytes> {
        let lease = Lease {
            queues: self.queues.clone(),
            id: id.clone(),
            queue: self.queue(id.clone()),
        };

        // `recv` is cancel safe, dropping the stream mid-wait leaves the payload queued.
        stream::unfold(lease, |lease| async move {
            let payload = lease.queue.receiver.lock().await.recv().await?;
            Some((payload, lease))
        })
        .boxed()
    }
}

// A poisoned lock only means another thread panicked mid-update. The map and sender slot are
// always left consistent, so keep going.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
