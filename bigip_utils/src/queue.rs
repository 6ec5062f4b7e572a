use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::Mutex as AsyncMutex;

/// A FIFO shared between many producers and a consuming worker.
///
/// The backing list is guarded by a mutex; liveness comes from a 1-slot
/// signal channel used as a level trigger. At every quiescent point the
/// channel holds exactly one token iff the queue is non-empty, so a blocked
/// `get` wakes as soon as an item arrives and consumers re-arm the signal
/// for each other.
pub struct DeployQueue<T> {
    items: Mutex<VecDeque<T>>,
    found_tx: Sender<()>,
    found_rx: AsyncMutex<Receiver<()>>,
}

impl<T> Default for DeployQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeployQueue<T> {
    pub fn new() -> Self {
        let (found_tx, found_rx) = channel(1);
        DeployQueue {
            items: Mutex::new(VecDeque::new()),
            found_tx,
            found_rx: AsyncMutex::new(found_rx),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an item, signalling on the empty -> non-empty transition.
    pub fn add(&self, r: T) {
        let items = &mut *self.items.lock().unwrap();
        items.push_back(r);
        if items.len() == 1 {
            self.signal();
        }
    }

    /// Prepend an item so it is dequeued next.
    pub fn insert(&self, r: T) {
        let items = &mut *self.items.lock().unwrap();
        items.push_front(r);
        if items.len() == 1 {
            self.signal();
        }
    }

    /// Block until the queue is non-empty, then pop the head.
    pub async fn get(&self) -> T {
        let mut rx = self.found_rx.lock().await;
        // a token is posted for every empty -> non-empty transition;
        // the senders live in self so recv cannot yield None
        rx.recv().await.expect("queue signal channel closed");
        let items = &mut *self.items.lock().unwrap();
        let head = items.pop_front().expect("signalled queue was empty");
        if !items.is_empty() {
            self.signal();
        }
        head
    }

    /// Remove and return every queued item matching `cmp(probe, item)`.
    ///
    /// Items that do not match stay queued in their original order.
    pub async fn filter<C>(&self, probe: &T, cmp: C) -> Vec<T>
    where
        C: Fn(&T, &T) -> bool,
    {
        self.filter_until(probe, cmp, |_: &T, _: &T| false).await
    }

    /// Like `filter`, but the scan terminates early before the first
    /// retained successor for which `stop(probe, next)` holds. This lets a
    /// caller coalesce a run of compatible requests without reordering them
    /// past an incompatible one.
    pub async fn filter_until<C, S>(&self, probe: &T, cmp: C, stop: S) -> Vec<T>
    where
        C: Fn(&T, &T) -> bool,
        S: Fn(&T, &T) -> bool,
    {
        let mut rx = self.found_rx.lock().await;
        let items = &mut *self.items.lock().unwrap();
        let mut taken = Vec::new();
        if items.is_empty() {
            return taken;
        }
        // take the level trigger while the list is mutated
        let _ = rx.try_recv();

        let mut kept = VecDeque::with_capacity(items.len());
        let mut halted = false;
        while let Some(item) = items.pop_front() {
            if halted {
                kept.push_back(item);
                continue;
            }
            if cmp(probe, &item) {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
            if let Some(next) = items.front() {
                if stop(probe, next) {
                    halted = true;
                }
            }
        }
        *items = kept;
        if !items.is_empty() {
            self.signal();
        }
        taken
    }

    fn signal(&self) {
        let mut tx = self.found_tx.clone();
        let _ = tx.try_send(());
    }
}

impl<T: Clone> DeployQueue<T> {
    /// Snapshot copy of the queued items.
    pub fn dumps(&self) -> Vec<T> {
        self.items.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    struct Req {
        name: String,
        partition: String,
    }

    fn req(x: usize) -> Req {
        Req {
            name: format!("r-{:05}", x),
            partition: "p1".into(),
        }
    }

    #[tokio::test]
    async fn add_then_len() {
        let dq = DeployQueue::new();
        for i in 0..100 {
            dq.add(req(i));
        }
        assert_eq!(dq.len(), 100);
    }

    #[tokio::test]
    async fn get_returns_fifo_order() {
        let dq = DeployQueue::new();
        for i in 0..10 {
            dq.add(req(i));
        }
        for i in 0..10 {
            assert_eq!(dq.get().await, req(i));
        }
        assert!(dq.is_empty());
    }

    #[tokio::test]
    async fn insert_goes_to_head() {
        let dq = DeployQueue::new();
        dq.add(req(1));
        dq.add(req(2));
        dq.insert(req(0));
        assert_eq!(dq.get().await, req(0));
        assert_eq!(dq.get().await, req(1));
    }

    #[tokio::test]
    async fn dumps_is_a_snapshot() {
        let dq = DeployQueue::new();
        for i in 0..10 {
            dq.add(req(i));
        }
        let dumped = dq.dumps();
        assert_eq!(dumped.len(), 10);
        assert_eq!(dq.len(), 10);
        assert_eq!(dumped[3], req(3));
    }

    #[tokio::test]
    async fn get_blocks_until_add() {
        let dq = Arc::new(DeployQueue::new());
        let consumer = dq.clone();
        let handle = tokio::spawn(async move { consumer.get().await });
        tokio::time::delay_for(Duration::from_millis(10)).await;
        dq.add(req(7));
        assert_eq!(handle.await.unwrap(), req(7));
    }

    #[tokio::test]
    async fn concurrent_producers_single_consumer() {
        let dq = Arc::new(DeployQueue::new());
        for chunk in 0..3 {
            let q = dq.clone();
            tokio::spawn(async move {
                for i in (chunk * 200)..((chunk + 1) * 200) {
                    q.add(req(i));
                }
            });
        }
        let mut total = Vec::with_capacity(600);
        for _ in 0..600 {
            total.push(dq.get().await);
        }
        assert_eq!(total.len(), 600);
        assert!(dq.is_empty());
    }

    #[tokio::test]
    async fn filter_on_empty_queue_is_a_noop() {
        let dq: DeployQueue<Req> = DeployQueue::new();
        let fs = dq.filter(&req(0), |a, b| a == b).await;
        assert!(fs.is_empty());
    }

    #[tokio::test]
    async fn filter_removes_matches_and_keeps_order() {
        let dq = DeployQueue::new();
        dq.add(req(0));
        let fs = dq.filter(&req(0), |a, b| a == b).await;
        assert_eq!(fs.len(), 1);
        assert_eq!(dq.len(), 0);

        for i in 0..10 {
            dq.add(req(i));
        }
        let fs = dq.filter(&req(0), |a, b| a == b).await;
        assert_eq!(fs.len(), 1);
        // queue still works and yields the next head
        assert_eq!(dq.get().await, req(1));
    }

    #[tokio::test]
    async fn filter_until_stops_at_barrier() {
        let dq = DeployQueue::new();
        dq.add(req(1));
        dq.add(req(3));
        dq.add(req(5)); // barrier
        dq.add(req(3));
        let probe = req(3);
        let fs = dq
            .filter_until(&probe, |a, b| a.name == b.name, |_, next| next.name == "r-00005")
            .await;
        // only the run before the barrier is coalesced
        assert_eq!(fs.len(), 1);
        assert_eq!(dq.len(), 3);
        assert_eq!(dq.get().await, req(1));
        assert_eq!(dq.get().await, req(5));
        assert_eq!(dq.get().await, req(3));
    }

    #[tokio::test]
    async fn signal_survives_filter_mutation() {
        let dq = Arc::new(DeployQueue::new());
        for i in 0..4 {
            dq.add(req(i));
        }
        let _ = dq.filter(&req(1), |a, b| a == b).await;
        // remaining items must still be consumable without a fresh add
        assert_eq!(dq.get().await, req(0));
        assert_eq!(dq.get().await, req(2));
        assert_eq!(dq.get().await, req(3));
    }
}
