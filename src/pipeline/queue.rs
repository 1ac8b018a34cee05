use crossbeam::channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};

/// What a bounded queue does with a new item when it is full.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Overflow {
    /// Wait for the consumer to make room. Pushes back on the producer.
    #[default]
    Block,
    /// Drop the new item and count it.
    DropNewest,
}

/// Capacity policy of a hand-off queue.
///
/// Queues are unbounded by default, so a slow consumer grows memory use without
/// limit rather than losing data or stalling the producer. Choose a bounded
/// capacity to trade that for backpressure or loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capacity {
    #[default]
    Unbounded,
    Bounded { size: usize, overflow: Overflow },
}

/// Result of [Producer::push].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    /// The queue was full and the item was dropped.
    Dropped,
    /// The consumer is gone.
    Disconnected,
}

/// Result of [Consumer::poll].
#[derive(Debug)]
pub enum Polled<T> {
    Item(T),
    Empty,
    /// Empty, and the producer is gone so it will stay that way.
    Drained,
}

/// Create a single-producer, single-consumer FIFO hand-off queue.
pub fn queue<T>(capacity: Capacity) -> (Producer<T>, Consumer<T>) {
    let (tx, rx, overflow) = match capacity {
        Capacity::Unbounded => {
            let (tx, rx) = unbounded();
            (tx, rx, Overflow::Block)
        }
        Capacity::Bounded { size, overflow } => {
            let (tx, rx) = bounded(size);
            (tx, rx, overflow)
        }
    };
    (
        Producer {
            tx,
            overflow,
            dropped: 0,
        },
        Consumer { rx },
    )
}

#[derive(Debug)]
pub struct Producer<T> {
    tx: Sender<T>,
    overflow: Overflow,
    dropped: u64,
}

impl<T> Producer<T> {
    /// Add `item` to the queue according to the queue's [Overflow] policy.
    pub fn push(&mut self, item: T) -> Push {
        match self.overflow {
            Overflow::Block => match self.tx.send(item) {
                Ok(()) => Push::Queued,
                Err(_) => Push::Disconnected,
            },
            Overflow::DropNewest => match self.tx.try_send(item) {
                Ok(()) => Push::Queued,
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    Push::Dropped
                }
                Err(TrySendError::Disconnected(_)) => Push::Disconnected,
            },
        }
    }

    /// Number of items dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug)]
pub struct Consumer<T> {
    rx: Receiver<T>,
}

impl<T> Consumer<T> {
    /// Take the oldest item without blocking.
    pub fn poll(&self) -> Polled<T> {
        match self.rx.try_recv() {
            Ok(item) => Polled::Item(item),
            Err(TryRecvError::Empty) => Polled::Empty,
            Err(TryRecvError::Disconnected) => Polled::Drained,
        }
    }

    /// Number of items waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_is_fifo() {
        let (mut tx, rx) = queue(Capacity::Unbounded);
        for i in 0..1000 {
            assert_eq!(tx.push(i), Push::Queued);
        }
        assert_eq!(rx.len(), 1000);
        for i in 0..1000 {
            assert!(matches!(rx.poll(), Polled::Item(x) if x == i));
        }
        assert!(matches!(rx.poll(), Polled::Empty));

        drop(tx);
        assert!(matches!(rx.poll(), Polled::Drained));
    }

    #[test]
    fn bounded_drop_newest() {
        let (mut tx, rx) = queue(Capacity::Bounded {
            size: 2,
            overflow: Overflow::DropNewest,
        });
        assert_eq!(tx.push(1), Push::Queued);
        assert_eq!(tx.push(2), Push::Queued);
        assert_eq!(tx.push(3), Push::Dropped);
        assert_eq!(tx.dropped(), 1);

        assert!(matches!(rx.poll(), Polled::Item(1)));
        assert!(matches!(rx.poll(), Polled::Item(2)));
        assert!(rx.is_empty());
    }

    #[test]
    fn push_after_consumer_gone() {
        let (mut tx, rx) = queue::<u8>(Capacity::Bounded {
            size: 1,
            overflow: Overflow::Block,
        });
        drop(rx);
        assert_eq!(tx.push(1), Push::Disconnected);
    }

    #[test]
    fn drained_only_after_items_taken() {
        let (mut tx, rx) = queue(Capacity::Unbounded);
        tx.push("a");
        drop(tx);

        assert!(matches!(rx.poll(), Polled::Item("a")));
        assert!(matches!(rx.poll(), Polled::Drained));
    }
}
