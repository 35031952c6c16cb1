//! Per-source bounded inbound queue. A plain bounded
//! `mpsc` channel can only ever block or fail the sender on overflow; the
//! spec's drop policy needs to pick *which* element to discard, so this is a
//! small hand-rolled ring buffer behind a `Notify` instead.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::command::TaggedCommand;

pub struct InboundQueue {
    capacity: usize,
    inner: Mutex<VecDeque<TaggedCommand>>,
    notify: Notify,
}

impl InboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), inner: Mutex::new(VecDeque::new()), notify: Notify::new() }
    }

    /// Overflow drops the oldest queued element for an idempotent command
    /// (the newest value is the only one that matters anyway) and drops the
    /// incoming element itself for a non-idempotent one.
    pub async fn push(&self, cmd: TaggedCommand) {
        let mut guard = self.inner.lock().await;
        if guard.len() >= self.capacity {
            if cmd.command.is_idempotent() {
                guard.pop_front();
                guard.push_back(cmd);
            } else {
                warn!("inbound queue full; dropping newest non-idempotent command");
                return;
            }
        } else {
            guard.push_back(cmd);
        }
        drop(guard);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> TaggedCommand {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(cmd) = guard.pop_front() {
                    return cmd;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, SourceProtocol};

    fn tagged(cmd: Command) -> TaggedCommand {
        TaggedCommand { source: SourceProtocol::Api, command: cmd }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_for_idempotent_commands() {
        let queue = InboundQueue::new(2);
        queue.push(tagged(Command::SetZoneVolume { zone_id: 1, volume: 10 })).await;
        queue.push(tagged(Command::SetZoneVolume { zone_id: 1, volume: 20 })).await;
        queue.push(tagged(Command::SetZoneVolume { zone_id: 1, volume: 30 })).await;

        let first = queue.pop().await;
        let second = queue.pop().await;
        assert!(matches!(first.command, Command::SetZoneVolume { volume: 20, .. }));
        assert!(matches!(second.command, Command::SetZoneVolume { volume: 30, .. }));
    }

    #[tokio::test]
    async fn overflow_drops_newest_for_non_idempotent_commands() {
        let queue = InboundQueue::new(1);
        queue.push(tagged(Command::Next { zone_id: 1 })).await;
        queue.push(tagged(Command::Previous { zone_id: 1 })).await;

        let only = queue.pop().await;
        assert!(matches!(only.command, Command::Next { .. }));
    }
}
