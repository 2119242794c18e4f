// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::engine::EngineCommand;

/// Ingress Queue abstraction for passing commands from the transport
/// layer to the matching loop
///
/// The Ingress Queue is the boundary between multi-threaded TCP
/// ingress and the single-threaded matching loop. Everything that
/// mutates engine state flows through it - orders, cancels, and
/// participant joins/leaves - so the matching loop observes one total
/// order of events and needs no locks.
///
/// Properties:
/// - Multiple Producers (one per connection task)
/// - Single Consumer (matching loop)
/// - Bounded capacity for backpressure
///
/// The queue does NOT:
/// - Provide scheduling or prioritization
/// - Make business decisions about command acceptance
///
/// When the queue is full, producers retry with a short sleep rather
/// than dropping: losing a join or leave would desynchronize the
/// registry, and losing an order would silently break the per-trader
/// message ordering guarantee.
pub struct IngressQueue {
	sender: Sender<EngineCommand>,
	receiver: Receiver<EngineCommand>,
}

impl IngressQueue {
	/// Create a new ingress queue with the specified capacity
	pub fn new(capacity: usize) -> Self {
		let (sender, receiver) = bounded(capacity);
		Self { sender, receiver }
	}

	/// Split the queue into sender and receiver ends
	///
	/// The sender can be cloned for multiple connection tasks.
	/// The receiver must remain unique for the single matching loop.
	pub fn split(self) -> (QueueSender, QueueReceiver) {
		(
			QueueSender {
				sender: self.sender,
			},
			QueueReceiver {
				receiver: self.receiver,
			},
		)
	}
}

/// Sender end of the ingress queue (used by connection tasks)
///
/// This can be cloned and shared across multiple tasks.
#[derive(Clone)]
pub struct QueueSender {
	sender: Sender<EngineCommand>,
}

impl QueueSender {
	/// Try to enqueue a command (non-blocking)
	///
	/// Returns an error when the queue is full, signalling that the
	/// matching loop is falling behind.
	pub fn try_enqueue(&self, command: EngineCommand) -> Result<(), QueueError> {
		self.sender.try_send(command).map_err(|e| match e {
			TrySendError::Full(_) => QueueError::Full,
			TrySendError::Disconnected(_) => QueueError::Disconnected,
		})
	}

	/// Enqueue a command from an async task, waiting out backpressure.
	///
	/// A full queue is retried with a short sleep; the command is
	/// handed back by the channel on each failed attempt, so nothing
	/// is ever dropped.
	pub async fn enqueue(&self, command: EngineCommand) -> Result<(), QueueError> {
		let mut pending = command;
		loop {
			match self.sender.try_send(pending) {
				Ok(()) => return Ok(()),
				Err(TrySendError::Full(returned)) => {
					pending = returned;
					tokio::time::sleep(std::time::Duration::from_millis(1)).await;
				}
				Err(TrySendError::Disconnected(_)) => return Err(QueueError::Disconnected),
			}
		}
	}

	/// Check if the queue is full
	pub fn is_full(&self) -> bool {
		self.sender.is_full()
	}
}

/// Receiver end of the ingress queue (used by the matching loop)
///
/// This should NOT be cloned - only one matching loop should consume.
pub struct QueueReceiver {
	receiver: Receiver<EngineCommand>,
}

impl QueueReceiver {
	/// Receive a command (blocking)
	pub fn recv(&self) -> Result<EngineCommand, QueueError> {
		self.receiver.recv().map_err(|_| QueueError::Disconnected)
	}

	/// Try to receive a command (non-blocking)
	///
	/// Used by the matching loop so it can interleave shutdown checks
	/// with draining the queue.
	pub fn try_recv(&self) -> Result<EngineCommand, QueueError> {
		self.receiver.try_recv().map_err(|e| match e {
			TryRecvError::Empty => QueueError::Empty,
			TryRecvError::Disconnected => QueueError::Disconnected,
		})
	}
}

/// Errors that can occur when interacting with the ingress queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("Queue is full")]
	Full,
	#[error("Queue is empty")]
	Empty,
	#[error("Queue disconnected")]
	Disconnected,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn enqueue_and_recv() {
		let queue = IngressQueue::new(10);
		let (sender, receiver) = queue.split();

		sender.try_enqueue(EngineCommand::TraderLeft(7)).unwrap();

		let received = receiver.recv().unwrap();
		assert!(matches!(received, EngineCommand::TraderLeft(7)));
	}

	#[test]
	fn queue_full() {
		let queue = IngressQueue::new(2);
		let (sender, _receiver) = queue.split();

		sender.try_enqueue(EngineCommand::TraderLeft(1)).unwrap();
		sender.try_enqueue(EngineCommand::TraderLeft(2)).unwrap();

		let result = sender.try_enqueue(EngineCommand::TraderLeft(3));
		assert!(matches!(result, Err(QueueError::Full)));
		assert!(sender.is_full());
	}

	#[test]
	fn multiple_senders_share_one_queue() {
		let queue = IngressQueue::new(10);
		let (sender, receiver) = queue.split();

		let first = sender.clone();
		let second = sender.clone();

		first.try_enqueue(EngineCommand::TraderLeft(1)).unwrap();
		second.try_enqueue(EngineCommand::ObserverLeft(2)).unwrap();

		assert!(matches!(receiver.recv().unwrap(), EngineCommand::TraderLeft(1)));
		assert!(matches!(
			receiver.recv().unwrap(),
			EngineCommand::ObserverLeft(2)
		));
	}

	#[test]
	fn recv_after_senders_dropped_disconnects() {
		let queue = IngressQueue::new(2);
		let (sender, receiver) = queue.split();
		drop(sender);

		assert!(matches!(receiver.recv(), Err(QueueError::Disconnected)));
	}
}
