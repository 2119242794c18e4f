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

//! Engine thread
//!
//! Runs the matcher on a dedicated single thread, consuming commands
//! from the ingress queue. Each command runs to completion - including
//! every outbound message it generates - before the next one is
//! dequeued, which gives the ordering guarantee: all effects of an
//! earlier inbound message are observable to every participant
//! strictly before any effect of a later one.

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	thread::{self, JoinHandle},
};

use tracing::{error, info, warn};

use crate::{
	matcher::Matcher,
	queue::{QueueError, QueueReceiver},
	registry::{Participant, ParticipantId},
};

/// One serialized unit of work for the matching loop
///
/// Joins and leaves travel the same queue as message frames, so the
/// registry changes in the same total order the messages arrived in.
/// Frames stay raw here; the matcher owns decoding so it can answer
/// malformed input with a protocol error instead of dropping it.
#[derive(Debug)]
pub enum EngineCommand {
	TraderJoined(Arc<Participant>),
	TraderLeft(ParticipantId),
	TraderMessage {
		trader: Arc<Participant>,
		line: String,
	},
	ObserverJoined(Arc<Participant>),
	ObserverLeft(ParticipantId),
	ObserverMessage {
		observer: Arc<Participant>,
		line: String,
	},
	Shutdown,
}

/// Configuration for the matching engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub symbol: String,
	pub verbose_logging: bool,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			symbol: "CRUCIBLE".to_string(),
			verbose_logging: false,
		}
	}
}

/// Handle to the running matching loop
///
/// The loop thread owns the matcher exclusively; this handle only
/// carries the shutdown flag and the join handle.
pub struct Engine {
	thread_handle: Option<JoinHandle<()>>,
	shutdown: Arc<AtomicBool>,
}

impl Engine {
	/// Start the matching loop on its own thread.
	pub fn start(config: EngineConfig, receiver: QueueReceiver) -> Self {
		let shutdown = Arc::new(AtomicBool::new(false));
		let shutdown_flag = shutdown.clone();

		let thread_handle = thread::Builder::new()
			.name("matching-loop".to_string())
			.spawn(move || {
				info!(symbol = %config.symbol, "matching engine started");
				let mut matcher = Matcher::new(&config);
				Self::run_matching_loop(&mut matcher, &receiver, &shutdown_flag);
				info!("matching engine stopped");
			})
			.expect("Failed to spawn matching engine thread");

		Self {
			thread_handle: Some(thread_handle),
			shutdown,
		}
	}

	/// Main matching loop - the heart of the engine
	///
	/// Dequeues one command at a time and hands it to the matcher.
	/// There are no suspension points inside command processing, so
	/// observers can never see a half-matched book.
	fn run_matching_loop(
		matcher: &mut Matcher,
		receiver: &QueueReceiver,
		shutdown: &Arc<AtomicBool>,
	) {
		loop {
			if shutdown.load(Ordering::Relaxed) {
				break;
			}

			let command = match receiver.try_recv() {
				Ok(command) => command,
				Err(QueueError::Empty) => {
					std::thread::sleep(std::time::Duration::from_millis(1));
					continue;
				}
				Err(err) => {
					error!(%err, "ingress queue unavailable");
					break;
				}
			};

			if matches!(command, EngineCommand::Shutdown) {
				info!("shutdown command received");
				break;
			}

			matcher.handle(command);
		}
	}

	/// Shutdown the matching engine gracefully
	pub fn shutdown(mut self) {
		info!("shutting down matching engine");
		self.shutdown.store(true, Ordering::Relaxed);

		if let Some(handle) = self.thread_handle.take()
			&& let Err(err) = handle.join()
		{
			warn!("matching engine thread panicked: {:?}", err);
		}
	}
}

impl Drop for Engine {
	fn drop(&mut self) {
		self.shutdown.store(true, Ordering::Relaxed);
		if let Some(handle) = self.thread_handle.take() {
			let _ = handle.join();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::queue::IngressQueue;
	use crate::registry::Role;
	use crucible_sdk::{Request, ServerMessage, Side};
	use std::time::Duration;
	use tokio::sync::mpsc::{self, UnboundedReceiver};

	fn create_test_participant(
		id: ParticipantId,
		role: Role,
	) -> (Arc<Participant>, UnboundedReceiver<String>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(
			Arc::new(Participant::new(id, role, format!("peer-{id}"), tx)),
			rx,
		)
	}

	fn frame(request: &Request) -> String {
		serde_json::to_string(request).unwrap()
	}

	fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<ServerMessage> {
		let mut out = Vec::new();
		while let Ok(line) = rx.try_recv() {
			out.push(serde_json::from_str(&line).unwrap());
		}
		out
	}

	#[test]
	fn engine_matches_orders_from_the_queue() {
		let queue = IngressQueue::new(64);
		let (sender, receiver) = queue.split();
		let engine = Engine::start(EngineConfig::default(), receiver);

		let (alice, mut alice_rx) = create_test_participant(1, Role::Trader);
		let (bob, mut bob_rx) = create_test_participant(2, Role::Trader);

		sender
			.try_enqueue(EngineCommand::TraderJoined(alice.clone()))
			.unwrap();
		sender
			.try_enqueue(EngineCommand::TraderJoined(bob.clone()))
			.unwrap();
		sender
			.try_enqueue(EngineCommand::TraderMessage {
				trader: alice.clone(),
				line: frame(&Request::limit(1, Side::Buy, 100, 10)),
			})
			.unwrap();
		sender
			.try_enqueue(EngineCommand::TraderMessage {
				trader: bob.clone(),
				line: frame(&Request::limit(1, Side::Sell, 100, 10)),
			})
			.unwrap();

		std::thread::sleep(Duration::from_millis(200));

		assert_eq!(
			drain(&mut alice_rx),
			vec![
				ServerMessage::OrderCreated { order_id: 1 },
				ServerMessage::OrderExecuted {
					order_id: 1,
					quantity: 10,
					remaining: 0,
					price: 100,
				},
			]
		);
		assert_eq!(
			drain(&mut bob_rx),
			vec![ServerMessage::OrderExecuted {
				order_id: 1,
				quantity: 10,
				remaining: 0,
				price: 100,
			}]
		);

		engine.shutdown();
	}

	#[test]
	fn shutdown_command_stops_the_loop() {
		let queue = IngressQueue::new(8);
		let (sender, receiver) = queue.split();
		let engine = Engine::start(EngineConfig::default(), receiver);

		sender.try_enqueue(EngineCommand::Shutdown).unwrap();
		std::thread::sleep(Duration::from_millis(100));

		// The loop has exited; joining must not hang.
		engine.shutdown();
	}
}
