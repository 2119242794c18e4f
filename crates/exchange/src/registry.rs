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

//! Participant registry
//!
//! Two disjoint-by-role sets of connected participants: traders receive
//! order-lifecycle messages, observers receive depth-of-book updates.
//! The registry holds no ownership of the connection itself, only the
//! outbound channel used to hand frames to the connection's writer
//! task. Delivery is best-effort per recipient: a failed send during a
//! broadcast is logged and the dead recipient is evicted without
//! interrupting delivery to the rest.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crucible_sdk::ServerMessage;

/// Stable participant identity, assigned at connection accept. Order
/// keys embed this id, so it must outlive the connection handle.
pub type ParticipantId = u64;

/// Role of a connected participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Trader,
	Observer,
}

/// Error types for outbound delivery
#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("failed to encode outbound message: {0}")]
	Encode(#[from] serde_json::Error),
	#[error("connection closed")]
	Closed,
}

/// Handle to one connected participant
///
/// The engine addresses participants exclusively through this handle;
/// the socket itself lives in the transport task. Orders keep a `Weak`
/// reference to their submitting trader, so a `Participant` is dropped
/// as soon as the registry and transport let go of it.
#[derive(Debug)]
pub struct Participant {
	id: ParticipantId,
	role: Role,
	peer: String,
	outbound: UnboundedSender<String>,
}

impl Participant {
	pub fn new(
		id: ParticipantId,
		role: Role,
		peer: impl Into<String>,
		outbound: UnboundedSender<String>,
	) -> Self {
		Self {
			id,
			role,
			peer: peer.into(),
			outbound,
		}
	}

	pub fn id(&self) -> ParticipantId {
		self.id
	}

	pub fn role(&self) -> Role {
		self.role
	}

	pub fn peer(&self) -> &str {
		&self.peer
	}

	/// Serialize and enqueue one outbound message.
	pub fn send(&self, message: &ServerMessage) -> Result<(), DeliveryError> {
		let frame = serde_json::to_string(message)?;
		self.send_frame(frame)
	}

	/// Enqueue an already-serialized frame.
	pub fn send_frame(&self, frame: String) -> Result<(), DeliveryError> {
		self.outbound
			.send(frame)
			.map_err(|_| DeliveryError::Closed)
	}
}

/// Registry of connected traders and observers
#[derive(Debug, Default)]
pub struct Registry {
	traders: HashMap<ParticipantId, Arc<Participant>>,
	observers: HashMap<ParticipantId, Arc<Participant>>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_trader(&mut self, trader: Arc<Participant>) {
		self.traders.insert(trader.id(), trader);
	}

	/// Remove a trader. Removing an unknown id is a no-op so that
	/// disconnection races cannot crash the engine.
	pub fn remove_trader(&mut self, id: ParticipantId) -> Option<Arc<Participant>> {
		self.traders.remove(&id)
	}

	pub fn add_observer(&mut self, observer: Arc<Participant>) {
		self.observers.insert(observer.id(), observer);
	}

	pub fn remove_observer(&mut self, id: ParticipantId) -> Option<Arc<Participant>> {
		self.observers.remove(&id)
	}

	pub fn trader_count(&self) -> usize {
		self.traders.len()
	}

	pub fn observer_count(&self) -> usize {
		self.observers.len()
	}

	/// Deliver one message to every trader, evicting dead connections.
	pub fn send_to_all_traders(&mut self, message: &ServerMessage) {
		Self::broadcast(&mut self.traders, message);
	}

	/// Deliver one message to every observer, evicting dead connections.
	pub fn send_to_all_observers(&mut self, message: &ServerMessage) {
		Self::broadcast(&mut self.observers, message);
	}

	fn broadcast(recipients: &mut HashMap<ParticipantId, Arc<Participant>>, message: &ServerMessage) {
		let frame = match serde_json::to_string(message) {
			Ok(frame) => frame,
			Err(err) => {
				warn!(%err, "failed to encode broadcast message");
				return;
			}
		};

		let mut dead = Vec::new();
		for (id, participant) in recipients.iter() {
			if participant.send_frame(frame.clone()).is_err() {
				debug!(peer = %participant.peer(), "broadcast recipient gone");
				dead.push(*id);
			}
		}

		for id in dead {
			if let Some(participant) = recipients.remove(&id) {
				warn!(peer = %participant.peer(), "evicted unreachable participant");
			}
		}
	}
}
