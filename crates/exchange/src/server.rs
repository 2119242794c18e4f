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

//! TCP transport
//!
//! Two listeners: traders on one port, market-data observers on the
//! other. Frames are newline-delimited JSON. The transport does no
//! decoding and holds no engine state; every event - join, inbound
//! line, leave - is funnelled into the ingress queue, and outbound
//! frames flow back through a per-connection channel drained by a
//! writer task.

use std::{
	net::SocketAddr,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
};

use anyhow::{Context, Result};
use tokio::{
	io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
	net::{
		TcpListener, TcpStream,
		tcp::{OwnedReadHalf, OwnedWriteHalf},
	},
	sync::mpsc::{self, UnboundedReceiver},
};
use tracing::{debug, info, warn};

use crate::{
	config::ExchangeConfig,
	engine::EngineCommand,
	queue::QueueSender,
	registry::{Participant, ParticipantId, Role},
};

static NEXT_PARTICIPANT_ID: AtomicU64 = AtomicU64::new(1);

fn next_participant_id() -> ParticipantId {
	NEXT_PARTICIPANT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The two listening sockets of one exchange instance
pub struct ExchangeServer {
	trader_listener: TcpListener,
	observer_listener: TcpListener,
}

impl ExchangeServer {
	/// Bind both listeners. Binding to port 0 picks free ports, which
	/// the integration tests rely on.
	pub async fn bind(config: &ExchangeConfig) -> Result<Self> {
		let trader_listener = TcpListener::bind(config.trader_addr)
			.await
			.with_context(|| format!("failed to bind trader port {}", config.trader_addr))?;
		let observer_listener = TcpListener::bind(config.observer_addr)
			.await
			.with_context(|| format!("failed to bind observer port {}", config.observer_addr))?;

		Ok(Self {
			trader_listener,
			observer_listener,
		})
	}

	pub fn trader_addr(&self) -> Result<SocketAddr> {
		Ok(self.trader_listener.local_addr()?)
	}

	pub fn observer_addr(&self) -> Result<SocketAddr> {
		Ok(self.observer_listener.local_addr()?)
	}

	/// Accept connections on both ports until the process exits.
	pub async fn serve(self, sender: QueueSender) -> Result<()> {
		let traders = tokio::spawn(accept_loop(self.trader_listener, Role::Trader, sender.clone()));
		let observers = tokio::spawn(accept_loop(self.observer_listener, Role::Observer, sender));

		let (traders, observers) = tokio::try_join!(traders, observers)?;
		traders?;
		observers?;
		Ok(())
	}
}

async fn accept_loop(listener: TcpListener, role: Role, sender: QueueSender) -> Result<()> {
	let local = listener.local_addr()?;
	info!(%local, ?role, "listening");

	loop {
		match listener.accept().await {
			Ok((stream, peer)) => {
				tokio::spawn(handle_connection(stream, peer, role, sender.clone()));
			}
			Err(err) => {
				// Transient accept errors (e.g. fd exhaustion) should
				// not take the listener down.
				warn!(%local, %err, "accept failed");
				tokio::time::sleep(std::time::Duration::from_millis(50)).await;
			}
		}
	}
}

/// One connection: register with the engine, pump inbound lines into
/// the ingress queue, and deregister on EOF or transport error.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, role: Role, sender: QueueSender) {
	let id = next_participant_id();
	let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
	let participant = Arc::new(Participant::new(id, role, peer.to_string(), outbound_tx));

	let (read_half, write_half) = stream.into_split();
	tokio::spawn(write_outbound(write_half, outbound_rx, peer));

	let joined = match role {
		Role::Trader => EngineCommand::TraderJoined(participant.clone()),
		Role::Observer => EngineCommand::ObserverJoined(participant.clone()),
	};
	if sender.enqueue(joined).await.is_err() {
		warn!(%peer, "engine gone; dropping connection");
		return;
	}

	read_inbound(read_half, &participant, role, &sender).await;

	let left = match role {
		Role::Trader => EngineCommand::TraderLeft(id),
		Role::Observer => EngineCommand::ObserverLeft(id),
	};
	let _ = sender.enqueue(left).await;
}

async fn read_inbound(
	read_half: OwnedReadHalf,
	participant: &Arc<Participant>,
	role: Role,
	sender: &QueueSender,
) {
	let mut lines = BufReader::new(read_half).lines();
	loop {
		match lines.next_line().await {
			Ok(Some(line)) => {
				let line = line.trim();
				if line.is_empty() {
					continue;
				}
				let command = match role {
					Role::Trader => EngineCommand::TraderMessage {
						trader: participant.clone(),
						line: line.to_string(),
					},
					Role::Observer => EngineCommand::ObserverMessage {
						observer: participant.clone(),
						line: line.to_string(),
					},
				};
				if sender.enqueue(command).await.is_err() {
					return;
				}
			}
			Ok(None) => {
				debug!(peer = %participant.peer(), "connection closed");
				return;
			}
			Err(err) => {
				debug!(peer = %participant.peer(), %err, "read failed");
				return;
			}
		}
	}
}

/// Drain the participant's outbound channel onto the socket. Exits
/// when the channel closes (participant fully dropped) or the write
/// fails; a failed write leaves the channel to fill the registry's
/// eviction path on the next send.
async fn write_outbound(
	mut write_half: OwnedWriteHalf,
	mut outbound: UnboundedReceiver<String>,
	peer: SocketAddr,
) {
	while let Some(mut frame) = outbound.recv().await {
		frame.push('\n');
		if let Err(err) = write_half.write_all(frame.as_bytes()).await {
			debug!(%peer, %err, "write failed");
			return;
		}
	}
}
