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

//! Async TCP clients for the two participant roles
//!
//! Both clients speak the line-delimited JSON protocol from
//! [`crate::protocol`]. A [`TraderClient`] connects to the trader port
//! and submits requests; an [`ObserverClient`] connects to the
//! market-data port and consumes depth updates.

use thiserror::Error;
use tokio::{
	io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
	net::{
		TcpStream, ToSocketAddrs,
		tcp::{OwnedReadHalf, OwnedWriteHalf},
	},
};

use crate::protocol::{Request, ServerMessage};

/// Error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("transport error: {0}")]
	Io(#[from] std::io::Error),
	#[error("codec error: {0}")]
	Codec(#[from] serde_json::Error),
	#[error("connection closed by server")]
	Closed,
}

struct Connection {
	lines: Lines<BufReader<OwnedReadHalf>>,
	writer: OwnedWriteHalf,
}

impl Connection {
	async fn open<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
		let stream = TcpStream::connect(addr).await?;
		let (read_half, write_half) = stream.into_split();
		Ok(Self {
			lines: BufReader::new(read_half).lines(),
			writer: write_half,
		})
	}

	async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
		self.writer.write_all(line.as_bytes()).await?;
		self.writer.write_all(b"\n").await?;
		Ok(())
	}

	async fn next_message(&mut self) -> Result<ServerMessage, ClientError> {
		let line = self.lines.next_line().await?.ok_or(ClientError::Closed)?;
		Ok(serde_json::from_str(&line)?)
	}
}

/// Client for the trader port.
pub struct TraderClient {
	connection: Connection,
}

impl TraderClient {
	pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
		Ok(Self {
			connection: Connection::open(addr).await?,
		})
	}

	/// Send one typed request.
	pub async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
		let frame = serde_json::to_string(request)?;
		self.connection.send_line(&frame).await
	}

	/// Send one raw frame, bypassing the typed schema. Intended for
	/// exercising the engine's validation paths.
	pub async fn send_raw(&mut self, frame: &str) -> Result<(), ClientError> {
		self.connection.send_line(frame).await
	}

	/// Wait for the next message addressed to this trader.
	pub async fn next(&mut self) -> Result<ServerMessage, ClientError> {
		self.connection.next_message().await
	}
}

/// Client for the market-data port.
pub struct ObserverClient {
	connection: Connection,
}

impl ObserverClient {
	pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
		Ok(Self {
			connection: Connection::open(addr).await?,
		})
	}

	/// Send one raw frame. Observers have no commands; the engine
	/// answers any input with an `error` message.
	pub async fn send_raw(&mut self, frame: &str) -> Result<(), ClientError> {
		self.connection.send_line(frame).await
	}

	/// Wait for the next depth update.
	pub async fn next(&mut self) -> Result<ServerMessage, ClientError> {
		self.connection.next_message().await
	}
}
