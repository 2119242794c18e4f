// Copyright 2025 chenjjiaa
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

//! Exchange service entry point
//!
//! Starts one engine instance bound to the configured trader and
//! observer ports. Configuration comes from an optional file argument
//! plus EXCHANGE_* environment variables; no flag affects matching
//! behavior. The book is in-memory only - a restart empties it.

use anyhow::Result;
use tokio::signal;
use tracing::info;

use crucible_exchange::{
	Engine, EngineCommand, EngineConfig, ExchangeConfig, ExchangeServer, IngressQueue, logging,
};

#[tokio::main]
async fn main() -> Result<()> {
	// A panicked matching loop means corrupt engine state; take the
	// whole process down instead of serving from a broken book.
	let default_hook = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_hook(info);
		std::process::abort();
	}));

	let config = match std::env::args().nth(1) {
		Some(path) => ExchangeConfig::from_file(&path)?,
		None => ExchangeConfig::from_env()?,
	};

	logging::init_logging()?;

	info!(target: "server", "Starting Crucible Exchange");
	info!(target: "server", "Symbol: {}", config.symbol);

	let queue = IngressQueue::new(config.queue_capacity);
	let (sender, receiver) = queue.split();

	let engine = Engine::start(
		EngineConfig {
			symbol: config.symbol.clone(),
			verbose_logging: config.verbose_logging,
		},
		receiver,
	);

	let server = ExchangeServer::bind(&config).await?;
	info!(target: "server", "Trader port: {}", server.trader_addr()?);
	info!(target: "server", "Observer port: {}", server.observer_addr()?);

	tokio::select! {
		result = server.serve(sender.clone()) => result?,
		_ = signal::ctrl_c() => {
			info!(target: "server", "Shutdown signal received");
		}
	}

	let _ = sender.try_enqueue(EngineCommand::Shutdown);
	engine.shutdown();

	Ok(())
}
