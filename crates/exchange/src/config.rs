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

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Component name used for the log directory and file prefix
pub const LOG_COMPONENT_NAME: &str = "exchange";

/// Default log level when RUST_LOG is not set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Whether logs are mirrored to stderr by default
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

/// Exchange service configuration
///
/// Trader and observer connections are accepted on separate ports; the
/// instrument symbol is display-only (one engine instance serves
/// exactly one instrument).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
	/// Trader port bind address
	pub trader_addr: SocketAddr,
	/// Market-data (observer) port bind address
	pub observer_addr: SocketAddr,
	/// Instrument symbol
	pub symbol: String,
	/// Ingress queue capacity
	pub queue_capacity: usize,
	/// Log every processed command at debug level
	pub verbose_logging: bool,
}

impl Default for ExchangeConfig {
	fn default() -> Self {
		Self {
			trader_addr: "0.0.0.0:7001".parse().unwrap(),
			observer_addr: "0.0.0.0:7002".parse().unwrap(),
			symbol: "CRUCIBLE".to_string(),
			queue_capacity: 65536,
			verbose_logging: false,
		}
	}
}

impl ExchangeConfig {
	/// Load configuration from environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("EXCHANGE"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("EXCHANGE"))
			.build()?;

		cfg.try_deserialize()
	}
}
