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

//! Crucible Exchange
//!
//! This crate provides a deterministic, single-instrument CLOB exchange
//! simulator. It maintains an in-memory order book with price-time
//! priority, matches incoming orders against resting liquidity, and
//! fans out lifecycle and depth-of-book messages to connected
//! participants.
//!
//! Architecture:
//! - Single-threaded matching core for deterministic behavior
//! - MPSC ingress queue funnelling multi-threaded TCP ingress
//! - Dual-indexed order container: O(1) cancel key, price-time scan
//! - Per-connection outbound channels; broadcast evicts dead peers

pub mod book;
pub mod config;
pub mod engine;
pub mod logging;
pub mod matcher;
pub mod order;
pub mod queue;
pub mod registry;
pub mod server;

pub use book::OrderBook;
pub use config::ExchangeConfig;
pub use engine::{Engine, EngineCommand, EngineConfig};
pub use matcher::Matcher;
pub use order::{Order, OrderError, OrderKey};
pub use queue::{IngressQueue, QueueError, QueueReceiver, QueueSender};
pub use registry::{DeliveryError, Participant, ParticipantId, Registry, Role};
pub use server::ExchangeServer;
