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

use serde::{Deserialize, Serialize};

/// Order identifier, unique per trader. Market orders carry id 0 and
/// never rest in the book.
pub type OrderId = u64;

/// Price in integer ticks.
pub type Price = u64;

/// Order quantity.
pub type Quantity = u64;

/// Order side (buy or sell)
///
/// The wire tokens are exactly `"BUY"` and `"SELL"`, case-sensitive.
/// The same tokens appear in inbound `createOrder` requests and in
/// outbound `orderbook` depth updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
	Buy,
	Sell,
}

impl Side {
	/// Parse a wire token. Returns `None` for anything but the two
	/// canonical tokens.
	pub fn from_token(token: &str) -> Option<Self> {
		match token {
			"BUY" => Some(Side::Buy),
			"SELL" => Some(Side::Sell),
			_ => None,
		}
	}

	/// The canonical wire token for this side.
	pub fn token(self) -> &'static str {
		match self {
			Side::Buy => "BUY",
			Side::Sell => "SELL",
		}
	}

	/// The side an order on this side matches against.
	pub fn opposite(self) -> Self {
		match self {
			Side::Buy => Side::Sell,
			Side::Sell => Side::Buy,
		}
	}
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
	Limit,
	Market,
}
