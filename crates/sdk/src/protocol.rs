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

//! Wire protocol schema
//!
//! Every frame is one line of JSON. Inbound frames are decoded into a
//! permissive [`Envelope`] so the engine can report field-level
//! validation failures instead of a single opaque decode error; the
//! typed [`Request`] enum is the client-side view of the same schema.
//!
//! Inbound fields:
//!
//! | Field       | Values                          |
//! |-------------|---------------------------------|
//! | `message`   | `"createOrder"`, `"cancelOrder"`|
//! | `orderType` | `"limit"`, `"market"`           |
//! | `side`      | `"BUY"`, `"SELL"`               |
//! | `orderId`   | positive integer                |
//! | `price`     | positive integer ticks          |
//! | `quantity`  | positive integer                |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{OrderId, OrderType, Price, Quantity, Side};

/// Typed inbound request, as built by trader clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message")]
pub enum Request {
	#[serde(rename = "createOrder")]
	CreateOrder {
		#[serde(rename = "orderType")]
		order_type: OrderType,
		side: Side,
		/// Required for limit orders; absent for market orders.
		#[serde(rename = "orderId", skip_serializing_if = "Option::is_none")]
		order_id: Option<OrderId>,
		/// Required for limit orders; absent for market orders.
		#[serde(skip_serializing_if = "Option::is_none")]
		price: Option<Price>,
		quantity: Quantity,
	},
	#[serde(rename = "cancelOrder")]
	CancelOrder {
		#[serde(rename = "orderId")]
		order_id: OrderId,
	},
}

impl Request {
	/// A day-GTC limit order.
	pub fn limit(order_id: OrderId, side: Side, price: Price, quantity: Quantity) -> Self {
		Request::CreateOrder {
			order_type: OrderType::Limit,
			side,
			order_id: Some(order_id),
			price: Some(price),
			quantity,
		}
	}

	/// An immediate market order. Market orders carry no id and any
	/// unfilled remainder is discarded by the engine.
	pub fn market(side: Side, quantity: Quantity) -> Self {
		Request::CreateOrder {
			order_type: OrderType::Market,
			side,
			order_id: None,
			price: None,
			quantity,
		}
	}

	pub fn cancel(order_id: OrderId) -> Self {
		Request::CancelOrder { order_id }
	}
}

/// Permissive inbound frame, as decoded by the engine.
///
/// Every field is optional and the value fields stay untyped so the
/// engine can distinguish a missing `price` from a non-integer one and
/// answer with the precise validation error. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
	pub message: Option<String>,
	#[serde(rename = "orderType")]
	pub order_type: Option<String>,
	pub side: Option<Value>,
	#[serde(rename = "orderId")]
	pub order_id: Option<Value>,
	pub price: Option<Value>,
	pub quantity: Option<Value>,
}

/// Decode one inbound frame into an [`Envelope`].
pub fn decode(line: &str) -> Result<Envelope, serde_json::Error> {
	serde_json::from_str(line)
}

/// Outbound message, addressed to one trader or broadcast to all
/// observers (`OrderBook` only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message")]
pub enum ServerMessage {
	/// One fill; sent to both counterparties of a trade. `price` is
	/// the resting order's price.
	#[serde(rename = "orderExecuted")]
	OrderExecuted {
		#[serde(rename = "orderId")]
		order_id: OrderId,
		quantity: Quantity,
		remaining: Quantity,
		price: Price,
	},
	/// Limit order accepted and resting in the book.
	#[serde(rename = "orderCreated")]
	OrderCreated {
		#[serde(rename = "orderId")]
		order_id: OrderId,
	},
	#[serde(rename = "orderCancelled")]
	OrderCancelled {
		#[serde(rename = "orderId")]
		order_id: OrderId,
	},
	#[serde(rename = "cancelReject")]
	CancelReject {
		#[serde(rename = "orderId")]
		order_id: OrderId,
		reason: String,
	},
	#[serde(rename = "createOrderReject")]
	CreateOrderReject {
		#[serde(rename = "orderId")]
		order_id: OrderId,
		reason: String,
	},
	/// Market order residual that could not be matched; the filled
	/// portion has already been reported through `OrderExecuted`.
	#[serde(rename = "orderUnfilled")]
	OrderUnfilled {
		#[serde(rename = "orderId")]
		order_id: OrderId,
		quantity: Quantity,
	},
	#[serde(rename = "error")]
	Error { text: String },
	/// Aggregate quantity now resting at one price level. Quantity 0
	/// means the level is gone. Broadcast to observers only.
	#[serde(rename = "orderbook")]
	OrderBook {
		price: Price,
		side: Side,
		quantity: Quantity,
	},
}
