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

//! Order record
//!
//! An [`Order`] is built from a decoded inbound envelope and is
//! immutable after construction except for its residual quantity,
//! which only ever decreases as fills occur.
//!
//! Market orders are priced at the extreme of their side (`u64::MAX`
//! for a buy, `0` for a sell, with real limit prices always >= 1), so
//! the cross comparator treats market and limit orders uniformly.

use std::{
	fmt,
	sync::{Arc, Weak},
};

use serde_json::Value;
use thiserror::Error;

use crucible_sdk::{Envelope, OrderId, Price, Quantity, Side};

use crate::registry::{Participant, ParticipantId};

/// Unique key of a resting order: the submitting trader plus the
/// trader-scoped order id.
pub type OrderKey = (ParticipantId, OrderId);

/// Price assigned to market buy orders
pub const MARKET_BUY_PRICE: Price = Price::MAX;

/// Price assigned to market sell orders
pub const MARKET_SELL_PRICE: Price = 0;

/// Validation error kinds for order construction
///
/// The display strings double as reject reasons on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderError {
	#[error("side must be \"BUY\" or \"SELL\"")]
	WrongSide,
	#[error("orderId must be a positive integer")]
	OrderId,
	#[error("price must be a positive integer")]
	Price,
	#[error("quantity must be a positive integer")]
	Quantity,
}

/// A single resting or incoming order
#[derive(Debug, Clone)]
pub struct Order {
	pub is_market: bool,
	pub side: Side,
	/// Positive and unique per trader for limit orders; 0 for market
	/// orders, which never rest.
	pub order_id: OrderId,
	pub price: Price,
	/// Residual quantity, monotonically non-increasing.
	pub quantity: Quantity,
	/// Engine-assigned admission sequence; strictly increasing, so two
	/// orders never tie on (price, time).
	pub time: u64,
	/// Identity half of the unique key; survives trader disconnect.
	pub trader_id: ParticipantId,
	/// Non-owning back-reference for addressing lifecycle messages.
	pub trader: Weak<Participant>,
}

impl Order {
	/// Build a limit order from a decoded envelope.
	///
	/// Fields are validated in protocol order: side, orderId, price,
	/// quantity. Each failure maps to its own [`OrderError`] kind.
	pub fn limit(
		trader: &Arc<Participant>,
		decoded: &Envelope,
		time: u64,
	) -> Result<Self, OrderError> {
		let side = extract_side(decoded)?;
		let order_id = extract_order_id(decoded)?;
		let price = extract_price(decoded)?;
		let quantity = extract_quantity(decoded)?;

		Ok(Self {
			is_market: false,
			side,
			order_id,
			price,
			quantity,
			time,
			trader_id: trader.id(),
			trader: Arc::downgrade(trader),
		})
	}

	/// Build a market order from a decoded envelope.
	///
	/// Market orders carry no id and no price of their own; the price
	/// is pinned to the side's extreme so the order crosses every
	/// resting level.
	pub fn market(
		trader: &Arc<Participant>,
		decoded: &Envelope,
		time: u64,
	) -> Result<Self, OrderError> {
		let side = extract_side(decoded)?;
		let quantity = extract_quantity(decoded)?;
		let price = match side {
			Side::Buy => MARKET_BUY_PRICE,
			Side::Sell => MARKET_SELL_PRICE,
		};

		Ok(Self {
			is_market: true,
			side,
			order_id: 0,
			price,
			quantity,
			time,
			trader_id: trader.id(),
			trader: Arc::downgrade(trader),
		})
	}

	/// Unique (trader, orderId) key of this order.
	pub fn key(&self) -> OrderKey {
		(self.trader_id, self.order_id)
	}

	/// Whether this order, as the aggressor, crosses a resting order
	/// at `resting_price` on the opposite side.
	pub fn crosses(&self, resting_price: Price) -> bool {
		match self.side {
			Side::Buy => self.price >= resting_price,
			Side::Sell => self.price <= resting_price,
		}
	}
}

impl fmt::Display for Order {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_market {
			write!(f, "{} {} MKT", self.side.token(), self.quantity)
		} else {
			write!(
				f,
				"{} {} @ {} (id {})",
				self.side.token(),
				self.quantity,
				self.price,
				self.order_id
			)
		}
	}
}

fn extract_side(decoded: &Envelope) -> Result<Side, OrderError> {
	decoded
		.side
		.as_ref()
		.and_then(Value::as_str)
		.and_then(Side::from_token)
		.ok_or(OrderError::WrongSide)
}

/// Extract a positive integer orderId. Also used by the cancel path.
pub(crate) fn extract_order_id(decoded: &Envelope) -> Result<OrderId, OrderError> {
	positive_integer(decoded.order_id.as_ref()).ok_or(OrderError::OrderId)
}

fn extract_price(decoded: &Envelope) -> Result<Price, OrderError> {
	positive_integer(decoded.price.as_ref()).ok_or(OrderError::Price)
}

fn extract_quantity(decoded: &Envelope) -> Result<Quantity, OrderError> {
	positive_integer(decoded.quantity.as_ref()).ok_or(OrderError::Quantity)
}

/// A missing field, a non-integer value (including fractional
/// numbers), or a value < 1 all yield `None`.
fn positive_integer(value: Option<&Value>) -> Option<u64> {
	value.and_then(Value::as_u64).filter(|v| *v > 0)
}
