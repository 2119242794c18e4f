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

//! Dual-indexed order container
//!
//! One owning map keyed by (trader, orderId) gives O(1) cancel and
//! duplicate detection; two price-time ordered secondary indexes hold
//! keys into it for the match scan. Both indexes always describe the
//! same order set; a divergence means the engine state is corrupt and
//! the process must not continue.
//!
//! Priority order:
//! - Buy side: highest price first, then earliest admission
//! - Sell side: lowest price first, then earliest admission
//!
//! Admission times are strictly increasing, so (price, time) is unique
//! per side and no further tiebreak is needed.

use std::{
	cmp::Reverse,
	collections::{BTreeMap, HashMap, btree_map},
	iter::Peekable,
};

use crucible_sdk::{Price, Quantity, Side};

use crate::order::{Order, OrderKey};
use crate::registry::ParticipantId;

/// The set of resting orders, indexed for cancel and for matching
#[derive(Debug, Default)]
pub struct OrderBook {
	/// Owning store, keyed by (trader, orderId)
	orders: HashMap<OrderKey, Order>,
	/// Buy side: (price high to low, time) -> key
	bids: BTreeMap<(Reverse<Price>, u64), OrderKey>,
	/// Sell side: (price low to high, time) -> key
	asks: BTreeMap<(Price, u64), OrderKey>,
}

impl OrderBook {
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether an order with this (trader, orderId) key is resting.
	pub fn contains_key(&self, key: &OrderKey) -> bool {
		self.orders.contains_key(key)
	}

	/// Add an order to both indexes.
	///
	/// The caller must have checked for a duplicate key and matched
	/// the order first; a duplicate, a market order, a zero quantity,
	/// or an insert that would cross the book is engine corruption.
	pub fn insert(&mut self, order: Order) {
		let key = order.key();
		assert!(!order.is_market, "market orders never rest");
		assert!(order.quantity > 0, "resting orders carry positive quantity");
		assert!(
			!self.orders.contains_key(&key),
			"duplicate resting order key {key:?}"
		);
		if let Some(best) = self.best(order.side.opposite())
			&& order.crosses(best.price)
		{
			panic!("inserting {order} would cross the book at {}", best.price);
		}

		match order.side {
			Side::Buy => {
				self.bids.insert((Reverse(order.price), order.time), key);
			}
			Side::Sell => {
				self.asks.insert((order.price, order.time), key);
			}
		}
		self.orders.insert(key, order);
	}

	/// Remove an order from both indexes, returning it if present.
	pub fn remove(&mut self, key: &OrderKey) -> Option<Order> {
		let order = self.orders.remove(key)?;
		let indexed = match order.side {
			Side::Buy => self.bids.remove(&(Reverse(order.price), order.time)),
			Side::Sell => self.asks.remove(&(order.price, order.time)),
		};
		match indexed {
			Some(indexed) if indexed == *key => Some(order),
			_ => panic!("order container indexes diverged at {key:?}"),
		}
	}

	pub fn get(&self, key: &OrderKey) -> Option<&Order> {
		self.orders.get(key)
	}

	/// Key of the best resting order on a side, if any.
	pub fn best_key(&self, side: Side) -> Option<OrderKey> {
		match side {
			Side::Buy => self.bids.first_key_value().map(|(_, key)| *key),
			Side::Sell => self.asks.first_key_value().map(|(_, key)| *key),
		}
	}

	/// The best resting order on a side, if any.
	pub fn best(&self, side: Side) -> Option<&Order> {
		self.best_key(side)
			.map(|key| self.lookup(&key))
	}

	/// Reduce an order's residual quantity, returning the remainder.
	/// The caller removes the order once the remainder hits zero.
	pub fn fill(&mut self, key: &OrderKey, quantity: Quantity) -> Quantity {
		let order = self
			.orders
			.get_mut(key)
			.unwrap_or_else(|| panic!("fill of unknown order {key:?}"));
		assert!(
			quantity <= order.quantity,
			"fill exceeds residual quantity of {key:?}"
		);
		order.quantity -= quantity;
		order.quantity
	}

	/// Lazy (price, aggregate quantity) sequence for one side, best
	/// level first. Observers only ever see these aggregates.
	pub fn depth(&self, side: Side) -> Depth<'_> {
		let keys = match side {
			Side::Buy => KeyIter::Bids(self.bids.values()),
			Side::Sell => KeyIter::Asks(self.asks.values()),
		};
		Depth {
			orders: &self.orders,
			keys: keys.peekable(),
		}
	}

	/// Aggregate resting quantity at one price level; 0 when empty.
	pub fn level_quantity(&self, side: Side, price: Price) -> Quantity {
		match side {
			Side::Buy => self
				.bids
				.range((Reverse(price), 0)..=(Reverse(price), u64::MAX))
				.map(|(_, key)| self.lookup(key).quantity)
				.sum(),
			Side::Sell => self
				.asks
				.range((price, 0)..=(price, u64::MAX))
				.map(|(_, key)| self.lookup(key).quantity)
				.sum(),
		}
	}

	/// Keys of every resting order owned by one trader. Used to purge
	/// the book when a trader disconnects.
	pub fn keys_of_trader(&self, trader_id: ParticipantId) -> Vec<OrderKey> {
		self.orders
			.keys()
			.filter(|(owner, _)| *owner == trader_id)
			.copied()
			.collect()
	}

	/// Total resting quantity on one side, across all levels.
	pub fn total_quantity(&self, side: Side) -> Quantity {
		self.depth(side).map(|(_, quantity)| quantity).sum()
	}

	pub fn order_count(&self) -> usize {
		self.orders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}

	fn lookup(&self, key: &OrderKey) -> &Order {
		self.orders
			.get(key)
			.unwrap_or_else(|| panic!("price index references missing order {key:?}"))
	}
}

enum KeyIter<'a> {
	Bids(btree_map::Values<'a, (Reverse<Price>, u64), OrderKey>),
	Asks(btree_map::Values<'a, (Price, u64), OrderKey>),
}

impl<'a> Iterator for KeyIter<'a> {
	type Item = &'a OrderKey;

	fn next(&mut self) -> Option<Self::Item> {
		match self {
			KeyIter::Bids(inner) => inner.next(),
			KeyIter::Asks(inner) => inner.next(),
		}
	}
}

/// Iterator returned by [`OrderBook::depth`]; groups consecutive
/// same-price orders into one aggregate without materializing levels.
pub struct Depth<'a> {
	orders: &'a HashMap<OrderKey, Order>,
	keys: Peekable<KeyIter<'a>>,
}

impl Iterator for Depth<'_> {
	type Item = (Price, Quantity);

	fn next(&mut self) -> Option<Self::Item> {
		let key = self.keys.next()?;
		let order = self
			.orders
			.get(key)
			.unwrap_or_else(|| panic!("price index references missing order {key:?}"));
		let price = order.price;
		let mut quantity = order.quantity;

		while let Some(&&next_key) = self.keys.peek() {
			let next = self
				.orders
				.get(&next_key)
				.unwrap_or_else(|| panic!("price index references missing order {next_key:?}"));
			if next.price != price {
				break;
			}
			quantity += next.quantity;
			self.keys.next();
		}

		Some((price, quantity))
	}
}
