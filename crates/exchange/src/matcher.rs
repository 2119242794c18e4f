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

//! Matcher
//!
//! Dispatches inbound participant commands, runs the price-time
//! priority match cascade, and emits outbound messages. All matcher
//! state is owned by the single matching loop thread; a command runs
//! to completion, including every outbound emission, before the next
//! one is looked at.
//!
//! Depth updates for observers are batched per cascade: touched levels
//! are collected while matching and broadcast once at the end with
//! their post-cascade aggregates (ascending price, bid side first), so
//! observers never see a half-matched book.

use std::{
	collections::BTreeSet,
	sync::{Arc, Weak},
};

use tracing::{debug, info, warn};

use crucible_sdk::{Price, ServerMessage, Side, protocol};

use crate::{
	book::OrderBook,
	engine::{EngineCommand, EngineConfig},
	order::{self, Order},
	registry::{Participant, ParticipantId, Registry},
};

/// Price levels whose aggregate changed during one cascade.
///
/// Iteration order of the final broadcast is fixed by construction:
/// bid levels ascending, then ask levels ascending.
#[derive(Debug, Default)]
struct LevelSet {
	bids: BTreeSet<Price>,
	asks: BTreeSet<Price>,
}

impl LevelSet {
	fn touch(&mut self, side: Side, price: Price) {
		match side {
			Side::Buy => self.bids.insert(price),
			Side::Sell => self.asks.insert(price),
		};
	}
}

/// The matching engine proper
///
/// Owns the order container and the participant registry. Never
/// returns an error for bad input: every recoverable failure is
/// reported to the offending participant as an outbound message and
/// leaves the book untouched.
pub struct Matcher {
	book: OrderBook,
	registry: Registry,
	symbol: String,
	verbose: bool,
	/// Admission counter standing in for a wall clock; strictly
	/// increasing, which is all price-time priority needs.
	next_time: u64,
}

impl Matcher {
	pub fn new(config: &EngineConfig) -> Self {
		Self {
			book: OrderBook::new(),
			registry: Registry::new(),
			symbol: config.symbol.clone(),
			verbose: config.verbose_logging,
			next_time: 0,
		}
	}

	pub fn book(&self) -> &OrderBook {
		&self.book
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	/// Process one serialized engine command.
	pub fn handle(&mut self, command: EngineCommand) {
		match command {
			EngineCommand::TraderJoined(trader) => {
				info!(
					symbol = %self.symbol,
					id = trader.id(),
					peer = %trader.peer(),
					"trader connected"
				);
				self.registry.add_trader(trader);
			}
			EngineCommand::TraderLeft(id) => self.remove_trader(id),
			EngineCommand::TraderMessage { trader, line } => {
				self.on_trader_message(&trader, &line);
			}
			EngineCommand::ObserverJoined(observer) => self.add_observer(observer),
			EngineCommand::ObserverLeft(id) => {
				info!(symbol = %self.symbol, id, "observer disconnected");
				self.registry.remove_observer(id);
			}
			EngineCommand::ObserverMessage { observer, line } => {
				self.on_observer_message(&observer, &line);
			}
			// Consumed by the matching loop before dispatch.
			EngineCommand::Shutdown => {}
		}
	}

	/// Dispatch one raw frame from a trader.
	pub fn on_trader_message(&mut self, trader: &Arc<Participant>, line: &str) {
		let decoded = match protocol::decode(line) {
			Ok(decoded) => decoded,
			Err(err) => {
				debug!(peer = %trader.peer(), %err, "undecodable frame");
				self.notify(
					trader,
					&ServerMessage::Error {
						text: format!("malformed message: {err}"),
					},
				);
				return;
			}
		};

		match decoded.message.as_deref() {
			Some("createOrder") => match decoded.order_type.as_deref() {
				Some("limit") => self.create_limit_order(trader, &decoded),
				Some("market") => self.create_market_order(trader, &decoded),
				_ => self.notify(
					trader,
					&ServerMessage::Error {
						text: "orderType must be \"limit\" or \"market\"".to_string(),
					},
				),
			},
			Some("cancelOrder") => self.cancel_order(trader, &decoded),
			Some(other) => self.notify(
				trader,
				&ServerMessage::Error {
					text: format!("unknown message: {other}"),
				},
			),
			None => self.notify(
				trader,
				&ServerMessage::Error {
					text: "missing message field".to_string(),
				},
			),
		}
	}

	/// Observers have no state-changing commands; any input is
	/// answered with an error.
	pub fn on_observer_message(&mut self, observer: &Arc<Participant>, line: &str) {
		debug!(peer = %observer.peer(), line, "observer request ignored");
		self.notify(
			observer,
			&ServerMessage::Error {
				text: "observers cannot submit requests".to_string(),
			},
		);
	}

	/// Insert-and-match for a limit order.
	fn create_limit_order(&mut self, trader: &Arc<Participant>, decoded: &protocol::Envelope) {
		let mut taker = match Order::limit(trader, decoded, self.admit()) {
			Ok(order) => order,
			Err(err) => {
				// With a usable orderId the reject can be correlated
				// to the order; without one it degrades to an error.
				match order::extract_order_id(decoded) {
					Ok(order_id) => self.notify(
						trader,
						&ServerMessage::CreateOrderReject {
							order_id,
							reason: err.to_string(),
						},
					),
					Err(_) => self.notify(
						trader,
						&ServerMessage::Error {
							text: err.to_string(),
						},
					),
				}
				return;
			}
		};

		if self.book.contains_key(&taker.key()) {
			self.notify(
				trader,
				&ServerMessage::CreateOrderReject {
					order_id: taker.order_id,
					reason: "duplicate orderId".to_string(),
				},
			);
			return;
		}

		if self.verbose {
			debug!(symbol = %self.symbol, trader = trader.id(), order = %taker, "processing limit order");
		}

		let mut touched = LevelSet::default();
		self.execute(&mut taker, &mut touched);

		if taker.quantity > 0 {
			touched.touch(taker.side, taker.price);
			self.notify(
				trader,
				&ServerMessage::OrderCreated {
					order_id: taker.order_id,
				},
			);
			self.book.insert(taker);
		}

		self.publish_levels(&touched);
	}

	/// Match-only for a market order; any residual is reported back
	/// and discarded.
	fn create_market_order(&mut self, trader: &Arc<Participant>, decoded: &protocol::Envelope) {
		let mut taker = match Order::market(trader, decoded, self.admit()) {
			Ok(order) => order,
			Err(err) => {
				self.notify(
					trader,
					&ServerMessage::Error {
						text: err.to_string(),
					},
				);
				return;
			}
		};

		if self.verbose {
			debug!(symbol = %self.symbol, trader = trader.id(), order = %taker, "processing market order");
		}

		let mut touched = LevelSet::default();
		self.execute(&mut taker, &mut touched);

		if taker.quantity > 0 {
			self.notify(
				trader,
				&ServerMessage::OrderUnfilled {
					order_id: taker.order_id,
					quantity: taker.quantity,
				},
			);
		}

		self.publish_levels(&touched);
	}

	fn cancel_order(&mut self, trader: &Arc<Participant>, decoded: &protocol::Envelope) {
		let order_id = match order::extract_order_id(decoded) {
			Ok(order_id) => order_id,
			Err(err) => {
				self.notify(
					trader,
					&ServerMessage::Error {
						text: err.to_string(),
					},
				);
				return;
			}
		};

		match self.book.remove(&(trader.id(), order_id)) {
			Some(order) => {
				info!(
					symbol = %self.symbol,
					trader = trader.id(),
					order_id,
					"order cancelled"
				);
				self.notify(trader, &ServerMessage::OrderCancelled { order_id });
				let mut touched = LevelSet::default();
				touched.touch(order.side, order.price);
				self.publish_levels(&touched);
			}
			None => self.notify(
				trader,
				&ServerMessage::CancelReject {
					order_id,
					reason: "order not found".to_string(),
				},
			),
		}
	}

	/// The match cascade. Crosses the taker against resting orders in
	/// priority order until it no longer crosses or is exhausted.
	///
	/// Fills execute at the resting order's price. Both counterparties
	/// receive an execution report per fill; fully filled makers are
	/// erased before the next iteration.
	fn execute(&mut self, taker: &mut Order, touched: &mut LevelSet) {
		while taker.quantity > 0 {
			let Some(maker_key) = self.book.best_key(taker.side.opposite()) else {
				break;
			};
			let (maker_price, maker_id, maker_quantity, maker_trader) = {
				let maker = self
					.book
					.get(&maker_key)
					.unwrap_or_else(|| panic!("best key {maker_key:?} not in container"));
				(
					maker.price,
					maker.order_id,
					maker.quantity,
					maker.trader.clone(),
				)
			};

			if !taker.crosses(maker_price) {
				break;
			}

			let fill = taker.quantity.min(maker_quantity);
			taker.quantity -= fill;
			let maker_remaining = self.book.fill(&maker_key, fill);
			touched.touch(taker.side.opposite(), maker_price);

			debug!(
				symbol = %self.symbol,
				price = maker_price,
				quantity = fill,
				taker = taker.order_id,
				maker = maker_id,
				"trade executed"
			);

			self.notify_weak(
				&taker.trader,
				&ServerMessage::OrderExecuted {
					order_id: taker.order_id,
					quantity: fill,
					remaining: taker.quantity,
					price: maker_price,
				},
			);
			self.notify_weak(
				&maker_trader,
				&ServerMessage::OrderExecuted {
					order_id: maker_id,
					quantity: fill,
					remaining: maker_remaining,
					price: maker_price,
				},
			);

			if maker_remaining == 0 {
				self.book.remove(&maker_key);
			}
		}
	}

	/// Register an observer and send it the current depth so its view
	/// starts consistent: bid levels then ask levels, ascending price,
	/// same ordering the incremental updates use.
	fn add_observer(&mut self, observer: Arc<Participant>) {
		info!(
			symbol = %self.symbol,
			id = observer.id(),
			peer = %observer.peer(),
			"observer connected"
		);

		let mut bids: Vec<_> = self.book.depth(Side::Buy).collect();
		bids.reverse();
		for (price, quantity) in bids {
			self.notify(
				&observer,
				&ServerMessage::OrderBook {
					price,
					side: Side::Buy,
					quantity,
				},
			);
		}
		for (price, quantity) in self.book.depth(Side::Sell).collect::<Vec<_>>() {
			self.notify(
				&observer,
				&ServerMessage::OrderBook {
					price,
					side: Side::Sell,
					quantity,
				},
			);
		}

		self.registry.add_observer(observer);
	}

	/// Purge a disconnected trader: erase its resting orders, emit
	/// best-effort synthetic cancel notices, and let observers see the
	/// freed levels.
	fn remove_trader(&mut self, id: ParticipantId) {
		let trader = self.registry.remove_trader(id);
		let keys = self.book.keys_of_trader(id);
		let purged = keys.len();

		let mut touched = LevelSet::default();
		for key in keys {
			if let Some(order) = self.book.remove(&key) {
				touched.touch(order.side, order.price);
				// The connection is usually already gone.
				if let Some(trader) = &trader {
					let _ = trader.send(&ServerMessage::OrderCancelled {
						order_id: order.order_id,
					});
				}
			}
		}
		self.publish_levels(&touched);

		info!(symbol = %self.symbol, id, purged, "trader disconnected");
	}

	/// Broadcast the post-cascade aggregate of every touched level.
	fn publish_levels(&mut self, touched: &LevelSet) {
		for &price in &touched.bids {
			let quantity = self.book.level_quantity(Side::Buy, price);
			self.registry.send_to_all_observers(&ServerMessage::OrderBook {
				price,
				side: Side::Buy,
				quantity,
			});
		}
		for &price in &touched.asks {
			let quantity = self.book.level_quantity(Side::Sell, price);
			self.registry.send_to_all_observers(&ServerMessage::OrderBook {
				price,
				side: Side::Sell,
				quantity,
			});
		}
	}

	fn notify(&self, participant: &Arc<Participant>, message: &ServerMessage) {
		if let Err(err) = participant.send(message) {
			warn!(peer = %participant.peer(), %err, "dropping outbound message");
		}
	}

	fn notify_weak(&self, trader: &Weak<Participant>, message: &ServerMessage) {
		match trader.upgrade() {
			Some(participant) => self.notify(&participant, message),
			None => debug!("submitting trader gone; message dropped"),
		}
	}

	fn admit(&mut self) -> u64 {
		self.next_time += 1;
		self.next_time
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::Role;
	use crucible_sdk::Request;
	use tokio::sync::mpsc::{self, UnboundedReceiver};

	struct TestPeer {
		participant: Arc<Participant>,
		rx: UnboundedReceiver<String>,
	}

	impl TestPeer {
		fn messages(&mut self) -> Vec<ServerMessage> {
			let mut out = Vec::new();
			while let Ok(frame) = self.rx.try_recv() {
				out.push(serde_json::from_str(&frame).unwrap());
			}
			out
		}
	}

	fn create_test_peer(id: ParticipantId, role: Role) -> TestPeer {
		let (tx, rx) = mpsc::unbounded_channel();
		TestPeer {
			participant: Arc::new(Participant::new(id, role, format!("peer-{id}"), tx)),
			rx,
		}
	}

	fn create_test_matcher() -> Matcher {
		Matcher::new(&EngineConfig {
			symbol: "TEST".to_string(),
			verbose_logging: false,
		})
	}

	fn join_trader(matcher: &mut Matcher, peer: &TestPeer) {
		matcher.handle(EngineCommand::TraderJoined(peer.participant.clone()));
	}

	fn join_observer(matcher: &mut Matcher, peer: &TestPeer) {
		matcher.handle(EngineCommand::ObserverJoined(peer.participant.clone()));
	}

	fn send(matcher: &mut Matcher, peer: &TestPeer, request: &Request) {
		let frame = serde_json::to_string(request).unwrap();
		matcher.on_trader_message(&peer.participant, &frame);
	}

	#[test]
	fn simple_cross_empties_the_book() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut bob = create_test_peer(2, Role::Trader);
		let mut observer = create_test_peer(3, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 10));
		assert_eq!(alice.messages(), vec![ServerMessage::OrderCreated { order_id: 1 }]);
		assert_eq!(
			observer.messages(),
			vec![ServerMessage::OrderBook {
				price: 100,
				side: Side::Buy,
				quantity: 10,
			}]
		);

		send(&mut matcher, &bob, &Request::limit(1, Side::Sell, 100, 10));
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::OrderExecuted {
				order_id: 1,
				quantity: 10,
				remaining: 0,
				price: 100,
			}]
		);
		assert_eq!(
			bob.messages(),
			vec![ServerMessage::OrderExecuted {
				order_id: 1,
				quantity: 10,
				remaining: 0,
				price: 100,
			}]
		);
		assert_eq!(
			observer.messages(),
			vec![ServerMessage::OrderBook {
				price: 100,
				side: Side::Buy,
				quantity: 0,
			}]
		);
		assert!(matcher.book().is_empty());
	}

	#[test]
	fn partial_fill_rests_the_remainder() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut bob = create_test_peer(2, Role::Trader);
		let mut observer = create_test_peer(3, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 10));
		alice.messages();
		observer.messages();

		send(&mut matcher, &bob, &Request::limit(2, Side::Sell, 100, 4));
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::OrderExecuted {
				order_id: 1,
				quantity: 4,
				remaining: 6,
				price: 100,
			}]
		);
		// Bob's order filled in full on arrival: no orderCreated.
		assert_eq!(
			bob.messages(),
			vec![ServerMessage::OrderExecuted {
				order_id: 2,
				quantity: 4,
				remaining: 0,
				price: 100,
			}]
		);
		assert_eq!(
			observer.messages(),
			vec![ServerMessage::OrderBook {
				price: 100,
				side: Side::Buy,
				quantity: 6,
			}]
		);
		assert_eq!(matcher.book().total_quantity(Side::Buy), 6);
		assert_eq!(matcher.book().total_quantity(Side::Sell), 0);
	}

	#[test]
	fn execution_price_is_the_makers_price() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut bob = create_test_peer(2, Role::Trader);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);

		send(&mut matcher, &bob, &Request::limit(5, Side::Sell, 99, 5));
		bob.messages();

		send(&mut matcher, &alice, &Request::limit(7, Side::Buy, 101, 5));
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::OrderExecuted {
				order_id: 7,
				quantity: 5,
				remaining: 0,
				price: 99,
			}]
		);
		assert_eq!(
			bob.messages(),
			vec![ServerMessage::OrderExecuted {
				order_id: 5,
				quantity: 5,
				remaining: 0,
				price: 99,
			}]
		);
	}

	#[test]
	fn market_order_sweeps_levels_in_price_order() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut bob = create_test_peer(2, Role::Trader);
		let mut observer = create_test_peer(3, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &bob, &Request::limit(1, Side::Sell, 100, 3));
		send(&mut matcher, &bob, &Request::limit(2, Side::Sell, 101, 2));
		bob.messages();
		observer.messages();

		send(&mut matcher, &alice, &Request::market(Side::Buy, 4));
		assert_eq!(
			alice.messages(),
			vec![
				ServerMessage::OrderExecuted {
					order_id: 0,
					quantity: 3,
					remaining: 1,
					price: 100,
				},
				ServerMessage::OrderExecuted {
					order_id: 0,
					quantity: 1,
					remaining: 0,
					price: 101,
				},
			]
		);
		assert_eq!(
			bob.messages(),
			vec![
				ServerMessage::OrderExecuted {
					order_id: 1,
					quantity: 3,
					remaining: 0,
					price: 100,
				},
				ServerMessage::OrderExecuted {
					order_id: 2,
					quantity: 1,
					remaining: 1,
					price: 101,
				},
			]
		);
		// Touched ask levels broadcast ascending.
		assert_eq!(
			observer.messages(),
			vec![
				ServerMessage::OrderBook {
					price: 100,
					side: Side::Sell,
					quantity: 0,
				},
				ServerMessage::OrderBook {
					price: 101,
					side: Side::Sell,
					quantity: 1,
				},
			]
		);
		assert!(!matcher.book().contains_key(&(2, 1)));
		assert_eq!(matcher.book().get(&(2, 2)).unwrap().quantity, 1);
	}

	#[test]
	fn unmatched_market_order_reports_unfilled() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut observer = create_test_peer(2, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &alice, &Request::market(Side::Buy, 5));
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::OrderUnfilled {
				order_id: 0,
				quantity: 5,
			}]
		);
		// No book change, no depth update.
		assert_eq!(observer.messages(), Vec::new());
		assert!(matcher.book().is_empty());
	}

	#[test]
	fn partially_filled_market_order_reports_residual() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut bob = create_test_peer(2, Role::Trader);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);

		send(&mut matcher, &bob, &Request::limit(1, Side::Sell, 100, 3));
		bob.messages();

		send(&mut matcher, &alice, &Request::market(Side::Buy, 5));
		assert_eq!(
			alice.messages(),
			vec![
				ServerMessage::OrderExecuted {
					order_id: 0,
					quantity: 3,
					remaining: 2,
					price: 100,
				},
				ServerMessage::OrderUnfilled {
					order_id: 0,
					quantity: 2,
				},
			]
		);
		// The residual is discarded, never rested.
		assert!(matcher.book().is_empty());
	}

	#[test]
	fn duplicate_order_id_is_rejected_before_matching() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut observer = create_test_peer(2, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 1));
		alice.messages();
		observer.messages();

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 101, 1));
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::CreateOrderReject {
				order_id: 1,
				reason: "duplicate orderId".to_string(),
			}]
		);
		// Book unchanged: still the original order at 100.
		assert_eq!(observer.messages(), Vec::new());
		assert_eq!(matcher.book().order_count(), 1);
		assert_eq!(matcher.book().get(&(1, 1)).unwrap().price, 100);
	}

	#[test]
	fn same_order_id_from_different_traders_coexists() {
		let mut matcher = create_test_matcher();
		let alice = create_test_peer(1, Role::Trader);
		let bob = create_test_peer(2, Role::Trader);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 1));
		send(&mut matcher, &bob, &Request::limit(1, Side::Buy, 99, 1));
		assert_eq!(matcher.book().order_count(), 2);
	}

	#[test]
	fn cancel_is_acknowledged_once_then_rejected() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		let mut observer = create_test_peer(2, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 10));
		alice.messages();
		observer.messages();

		send(&mut matcher, &alice, &Request::cancel(1));
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::OrderCancelled { order_id: 1 }]
		);
		assert_eq!(
			observer.messages(),
			vec![ServerMessage::OrderBook {
				price: 100,
				side: Side::Buy,
				quantity: 0,
			}]
		);
		assert!(matcher.book().is_empty());

		send(&mut matcher, &alice, &Request::cancel(1));
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::CancelReject {
				order_id: 1,
				reason: "order not found".to_string(),
			}]
		);
	}

	#[test]
	fn cancel_cannot_touch_another_traders_order() {
		let mut matcher = create_test_matcher();
		let alice = create_test_peer(1, Role::Trader);
		let mut bob = create_test_peer(2, Role::Trader);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 1));

		send(&mut matcher, &bob, &Request::cancel(1));
		assert!(matches!(
			bob.messages().as_slice(),
			[ServerMessage::CancelReject { order_id: 1, .. }]
		));
		assert_eq!(matcher.book().order_count(), 1);
	}

	#[test]
	fn malformed_and_unknown_input_yields_error() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		join_trader(&mut matcher, &alice);

		matcher.on_trader_message(&alice.participant, "this is not json");
		matcher.on_trader_message(&alice.participant, r#"{"message":"selfDestruct"}"#);
		matcher.on_trader_message(&alice.participant, r#"{"orderId":1}"#);
		matcher.on_trader_message(
			&alice.participant,
			r#"{"message":"createOrder","orderType":"stop","side":"BUY","orderId":1,"price":1,"quantity":1}"#,
		);

		let messages = alice.messages();
		assert_eq!(messages.len(), 4);
		assert!(
			messages
				.iter()
				.all(|m| matches!(m, ServerMessage::Error { .. }))
		);
		assert!(matcher.book().is_empty());
	}

	#[test]
	fn limit_validation_failure_rejects_with_order_id_when_possible() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		join_trader(&mut matcher, &alice);

		// orderId parseable: correlated reject.
		matcher.on_trader_message(
			&alice.participant,
			r#"{"message":"createOrder","orderType":"limit","side":"BUY","orderId":9,"price":100,"quantity":0}"#,
		);
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::CreateOrderReject {
				order_id: 9,
				reason: "quantity must be a positive integer".to_string(),
			}]
		);

		// No usable orderId: plain error.
		matcher.on_trader_message(
			&alice.participant,
			r#"{"message":"createOrder","orderType":"limit","side":"BUY","price":100,"quantity":1}"#,
		);
		assert!(matches!(
			alice.messages().as_slice(),
			[ServerMessage::Error { .. }]
		));

		// Side is validated first.
		matcher.on_trader_message(
			&alice.participant,
			r#"{"message":"createOrder","orderType":"limit","side":"LONG","orderId":9,"price":100,"quantity":1}"#,
		);
		assert_eq!(
			alice.messages(),
			vec![ServerMessage::CreateOrderReject {
				order_id: 9,
				reason: "side must be \"BUY\" or \"SELL\"".to_string(),
			}]
		);

		assert!(matcher.book().is_empty());
	}

	#[test]
	fn cancel_with_invalid_order_id_yields_error() {
		let mut matcher = create_test_matcher();
		let mut alice = create_test_peer(1, Role::Trader);
		join_trader(&mut matcher, &alice);

		matcher.on_trader_message(&alice.participant, r#"{"message":"cancelOrder"}"#);
		matcher.on_trader_message(
			&alice.participant,
			r#"{"message":"cancelOrder","orderId":-1}"#,
		);

		let messages = alice.messages();
		assert_eq!(messages.len(), 2);
		assert!(
			messages
				.iter()
				.all(|m| matches!(m, ServerMessage::Error { .. }))
		);
	}

	#[test]
	fn observer_input_yields_error() {
		let mut matcher = create_test_matcher();
		let mut observer = create_test_peer(1, Role::Observer);
		join_observer(&mut matcher, &observer);
		observer.messages();

		matcher.handle(EngineCommand::ObserverMessage {
			observer: observer.participant.clone(),
			line: r#"{"message":"createOrder"}"#.to_string(),
		});
		assert!(matches!(
			observer.messages().as_slice(),
			[ServerMessage::Error { .. }]
		));
	}

	#[test]
	fn new_observer_receives_depth_snapshot() {
		let mut matcher = create_test_matcher();
		let alice = create_test_peer(1, Role::Trader);
		join_trader(&mut matcher, &alice);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 6));
		send(&mut matcher, &alice, &Request::limit(2, Side::Buy, 99, 4));
		send(&mut matcher, &alice, &Request::limit(3, Side::Sell, 105, 5));

		let mut observer = create_test_peer(2, Role::Observer);
		join_observer(&mut matcher, &observer);

		// Bid levels ascending, then ask levels ascending.
		assert_eq!(
			observer.messages(),
			vec![
				ServerMessage::OrderBook {
					price: 99,
					side: Side::Buy,
					quantity: 4,
				},
				ServerMessage::OrderBook {
					price: 100,
					side: Side::Buy,
					quantity: 6,
				},
				ServerMessage::OrderBook {
					price: 105,
					side: Side::Sell,
					quantity: 5,
				},
			]
		);
	}

	#[test]
	fn trader_disconnect_purges_resting_orders() {
		let mut matcher = create_test_matcher();
		let alice = create_test_peer(1, Role::Trader);
		let bob = create_test_peer(2, Role::Trader);
		let mut observer = create_test_peer(3, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 5));
		send(&mut matcher, &alice, &Request::limit(2, Side::Sell, 105, 3));
		send(&mut matcher, &bob, &Request::limit(1, Side::Buy, 98, 2));
		observer.messages();

		matcher.handle(EngineCommand::TraderLeft(1));

		assert_eq!(matcher.registry().trader_count(), 1);
		assert_eq!(matcher.book().keys_of_trader(1), Vec::new());
		assert_eq!(matcher.book().order_count(), 1);
		assert_eq!(
			observer.messages(),
			vec![
				ServerMessage::OrderBook {
					price: 100,
					side: Side::Buy,
					quantity: 0,
				},
				ServerMessage::OrderBook {
					price: 105,
					side: Side::Sell,
					quantity: 0,
				},
			]
		);
	}

	#[test]
	fn submit_then_cancel_restores_the_book() {
		let mut matcher = create_test_matcher();
		let alice = create_test_peer(1, Role::Trader);
		join_trader(&mut matcher, &alice);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 5));
		let bids_before: Vec<_> = matcher.book().depth(Side::Buy).collect();
		let asks_before: Vec<_> = matcher.book().depth(Side::Sell).collect();

		send(&mut matcher, &alice, &Request::limit(2, Side::Sell, 200, 7));
		send(&mut matcher, &alice, &Request::cancel(2));

		assert_eq!(
			matcher.book().depth(Side::Buy).collect::<Vec<_>>(),
			bids_before
		);
		assert_eq!(
			matcher.book().depth(Side::Sell).collect::<Vec<_>>(),
			asks_before
		);
	}

	#[test]
	fn resting_book_never_crosses() {
		let mut matcher = create_test_matcher();
		let alice = create_test_peer(1, Role::Trader);
		let bob = create_test_peer(2, Role::Trader);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 5));
		send(&mut matcher, &bob, &Request::limit(1, Side::Sell, 95, 2));
		send(&mut matcher, &bob, &Request::limit(2, Side::Sell, 99, 4));
		send(&mut matcher, &alice, &Request::limit(2, Side::Buy, 103, 1));
		send(&mut matcher, &alice, &Request::limit(3, Side::Buy, 90, 1));
		send(&mut matcher, &bob, &Request::limit(3, Side::Sell, 110, 1));

		let book = matcher.book();
		let bid = book.best(Side::Buy).expect("resting bid");
		let ask = book.best(Side::Sell).expect("resting ask");
		assert!(bid.price < ask.price);
	}

	#[test]
	fn depth_updates_mirror_resting_totals() {
		// Every level change is broadcast, so replaying the last
		// update per level reconstructs the side totals.
		use std::collections::BTreeMap;

		let mut matcher = create_test_matcher();
		let alice = create_test_peer(1, Role::Trader);
		let bob = create_test_peer(2, Role::Trader);
		let mut observer = create_test_peer(3, Role::Observer);
		join_trader(&mut matcher, &alice);
		join_trader(&mut matcher, &bob);
		join_observer(&mut matcher, &observer);

		send(&mut matcher, &alice, &Request::limit(1, Side::Buy, 100, 5));
		send(&mut matcher, &alice, &Request::limit(2, Side::Buy, 99, 3));
		send(&mut matcher, &bob, &Request::limit(1, Side::Sell, 100, 2));
		send(&mut matcher, &bob, &Request::limit(2, Side::Sell, 104, 6));
		send(&mut matcher, &alice, &Request::cancel(2));

		let mut last_seen: BTreeMap<(Side, u64), u64> = BTreeMap::new();
		for message in observer.messages() {
			if let ServerMessage::OrderBook {
				price,
				side,
				quantity,
			} = message
			{
				last_seen.insert((side, price), quantity);
			}
		}

		let observed_bid_total: u64 = last_seen
			.iter()
			.filter(|((side, _), _)| *side == Side::Buy)
			.map(|(_, quantity)| quantity)
			.sum();
		let observed_ask_total: u64 = last_seen
			.iter()
			.filter(|((side, _), _)| *side == Side::Sell)
			.map(|(_, quantity)| quantity)
			.sum();

		assert_eq!(observed_bid_total, matcher.book().total_quantity(Side::Buy));
		assert_eq!(observed_ask_total, matcher.book().total_quantity(Side::Sell));
	}
}
