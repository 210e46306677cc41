//! Response Buffer
//!
//! Accumulates the records of one block, indexed by every dimension a
//! subscriber can filter on. A record indexed under two dimensions (market
//! and subaccount, say) is stored once behind an [`Arc`] and shared by both
//! indices; its [`RecordId`] identifies it across them.
//!
//! Access goes through [`ResponseBuffer::read`] and [`ResponseBuffer::write`],
//! which hold the lock only for the duration of the closure.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::records::{
    BankBalance, ConditionalOrderTriggerFailureUpdate, DerivativeOrderUpdate, DerivativeTrade,
    DomainRecord, OraclePrice, OrderFailureUpdate, OrderbookUpdate, Position, SpotOrderUpdate,
    SpotTrade, SubaccountDeposits,
};

/// Identity of a record within one buffer lifetime.
pub type RecordId = u64;

/// A record together with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<T> {
    /// Identity, unique within the buffer.
    pub id: RecordId,
    /// The record.
    pub value: T,
}

/// Shared handle to a stamped record.
pub type Shared<T> = Arc<Stamped<T>>;

/// Dimension key to records, in insertion order.
pub type Index<T> = HashMap<String, Vec<Shared<T>>>;

/// Contents of a [`ResponseBuffer`].
#[derive(Debug, Default)]
pub struct BufferState {
    /// Height of the block being accumulated.
    pub block_height: u64,
    /// Time of the block, set at flush.
    pub block_time: DateTime<Utc>,
    trade_counter: u64,
    next_id: RecordId,

    /// Bank balances by account address.
    pub bank_balances_by_account: Index<BankBalance>,
    /// Spot orders by market ID.
    pub spot_orders_by_market: Index<SpotOrderUpdate>,
    /// Spot orders by subaccount ID.
    pub spot_orders_by_subaccount: Index<SpotOrderUpdate>,
    /// Derivative orders by market ID.
    pub derivative_orders_by_market: Index<DerivativeOrderUpdate>,
    /// Derivative orders by subaccount ID.
    pub derivative_orders_by_subaccount: Index<DerivativeOrderUpdate>,
    /// Spot orderbook updates by market ID.
    pub spot_orderbooks_by_market: Index<OrderbookUpdate>,
    /// Derivative orderbook updates by market ID.
    pub derivative_orderbooks_by_market: Index<OrderbookUpdate>,
    /// Deposits by subaccount ID.
    pub deposits_by_subaccount: Index<SubaccountDeposits>,
    /// Spot trades by market ID.
    pub spot_trades_by_market: Index<SpotTrade>,
    /// Spot trades by subaccount ID.
    pub spot_trades_by_subaccount: Index<SpotTrade>,
    /// Derivative trades by market ID.
    pub derivative_trades_by_market: Index<DerivativeTrade>,
    /// Derivative trades by subaccount ID.
    pub derivative_trades_by_subaccount: Index<DerivativeTrade>,
    /// Positions by market ID.
    pub positions_by_market: Index<Position>,
    /// Positions by subaccount ID.
    pub positions_by_subaccount: Index<Position>,
    /// Oracle prices by symbol.
    pub oracle_prices_by_symbol: Index<OraclePrice>,
    /// Order failures by account address.
    pub order_failures_by_account: Index<OrderFailureUpdate>,
    /// Conditional trigger failures by market ID.
    pub trigger_failures_by_market: Index<ConditionalOrderTriggerFailureUpdate>,
    /// Conditional trigger failures by subaccount ID.
    pub trigger_failures_by_subaccount: Index<ConditionalOrderTriggerFailureUpdate>,
}

fn push<T>(index: &mut Index<T>, key: &str, record: &Shared<T>) {
    index
        .entry(key.to_string())
        .or_default()
        .push(Arc::clone(record));
}

impl BufferState {
    /// Next trade sequence number: 0, 1, 2, ... until the buffer is cleared.
    pub fn next_trade_event_number(&mut self) -> u64 {
        let n = self.trade_counter;
        self.trade_counter += 1;
        n
    }

    fn next_trade_id(&mut self) -> String {
        let n = self.next_trade_event_number();
        format!("{}_{n}", self.block_height)
    }

    fn stamp<T>(&mut self, value: T) -> Shared<T> {
        let id = self.next_id;
        self.next_id += 1;
        Arc::new(Stamped { id, value })
    }

    /// Number of distinct records inserted so far.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.next_id
    }

    /// Index a decoded record under every dimension it belongs to.
    ///
    /// Trades get their `{height}_{n}` trade ID here.
    pub fn insert(&mut self, record: DomainRecord) {
        match record {
            DomainRecord::BankBalance(balance) => {
                let shared = self.stamp(balance);
                push(&mut self.bank_balances_by_account, &shared.value.account, &shared);
            }
            DomainRecord::SpotOrder(order) => {
                let shared = self.stamp(order);
                push(&mut self.spot_orders_by_market, &shared.value.market_id, &shared);
                push(&mut self.spot_orders_by_subaccount, shared.value.subaccount_id(), &shared);
            }
            DomainRecord::DerivativeOrder(order) => {
                let shared = self.stamp(order);
                push(&mut self.derivative_orders_by_market, &shared.value.market_id, &shared);
                push(
                    &mut self.derivative_orders_by_subaccount,
                    shared.value.subaccount_id(),
                    &shared,
                );
            }
            DomainRecord::SpotTrade(mut trade) => {
                trade.trade_id = self.next_trade_id();
                let shared = self.stamp(trade);
                push(&mut self.spot_trades_by_market, &shared.value.market_id, &shared);
                push(&mut self.spot_trades_by_subaccount, &shared.value.subaccount_id, &shared);
            }
            DomainRecord::DerivativeTrade(mut trade) => {
                trade.trade_id = self.next_trade_id();
                let shared = self.stamp(trade);
                push(&mut self.derivative_trades_by_market, &shared.value.market_id, &shared);
                push(
                    &mut self.derivative_trades_by_subaccount,
                    &shared.value.subaccount_id,
                    &shared,
                );
            }
            DomainRecord::SpotOrderbook(update) => {
                let shared = self.stamp(update);
                push(
                    &mut self.spot_orderbooks_by_market,
                    &shared.value.orderbook.market_id,
                    &shared,
                );
            }
            DomainRecord::DerivativeOrderbook(update) => {
                let shared = self.stamp(update);
                push(
                    &mut self.derivative_orderbooks_by_market,
                    &shared.value.orderbook.market_id,
                    &shared,
                );
            }
            DomainRecord::SubaccountDeposits(deposits) => {
                let shared = self.stamp(deposits);
                push(&mut self.deposits_by_subaccount, &shared.value.subaccount_id, &shared);
            }
            DomainRecord::Position(position) => {
                let shared = self.stamp(position);
                push(&mut self.positions_by_market, &shared.value.market_id, &shared);
                push(&mut self.positions_by_subaccount, &shared.value.subaccount_id, &shared);
            }
            DomainRecord::OraclePrice(price) => {
                let shared = self.stamp(price);
                push(&mut self.oracle_prices_by_symbol, &shared.value.symbol, &shared);
            }
            DomainRecord::OrderFailure(failure) => {
                let shared = self.stamp(failure);
                push(&mut self.order_failures_by_account, &shared.value.account, &shared);
            }
            DomainRecord::ConditionalOrderTriggerFailure(failure) => {
                let shared = self.stamp(failure);
                push(&mut self.trigger_failures_by_market, &shared.value.market_id, &shared);
                push(
                    &mut self.trigger_failures_by_subaccount,
                    &shared.value.subaccount_id,
                    &shared,
                );
            }
        }
    }
}

/// Per-block record buffer shared between the publisher and subscribers.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    state: RwLock<BufferState>,
}

impl ResponseBuffer {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&BufferState) -> R) -> R {
        f(&self.state.read())
    }

    /// Run `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut BufferState) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Reset to empty: every index, height, time, trade counter and record
    /// identity counter.
    pub fn clear(&self) {
        self.write(|state| *state = BufferState::default());
    }

    /// Current block height.
    #[must_use]
    pub fn block_height(&self) -> u64 {
        self.read(|s| s.block_height)
    }

    /// Current block time.
    #[must_use]
    pub fn block_time(&self) -> DateTime<Utc> {
        self.read(|s| s.block_time)
    }
}
