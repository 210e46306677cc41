//! Stream Responses
//!
//! The per-subscriber projection of one published buffer. Records are
//! shared with the buffer, so building a response copies no record data.

use crate::domain::buffer::{BufferState, Index, ResponseBuffer, Shared};
use crate::domain::filter::{FilterError, filter_multi, filter_single};
use crate::domain::records::{
    BankBalance, ConditionalOrderTriggerFailureUpdate, DerivativeOrderUpdate, DerivativeTrade,
    OraclePrice, OrderFailureUpdate, OrderbookUpdate, Position, SpotOrderUpdate, SpotTrade,
    SubaccountDeposits,
};
use crate::domain::request::{MarketSubaccountFilter, StreamRequest};

/// Filtered contents of one block for one subscriber.
#[derive(Debug, Clone, Default)]
pub struct StreamResponse {
    /// Block height.
    pub block_height: u64,
    /// Block time in Unix milliseconds.
    pub block_time: i64,
    /// Current gas price, empty when unknown.
    pub gas_price: String,
    /// Bank balances.
    pub bank_balances: Vec<Shared<BankBalance>>,
    /// Subaccount deposits.
    pub subaccount_deposits: Vec<Shared<SubaccountDeposits>>,
    /// Spot trades.
    pub spot_trades: Vec<Shared<SpotTrade>>,
    /// Derivative trades.
    pub derivative_trades: Vec<Shared<DerivativeTrade>>,
    /// Spot orders.
    pub spot_orders: Vec<Shared<SpotOrderUpdate>>,
    /// Derivative orders.
    pub derivative_orders: Vec<Shared<DerivativeOrderUpdate>>,
    /// Spot orderbook updates.
    pub spot_orderbook_updates: Vec<Shared<OrderbookUpdate>>,
    /// Derivative orderbook updates.
    pub derivative_orderbook_updates: Vec<Shared<OrderbookUpdate>>,
    /// Positions.
    pub positions: Vec<Shared<Position>>,
    /// Oracle prices.
    pub oracle_prices: Vec<Shared<OraclePrice>>,
    /// Order failures.
    pub order_failures: Vec<Shared<OrderFailureUpdate>>,
    /// Conditional order trigger failures.
    pub conditional_order_trigger_failures: Vec<Shared<ConditionalOrderTriggerFailureUpdate>>,
}

fn single<T>(index: &Index<T>, filter: Option<&Vec<String>>) -> Vec<Shared<T>> {
    filter.map(|f| filter_single(index, f)).unwrap_or_default()
}

fn multi<T>(
    by_market: &Index<T>,
    by_subaccount: &Index<T>,
    filter: Option<&MarketSubaccountFilter>,
) -> Result<Vec<Shared<T>>, FilterError> {
    filter.map_or_else(
        || Ok(Vec::new()),
        |f| filter_multi(by_market, by_subaccount, &f.market_ids, &f.subaccount_ids),
    )
}

impl StreamResponse {
    /// Project a buffer through `request` under the buffer's read lock.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when a dual-dimension collection is
    /// inconsistently indexed.
    pub fn from_buffer(
        buffer: &ResponseBuffer,
        request: &StreamRequest,
        gas_price: String,
    ) -> Result<Self, FilterError> {
        buffer.read(|state| Self::from_state(state, request, gas_price))
    }

    fn from_state(
        state: &BufferState,
        request: &StreamRequest,
        gas_price: String,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            block_height: state.block_height,
            block_time: state.block_time.timestamp_millis(),
            gas_price,
            bank_balances: single(
                &state.bank_balances_by_account,
                request.bank_balances.as_ref().map(|f| &f.accounts),
            ),
            subaccount_deposits: single(
                &state.deposits_by_subaccount,
                request.subaccount_deposits.as_ref().map(|f| &f.subaccount_ids),
            ),
            spot_trades: multi(
                &state.spot_trades_by_market,
                &state.spot_trades_by_subaccount,
                request.spot_trades.as_ref(),
            )?,
            derivative_trades: multi(
                &state.derivative_trades_by_market,
                &state.derivative_trades_by_subaccount,
                request.derivative_trades.as_ref(),
            )?,
            spot_orders: multi(
                &state.spot_orders_by_market,
                &state.spot_orders_by_subaccount,
                request.spot_orders.as_ref(),
            )?,
            derivative_orders: multi(
                &state.derivative_orders_by_market,
                &state.derivative_orders_by_subaccount,
                request.derivative_orders.as_ref(),
            )?,
            spot_orderbook_updates: single(
                &state.spot_orderbooks_by_market,
                request.spot_orderbooks.as_ref().map(|f| &f.market_ids),
            ),
            derivative_orderbook_updates: single(
                &state.derivative_orderbooks_by_market,
                request.derivative_orderbooks.as_ref().map(|f| &f.market_ids),
            ),
            positions: multi(
                &state.positions_by_market,
                &state.positions_by_subaccount,
                request.positions.as_ref(),
            )?,
            oracle_prices: single(
                &state.oracle_prices_by_symbol,
                request.oracle_prices.as_ref().map(|f| &f.symbol),
            ),
            order_failures: single(
                &state.order_failures_by_account,
                request.order_failures.as_ref().map(|f| &f.accounts),
            ),
            conditional_order_trigger_failures: multi(
                &state.trigger_failures_by_market,
                &state.trigger_failures_by_subaccount,
                request.conditional_order_trigger_failures.as_ref(),
            )?,
        })
    }

    /// Total number of records carried.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.bank_balances.len()
            + self.subaccount_deposits.len()
            + self.spot_trades.len()
            + self.derivative_trades.len()
            + self.spot_orders.len()
            + self.derivative_orders.len()
            + self.spot_orderbook_updates.len()
            + self.derivative_orderbook_updates.len()
            + self.positions.len()
            + self.oracle_prices.len()
            + self.order_failures.len()
            + self.conditional_order_trigger_failures.len()
    }
}
