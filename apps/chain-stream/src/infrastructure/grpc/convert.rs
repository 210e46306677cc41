//! Wire Conversions
//!
//! Boundary translation between the canonical request/response types and the
//! two generated protocol versions. The record shapes of v1 and v2 are
//! identical, so their conversions are generated by one macro; only v1 needs
//! the values rescaled to chain fixed-point first.

use rust_decimal::Decimal;
use thiserror::Error;

use super::proto::chainstream::{v1, v2};
use crate::application::services::{CachedMarketFinder, ResolverError};
use crate::domain::buffer::Shared;
use crate::domain::market::{MarketMetadata, ScaleError};
use crate::domain::records::{
    BankBalance, Coin, ConditionalOrderTriggerFailureUpdate, DerivativeLimitOrder,
    DerivativeOrderUpdate, DerivativeTrade, Level, OraclePrice, OrderFailureUpdate, OrderInfo,
    OrderbookUpdate, Position, PositionDelta, SpotLimitOrder, SpotOrderUpdate, SpotTrade,
    SubaccountDeposits,
};
use crate::domain::request::{
    AccountsFilter, MarketSubaccountFilter, MarketsFilter, StreamRequest, SubaccountsFilter,
    SymbolsFilter,
};
use crate::domain::response::StreamResponse;

/// Failure converting a response to the v1 wire format.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Market metadata could not be resolved.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// A value could not be rescaled.
    #[error(transparent)]
    Scale(#[from] ScaleError),
}

fn dec(value: Decimal) -> String {
    value.normalize().to_string()
}

fn wire<T, W>(records: &[Shared<T>]) -> Vec<W>
where
    W: for<'a> From<&'a T>,
{
    records.iter().map(|record| W::from(&record.value)).collect()
}

// =============================================================================
// Shared Record Shapes
// =============================================================================

macro_rules! impl_wire_shapes {
    ($wire:ident) => {
        impl From<&$wire::BankBalancesFilter> for AccountsFilter {
            fn from(f: &$wire::BankBalancesFilter) -> Self {
                Self {
                    accounts: f.accounts.clone(),
                }
            }
        }

        impl From<&AccountsFilter> for $wire::BankBalancesFilter {
            fn from(f: &AccountsFilter) -> Self {
                Self {
                    accounts: f.accounts.clone(),
                }
            }
        }

        impl From<&$wire::SubaccountDepositsFilter> for SubaccountsFilter {
            fn from(f: &$wire::SubaccountDepositsFilter) -> Self {
                Self {
                    subaccount_ids: f.subaccount_ids.clone(),
                }
            }
        }

        impl From<&SubaccountsFilter> for $wire::SubaccountDepositsFilter {
            fn from(f: &SubaccountsFilter) -> Self {
                Self {
                    subaccount_ids: f.subaccount_ids.clone(),
                }
            }
        }

        impl From<&$wire::OrderbookFilter> for MarketsFilter {
            fn from(f: &$wire::OrderbookFilter) -> Self {
                Self {
                    market_ids: f.market_ids.clone(),
                }
            }
        }

        impl From<&MarketsFilter> for $wire::OrderbookFilter {
            fn from(f: &MarketsFilter) -> Self {
                Self {
                    market_ids: f.market_ids.clone(),
                }
            }
        }

        impl From<&$wire::OraclePriceFilter> for SymbolsFilter {
            fn from(f: &$wire::OraclePriceFilter) -> Self {
                Self {
                    symbol: f.symbol.clone(),
                }
            }
        }

        impl From<&SymbolsFilter> for $wire::OraclePriceFilter {
            fn from(f: &SymbolsFilter) -> Self {
                Self {
                    symbol: f.symbol.clone(),
                }
            }
        }

        impl_wire_shapes!(@dual $wire, TradesFilter);
        impl_wire_shapes!(@dual $wire, OrdersFilter);
        impl_wire_shapes!(@dual $wire, PositionsFilter);

        impl From<&Coin> for $wire::Coin {
            fn from(c: &Coin) -> Self {
                Self {
                    denom: c.denom.clone(),
                    amount: dec(c.amount),
                }
            }
        }

        impl From<&BankBalance> for $wire::BankBalance {
            fn from(b: &BankBalance) -> Self {
                Self {
                    account: b.account.clone(),
                    balances: b.balances.iter().map(Into::into).collect(),
                }
            }
        }

        impl From<&SubaccountDeposits> for $wire::SubaccountDeposits {
            fn from(d: &SubaccountDeposits) -> Self {
                Self {
                    subaccount_id: d.subaccount_id.clone(),
                    deposits: d
                        .deposits
                        .iter()
                        .map(|entry| $wire::SubaccountDeposit {
                            denom: entry.denom.clone(),
                            deposit: Some($wire::Deposit {
                                available_balance: dec(entry.deposit.available_balance),
                                total_balance: dec(entry.deposit.total_balance),
                            }),
                        })
                        .collect(),
                }
            }
        }

        impl From<&OrderInfo> for $wire::OrderInfo {
            fn from(i: &OrderInfo) -> Self {
                Self {
                    subaccount_id: i.subaccount_id.clone(),
                    fee_recipient: i.fee_recipient.clone(),
                    price: dec(i.price),
                    quantity: dec(i.quantity),
                    cid: i.cid.clone(),
                }
            }
        }

        impl From<&SpotLimitOrder> for $wire::SpotLimitOrder {
            fn from(o: &SpotLimitOrder) -> Self {
                Self {
                    order_info: Some((&o.order_info).into()),
                    order_type: o.order_type.clone(),
                    fillable: dec(o.fillable),
                    trigger_price: o.trigger_price.map(dec).unwrap_or_default(),
                    order_hash: o.order_hash.clone(),
                }
            }
        }

        impl From<&DerivativeLimitOrder> for $wire::DerivativeLimitOrder {
            fn from(o: &DerivativeLimitOrder) -> Self {
                Self {
                    order_info: Some((&o.order_info).into()),
                    order_type: o.order_type.clone(),
                    margin: dec(o.margin),
                    fillable: dec(o.fillable),
                    trigger_price: o.trigger_price.map(dec).unwrap_or_default(),
                    order_hash: o.order_hash.clone(),
                }
            }
        }

        impl From<&SpotOrderUpdate> for $wire::SpotOrderUpdate {
            fn from(u: &SpotOrderUpdate) -> Self {
                Self {
                    status: u.status.as_str().to_string(),
                    order_hash: u.order_hash.clone(),
                    cid: u.cid.clone(),
                    market_id: u.market_id.clone(),
                    order: Some((&u.order).into()),
                }
            }
        }

        impl From<&DerivativeOrderUpdate> for $wire::DerivativeOrderUpdate {
            fn from(u: &DerivativeOrderUpdate) -> Self {
                Self {
                    status: u.status.as_str().to_string(),
                    order_hash: u.order_hash.clone(),
                    cid: u.cid.clone(),
                    market_id: u.market_id.clone(),
                    is_market: u.is_market,
                    order: Some((&u.order).into()),
                }
            }
        }

        impl From<&SpotTrade> for $wire::SpotTrade {
            fn from(t: &SpotTrade) -> Self {
                Self {
                    market_id: t.market_id.clone(),
                    is_buy: t.is_buy,
                    execution_type: t.execution_type.clone(),
                    quantity: dec(t.quantity),
                    price: dec(t.price),
                    subaccount_id: t.subaccount_id.clone(),
                    fee: dec(t.fee),
                    order_hash: t.order_hash.clone(),
                    fee_recipient_address: t.fee_recipient_address.clone(),
                    cid: t.cid.clone(),
                    trade_id: t.trade_id.clone(),
                }
            }
        }

        impl From<&PositionDelta> for $wire::PositionDelta {
            fn from(d: &PositionDelta) -> Self {
                Self {
                    is_long: d.is_long,
                    execution_quantity: dec(d.execution_quantity),
                    execution_margin: dec(d.execution_margin),
                    execution_price: dec(d.execution_price),
                }
            }
        }

        impl From<&DerivativeTrade> for $wire::DerivativeTrade {
            fn from(t: &DerivativeTrade) -> Self {
                Self {
                    market_id: t.market_id.clone(),
                    is_buy: t.is_buy,
                    execution_type: t.execution_type.clone(),
                    subaccount_id: t.subaccount_id.clone(),
                    position_delta: t.position_delta.as_ref().map(Into::into),
                    payout: dec(t.payout),
                    fee: dec(t.fee),
                    order_hash: t.order_hash.clone(),
                    fee_recipient_address: t.fee_recipient_address.clone(),
                    cid: t.cid.clone(),
                    trade_id: t.trade_id.clone(),
                }
            }
        }

        impl From<&Position> for $wire::Position {
            fn from(p: &Position) -> Self {
                Self {
                    market_id: p.market_id.clone(),
                    subaccount_id: p.subaccount_id.clone(),
                    is_long: p.is_long,
                    quantity: dec(p.quantity),
                    entry_price: dec(p.entry_price),
                    margin: dec(p.margin),
                    cumulative_funding_entry: dec(p.cumulative_funding_entry),
                }
            }
        }

        impl From<&Level> for $wire::Level {
            fn from(l: &Level) -> Self {
                Self {
                    p: dec(l.p),
                    q: dec(l.q),
                }
            }
        }

        impl From<&OrderbookUpdate> for $wire::OrderbookUpdate {
            fn from(u: &OrderbookUpdate) -> Self {
                Self {
                    seq: u.seq,
                    orderbook: Some($wire::Orderbook {
                        market_id: u.orderbook.market_id.clone(),
                        buy_levels: u.orderbook.buy_levels.iter().map(Into::into).collect(),
                        sell_levels: u.orderbook.sell_levels.iter().map(Into::into).collect(),
                    }),
                }
            }
        }

        impl From<&OraclePrice> for $wire::OraclePrice {
            fn from(p: &OraclePrice) -> Self {
                Self {
                    symbol: p.symbol.clone(),
                    price: dec(p.price),
                    r#type: p.kind.as_str().to_string(),
                }
            }
        }
    };

    (@dual $wire:ident, $filter:ident) => {
        impl From<&$wire::$filter> for MarketSubaccountFilter {
            fn from(f: &$wire::$filter) -> Self {
                Self {
                    market_ids: f.market_ids.clone(),
                    subaccount_ids: f.subaccount_ids.clone(),
                }
            }
        }

        impl From<&MarketSubaccountFilter> for $wire::$filter {
            fn from(f: &MarketSubaccountFilter) -> Self {
                Self {
                    subaccount_ids: f.subaccount_ids.clone(),
                    market_ids: f.market_ids.clone(),
                }
            }
        }
    };
}

impl_wire_shapes!(v1);
impl_wire_shapes!(v2);

// =============================================================================
// Requests
// =============================================================================

impl From<&v1::StreamRequest> for StreamRequest {
    fn from(r: &v1::StreamRequest) -> Self {
        Self {
            bank_balances: r.bank_balances_filter.as_ref().map(Into::into),
            subaccount_deposits: r.subaccount_deposits_filter.as_ref().map(Into::into),
            spot_trades: r.spot_trades_filter.as_ref().map(Into::into),
            derivative_trades: r.derivative_trades_filter.as_ref().map(Into::into),
            spot_orders: r.spot_orders_filter.as_ref().map(Into::into),
            derivative_orders: r.derivative_orders_filter.as_ref().map(Into::into),
            spot_orderbooks: r.spot_orderbooks_filter.as_ref().map(Into::into),
            derivative_orderbooks: r.derivative_orderbooks_filter.as_ref().map(Into::into),
            positions: r.positions_filter.as_ref().map(Into::into),
            oracle_prices: r.oracle_price_filter.as_ref().map(Into::into),
            order_failures: None,
            conditional_order_trigger_failures: None,
        }
    }
}

impl From<&v2::StreamRequest> for StreamRequest {
    fn from(r: &v2::StreamRequest) -> Self {
        Self {
            bank_balances: r.bank_balances_filter.as_ref().map(Into::into),
            subaccount_deposits: r.subaccount_deposits_filter.as_ref().map(Into::into),
            spot_trades: r.spot_trades_filter.as_ref().map(Into::into),
            derivative_trades: r.derivative_trades_filter.as_ref().map(Into::into),
            spot_orders: r.spot_orders_filter.as_ref().map(Into::into),
            derivative_orders: r.derivative_orders_filter.as_ref().map(Into::into),
            spot_orderbooks: r.spot_orderbooks_filter.as_ref().map(Into::into),
            derivative_orderbooks: r.derivative_orderbooks_filter.as_ref().map(Into::into),
            positions: r.positions_filter.as_ref().map(Into::into),
            oracle_prices: r.oracle_price_filter.as_ref().map(Into::into),
            order_failures: r
                .order_failures_filter
                .as_ref()
                .map(|f| AccountsFilter {
                    accounts: f.accounts.clone(),
                }),
            conditional_order_trigger_failures: r
                .conditional_order_trigger_failures_filter
                .as_ref()
                .map(|f| MarketSubaccountFilter {
                    market_ids: f.market_ids.clone(),
                    subaccount_ids: f.subaccount_ids.clone(),
                }),
        }
    }
}

impl From<&StreamRequest> for v1::StreamRequest {
    fn from(r: &StreamRequest) -> Self {
        Self {
            bank_balances_filter: r.bank_balances.as_ref().map(Into::into),
            subaccount_deposits_filter: r.subaccount_deposits.as_ref().map(Into::into),
            spot_trades_filter: r.spot_trades.as_ref().map(Into::into),
            derivative_trades_filter: r.derivative_trades.as_ref().map(Into::into),
            spot_orders_filter: r.spot_orders.as_ref().map(Into::into),
            derivative_orders_filter: r.derivative_orders.as_ref().map(Into::into),
            spot_orderbooks_filter: r.spot_orderbooks.as_ref().map(Into::into),
            derivative_orderbooks_filter: r.derivative_orderbooks.as_ref().map(Into::into),
            positions_filter: r.positions.as_ref().map(Into::into),
            oracle_price_filter: r.oracle_prices.as_ref().map(Into::into),
        }
    }
}

impl From<&StreamRequest> for v2::StreamRequest {
    fn from(r: &StreamRequest) -> Self {
        Self {
            bank_balances_filter: r.bank_balances.as_ref().map(Into::into),
            subaccount_deposits_filter: r.subaccount_deposits.as_ref().map(Into::into),
            spot_trades_filter: r.spot_trades.as_ref().map(Into::into),
            derivative_trades_filter: r.derivative_trades.as_ref().map(Into::into),
            spot_orders_filter: r.spot_orders.as_ref().map(Into::into),
            derivative_orders_filter: r.derivative_orders.as_ref().map(Into::into),
            spot_orderbooks_filter: r.spot_orderbooks.as_ref().map(Into::into),
            derivative_orderbooks_filter: r.derivative_orderbooks.as_ref().map(Into::into),
            positions_filter: r.positions.as_ref().map(Into::into),
            oracle_price_filter: r.oracle_prices.as_ref().map(Into::into),
            order_failures_filter: r
                .order_failures
                .as_ref()
                .map(|f| v2::OrderFailuresFilter {
                    accounts: f.accounts.clone(),
                }),
            conditional_order_trigger_failures_filter: r
                .conditional_order_trigger_failures
                .as_ref()
                .map(|f| v2::ConditionalOrderTriggerFailuresFilter {
                    subaccount_ids: f.subaccount_ids.clone(),
                    market_ids: f.market_ids.clone(),
                }),
        }
    }
}

// =============================================================================
// v2 Responses
// =============================================================================

impl From<&OrderFailureUpdate> for v2::OrderFailureUpdate {
    fn from(f: &OrderFailureUpdate) -> Self {
        Self {
            account: f.account.clone(),
            order_hash: f.order_hash.clone(),
            cid: f.cid.clone(),
            error_code: f.error_code,
        }
    }
}

impl From<&ConditionalOrderTriggerFailureUpdate> for v2::ConditionalOrderTriggerFailureUpdate {
    fn from(f: &ConditionalOrderTriggerFailureUpdate) -> Self {
        Self {
            market_id: f.market_id.clone(),
            subaccount_id: f.subaccount_id.clone(),
            mark_price: dec(f.mark_price),
            order_hash: f.order_hash.clone(),
            cid: f.cid.clone(),
            error_description: f.error_description.clone(),
        }
    }
}

impl From<&StreamResponse> for v2::StreamResponse {
    fn from(r: &StreamResponse) -> Self {
        Self {
            block_height: r.block_height,
            block_time: r.block_time,
            bank_balances: wire(&r.bank_balances),
            subaccount_deposits: wire(&r.subaccount_deposits),
            spot_trades: wire(&r.spot_trades),
            derivative_trades: wire(&r.derivative_trades),
            spot_orders: wire(&r.spot_orders),
            derivative_orders: wire(&r.derivative_orders),
            spot_orderbook_updates: wire(&r.spot_orderbook_updates),
            derivative_orderbook_updates: wire(&r.derivative_orderbook_updates),
            positions: wire(&r.positions),
            oracle_prices: wire(&r.oracle_prices),
            gas_price: r.gas_price.clone(),
            order_failures: wire(&r.order_failures),
            conditional_order_trigger_failures: wire(&r.conditional_order_trigger_failures),
        }
    }
}

// =============================================================================
// v1 Responses
// =============================================================================

fn scale_order_info(m: &MarketMetadata, info: &OrderInfo) -> Result<OrderInfo, ScaleError> {
    Ok(OrderInfo {
        price: m.price_to_chain(info.price, "price")?,
        quantity: m.quantity_to_chain(info.quantity, "quantity")?,
        ..info.clone()
    })
}

fn scale_trigger(m: &MarketMetadata, price: Option<Decimal>) -> Result<Option<Decimal>, ScaleError> {
    price
        .map(|p| m.price_to_chain(p, "trigger_price"))
        .transpose()
}

fn scale_spot_order(m: &MarketMetadata, u: &SpotOrderUpdate) -> Result<SpotOrderUpdate, ScaleError> {
    let order = SpotLimitOrder {
        order_info: scale_order_info(m, &u.order.order_info)?,
        fillable: m.quantity_to_chain(u.order.fillable, "fillable")?,
        trigger_price: scale_trigger(m, u.order.trigger_price)?,
        ..u.order.clone()
    };
    Ok(SpotOrderUpdate {
        order,
        ..u.clone()
    })
}

fn scale_derivative_order(
    m: &MarketMetadata,
    u: &DerivativeOrderUpdate,
) -> Result<DerivativeOrderUpdate, ScaleError> {
    let order = DerivativeLimitOrder {
        order_info: scale_order_info(m, &u.order.order_info)?,
        margin: m.notional_to_chain(u.order.margin, "margin")?,
        fillable: m.quantity_to_chain(u.order.fillable, "fillable")?,
        trigger_price: scale_trigger(m, u.order.trigger_price)?,
        ..u.order.clone()
    };
    Ok(DerivativeOrderUpdate {
        order,
        ..u.clone()
    })
}

fn scale_spot_trade(m: &MarketMetadata, t: &SpotTrade) -> Result<SpotTrade, ScaleError> {
    Ok(SpotTrade {
        quantity: m.quantity_to_chain(t.quantity, "quantity")?,
        price: m.price_to_chain(t.price, "price")?,
        fee: m.notional_to_chain(t.fee, "fee")?,
        ..t.clone()
    })
}

fn scale_derivative_trade(
    m: &MarketMetadata,
    t: &DerivativeTrade,
) -> Result<DerivativeTrade, ScaleError> {
    let position_delta = t
        .position_delta
        .as_ref()
        .map(|d| {
            Ok::<_, ScaleError>(PositionDelta {
                is_long: d.is_long,
                execution_quantity: m.quantity_to_chain(d.execution_quantity, "execution_quantity")?,
                execution_margin: m.notional_to_chain(d.execution_margin, "execution_margin")?,
                execution_price: m.price_to_chain(d.execution_price, "execution_price")?,
            })
        })
        .transpose()?;

    Ok(DerivativeTrade {
        position_delta,
        payout: m.notional_to_chain(t.payout, "payout")?,
        fee: m.notional_to_chain(t.fee, "fee")?,
        ..t.clone()
    })
}

fn scale_position(m: &MarketMetadata, p: &Position) -> Result<Position, ScaleError> {
    Ok(Position {
        quantity: m.quantity_to_chain(p.quantity, "quantity")?,
        entry_price: m.price_to_chain(p.entry_price, "entry_price")?,
        margin: m.notional_to_chain(p.margin, "margin")?,
        cumulative_funding_entry: m
            .notional_to_chain(p.cumulative_funding_entry, "cumulative_funding_entry")?,
        ..p.clone()
    })
}

fn scale_levels(m: &MarketMetadata, levels: &[Level]) -> Result<Vec<Level>, ScaleError> {
    levels
        .iter()
        .map(|l| {
            Ok(Level {
                p: m.price_to_chain(l.p, "price")?,
                q: m.quantity_to_chain(l.q, "quantity")?,
            })
        })
        .collect()
}

fn scale_orderbook(m: &MarketMetadata, u: &OrderbookUpdate) -> Result<OrderbookUpdate, ScaleError> {
    let mut scaled = u.clone();
    scaled.orderbook.buy_levels = scale_levels(m, &u.orderbook.buy_levels)?;
    scaled.orderbook.sell_levels = scale_levels(m, &u.orderbook.sell_levels)?;
    Ok(scaled)
}

/// Convert a response to the v1 wire format.
///
/// Markets are resolved at `block_height - 1`, the first height whose state
/// reflects the block's effects. Bank balances, deposits and oracle prices
/// are copied unscaled.
///
/// # Errors
///
/// Returns [`ConvertError`] when a market cannot be resolved or a value
/// cannot be rescaled.
pub async fn response_to_v1(
    response: &StreamResponse,
    finder: &CachedMarketFinder,
) -> Result<v1::StreamResponse, ConvertError> {
    let height = response.block_height.saturating_sub(1);
    let mut out = v1::StreamResponse {
        block_height: response.block_height,
        block_time: response.block_time,
        bank_balances: wire(&response.bank_balances),
        subaccount_deposits: wire(&response.subaccount_deposits),
        oracle_prices: wire(&response.oracle_prices),
        ..v1::StreamResponse::default()
    };

    for record in &response.spot_orders {
        let market = finder.find_spot_market(height, &record.value.market_id).await?;
        out.spot_orders
            .push((&scale_spot_order(&market, &record.value)?).into());
    }
    for record in &response.derivative_orders {
        let market = finder.find_market(height, &record.value.market_id).await?;
        out.derivative_orders
            .push((&scale_derivative_order(&market, &record.value)?).into());
    }
    for record in &response.spot_trades {
        let market = finder.find_spot_market(height, &record.value.market_id).await?;
        out.spot_trades
            .push((&scale_spot_trade(&market, &record.value)?).into());
    }
    for record in &response.derivative_trades {
        let market = finder.find_market(height, &record.value.market_id).await?;
        out.derivative_trades
            .push((&scale_derivative_trade(&market, &record.value)?).into());
    }
    for record in &response.spot_orderbook_updates {
        let market = finder
            .find_spot_market(height, &record.value.orderbook.market_id)
            .await?;
        out.spot_orderbook_updates
            .push((&scale_orderbook(&market, &record.value)?).into());
    }
    for record in &response.derivative_orderbook_updates {
        let market = finder
            .find_market(height, &record.value.orderbook.market_id)
            .await?;
        out.derivative_orderbook_updates
            .push((&scale_orderbook(&market, &record.value)?).into());
    }
    for record in &response.positions {
        let market = finder.find_market(height, &record.value.market_id).await?;
        out.positions
            .push((&scale_position(&market, &record.value)?).into());
    }

    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::ports::MockMarketStore;
    use crate::domain::buffer::Stamped;
    use crate::domain::market::MarketKind;
    use crate::domain::records::{OracleKind, OrderUpdateStatus};

    fn shared<T>(id: u64, value: T) -> Shared<T> {
        Arc::new(Stamped { id, value })
    }

    fn spot_trade() -> SpotTrade {
        SpotTrade {
            market_id: "m1".into(),
            is_buy: true,
            execution_type: "LimitMatchNewOrder".into(),
            quantity: Decimal::new(2, 0),
            price: Decimal::new(15, 1),
            subaccount_id: "s1".into(),
            fee: Decimal::new(1, 2),
            order_hash: "0x01".into(),
            fee_recipient_address: "inj1fee".into(),
            cid: "c1".into(),
            trade_id: "5_0".into(),
        }
    }

    fn spot_order() -> SpotOrderUpdate {
        SpotOrderUpdate {
            status: OrderUpdateStatus::Booked,
            order_hash: "0x02".into(),
            cid: "c2".into(),
            market_id: "m1".into(),
            order: SpotLimitOrder {
                order_info: OrderInfo {
                    subaccount_id: "s1".into(),
                    fee_recipient: "inj1fee".into(),
                    price: Decimal::new(15, 1),
                    quantity: Decimal::new(3, 0),
                    cid: "c2".into(),
                },
                order_type: "BUY".into(),
                fillable: Decimal::new(3, 0),
                trigger_price: None,
                order_hash: "0x02".into(),
            },
        }
    }

    fn store_with_spot_market() -> MockMarketStore {
        let mut store = MockMarketStore::new();
        store
            .expect_spot_market()
            .withf(|height, id| *height == 4 && id == "m1")
            .returning(|_, id| {
                Ok(Some(MarketMetadata {
                    market_id: id.to_string(),
                    kind: MarketKind::Spot,
                    base_decimals: 18,
                    quote_decimals: 6,
                }))
            });
        store
    }

    #[test]
    fn v2_request_keeps_unset_filters_unset() {
        let wire = v2::StreamRequest {
            spot_trades_filter: Some(v2::TradesFilter {
                subaccount_ids: vec!["*".into()],
                market_ids: vec!["m1".into()],
            }),
            order_failures_filter: Some(v2::OrderFailuresFilter { accounts: vec![] }),
            ..Default::default()
        };

        let request = StreamRequest::from(&wire);

        let trades = request.spot_trades.as_ref().unwrap();
        assert_eq!(trades.market_ids, vec!["m1".to_string()]);
        assert_eq!(trades.subaccount_ids, vec!["*".to_string()]);
        assert!(request.order_failures.is_some());
        assert!(request.positions.is_none());
        assert_eq!(v2::StreamRequest::from(&request), wire);
    }

    #[test]
    fn v1_request_has_no_failure_filters() {
        let wire = v1::StreamRequest::from(&StreamRequest::full());
        let request = StreamRequest::from(&wire);
        assert!(request.order_failures.is_none());
        assert!(request.conditional_order_trigger_failures.is_none());
        assert!(request.oracle_prices.is_some());
    }

    #[test]
    fn v2_response_carries_human_readable_values() {
        let response = StreamResponse {
            block_height: 5,
            block_time: 1_700_000_000_000,
            gas_price: "160000000".into(),
            spot_trades: vec![shared(0, spot_trade())],
            oracle_prices: vec![shared(
                1,
                OraclePrice {
                    symbol: "BTC".into(),
                    price: Decimal::new(4_200_000, 2),
                    kind: OracleKind::BandIbc,
                },
            )],
            ..StreamResponse::default()
        };

        let wire = v2::StreamResponse::from(&response);

        assert_eq!(wire.block_height, 5);
        assert_eq!(wire.gas_price, "160000000");
        assert_eq!(wire.spot_trades[0].price, "1.5");
        assert_eq!(wire.spot_trades[0].fee, "0.01");
        assert_eq!(wire.oracle_prices[0].price, "42000");
        assert_eq!(wire.oracle_prices[0].r#type, "bandibc");
    }

    #[tokio::test]
    async fn v1_response_rescales_spot_records() {
        let finder = CachedMarketFinder::new(Arc::new(store_with_spot_market()));
        let response = StreamResponse {
            block_height: 5,
            spot_trades: vec![shared(0, spot_trade())],
            spot_orders: vec![shared(1, spot_order())],
            ..StreamResponse::default()
        };

        let wire = response_to_v1(&response, &finder).await.unwrap();

        let trade = &wire.spot_trades[0];
        assert_eq!(trade.price, "0.0000000000015");
        assert_eq!(trade.quantity, "2000000000000000000");
        assert_eq!(trade.fee, "10000");
        assert_eq!(trade.trade_id, "5_0");

        let order = wire.spot_orders[0].order.as_ref().unwrap();
        assert_eq!(order.fillable, "3000000000000000000");
        assert_eq!(order.trigger_price, "");
        assert_eq!(wire.spot_orders[0].status, "Booked");
    }

    #[tokio::test]
    async fn v1_response_fails_on_unknown_market() {
        let mut store = MockMarketStore::new();
        store.expect_spot_market().returning(|_, _| Ok(None));
        let finder = CachedMarketFinder::new(Arc::new(store));
        let response = StreamResponse {
            block_height: 5,
            spot_trades: vec![shared(0, spot_trade())],
            ..StreamResponse::default()
        };

        let err = response_to_v1(&response, &finder).await.unwrap_err();
        assert_eq!(err.to_string(), "spot market doesn't exist m1");
    }
}
