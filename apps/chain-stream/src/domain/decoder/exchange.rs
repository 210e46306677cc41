//! Exchange module events: orders, trades, positions, books, deposits and
//! failures.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::attributes::{AccountAddress, Attributes, HexHash, lenient_u64};
use super::{DecodeError, DecoderRegistry, topics};
use crate::domain::events::RawEvent;
use crate::domain::records::{
    ConditionalOrderTriggerFailureUpdate, Deposit, DerivativeLimitOrder, DerivativeOrderUpdate,
    DerivativeTrade, DomainRecord, Level, OrderFailureUpdate, OrderInfo, OrderUpdateStatus,
    Orderbook, OrderbookUpdate, Position, PositionDelta, SpotLimitOrder, SpotOrderUpdate,
    SpotTrade, SubaccountDeposit, SubaccountDeposits,
};

pub(super) fn register(registry: &mut DecoderRegistry) {
    registry.register(topics::NEW_SPOT_ORDERS, new_spot_orders);
    registry.register(topics::NEW_DERIVATIVE_ORDERS, new_derivative_orders);
    registry.register(
        topics::NEW_CONDITIONAL_DERIVATIVE_ORDER,
        new_conditional_derivative_order,
    );
    registry.register(topics::CANCEL_SPOT_ORDER, cancel_spot_order);
    registry.register(topics::CANCEL_DERIVATIVE_ORDER, cancel_derivative_order);
    registry.register(topics::BATCH_SPOT_EXECUTION, batch_spot_execution);
    registry.register(topics::BATCH_DERIVATIVE_EXECUTION, batch_derivative_execution);
    registry.register(topics::BATCH_DERIVATIVE_POSITION, batch_derivative_position);
    registry.register(topics::ORDERBOOK_UPDATE, orderbook_update);
    registry.register(topics::BATCH_DEPOSIT_UPDATE, batch_deposit_update);
    registry.register(topics::ORDER_FAIL, order_fail);
    registry.register(
        topics::CONDITIONAL_MARKET_ORDER_TRIGGER_FAILED,
        conditional_order_trigger_failed,
    );
    registry.register(
        topics::CONDITIONAL_LIMIT_ORDER_TRIGGER_FAILED,
        conditional_order_trigger_failed,
    );
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct OrderInfoPayload {
    #[serde(default)]
    subaccount_id: String,
    #[serde(default)]
    fee_recipient: String,
    price: Decimal,
    quantity: Decimal,
    #[serde(default)]
    cid: String,
}

impl From<OrderInfoPayload> for OrderInfo {
    fn from(p: OrderInfoPayload) -> Self {
        Self {
            subaccount_id: p.subaccount_id,
            fee_recipient: p.fee_recipient,
            price: p.price,
            quantity: p.quantity,
            cid: p.cid,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpotLimitOrderPayload {
    order_info: OrderInfoPayload,
    #[serde(default)]
    order_type: String,
    fillable: Decimal,
    #[serde(default)]
    trigger_price: Option<Decimal>,
    #[serde(default)]
    order_hash: HexHash,
}

impl From<SpotLimitOrderPayload> for SpotLimitOrder {
    fn from(p: SpotLimitOrderPayload) -> Self {
        Self {
            order_info: p.order_info.into(),
            order_type: p.order_type,
            fillable: p.fillable,
            trigger_price: p.trigger_price,
            order_hash: p.order_hash.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DerivativeLimitOrderPayload {
    order_info: OrderInfoPayload,
    #[serde(default)]
    order_type: String,
    margin: Decimal,
    fillable: Decimal,
    #[serde(default)]
    trigger_price: Option<Decimal>,
    #[serde(default)]
    order_hash: HexHash,
}

impl From<DerivativeLimitOrderPayload> for DerivativeLimitOrder {
    fn from(p: DerivativeLimitOrderPayload) -> Self {
        Self {
            order_info: p.order_info.into(),
            order_type: p.order_type,
            margin: p.margin,
            fillable: p.fillable,
            trigger_price: p.trigger_price,
            order_hash: p.order_hash.into(),
        }
    }
}

/// Conditional order as carried by the new-conditional-order event. It has
/// no fill state yet; its hash travels in a separate attribute.
#[derive(Debug, Deserialize)]
struct DerivativeOrderPayload {
    order_info: OrderInfoPayload,
    #[serde(default)]
    order_type: String,
    margin: Decimal,
    #[serde(default)]
    trigger_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct TradeLogPayload {
    quantity: Decimal,
    price: Decimal,
    #[serde(default)]
    subaccount_id: HexHash,
    fee: Decimal,
    #[serde(default)]
    order_hash: HexHash,
    #[serde(default)]
    fee_recipient_address: AccountAddress,
    #[serde(default)]
    cid: String,
}

#[derive(Debug, Deserialize)]
struct PositionDeltaPayload {
    is_long: bool,
    execution_quantity: Decimal,
    execution_margin: Decimal,
    execution_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct DerivativeTradeLogPayload {
    #[serde(default)]
    subaccount_id: HexHash,
    #[serde(default)]
    position_delta: Option<PositionDeltaPayload>,
    payout: Decimal,
    fee: Decimal,
    #[serde(default)]
    order_hash: HexHash,
    #[serde(default)]
    fee_recipient_address: AccountAddress,
    #[serde(default)]
    cid: String,
}

#[derive(Debug, Deserialize)]
struct PositionPayload {
    is_long: bool,
    quantity: Decimal,
    entry_price: Decimal,
    margin: Decimal,
    cumulative_funding_entry: Decimal,
}

#[derive(Debug, Deserialize)]
struct SubaccountPositionPayload {
    #[serde(default)]
    subaccount_id: HexHash,
    position: PositionPayload,
}

#[derive(Debug, Deserialize)]
struct LevelPayload {
    p: Decimal,
    q: Decimal,
}

impl From<LevelPayload> for Level {
    fn from(l: LevelPayload) -> Self {
        Self { p: l.p, q: l.q }
    }
}

#[derive(Debug, Deserialize)]
struct OrderbookPayload {
    #[serde(default)]
    market_id: HexHash,
    #[serde(default)]
    buy_levels: Vec<LevelPayload>,
    #[serde(default)]
    sell_levels: Vec<LevelPayload>,
}

#[derive(Debug, Deserialize)]
struct OrderbookUpdatePayload {
    #[serde(default, deserialize_with = "lenient_u64")]
    seq: u64,
    #[serde(default)]
    orderbook: Option<OrderbookPayload>,
}

#[derive(Debug, Deserialize)]
struct DepositPayload {
    available_balance: Decimal,
    total_balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct SubaccountDepositPayload {
    #[serde(default)]
    subaccount_id: HexHash,
    #[serde(default)]
    deposit: Option<DepositPayload>,
}

#[derive(Debug, Deserialize)]
struct DepositUpdatePayload {
    denom: String,
    #[serde(default)]
    deposits: Vec<SubaccountDepositPayload>,
}

// =============================================================================
// Orders
// =============================================================================

fn spot_update(market_id: &str, status: OrderUpdateStatus, order: SpotLimitOrder) -> DomainRecord {
    DomainRecord::SpotOrder(SpotOrderUpdate {
        status,
        order_hash: order.order_hash.clone(),
        cid: order.order_info.cid.clone(),
        market_id: market_id.to_string(),
        order,
    })
}

fn derivative_update(
    market_id: &str,
    status: OrderUpdateStatus,
    is_market: bool,
    order: DerivativeLimitOrder,
) -> DomainRecord {
    DomainRecord::DerivativeOrder(DerivativeOrderUpdate {
        status,
        order_hash: order.order_hash.clone(),
        cid: order.order_info.cid.clone(),
        market_id: market_id.to_string(),
        is_market,
        order,
    })
}

fn new_spot_orders(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;
    let mut orders: Vec<SpotLimitOrderPayload> = attrs.list("buy_orders")?;
    orders.extend(attrs.list::<SpotLimitOrderPayload>("sell_orders")?);

    Ok(orders
        .into_iter()
        .map(|payload| {
            let order = SpotLimitOrder::from(payload);
            let status = OrderUpdateStatus::from_fill(order.fillable, order.order_info.quantity);
            spot_update(&market_id, status, order)
        })
        .collect())
}

fn new_derivative_orders(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;
    let mut orders: Vec<DerivativeLimitOrderPayload> = attrs.list("buy_orders")?;
    orders.extend(attrs.list::<DerivativeLimitOrderPayload>("sell_orders")?);

    Ok(orders
        .into_iter()
        .map(|payload| {
            let order = DerivativeLimitOrder::from(payload);
            let status = OrderUpdateStatus::from_fill(order.fillable, order.order_info.quantity);
            derivative_update(&market_id, status, false, order)
        })
        .collect())
}

fn new_conditional_derivative_order(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;
    let payload: DerivativeOrderPayload = attrs.json("order")?;
    let hash: HexHash = attrs.json("hash")?;
    let is_market = attrs.bool("is_market")?;

    let order_info = OrderInfo::from(payload.order_info);
    let order = DerivativeLimitOrder {
        fillable: order_info.quantity,
        order_info,
        order_type: payload.order_type,
        margin: payload.margin,
        trigger_price: payload.trigger_price,
        order_hash: hash.into(),
    };
    let status = OrderUpdateStatus::from_fill(order.fillable, order.order_info.quantity);

    Ok(vec![derivative_update(&market_id, status, is_market, order)])
}

fn cancel_spot_order(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;
    let order: SpotLimitOrderPayload = attrs.json("order")?;

    Ok(vec![spot_update(
        &market_id,
        OrderUpdateStatus::Cancelled,
        order.into(),
    )])
}

fn cancel_derivative_order(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;

    // Market orders are cancelled without a limit order attached.
    let Some(order) = attrs.optional_json::<DerivativeLimitOrderPayload>("limit_order")? else {
        return Ok(Vec::new());
    };

    Ok(vec![derivative_update(
        &market_id,
        OrderUpdateStatus::Cancelled,
        false,
        order.into(),
    )])
}

// =============================================================================
// Trades and Positions
// =============================================================================

fn batch_spot_execution(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;
    let is_buy = attrs.bool("is_buy")?;
    let execution_type = attrs.lenient_string("executionType")?;
    let trades: Vec<TradeLogPayload> = attrs.list("trades")?;

    Ok(trades
        .into_iter()
        .map(|log| {
            DomainRecord::SpotTrade(SpotTrade {
                market_id: market_id.clone(),
                is_buy,
                execution_type: execution_type.clone(),
                quantity: log.quantity,
                price: log.price,
                subaccount_id: log.subaccount_id.into(),
                fee: log.fee,
                order_hash: log.order_hash.into(),
                fee_recipient_address: log.fee_recipient_address.into(),
                cid: log.cid,
                trade_id: String::new(),
            })
        })
        .collect())
}

fn batch_derivative_execution(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;
    let is_buy = attrs.bool("is_buy")?;
    let execution_type = attrs.lenient_string("executionType")?;
    let trades: Vec<DerivativeTradeLogPayload> = attrs.list("trades")?;

    Ok(trades
        .into_iter()
        .map(|log| {
            DomainRecord::DerivativeTrade(DerivativeTrade {
                market_id: market_id.clone(),
                is_buy,
                execution_type: execution_type.clone(),
                subaccount_id: log.subaccount_id.into(),
                position_delta: log.position_delta.map(|d| PositionDelta {
                    is_long: d.is_long,
                    execution_quantity: d.execution_quantity,
                    execution_margin: d.execution_margin,
                    execution_price: d.execution_price,
                }),
                payout: log.payout,
                fee: log.fee,
                order_hash: log.order_hash.into(),
                fee_recipient_address: log.fee_recipient_address.into(),
                cid: log.cid,
                trade_id: String::new(),
            })
        })
        .collect())
}

fn batch_derivative_position(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let market_id = attrs.lenient_string("market_id")?;
    let positions: Vec<SubaccountPositionPayload> = attrs.list("positions")?;

    Ok(positions
        .into_iter()
        // Zero entry price marks a transient position that is about to be pruned.
        .filter(|p| !p.position.entry_price.is_zero())
        .map(|p| {
            DomainRecord::Position(Position {
                market_id: market_id.clone(),
                subaccount_id: p.subaccount_id.into(),
                is_long: p.position.is_long,
                quantity: p.position.quantity,
                entry_price: p.position.entry_price,
                margin: p.position.margin,
                cumulative_funding_entry: p.position.cumulative_funding_entry,
            })
        })
        .collect())
}

// =============================================================================
// Books and Deposits
// =============================================================================

fn orderbook_updates(updates: Vec<OrderbookUpdatePayload>) -> impl Iterator<Item = OrderbookUpdate> {
    updates.into_iter().filter_map(|update| {
        let book = update.orderbook?;
        Some(OrderbookUpdate {
            seq: update.seq,
            orderbook: Orderbook {
                market_id: book.market_id.into(),
                buy_levels: book.buy_levels.into_iter().map(Level::from).collect(),
                sell_levels: book.sell_levels.into_iter().map(Level::from).collect(),
            },
        })
    })
}

fn orderbook_update(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let spot: Vec<OrderbookUpdatePayload> = attrs.list("spot_updates")?;
    let derivative: Vec<OrderbookUpdatePayload> = attrs.list("derivative_updates")?;

    Ok(orderbook_updates(spot)
        .map(DomainRecord::SpotOrderbook)
        .chain(orderbook_updates(derivative).map(DomainRecord::DerivativeOrderbook))
        .collect())
}

fn batch_deposit_update(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let updates: Vec<DepositUpdatePayload> = attrs.list("deposit_updates")?;

    let mut grouped: Vec<SubaccountDeposits> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for update in updates {
        for entry in update.deposits {
            let Some(deposit) = entry.deposit else {
                continue;
            };
            let subaccount_id: String = entry.subaccount_id.into();
            let slot = *slots.entry(subaccount_id.clone()).or_insert_with(|| {
                grouped.push(SubaccountDeposits {
                    subaccount_id,
                    deposits: Vec::new(),
                });
                grouped.len() - 1
            });
            grouped[slot].deposits.push(SubaccountDeposit {
                denom: update.denom.clone(),
                deposit: Deposit {
                    available_balance: deposit.available_balance,
                    total_balance: deposit.total_balance,
                },
            });
        }
    }

    Ok(grouped
        .into_iter()
        .map(DomainRecord::SubaccountDeposits)
        .collect())
}

// =============================================================================
// Failures
// =============================================================================

fn order_fail(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let account: String = attrs.json::<AccountAddress>("account")?.into();
    let hashes: Vec<HexHash> = attrs.list("hashes")?;
    let flags: Vec<u32> = attrs.list("flags")?;
    let cids: Vec<String> = attrs.list("cids")?;

    if hashes.len() < flags.len() {
        return Err(attrs.invalid(
            "hashes",
            format!("{} hashes for {} flags", hashes.len(), flags.len()),
        ));
    }
    if cids.len() < flags.len() {
        return Err(attrs.invalid(
            "cids",
            format!("{} cids for {} flags", cids.len(), flags.len()),
        ));
    }

    Ok(flags
        .into_iter()
        .zip(hashes.into_iter().zip(cids))
        .map(|(error_code, (hash, cid))| {
            DomainRecord::OrderFailure(OrderFailureUpdate {
                account: account.clone(),
                order_hash: hash.into(),
                cid,
                error_code,
            })
        })
        .collect())
}

fn conditional_order_trigger_failed(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let order_hash: HexHash = attrs.json("order_hash")?;
    let cid = if attrs.has("cid") {
        attrs.lenient_string("cid")?
    } else {
        String::new()
    };

    Ok(vec![DomainRecord::ConditionalOrderTriggerFailure(
        ConditionalOrderTriggerFailureUpdate {
            market_id: attrs.lenient_string("market_id")?,
            subaccount_id: attrs.lenient_string("subaccount_id")?,
            mark_price: attrs.decimal("mark_price")?,
            order_hash: order_hash.into(),
            cid,
            error_description: attrs.lenient_string("trigger_err")?,
        },
    )])
}
