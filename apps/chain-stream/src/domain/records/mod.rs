//! Canonical Domain Records
//!
//! The single internal representation of every update the stream carries.
//! Prices, quantities and notionals are human-readable decimals; conversion
//! to the fixed-point v1 wire format happens only at the protocol boundary.
//!
//! Records are immutable once constructed. The only field filled in after
//! decoding is the trade ID, which the response buffer assigns on insertion.

use rust_decimal::Decimal;
use serde::Serialize;

// =============================================================================
// Shared Types
// =============================================================================

/// Lifecycle status carried by order updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrderUpdateStatus {
    /// Order rests on the book untouched.
    Booked,
    /// Order was (partially) matched.
    Matched,
    /// Order was cancelled.
    Cancelled,
}

impl OrderUpdateStatus {
    /// Derive the status of a new order from its fill state.
    #[must_use]
    pub fn from_fill(fillable: Decimal, quantity: Decimal) -> Self {
        if fillable == quantity {
            Self::Booked
        } else {
            Self::Matched
        }
    }

    /// Status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "Booked",
            Self::Matched => "Matched",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// A denomination and amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coin {
    /// Denomination.
    pub denom: String,
    /// Integer amount.
    pub amount: Decimal,
}

/// Order parameters common to spot and derivative orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderInfo {
    /// Owning subaccount.
    pub subaccount_id: String,
    /// Fee recipient address.
    pub fee_recipient: String,
    /// Limit price.
    pub price: Decimal,
    /// Original quantity.
    pub quantity: Decimal,
    /// Client order ID.
    pub cid: String,
}

// =============================================================================
// Orders
// =============================================================================

/// A spot limit order as stored on the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotLimitOrder {
    /// Order parameters.
    pub order_info: OrderInfo,
    /// Order type name (`BUY`, `SELL_PO`, ...).
    pub order_type: String,
    /// Remaining unfilled quantity.
    pub fillable: Decimal,
    /// Trigger price for conditional orders.
    pub trigger_price: Option<Decimal>,
    /// Order hash (hex).
    pub order_hash: String,
}

/// A derivative limit order as stored on the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivativeLimitOrder {
    /// Order parameters.
    pub order_info: OrderInfo,
    /// Order type name.
    pub order_type: String,
    /// Committed margin.
    pub margin: Decimal,
    /// Remaining unfilled quantity.
    pub fillable: Decimal,
    /// Trigger price for conditional orders.
    pub trigger_price: Option<Decimal>,
    /// Order hash (hex).
    pub order_hash: String,
}

/// Spot order update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotOrderUpdate {
    /// Update status.
    pub status: OrderUpdateStatus,
    /// Order hash (hex).
    pub order_hash: String,
    /// Client order ID.
    pub cid: String,
    /// Market the order belongs to.
    pub market_id: String,
    /// The order.
    pub order: SpotLimitOrder,
}

impl SpotOrderUpdate {
    /// Subaccount that owns the order.
    #[must_use]
    pub fn subaccount_id(&self) -> &str {
        &self.order.order_info.subaccount_id
    }
}

/// Derivative order update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivativeOrderUpdate {
    /// Update status.
    pub status: OrderUpdateStatus,
    /// Order hash (hex).
    pub order_hash: String,
    /// Client order ID.
    pub cid: String,
    /// Market the order belongs to.
    pub market_id: String,
    /// Whether this is a conditional market order.
    pub is_market: bool,
    /// The order.
    pub order: DerivativeLimitOrder,
}

impl DerivativeOrderUpdate {
    /// Subaccount that owns the order.
    #[must_use]
    pub fn subaccount_id(&self) -> &str {
        &self.order.order_info.subaccount_id
    }
}

// =============================================================================
// Trades and Positions
// =============================================================================

/// Spot trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotTrade {
    /// Market ID.
    pub market_id: String,
    /// Whether the taker side was a buy.
    pub is_buy: bool,
    /// Execution type name.
    pub execution_type: String,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Subaccount (hex).
    pub subaccount_id: String,
    /// Fee paid.
    pub fee: Decimal,
    /// Order hash (hex).
    pub order_hash: String,
    /// Bech32 fee recipient address, empty when unset.
    pub fee_recipient_address: String,
    /// Client order ID.
    pub cid: String,
    /// `{height}_{n}`, assigned by the response buffer.
    pub trade_id: String,
}

/// Change applied to a position by a derivative trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionDelta {
    /// Direction.
    pub is_long: bool,
    /// Executed quantity.
    pub execution_quantity: Decimal,
    /// Executed margin.
    pub execution_margin: Decimal,
    /// Execution price.
    pub execution_price: Decimal,
}

/// Derivative trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivativeTrade {
    /// Market ID.
    pub market_id: String,
    /// Whether the taker side was a buy.
    pub is_buy: bool,
    /// Execution type name.
    pub execution_type: String,
    /// Subaccount (hex).
    pub subaccount_id: String,
    /// Position change, if reported.
    pub position_delta: Option<PositionDelta>,
    /// Payout.
    pub payout: Decimal,
    /// Fee paid.
    pub fee: Decimal,
    /// Order hash (hex).
    pub order_hash: String,
    /// Bech32 fee recipient address, empty when unset.
    pub fee_recipient_address: String,
    /// Client order ID.
    pub cid: String,
    /// `{height}_{n}`, assigned by the response buffer.
    pub trade_id: String,
}

/// Derivative position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Market ID.
    pub market_id: String,
    /// Subaccount (hex).
    pub subaccount_id: String,
    /// Direction.
    pub is_long: bool,
    /// Position size.
    pub quantity: Decimal,
    /// Entry price.
    pub entry_price: Decimal,
    /// Margin.
    pub margin: Decimal,
    /// Cumulative funding at entry.
    pub cumulative_funding_entry: Decimal,
}

// =============================================================================
// Books, Balances and Prices
// =============================================================================

/// Price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level {
    /// Price.
    pub p: Decimal,
    /// Quantity.
    pub q: Decimal,
}

/// Orderbook levels for a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Orderbook {
    /// Market ID (hex).
    pub market_id: String,
    /// Bid levels.
    pub buy_levels: Vec<Level>,
    /// Ask levels.
    pub sell_levels: Vec<Level>,
}

/// Sequenced orderbook update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderbookUpdate {
    /// Orderbook sequence number.
    pub seq: u64,
    /// Updated levels.
    pub orderbook: Orderbook,
}

/// Bank balance change for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankBalance {
    /// Bech32 account address.
    pub account: String,
    /// New balances.
    pub balances: Vec<Coin>,
}

/// Deposit amounts for one denom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deposit {
    /// Available balance.
    pub available_balance: Decimal,
    /// Total balance.
    pub total_balance: Decimal,
}

/// Deposit of a subaccount in one denom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubaccountDeposit {
    /// Denomination.
    pub denom: String,
    /// Amounts.
    pub deposit: Deposit,
}

/// All deposit changes of one subaccount within an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubaccountDeposits {
    /// Subaccount (hex).
    pub subaccount_id: String,
    /// Deposits.
    pub deposits: Vec<SubaccountDeposit>,
}

/// Oracle scheme that produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OracleKind {
    /// Coinbase signed prices.
    Coinbase,
    /// Pyth network.
    Pyth,
    /// Band protocol over IBC.
    BandIbc,
    /// Permissioned price provider.
    Provider,
    /// Price feeder relayers.
    PriceFeed,
    /// Stork network.
    Stork,
}

impl OracleKind {
    /// Type discriminator used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Coinbase => "coinbase",
            Self::Pyth => "pyth",
            Self::BandIbc => "bandibc",
            Self::Provider => "provider",
            Self::PriceFeed => "pricefeed",
            Self::Stork => "stork",
        }
    }
}

/// Oracle price update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OraclePrice {
    /// Symbol (or feed ID for Pyth).
    pub symbol: String,
    /// Price.
    pub price: Decimal,
    /// Originating scheme.
    pub kind: OracleKind,
}

// =============================================================================
// Failures
// =============================================================================

/// Order rejected by the exchange module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderFailureUpdate {
    /// Bech32 account address.
    pub account: String,
    /// Order hash (hex).
    pub order_hash: String,
    /// Client order ID.
    pub cid: String,
    /// Failure flag.
    pub error_code: u32,
}

/// Conditional order that failed to trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionalOrderTriggerFailureUpdate {
    /// Market ID.
    pub market_id: String,
    /// Subaccount ID.
    pub subaccount_id: String,
    /// Mark price at trigger time.
    pub mark_price: Decimal,
    /// Order hash (hex).
    pub order_hash: String,
    /// Client order ID.
    pub cid: String,
    /// Trigger error.
    pub error_description: String,
}

// =============================================================================
// Sum Type
// =============================================================================

/// Any record the decoder can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DomainRecord {
    /// Bank balance.
    BankBalance(BankBalance),
    /// Spot order update.
    SpotOrder(SpotOrderUpdate),
    /// Derivative order update.
    DerivativeOrder(DerivativeOrderUpdate),
    /// Spot trade.
    SpotTrade(SpotTrade),
    /// Derivative trade.
    DerivativeTrade(DerivativeTrade),
    /// Spot orderbook update.
    SpotOrderbook(OrderbookUpdate),
    /// Derivative orderbook update.
    DerivativeOrderbook(OrderbookUpdate),
    /// Subaccount deposits.
    SubaccountDeposits(SubaccountDeposits),
    /// Derivative position.
    Position(Position),
    /// Oracle price.
    OraclePrice(OraclePrice),
    /// Order failure.
    OrderFailure(OrderFailureUpdate),
    /// Conditional order trigger failure.
    ConditionalOrderTriggerFailure(ConditionalOrderTriggerFailureUpdate),
}

impl DomainRecord {
    /// Short name of the record kind, used as a metrics label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BankBalance(_) => "bank_balance",
            Self::SpotOrder(_) => "spot_order",
            Self::DerivativeOrder(_) => "derivative_order",
            Self::SpotTrade(_) => "spot_trade",
            Self::DerivativeTrade(_) => "derivative_trade",
            Self::SpotOrderbook(_) => "spot_orderbook",
            Self::DerivativeOrderbook(_) => "derivative_orderbook",
            Self::SubaccountDeposits(_) => "subaccount_deposits",
            Self::Position(_) => "position",
            Self::OraclePrice(_) => "oracle_price",
            Self::OrderFailure(_) => "order_failure",
            Self::ConditionalOrderTriggerFailure(_) => "conditional_trigger_failure",
        }
    }
}
