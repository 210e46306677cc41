//! Event type strings recognised by the standard registry.

/// Bank balance changes.
pub const BANK_BALANCES: &str = "cosmos.bank.v1beta1.EventSetBalances";

/// New spot limit orders.
pub const NEW_SPOT_ORDERS: &str = "injective.exchange.v2.EventNewSpotOrders";
/// New derivative limit orders.
pub const NEW_DERIVATIVE_ORDERS: &str = "injective.exchange.v2.EventNewDerivativeOrders";
/// New conditional derivative order.
pub const NEW_CONDITIONAL_DERIVATIVE_ORDER: &str =
    "injective.exchange.v2.EventNewConditionalDerivativeOrder";
/// Spot order cancellation.
pub const CANCEL_SPOT_ORDER: &str = "injective.exchange.v2.EventCancelSpotOrder";
/// Derivative order cancellation.
pub const CANCEL_DERIVATIVE_ORDER: &str = "injective.exchange.v2.EventCancelDerivativeOrder";
/// Batch of spot trades.
pub const BATCH_SPOT_EXECUTION: &str = "injective.exchange.v2.EventBatchSpotExecution";
/// Batch of derivative trades.
pub const BATCH_DERIVATIVE_EXECUTION: &str = "injective.exchange.v2.EventBatchDerivativeExecution";
/// Batch of derivative positions.
pub const BATCH_DERIVATIVE_POSITION: &str = "injective.exchange.v2.EventBatchDerivativePosition";
/// Orderbook level changes.
pub const ORDERBOOK_UPDATE: &str = "injective.exchange.v2.EventOrderbookUpdate";
/// Subaccount deposit changes.
pub const BATCH_DEPOSIT_UPDATE: &str = "injective.exchange.v2.EventBatchDepositUpdate";
/// Rejected orders.
pub const ORDER_FAIL: &str = "injective.exchange.v2.EventOrderFail";
/// Conditional market order failed to trigger.
pub const CONDITIONAL_MARKET_ORDER_TRIGGER_FAILED: &str =
    "injective.exchange.v2.EventTriggerConditionalMarketOrderFailed";
/// Conditional limit order failed to trigger.
pub const CONDITIONAL_LIMIT_ORDER_TRIGGER_FAILED: &str =
    "injective.exchange.v2.EventTriggerConditionalLimitOrderFailed";

/// Coinbase price.
pub const COINBASE_PRICE: &str = "injective.oracle.v1beta1.SetCoinbasePriceEvent";
/// Pyth prices.
pub const PYTH_PRICES: &str = "injective.oracle.v1beta1.EventSetPythPrices";
/// Band IBC prices.
pub const BAND_IBC_PRICES: &str = "injective.oracle.v1beta1.SetBandIBCPriceEvent";
/// Provider price.
pub const PROVIDER_PRICE: &str = "injective.oracle.v1beta1.SetProviderPriceEvent";
/// Price feeder price.
pub const PRICE_FEED_PRICE: &str = "injective.oracle.v1beta1.SetPriceFeedPriceEvent";
/// Stork prices.
pub const STORK_PRICES: &str = "injective.oracle.v1beta1.EventSetStorkPrices";
