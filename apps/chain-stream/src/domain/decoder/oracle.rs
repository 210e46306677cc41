//! Oracle module price events.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::attributes::{Attributes, parse_decimal};
use super::{DecodeError, DecoderRegistry, topics};
use crate::domain::events::RawEvent;
use crate::domain::records::{DomainRecord, OracleKind, OraclePrice};

pub(super) fn register(registry: &mut DecoderRegistry) {
    registry.register(topics::COINBASE_PRICE, coinbase_price);
    registry.register(topics::PYTH_PRICES, pyth_prices);
    registry.register(topics::BAND_IBC_PRICES, band_ibc_prices);
    registry.register(topics::PROVIDER_PRICE, provider_price);
    registry.register(topics::PRICE_FEED_PRICE, price_feed_price);
    registry.register(topics::STORK_PRICES, stork_prices);
}

#[derive(Debug, Deserialize)]
struct PythPriceStatePayload {
    price_id: String,
    ema_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct StorkPriceStatePayload {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct StorkPricePayload {
    symbol: String,
    price_state: StorkPriceStatePayload,
}

fn price(symbol: impl Into<String>, price: Decimal, kind: OracleKind) -> DomainRecord {
    DomainRecord::OraclePrice(OraclePrice {
        symbol: symbol.into(),
        price,
        kind,
    })
}

/// Coinbase prices are signed strings that may carry trailing zeros.
fn trim_coinbase_price(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.contains('.') {
        let digits = trimmed.trim_end_matches('0');
        digits.strip_suffix('.').unwrap_or(digits)
    } else {
        trimmed
    }
}

fn coinbase_price(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let symbol = attrs.string("symbol")?;
    let raw = attrs.string("price")?;
    let value =
        parse_decimal(trim_coinbase_price(&raw)).map_err(|reason| attrs.invalid("price", reason))?;

    Ok(vec![price(symbol.trim(), value, OracleKind::Coinbase)])
}

fn pyth_prices(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let states: Vec<PythPriceStatePayload> = attrs.list("prices")?;

    // Pyth identifies feeds by ID, not by symbol.
    Ok(states
        .into_iter()
        .map(|state| price(state.price_id, state.ema_price, OracleKind::Pyth))
        .collect())
}

fn band_ibc_prices(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let symbols: Vec<String> = attrs.list("symbols")?;
    let prices: Vec<Decimal> = attrs.list("prices")?;

    if attrs.has("relayer") {
        attrs.lenient_string("relayer")?;
    }
    for key in ["resolve_time", "request_id", "client_id"] {
        if attrs.has(key) {
            attrs.i64(key)?;
        }
    }

    // Symbols without a matching price are dropped.
    if symbols.len() != prices.len() {
        tracing::warn!(
            symbols = symbols.len(),
            prices = prices.len(),
            "Band IBC price lists differ in length, truncating"
        );
    }
    Ok(symbols
        .into_iter()
        .zip(prices)
        .map(|(symbol, value)| price(symbol, value, OracleKind::BandIbc))
        .collect())
}

fn provider_price(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    Ok(vec![price(
        attrs.lenient_string("symbol")?,
        attrs.decimal("price")?,
        OracleKind::Provider,
    )])
}

fn price_feed_price(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let symbol = format!(
        "{}/{}",
        attrs.lenient_string("base")?,
        attrs.lenient_string("quote")?
    );
    Ok(vec![price(
        symbol,
        attrs.decimal("price")?,
        OracleKind::PriceFeed,
    )])
}

fn stork_prices(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let attrs = Attributes::new(event);
    let states: Vec<StorkPricePayload> = attrs.list("prices")?;

    Ok(states
        .into_iter()
        .map(|state| price(state.symbol, state.price_state.price, OracleKind::Stork))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn only_price(records: &[DomainRecord]) -> &OraclePrice {
        match records {
            [DomainRecord::OraclePrice(p)] => p,
            other => panic!("expected one oracle price, got {other:?}"),
        }
    }

    #[test_case("1.500", "1.5"; "trailing zeros")]
    #[test_case("2.000", "2"; "integral")]
    #[test_case(" 300 ", "300"; "no fraction keeps zeros")]
    fn coinbase_trimming(raw: &str, expected: &str) {
        assert_eq!(trim_coinbase_price(raw), expected);
    }

    #[test]
    fn coinbase_price_is_unquoted_and_trimmed() {
        let event = RawEvent::new(topics::COINBASE_PRICE)
            .with_attribute("symbol", "\"BTC\"")
            .with_attribute("price", "\"42000.1200\"");

        let records = coinbase_price(&event).unwrap();

        let p = only_price(&records);
        assert_eq!(p.symbol, "BTC");
        assert_eq!(p.price, Decimal::new(4_200_012, 2));
        assert_eq!(p.kind, OracleKind::Coinbase);
    }

    #[test]
    fn band_prices_are_zipped_and_truncated() {
        let event = RawEvent::new(topics::BAND_IBC_PRICES)
            .with_attribute("symbols", r#"["ATOM","OSMO","JUNO"]"#)
            .with_attribute("prices", r#"["10.5","0.8"]"#)
            .with_attribute("relayer", "\"inj1relayer\"")
            .with_attribute("resolve_time", "\"1700000000\"")
            .with_attribute("request_id", "\"12\"")
            .with_attribute("client_id", "\"1\"");

        let records = band_ibc_prices(&event).unwrap();

        let symbols: Vec<_> = records
            .iter()
            .map(|r| match r {
                DomainRecord::OraclePrice(p) => p.symbol.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(symbols, ["ATOM", "OSMO"]);
    }

    #[test]
    fn band_rejects_non_numeric_request_id() {
        let event = RawEvent::new(topics::BAND_IBC_PRICES)
            .with_attribute("symbols", r#"["ATOM"]"#)
            .with_attribute("prices", r#"["1"]"#)
            .with_attribute("request_id", "\"abc\"");

        assert!(matches!(
            band_ibc_prices(&event),
            Err(DecodeError::InvalidAttribute { key: "request_id", .. })
        ));
    }

    #[test]
    fn pyth_uses_price_id_as_symbol() {
        let event = RawEvent::new(topics::PYTH_PRICES).with_attribute(
            "prices",
            r#"[{"price_id":"0xfeed","ema_price":"3.25","conf":"0.1"}]"#,
        );

        let records = pyth_prices(&event).unwrap();

        let p = only_price(&records);
        assert_eq!(p.symbol, "0xfeed");
        assert_eq!(p.price, Decimal::new(325, 2));
    }

    #[test]
    fn provider_price_accepts_quoted_and_bare_values() {
        let event = RawEvent::new(topics::PROVIDER_PRICE)
            .with_attribute("symbol", "\"FOO\"")
            .with_attribute("price", "7.5");

        let records = provider_price(&event).unwrap();

        let p = only_price(&records);
        assert_eq!(p.symbol, "FOO");
        assert_eq!(p.kind, OracleKind::Provider);
    }

    #[test]
    fn price_feed_symbol_joins_base_and_quote() {
        let event = RawEvent::new(topics::PRICE_FEED_PRICE)
            .with_attribute("base", "\"inj\"")
            .with_attribute("quote", "\"usdt\"")
            .with_attribute("price", "\"25\"");

        let records = price_feed_price(&event).unwrap();

        assert_eq!(only_price(&records).symbol, "inj/usdt");
    }

    #[test]
    fn stork_reads_nested_price_state() {
        let event = RawEvent::new(topics::STORK_PRICES).with_attribute(
            "prices",
            r#"[{"symbol":"ETHUSD","price_state":{"price":"3100","timestamp":"1"}}]"#,
        );

        let records = stork_prices(&event).unwrap();

        let p = only_price(&records);
        assert_eq!(p.symbol, "ETHUSD");
        assert_eq!(p.kind, OracleKind::Stork);
    }
}
