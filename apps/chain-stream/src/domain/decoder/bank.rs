//! Bank module events.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::attributes::{AccountAddress, Attributes};
use super::{DecodeError, DecoderRegistry, topics};
use crate::domain::events::RawEvent;
use crate::domain::records::{BankBalance, Coin, DomainRecord};

pub(super) fn register(registry: &mut DecoderRegistry) {
    registry.register(topics::BANK_BALANCES, set_balances);
}

#[derive(Debug, Deserialize)]
struct BalanceUpdatePayload {
    addr: AccountAddress,
    denom: String,
    amt: Decimal,
}

fn set_balances(event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
    let updates: Vec<BalanceUpdatePayload> = Attributes::new(event).list("balance_updates")?;

    Ok(updates
        .into_iter()
        .map(|update| {
            DomainRecord::BankBalance(BankBalance {
                account: update.addr.into(),
                balances: vec![Coin {
                    denom: update.denom,
                    amount: update.amt,
                }],
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_record_per_balance_update() {
        let event = RawEvent::new(topics::BANK_BALANCES).with_attribute(
            "balance_updates",
            r#"[{"addr":"AQEBAQEBAQEBAQEBAQEBAQEBAQE=","denom":"inj","amt":"100"},{"addr":"AgICAgICAgICAgICAgICAgICAgI=","denom":"peggy0xdac","amt":"5"}]"#,
        );

        let records = set_balances(&event).unwrap();

        assert_eq!(records.len(), 2);
        let DomainRecord::BankBalance(second) = &records[1] else {
            panic!("expected bank balance");
        };
        assert_eq!(second.account, "inj1qgpqyqszqgpqyqszqgpqyqszqgpqyqszf7sl5j");
        assert_eq!(second.balances[0].denom, "peggy0xdac");
        assert_eq!(second.balances[0].amount, Decimal::new(5, 0));
    }

    #[test]
    fn plain_text_address_is_rejected() {
        let event = RawEvent::new(topics::BANK_BALANCES).with_attribute(
            "balance_updates",
            r#"[{"addr":"inj1!","denom":"inj","amt":"1"}]"#,
        );

        assert!(matches!(
            set_balances(&event),
            Err(DecodeError::MalformedJson { key: "balance_updates", .. })
        ));
    }

    #[test]
    fn missing_updates_yield_nothing() {
        let event = RawEvent::new(topics::BANK_BALANCES);
        assert!(set_balances(&event).unwrap().is_empty());
    }
}
