//! Bank keeper: balances, minting, transfers, denom metadata.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use super::proto::{Coin, DenomUnit, Metadata};

/// Module account coins are minted into before being transferred out to a
/// funded account.
pub const MINT_MODULE: &str = "module/mint";

/// In-memory bank state.
#[derive(Default)]
pub struct BankKeeper {
    /// address -> denom -> amount.
    balances: BTreeMap<String, BTreeMap<String, u128>>,
    /// base denom -> metadata. Set-once per denom.
    denom_metadata: BTreeMap<String, Metadata>,
}

impl BankKeeper {
    /// Balance of one denom for one address. Unknown pairs are zero.
    pub fn balance(&self, address: &str, denom: &str) -> u128 {
        self.balances
            .get(address)
            .and_then(|coins| coins.get(denom))
            .copied()
            .unwrap_or(0)
    }

    /// All nonzero balances held by an address, ordered by denom.
    pub fn all_balances(&self, address: &str) -> Vec<Coin> {
        self.balances
            .get(address)
            .map(|coins| {
                coins
                    .iter()
                    .filter(|(_, amt)| **amt > 0)
                    .map(|(denom, amt)| Coin {
                        denom: denom.clone(),
                        amount: amt.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mint `amount` of `denom` into `address`.
    pub fn mint(&mut self, address: &str, denom: &str, amount: u128) -> Result<()> {
        let entry = self
            .balances
            .entry(address.to_string())
            .or_default()
            .entry(denom.to_string())
            .or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("mint overflow for {denom}"))?;
        Ok(())
    }

    /// Move coins between accounts. Fails if the sender balance is short.
    pub fn send(&mut self, from: &str, to: &str, denom: &str, amount: u128) -> Result<()> {
        let available = self
            .balances
            .get_mut(from)
            .and_then(|coins| coins.get_mut(denom));
        match available {
            Some(balance) if *balance >= amount => *balance -= amount,
            Some(balance) => {
                bail!("insufficient funds: {from} has {balance}{denom}, needs {amount}{denom}")
            }
            None => bail!("insufficient funds: {from} has 0{denom}, needs {amount}{denom}"),
        }
        self.mint(to, denom, amount)
    }

    /// Whether metadata exists for a base denom.
    pub fn has_denom_metadata(&self, denom: &str) -> bool {
        self.denom_metadata.contains_key(denom)
    }

    /// Metadata for a base denom, if registered.
    pub fn denom_metadata(&self, denom: &str) -> Option<&Metadata> {
        self.denom_metadata.get(denom)
    }

    /// Register metadata for a base denom. Re-registering the same denom is
    /// a no-op, so repeated funding cannot create duplicate entries.
    pub fn set_denom_metadata(&mut self, denom: &str) {
        if self.denom_metadata.contains_key(denom) {
            return;
        }
        self.denom_metadata.insert(
            denom.to_string(),
            Metadata {
                description: String::new(),
                denom_units: vec![DenomUnit {
                    denom: denom.to_string(),
                    exponent: 0,
                }],
                base: denom.to_string(),
                display: denom.to_string(),
            },
        );
    }

    /// Number of registered denom metadata entries.
    pub fn denom_metadata_count(&self) -> usize {
        self.denom_metadata.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_send() {
        let mut bank = BankKeeper::default();
        bank.mint(MINT_MODULE, "untrn", 1_000_000).unwrap();
        bank.send(MINT_MODULE, "addr1", "untrn", 400_000).unwrap();

        assert_eq!(bank.balance("addr1", "untrn"), 400_000);
        assert_eq!(bank.balance(MINT_MODULE, "untrn"), 600_000);
        assert_eq!(bank.balance("addr1", "uatom"), 0);
    }

    #[test]
    fn send_rejects_overdraft() {
        let mut bank = BankKeeper::default();
        bank.mint("a", "untrn", 10).unwrap();
        assert!(bank.send("a", "b", "untrn", 11).is_err());
        assert_eq!(bank.balance("a", "untrn"), 10);
    }

    #[test]
    fn denom_metadata_is_set_once() {
        let mut bank = BankKeeper::default();
        assert!(!bank.has_denom_metadata("untrn"));

        bank.set_denom_metadata("untrn");
        bank.set_denom_metadata("untrn");

        assert_eq!(bank.denom_metadata_count(), 1);
        let meta = bank.denom_metadata("untrn").unwrap();
        assert_eq!(meta.base, "untrn");
        assert_eq!(meta.denom_units.len(), 1);
    }

    #[test]
    fn all_balances_ordered_by_denom() {
        let mut bank = BankKeeper::default();
        bank.mint("a", "untrn", 2).unwrap();
        bank.mint("a", "uatom", 1).unwrap();

        let coins = bank.all_balances("a");
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].denom, "uatom");
        assert_eq!(coins[1].denom, "untrn");
    }
}
