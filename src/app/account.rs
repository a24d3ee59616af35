//! Account keeper: account numbers and sequences.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

/// Minimal on-chain account record.
#[derive(Debug, Clone, Copy)]
pub struct BaseAccount {
    /// Process-unique account number, assigned at creation.
    pub number: u64,
    /// Transaction sequence, starts at zero.
    pub sequence: u64,
}

/// In-memory account state.
#[derive(Default)]
pub struct AccountKeeper {
    accounts: BTreeMap<String, BaseAccount>,
    next_number: u64,
}

impl AccountKeeper {
    /// Create the account if it does not exist yet, returning its record.
    pub fn ensure_account(&mut self, address: &str) -> BaseAccount {
        if let Some(acc) = self.accounts.get(address) {
            return *acc;
        }
        let acc = BaseAccount {
            number: self.next_number,
            sequence: 0,
        };
        self.next_number += 1;
        self.accounts.insert(address.to_string(), acc);
        acc
    }

    /// Whether an account record exists for the address.
    pub fn contains(&self, address: &str) -> bool {
        self.accounts.contains_key(address)
    }

    /// The account's sequence. Unknown addresses are a fixture bug.
    pub fn sequence(&self, address: &str) -> Result<u64> {
        self.accounts
            .get(address)
            .map(|acc| acc.sequence)
            .ok_or_else(|| anyhow!("account not found: {address}"))
    }

    /// The account's number. Unknown addresses are a fixture bug.
    pub fn number(&self, address: &str) -> Result<u64> {
        self.accounts
            .get(address)
            .map(|acc| acc.number)
            .ok_or_else(|| anyhow!("account not found: {address}"))
    }

    /// Bump the sequence after a signed transaction from this account.
    pub fn increment_sequence(&mut self, address: &str) -> Result<()> {
        let acc = self
            .accounts
            .get_mut(address)
            .ok_or_else(|| anyhow!("account not found: {address}"))?;
        acc.sequence += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_assigned_in_order() {
        let mut keeper = AccountKeeper::default();
        let a = keeper.ensure_account("addr-a");
        let b = keeper.ensure_account("addr-b");
        let a_again = keeper.ensure_account("addr-a");

        assert_eq!(a.number, 0);
        assert_eq!(b.number, 1);
        assert_eq!(a_again.number, 0);
    }

    #[test]
    fn sequences_start_at_zero_and_increment() {
        let mut keeper = AccountKeeper::default();
        keeper.ensure_account("addr");
        assert_eq!(keeper.sequence("addr").unwrap(), 0);

        keeper.increment_sequence("addr").unwrap();
        assert_eq!(keeper.sequence("addr").unwrap(), 1);
    }

    #[test]
    fn unknown_address_errors() {
        let keeper = AccountKeeper::default();
        assert!(keeper.sequence("nope").is_err());
        assert!(keeper.number("nope").is_err());
    }
}
