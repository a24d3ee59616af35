//! Oracle keeper: currency pairs, quote prices, and the vote-extension
//! envelope that carries price deltas into a block.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use num_bigint::BigInt;
use prost::Message;

use super::proto::{CurrencyPair, ExtendedCommitInfo, ExtendedVoteInfo, OracleVoteExtension};
use crate::oracle::gob_decode_bigint;

/// Price decimals reported for every pair.
pub const PRICE_DECIMALS: u32 = 8;

/// Genesis price for the ATOM/USDT pair.
pub const GENESIS_ATOM_USDT_PRICE: i64 = 4_480_000;

/// One tracked quote price with the block it was last written at.
#[derive(Debug, Clone)]
pub struct QuoteState {
    /// Current price.
    pub price: BigInt,
    /// Block time (ns) of the last update.
    pub block_timestamp_ns: i64,
    /// Block height of the last update.
    pub block_height: u64,
}

/// In-memory oracle state.
#[derive(Default)]
pub struct OracleKeeper {
    /// (base, quote) -> pair index.
    pair_index: BTreeMap<(String, String), u64>,
    /// Pair index -> pair, in registration order.
    pairs: Vec<CurrencyPair>,
    /// Pair index -> current quote.
    quotes: BTreeMap<u64, QuoteState>,
}

impl OracleKeeper {
    /// Keeper seeded with the genesis market: ATOM/USDT at the genesis
    /// price, observed at block zero.
    pub fn with_genesis_pairs() -> Self {
        let mut keeper = Self::default();
        keeper.add_pair("ATOM", "USDT", BigInt::from(GENESIS_ATOM_USDT_PRICE));
        keeper
    }

    /// Register a currency pair with an initial price.
    pub fn add_pair(&mut self, base: &str, quote: &str, price: BigInt) -> u64 {
        let index = self.pairs.len() as u64;
        self.pair_index
            .insert((base.to_string(), quote.to_string()), index);
        self.pairs.push(CurrencyPair {
            base: base.to_string(),
            quote: quote.to_string(),
        });
        self.quotes.insert(
            index,
            QuoteState {
                price,
                block_timestamp_ns: 0,
                block_height: 0,
            },
        );
        index
    }

    /// Current price and pair index for a currency pair.
    pub fn price_and_index(&self, base: &str, quote: &str) -> Result<(BigInt, u64)> {
        let index = *self
            .pair_index
            .get(&(base.to_string(), quote.to_string()))
            .ok_or_else(|| anyhow!("no currency pair {base}/{quote}"))?;
        let state = self
            .quotes
            .get(&index)
            .ok_or_else(|| anyhow!("no price for pair index {index}"))?;
        Ok((state.price.clone(), index))
    }

    /// All registered pairs in index order.
    pub fn all_pairs(&self) -> &[CurrencyPair] {
        &self.pairs
    }

    /// Quote state for a pair index, if tracked.
    pub fn quote(&self, index: u64) -> Option<&QuoteState> {
        self.quotes.get(&index)
    }

    /// Apply an already-decoded delta to a pair's price, stamping the block
    /// that carried it.
    pub fn apply_delta(
        &mut self,
        index: u64,
        delta: &BigInt,
        block_height: u64,
        block_timestamp_ns: i64,
    ) -> Result<()> {
        let state = self
            .quotes
            .get_mut(&index)
            .ok_or_else(|| anyhow!("vote extension names unknown pair index {index}"))?;
        state.price += delta;
        state.block_height = block_height;
        state.block_timestamp_ns = block_timestamp_ns;
        Ok(())
    }
}

/// Build the signed extension-commit blob for a delta map.
///
/// The vote extension is the default codec's encoding of the price map (no
/// compression); the signature is the validator's deterministic ECDSA over
/// the extension bytes. Same inputs, same bytes.
pub fn build_extended_commit(
    validator_key: &SigningKey,
    prices: BTreeMap<u64, Vec<u8>>,
) -> Vec<u8> {
    let extension = OracleVoteExtension { prices }.encode_to_vec();
    let signature: Signature = validator_key.sign(&extension);
    ExtendedCommitInfo {
        round: 0,
        votes: vec![ExtendedVoteInfo {
            vote_extension: extension,
            extension_signature: signature.to_vec(),
        }],
    }
    .encode_to_vec()
}

/// Decode an extension-commit blob, check every vote's signature against
/// the validator key, and return the decoded price deltas per pair index.
///
/// A blob that fails to decode or verify means the chain state can no
/// longer be trusted, so errors here ride the fatal channel.
pub fn verify_extended_commit(
    validator_pubkey: &[u8],
    blob: &[u8],
) -> Result<BTreeMap<u64, BigInt>> {
    let commit =
        ExtendedCommitInfo::decode(blob).context("decoding extended commit info")?;
    let pubkey = VerifyingKey::from_sec1_bytes(validator_pubkey)
        .context("parsing validator public key")?;

    let mut deltas = BTreeMap::new();
    for vote in &commit.votes {
        let signature = Signature::from_slice(&vote.extension_signature)
            .context("parsing vote extension signature")?;
        pubkey
            .verify(&vote.vote_extension, &signature)
            .context("verifying vote extension signature")?;

        let extension = OracleVoteExtension::decode(vote.vote_extension.as_slice())
            .context("decoding oracle vote extension")?;
        for (index, encoded) in extension.prices {
            let delta = gob_decode_bigint(&encoded)
                .with_context(|| format!("decoding price delta for pair {index}"))?;
            deltas.insert(index, delta);
        }
    }
    if commit.votes.is_empty() {
        bail!("extended commit carries no votes");
    }
    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::gob_encode_bigint;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32].into()).unwrap()
    }

    #[test]
    fn genesis_pair_is_registered() {
        let keeper = OracleKeeper::with_genesis_pairs();
        let (price, index) = keeper.price_and_index("ATOM", "USDT").unwrap();
        assert_eq!(index, 0);
        assert_eq!(price, BigInt::from(GENESIS_ATOM_USDT_PRICE));
        assert_eq!(keeper.all_pairs().len(), 1);
    }

    #[test]
    fn apply_delta_moves_price_and_stamps_block() {
        let mut keeper = OracleKeeper::with_genesis_pairs();
        keeper
            .apply_delta(0, &BigInt::from(20_000), 3, 1_000)
            .unwrap();
        let quote = keeper.quote(0).unwrap();
        assert_eq!(quote.price, BigInt::from(4_500_000));
        assert_eq!(quote.block_height, 3);
        assert_eq!(quote.block_timestamp_ns, 1_000);
    }

    #[test]
    fn apply_delta_unknown_index_errors() {
        let mut keeper = OracleKeeper::with_genesis_pairs();
        assert!(keeper.apply_delta(42, &BigInt::from(1), 1, 1).is_err());
    }

    #[test]
    fn extended_commit_round_trip() {
        let key = test_key();
        let pubkey = key.verifying_key().to_sec1_bytes().to_vec();

        let mut prices = BTreeMap::new();
        prices.insert(0u64, gob_encode_bigint(&BigInt::from(20_000)));

        let blob = build_extended_commit(&key, prices);
        let deltas = verify_extended_commit(&pubkey, &blob).unwrap();
        assert_eq!(deltas[&0], BigInt::from(20_000));
    }

    #[test]
    fn extended_commit_is_deterministic() {
        let key = test_key();
        let mut prices = BTreeMap::new();
        prices.insert(0u64, gob_encode_bigint(&BigInt::from(-5)));
        prices.insert(3u64, gob_encode_bigint(&BigInt::from(9)));

        let a = build_extended_commit(&key, prices.clone());
        let b = build_extended_commit(&key, prices);
        assert_eq!(a, b);
    }

    #[test]
    fn tampered_extension_fails_verification() {
        let key = test_key();
        let pubkey = key.verifying_key().to_sec1_bytes().to_vec();

        let mut prices = BTreeMap::new();
        prices.insert(0u64, gob_encode_bigint(&BigInt::from(1)));
        let blob = build_extended_commit(&key, prices);

        let mut commit = ExtendedCommitInfo::decode(blob.as_slice()).unwrap();
        commit.votes[0].vote_extension.push(0xff);
        let tampered = commit.encode_to_vec();

        assert!(verify_extended_commit(&pubkey, &tampered).is_err());
    }
}
