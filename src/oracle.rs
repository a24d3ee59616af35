//! Oracle injection helper.
//!
//! Converts `(base, quote, price)` observations into the per-pair price
//! deltas a vote extension carries. The delta is computed against the
//! current on-chain price as an arbitrary-precision integer and encoded in
//! the oracle's wire integer format, which is Go's `big.Int` gob encoding:
//! one version/sign byte (`version << 1 | sign`) followed by the big-endian
//! magnitude. The on-chain side decodes these bytes verbatim, so the
//! encoding must be reproduced bit for bit.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use num_bigint::{BigInt, Sign};
use serde::Deserialize;

use crate::app::oracle::OracleKeeper;

/// One price observation submitted through the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceObservation {
    /// Base symbol of the currency pair, e.g. `ATOM`.
    pub base: String,
    /// Quote symbol of the currency pair, e.g. `USDT`.
    pub quote: String,
    /// New absolute price for the pair.
    pub price: i128,
}

/// Encode a signed big integer in gob wire format.
pub fn gob_encode_bigint(value: &BigInt) -> Vec<u8> {
    const VERSION: u8 = 1;
    let (sign, magnitude) = value.to_bytes_be();
    let negative = sign == Sign::Minus;
    let mut out = Vec::with_capacity(1 + magnitude.len());
    out.push((VERSION << 1) | negative as u8);
    // Go encodes zero with an empty magnitude.
    if sign != Sign::NoSign {
        out.extend_from_slice(&magnitude);
    }
    out
}

/// Decode a gob wire format signed big integer.
pub fn gob_decode_bigint(bytes: &[u8]) -> Result<BigInt> {
    let Some((&first, magnitude)) = bytes.split_first() else {
        bail!("empty big int encoding");
    };
    let version = first >> 1;
    if version != 1 {
        bail!("unsupported big int encoding version {version}");
    }
    let sign = if first & 1 == 1 {
        Sign::Minus
    } else {
        Sign::Plus
    };
    Ok(BigInt::from_bytes_be(sign, magnitude))
}

/// Resolve each observation against the oracle and produce the pair-index
/// to encoded-delta mapping consumed by the vote-extension builder.
///
/// Unknown currency pairs are a broken fixture, not a testable condition,
/// so resolution failure propagates on the fatal channel.
pub fn price_deltas(
    oracle: &OracleKeeper,
    observations: &[PriceObservation],
) -> Result<BTreeMap<u64, Vec<u8>>> {
    let mut deltas = BTreeMap::new();
    for obs in observations {
        let (current, index) = oracle
            .price_and_index(&obs.base, &obs.quote)
            .with_context(|| format!("resolving currency pair {}/{}", obs.base, obs.quote))?;
        let delta = BigInt::from(obs.price) - current;
        deltas.insert(index, gob_encode_bigint(&delta));
    }
    Ok(deltas)
}
