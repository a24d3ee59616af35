//! Wasm keeper: privileged (sudo) execution against contract addresses.
//!
//! The sandbox ships one built-in contract so sudo paths are exercisable
//! without a wasm runtime: a ticker at a fixed address that counts
//! privileged `{"tick":{}}` calls and reports its count on
//! `{"count":{}}`. Contract failures are recoverable; the caller gets an
//! execute-kind error, never an abort.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Built-in contract state.
#[derive(Debug, Default)]
struct TickerContract {
    ticks: u64,
}

impl TickerContract {
    fn sudo(&mut self, msg: &[u8]) -> Result<Vec<u8>, String> {
        let value: Value =
            serde_json::from_slice(msg).map_err(|e| format!("invalid sudo message: {e}"))?;
        let Some(object) = value.as_object() else {
            return Err("sudo message must be a JSON object".to_string());
        };
        if object.contains_key("tick") {
            self.ticks += 1;
            Ok(serde_json::to_vec(&serde_json::json!({ "ticks": self.ticks }))
                .expect("static json"))
        } else if object.contains_key("count") {
            Ok(serde_json::to_vec(&serde_json::json!({ "ticks": self.ticks }))
                .expect("static json"))
        } else {
            Err("unknown sudo variant".to_string())
        }
    }
}

/// The fixed address the built-in ticker contract is instantiated at.
pub fn ticker_contract_address() -> String {
    let digest = Sha256::digest(b"cw-sandbox/ticker");
    hex::encode(&digest[..20])
}

/// In-memory wasm state.
pub struct WasmKeeper {
    tickers: BTreeMap<String, TickerContract>,
}

impl WasmKeeper {
    /// Keeper with the built-in ticker contract instantiated.
    pub fn with_builtin_contracts() -> Self {
        let mut tickers = BTreeMap::new();
        tickers.insert(ticker_contract_address(), TickerContract::default());
        Self { tickers }
    }

    /// Privileged execution against a contract address.
    pub fn sudo(&mut self, address: &str, msg: &[u8]) -> Result<Vec<u8>, String> {
        match self.tickers.get_mut(address) {
            Some(contract) => contract.sudo(msg),
            None => Err(format!("no contract found at address `{address}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_increments_and_reports() {
        let mut wasm = WasmKeeper::with_builtin_contracts();
        let addr = ticker_contract_address();

        let res = wasm.sudo(&addr, br#"{"tick":{}}"#).unwrap();
        assert_eq!(res, br#"{"ticks":1}"#.to_vec());

        wasm.sudo(&addr, br#"{"tick":{}}"#).unwrap();
        let res = wasm.sudo(&addr, br#"{"count":{}}"#).unwrap();
        assert_eq!(res, br#"{"ticks":2}"#.to_vec());
    }

    #[test]
    fn unknown_address_is_recoverable() {
        let mut wasm = WasmKeeper::with_builtin_contracts();
        let err = wasm.sudo("deadbeef", br#"{"tick":{}}"#).unwrap_err();
        assert!(err.contains("no contract found"));
    }

    #[test]
    fn unknown_variant_is_recoverable() {
        let mut wasm = WasmKeeper::with_builtin_contracts();
        let addr = ticker_contract_address();
        assert!(wasm.sudo(&addr, br#"{"nope":{}}"#).is_err());
        assert!(wasm.sudo(&addr, b"not-json").is_err());
    }
}
