//! Protobuf wire shapes used by the application and the harness.
//!
//! Hand-derived prost messages for the subset of the chain's wire surface
//! the sandbox exchanges across the boundary: coins and bank queries, gas
//! info, finalize responses, the extended-commit envelope carrying oracle
//! vote extensions, oracle queries, and the tokenfactory param set.

/// A single coin: denomination plus decimal string amount.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub amount: ::prost::alloc::string::String,
}

/// One unit of a denomination's metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DenomUnit {
    #[prost(string, tag = "1")]
    pub denom: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub exponent: u32,
}

/// Bank metadata describing a denomination.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    #[prost(string, tag = "1")]
    pub description: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub denom_units: ::prost::alloc::vec::Vec<DenomUnit>,
    #[prost(string, tag = "3")]
    pub base: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub display: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryBalanceRequest {
    #[prost(string, tag = "1")]
    pub address: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub denom: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryBalanceResponse {
    #[prost(message, optional, tag = "1")]
    pub balance: ::core::option::Option<Coin>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryAllBalancesRequest {
    #[prost(string, tag = "1")]
    pub address: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryAllBalancesResponse {
    #[prost(message, repeated, tag = "1")]
    pub balances: ::prost::alloc::vec::Vec<Coin>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryDenomMetadataRequest {
    #[prost(string, tag = "1")]
    pub denom: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryDenomMetadataResponse {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,
}

/// Gas estimate from a dry-run simulation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GasInfo {
    #[prost(uint64, tag = "1")]
    pub gas_wanted: u64,
    #[prost(uint64, tag = "2")]
    pub gas_used: u64,
}

/// Execution result for one transaction in a finalized block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecTxResult {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "3")]
    pub log: ::prost::alloc::string::String,
    #[prost(uint64, tag = "4")]
    pub gas_wanted: u64,
    #[prost(uint64, tag = "5")]
    pub gas_used: u64,
}

/// Response returned from finalizing one block, serialized back across the
/// boundary by the block lifecycle controller.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FinalizeBlockResponse {
    #[prost(message, repeated, tag = "1")]
    pub tx_results: ::prost::alloc::vec::Vec<ExecTxResult>,
    #[prost(bytes = "vec", tag = "2")]
    pub app_hash: ::prost::alloc::vec::Vec<u8>,
}

/// One validator's vote carrying a signed vote extension.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtendedVoteInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub vote_extension: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub extension_signature: ::prost::alloc::vec::Vec<u8>,
}

/// The extension-commit blob injected as the first transaction slot once
/// vote extensions are active.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtendedCommitInfo {
    #[prost(int32, tag = "1")]
    pub round: i32,
    #[prost(message, repeated, tag = "2")]
    pub votes: ::prost::alloc::vec::Vec<ExtendedVoteInfo>,
}

/// Oracle vote extension: currency-pair index to encoded price delta.
///
/// A btree map keeps the encoding deterministic for a fixed set of deltas.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OracleVoteExtension {
    #[prost(btree_map = "uint64, bytes", tag = "1")]
    pub prices: ::prost::alloc::collections::BTreeMap<u64, ::prost::alloc::vec::Vec<u8>>,
}

/// A currency pair traded on the oracle.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CurrencyPair {
    #[prost(string, tag = "1")]
    pub base: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub quote: ::prost::alloc::string::String,
}

/// A price point with the block it was observed at.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QuotePrice {
    #[prost(string, tag = "1")]
    pub price: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub block_timestamp: i64,
    #[prost(uint64, tag = "3")]
    pub block_height: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPriceRequest {
    #[prost(message, optional, tag = "1")]
    pub currency_pair: ::core::option::Option<CurrencyPair>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPriceResponse {
    #[prost(message, optional, tag = "1")]
    pub price: ::core::option::Option<QuotePrice>,
    #[prost(uint64, tag = "2")]
    pub id: u64,
    #[prost(uint32, tag = "3")]
    pub decimals: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllCurrencyPairsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllCurrencyPairsResponse {
    #[prost(message, repeated, tag = "1")]
    pub currency_pairs: ::prost::alloc::vec::Vec<CurrencyPair>,
}

/// Runtime-configurable parameters of the tokenfactory module.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TokenFactoryParams {
    #[prost(message, repeated, tag = "1")]
    pub denom_creation_fee: ::prost::alloc::vec::Vec<Coin>,
    #[prost(uint64, tag = "2")]
    pub denom_creation_gas_consume: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn oracle_vote_extension_encoding_is_deterministic() {
        let mut a = OracleVoteExtension::default();
        a.prices.insert(2, vec![0x02, 0x01]);
        a.prices.insert(0, vec![0x02, 0x4e, 0x20]);

        let mut b = OracleVoteExtension::default();
        b.prices.insert(0, vec![0x02, 0x4e, 0x20]);
        b.prices.insert(2, vec![0x02, 0x01]);

        assert_eq!(a.encode_to_vec(), b.encode_to_vec());
    }

    #[test]
    fn finalize_response_round_trip() {
        let resp = FinalizeBlockResponse {
            tx_results: vec![ExecTxResult {
                code: 0,
                data: vec![],
                log: "tx 12 bytes".to_string(),
                gas_wanted: 50_120,
                gas_used: 50_120,
            }],
            app_hash: vec![0xab; 32],
        };
        let bytes = resp.encode_to_vec();
        let back = FinalizeBlockResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(back, resp);
    }
}
