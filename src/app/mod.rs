//! The simulated chain application.
//!
//! A deterministic, in-process stand-in for the external blockchain
//! application the harness drives. It exposes the adapter contract the
//! harness needs — construct, init-genesis, begin/finalize/commit a block,
//! simulate, route a query, keeper accessors — and nothing else. Consensus,
//! networking, and real transaction execution are out of scope; caller
//! transactions are treated as opaque bytes with deterministic gas.

pub mod account;
pub mod bank;
pub mod oracle;
pub mod params;
pub mod proto;
pub mod wasm;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use k256::ecdsa::SigningKey;
use prost::Message;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::env::BlockContext;

use account::AccountKeeper;
use bank::{BankKeeper, MINT_MODULE};
use oracle::{OracleKeeper, PRICE_DECIMALS};
use params::{ParamsKeeper, TOKENFACTORY_PARAMS_TYPE_URL, TOKENFACTORY_SUBSPACE};
use proto::{
    Coin, ExecTxResult, FinalizeBlockResponse, GasInfo, GetAllCurrencyPairsResponse,
    GetPriceRequest, GetPriceResponse, QueryAllBalancesRequest, QueryAllBalancesResponse,
    QueryBalanceRequest, QueryBalanceResponse, QueryDenomMetadataRequest,
    QueryDenomMetadataResponse, QuotePrice, TokenFactoryParams,
};
use wasm::WasmKeeper;

/// Height at which the vote-extension mechanism is established. Blocks
/// finalized above this height carry the extension-commit slot first.
pub const VOTE_EXTENSIONS_ACTIVATION_HEIGHT: i64 = 2;

/// Deterministic gas charged for a transaction of the given size.
pub fn tx_gas(tx_len: usize) -> u64 {
    50_000 + 10 * tx_len as u64
}

/// Derive the sandbox address string for a SEC1-encoded public key:
/// the first 20 bytes of its SHA-256 digest, hex encoded.
pub fn derive_address(pubkey_sec1: &[u8]) -> String {
    let digest = Sha256::digest(pubkey_sec1);
    hex::encode(&digest[..20])
}

/// Signing liveness record for one validator.
#[derive(Debug, Clone)]
pub struct ValidatorSigningInfo {
    /// Consensus address of the validator.
    pub address: String,
    /// Height the validator started signing at.
    pub start_height: i64,
    /// Whether the validator is jailed.
    pub jailed: bool,
    /// Blocks missed in the current window.
    pub missed_blocks: u64,
}

/// Minimal slashing surface: validator signing info by consensus address.
#[derive(Default)]
pub struct SlashingKeeper {
    infos: BTreeMap<String, ValidatorSigningInfo>,
}

impl SlashingKeeper {
    /// Record signing info for a validator.
    pub fn set_signing_info(&mut self, info: ValidatorSigningInfo) {
        self.infos.insert(info.address.clone(), info);
    }

    /// Signing info for a consensus address, if recorded.
    pub fn signing_info(&self, address: &str) -> Option<&ValidatorSigningInfo> {
        self.infos.get(address)
    }
}

/// The finalize request assembled by the block lifecycle controller.
#[derive(Debug, Clone)]
pub struct FinalizeBlockRequest {
    /// Height of the block being finalized.
    pub height: i64,
    /// Block time in nanoseconds.
    pub time_ns: i64,
    /// Ordered transaction byte list, extension-commit slot first once
    /// vote extensions are active.
    pub txs: Vec<Vec<u8>>,
}

/// The simulated chain application for one environment.
pub struct ChainApp {
    chain_id: String,
    home: PathBuf,

    bank: BankKeeper,
    accounts: AccountKeeper,
    oracle: OracleKeeper,
    params: ParamsKeeper,
    wasm: WasmKeeper,
    slashing: SlashingKeeper,

    /// SEC1-encoded public key of the sole validator, set at genesis.
    validator_pubkey: Vec<u8>,
    /// Block currently being executed, set by begin-block.
    working_block: Option<(i64, i64)>,
    /// Last committed height.
    committed_height: i64,
    /// App hash pending commit, produced by finalize.
    pending_app_hash: Vec<u8>,
    /// App hash of the last committed block.
    last_app_hash: Vec<u8>,
}

impl ChainApp {
    /// Construct an application rooted at the given working directory.
    pub fn new(home: &Path) -> Result<Self> {
        fs::create_dir_all(home)
            .with_context(|| format!("creating app home {}", home.display()))?;
        Ok(Self {
            chain_id: String::new(),
            home: home.to_path_buf(),
            bank: BankKeeper::default(),
            accounts: AccountKeeper::default(),
            oracle: OracleKeeper::default(),
            params: ParamsKeeper::default(),
            wasm: WasmKeeper::with_builtin_contracts(),
            slashing: SlashingKeeper::default(),
            validator_pubkey: Vec::new(),
            working_block: None,
            committed_height: 0,
            pending_app_hash: Vec::new(),
            last_app_hash: Vec::new(),
        })
    }

    /// Run genesis: create the sole bonded validator, seed its signing
    /// info, the genesis oracle markets, and the tokenfactory params.
    /// Returns the genesis context and the validator's private key.
    pub fn init_chain(&mut self) -> Result<(BlockContext, SigningKey)> {
        let validator_key = SigningKey::random(&mut OsRng);
        self.validator_pubkey = validator_key.verifying_key().to_sec1_bytes().to_vec();

        let ctx = BlockContext::genesis();
        self.chain_id = ctx.chain_id.clone();

        self.slashing.set_signing_info(ValidatorSigningInfo {
            address: derive_address(&self.validator_pubkey),
            start_height: ctx.height,
            jailed: false,
            missed_blocks: 0,
        });

        self.oracle = OracleKeeper::with_genesis_pairs();

        self.params.ensure_subspace(TOKENFACTORY_SUBSPACE);
        self.params.set_raw(
            TOKENFACTORY_SUBSPACE,
            TOKENFACTORY_PARAMS_TYPE_URL,
            TokenFactoryParams::default().encode_to_vec(),
        );

        let genesis = serde_json::json!({
            "chain_id": ctx.chain_id,
            "genesis_time_ns": ctx.time_ns,
            "validator_pubkey": hex::encode(&self.validator_pubkey),
        });
        fs::write(
            self.home.join("genesis.json"),
            serde_json::to_vec_pretty(&genesis).expect("static json"),
        )
        .context("writing genesis file")?;

        debug!(chain_id = %ctx.chain_id, "chain initialized");
        Ok((ctx, validator_key))
    }

    /// Open a block for execution.
    pub fn begin_block(&mut self, ctx: &BlockContext) {
        self.working_block = Some((ctx.height, ctx.time_ns));
    }

    /// Execute one block: apply the vote-extension slot (once active),
    /// run the remaining transactions, and produce the block's results.
    ///
    /// Any failure here means the simulated chain can no longer be
    /// trusted; the caller treats it as fatal.
    pub fn finalize_block(&mut self, req: &FinalizeBlockRequest) -> Result<FinalizeBlockResponse> {
        if req.height != self.committed_height + 1 {
            bail!(
                "finalize height {} does not follow committed height {}",
                req.height,
                self.committed_height
            );
        }

        if req.height > VOTE_EXTENSIONS_ACTIVATION_HEIGHT {
            if let Some(extension_commit) = req.txs.first() {
                if !extension_commit.is_empty() {
                    let deltas =
                        oracle::verify_extended_commit(&self.validator_pubkey, extension_commit)
                            .context("processing extension commit")?;
                    for (index, delta) in &deltas {
                        self.oracle
                            .apply_delta(*index, delta, req.height as u64, req.time_ns)
                            .context("applying oracle price delta")?;
                    }
                    debug!(height = req.height, pairs = deltas.len(), "applied oracle deltas");
                }
            }
        }

        let mut tx_results = Vec::with_capacity(req.txs.len());
        for tx in &req.txs {
            let gas = if tx.is_empty() { 0 } else { tx_gas(tx.len()) };
            tx_results.push(ExecTxResult {
                code: 0,
                data: Vec::new(),
                log: format!("tx {} bytes", tx.len()),
                gas_wanted: gas,
                gas_used: gas,
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(self.chain_id.as_bytes());
        hasher.update(req.height.to_be_bytes());
        hasher.update(req.time_ns.to_be_bytes());
        hasher.update(&self.last_app_hash);
        for tx in &req.txs {
            hasher.update((tx.len() as u64).to_be_bytes());
            hasher.update(tx);
        }
        self.pending_app_hash = hasher.finalize().to_vec();

        Ok(FinalizeBlockResponse {
            tx_results,
            app_hash: self.pending_app_hash.clone(),
        })
    }

    /// Commit the finalized block: bump the committed height and persist
    /// the commit record into the working directory.
    pub fn commit(&mut self) -> Result<()> {
        let (height, time_ns) = self
            .working_block
            .take()
            .ok_or_else(|| anyhow::anyhow!("commit without an open block"))?;
        self.committed_height = height;
        self.last_app_hash = std::mem::take(&mut self.pending_app_hash);

        let record = serde_json::json!({
            "height": height,
            "time_ns": time_ns,
            "app_hash": hex::encode(&self.last_app_hash),
        });
        fs::write(
            self.home.join("commit_info.json"),
            serde_json::to_vec_pretty(&record).expect("static json"),
        )
        .context("writing commit record")?;
        Ok(())
    }

    /// Dry-run gas estimation for a transaction.
    pub fn simulate(&self, tx: &[u8]) -> Result<GasInfo, String> {
        if tx.is_empty() {
            return Err("cannot simulate an empty transaction".to_string());
        }
        let gas = tx_gas(tx.len());
        Ok(GasInfo {
            gas_wanted: gas,
            gas_used: gas,
        })
    }

    /// Fund an account: ensure denom metadata, mint into the module
    /// account, transfer out, and create the account record. A transfer
    /// into an already-known account counts as activity on it, so its
    /// sequence grows with every funded transfer after the first.
    pub fn fund_account(&mut self, address: &str, coins: &[(String, u128)]) -> Result<()> {
        for (denom, _) in coins {
            self.bank.set_denom_metadata(denom);
        }
        for (denom, amount) in coins {
            self.bank.mint(MINT_MODULE, denom, *amount)?;
            self.bank.send(MINT_MODULE, address, denom, *amount)?;
        }
        if self.accounts.contains(address) {
            self.accounts.increment_sequence(address)?;
        } else {
            self.accounts.ensure_account(address);
        }
        Ok(())
    }

    /// Route raw query bytes through the gRPC-style query router.
    ///
    /// `None` means no route matches the path. `Some(Err)` is a
    /// route-reported failure; both are recoverable for the caller.
    pub fn route_query(
        &self,
        ctx: &BlockContext,
        path: &str,
        data: &[u8],
    ) -> Option<Result<Vec<u8>, String>> {
        match path {
            "/cosmos.bank.v1beta1.Query/Balance" => Some(self.query_balance(data)),
            "/cosmos.bank.v1beta1.Query/AllBalances" => Some(self.query_all_balances(data)),
            "/cosmos.bank.v1beta1.Query/DenomMetadata" => Some(self.query_denom_metadata(data)),
            "/slinky.oracle.v1.Query/GetPrice" => Some(self.query_get_price(data)),
            "/slinky.oracle.v1.Query/GetAllCurrencyPairs" => {
                let _ = ctx;
                Some(Ok(GetAllCurrencyPairsResponse {
                    currency_pairs: self.oracle.all_pairs().to_vec(),
                }
                .encode_to_vec()))
            }
            _ => None,
        }
    }

    fn query_balance(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let req = QueryBalanceRequest::decode(data).map_err(|e| e.to_string())?;
        let amount = self.bank.balance(&req.address, &req.denom);
        Ok(QueryBalanceResponse {
            balance: Some(Coin {
                denom: req.denom,
                amount: amount.to_string(),
            }),
        }
        .encode_to_vec())
    }

    fn query_all_balances(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let req = QueryAllBalancesRequest::decode(data).map_err(|e| e.to_string())?;
        Ok(QueryAllBalancesResponse {
            balances: self.bank.all_balances(&req.address),
        }
        .encode_to_vec())
    }

    fn query_denom_metadata(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let req = QueryDenomMetadataRequest::decode(data).map_err(|e| e.to_string())?;
        match self.bank.denom_metadata(&req.denom) {
            Some(metadata) => Ok(QueryDenomMetadataResponse {
                metadata: Some(metadata.clone()),
            }
            .encode_to_vec()),
            None => Err(format!("no metadata for denom `{}`", req.denom)),
        }
    }

    fn query_get_price(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let req = GetPriceRequest::decode(data).map_err(|e| e.to_string())?;
        let pair = req
            .currency_pair
            .ok_or_else(|| "missing currency pair".to_string())?;
        let (price, index) = self
            .oracle
            .price_and_index(&pair.base, &pair.quote)
            .map_err(|e| e.to_string())?;
        let quote = self
            .oracle
            .quote(index)
            .ok_or_else(|| format!("no quote for pair index {index}"))?;
        Ok(GetPriceResponse {
            price: Some(QuotePrice {
                price: price.to_string(),
                block_timestamp: quote.block_timestamp_ns,
                block_height: quote.block_height,
            }),
            id: index,
            decimals: PRICE_DECIMALS,
        }
        .encode_to_vec())
    }

    /// Bank keeper, read-only.
    pub fn bank(&self) -> &BankKeeper {
        &self.bank
    }

    /// Account keeper, read-only.
    pub fn accounts(&self) -> &AccountKeeper {
        &self.accounts
    }

    /// Oracle keeper, read-only.
    pub fn oracle(&self) -> &OracleKeeper {
        &self.oracle
    }

    /// Params keeper, read-only.
    pub fn params(&self) -> &ParamsKeeper {
        &self.params
    }

    /// Params keeper, mutable.
    pub fn params_mut(&mut self) -> &mut ParamsKeeper {
        &mut self.params
    }

    /// Wasm keeper, mutable (sudo mutates contract state).
    pub fn wasm_mut(&mut self) -> &mut WasmKeeper {
        &mut self.wasm
    }

    /// Slashing keeper, read-only.
    pub fn slashing(&self) -> &SlashingKeeper {
        &self.slashing
    }

    /// Last committed height.
    pub fn committed_height(&self) -> i64 {
        self.committed_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::gob_encode_bigint;
    use num_bigint::BigInt;
    use tempfile::TempDir;

    fn new_app() -> (ChainApp, SigningKey, BlockContext, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut app = ChainApp::new(dir.path()).unwrap();
        let (ctx, key) = app.init_chain().unwrap();
        (app, key, ctx, dir)
    }

    fn run_block(app: &mut ChainApp, ctx: &BlockContext, txs: Vec<Vec<u8>>) -> FinalizeBlockResponse {
        app.begin_block(ctx);
        let resp = app
            .finalize_block(&FinalizeBlockRequest {
                height: ctx.height,
                time_ns: ctx.time_ns,
                txs,
            })
            .unwrap();
        app.commit().unwrap();
        resp
    }

    #[test]
    fn init_chain_seeds_genesis_state() {
        let (app, key, ctx, dir) = new_app();
        assert_eq!(ctx.height, 0);
        assert!(app.oracle().price_and_index("ATOM", "USDT").is_ok());
        assert!(app.params().has_subspace(TOKENFACTORY_SUBSPACE));

        let cons_addr = derive_address(&key.verifying_key().to_sec1_bytes());
        let info = app.slashing().signing_info(&cons_addr).unwrap();
        assert_eq!(info.start_height, 0);
        assert!(!info.jailed);

        assert!(dir.path().join("genesis.json").exists());
    }

    #[test]
    fn finalize_rejects_height_gap() {
        let (mut app, _key, ctx, _dir) = new_app();
        app.begin_block(&ctx.next_block(3));
        let err = app
            .finalize_block(&FinalizeBlockRequest {
                height: 5,
                time_ns: ctx.time_ns,
                txs: vec![],
            })
            .unwrap_err();
        assert!(err.to_string().contains("does not follow"));
    }

    #[test]
    fn commit_persists_record() {
        let (mut app, _key, ctx, dir) = new_app();
        let block1 = ctx.next_block(3);
        run_block(&mut app, &block1, vec![]);

        assert_eq!(app.committed_height(), 1);
        assert!(dir.path().join("commit_info.json").exists());
    }

    #[test]
    fn extension_commit_applies_deltas_once_active() {
        let (mut app, key, ctx, _dir) = new_app();
        let block1 = ctx.next_block(3);
        run_block(&mut app, &block1, vec![]);
        let block2 = block1.next_block(3);
        run_block(&mut app, &block2, vec![vec![]]);

        // height 3 carries the extension slot first
        let mut prices = std::collections::BTreeMap::new();
        prices.insert(0u64, gob_encode_bigint(&BigInt::from(20_000)));
        let blob = oracle::build_extended_commit(&key, prices);

        let block3 = block2.next_block(3);
        let resp = run_block(&mut app, &block3, vec![blob, vec![]]);
        assert_eq!(resp.tx_results.len(), 2);

        let (price, _) = app.oracle().price_and_index("ATOM", "USDT").unwrap();
        assert_eq!(price, BigInt::from(4_500_000));
        let quote = app.oracle().quote(0).unwrap();
        assert_eq!(quote.block_height, 3);
    }

    #[test]
    fn simulate_charges_deterministic_gas() {
        let (app, _key, _ctx, _dir) = new_app();
        let gas = app.simulate(&[0u8; 12]).unwrap();
        assert_eq!(gas.gas_used, 50_120);
        assert_eq!(gas, app.simulate(&[1u8; 12]).unwrap());
        assert!(app.simulate(&[]).is_err());
    }

    #[test]
    fn unknown_query_route_is_none() {
        let (app, _key, ctx, _dir) = new_app();
        assert!(app.route_query(&ctx, "/unknown/path", &[]).is_none());
    }

    #[test]
    fn repeated_funding_grows_the_account_sequence() {
        let (mut app, _key, _ctx, _dir) = new_app();
        app.fund_account("someaddr", &[("untrn".to_string(), 10)])
            .unwrap();
        assert_eq!(app.accounts().sequence("someaddr").unwrap(), 0);
        assert_eq!(app.accounts().number("someaddr").unwrap(), 0);

        app.fund_account("someaddr", &[("untrn".to_string(), 5)])
            .unwrap();
        assert_eq!(app.accounts().sequence("someaddr").unwrap(), 1);
        assert_eq!(app.accounts().number("someaddr").unwrap(), 0);
        assert_eq!(app.bank().balance("someaddr", "untrn"), 15);
    }

    #[test]
    fn balance_query_reflects_funding() {
        let (mut app, _key, ctx, _dir) = new_app();
        app.fund_account("someaddr", &[("untrn".to_string(), 1_000_000)])
            .unwrap();

        let req = QueryBalanceRequest {
            address: "someaddr".to_string(),
            denom: "untrn".to_string(),
        }
        .encode_to_vec();
        let bytes = app
            .route_query(&ctx, "/cosmos.bank.v1beta1.Query/Balance", &req)
            .unwrap()
            .unwrap();
        let resp = QueryBalanceResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(resp.balance.unwrap().amount, "1000000");
    }
}
