//! The harness state object: environment registry plus boundary entry
//! points.
//!
//! One `Harness` owns every simulated chain instance in the process. It is
//! constructed explicitly and passed to (or owned by) whatever hosts the
//! boundary — no ambient globals. Handles come from a monotonic counter and
//! are never reused, even after an environment is destroyed.
//!
//! Concurrency discipline: the registry map is guarded by a read-write
//! lock, each environment sits behind its own mutex, and a single coarse
//! advance lock serializes every read-modify-write against the chain
//! application, across all handles — the application is not safe for
//! concurrent mutation. Pure reads (block time/height, account lookups,
//! query routing) take only the per-environment mutex.
//!
//! Error tiers: recoverable conditions (bad query route, failed sudo,
//! unknown subspace) come back inside an encoded result buffer; anything
//! that indicates a broken fixture (unknown handle, malformed setup JSON,
//! finalize/commit failure) is an `Err` on the fatal channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k256::ecdsa::SigningKey;
use parking_lot::{Mutex, RwLock};
use prost::Message;
use prost_types::Any;
use rand::rngs::OsRng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::app::params::ParamTypeRegistry;
use crate::app::proto::TokenFactoryParams;
use crate::app::{derive_address, ChainApp};
use crate::env::{BlockContext, Environment, DEFAULT_BLOCK_SECONDS};
use crate::lifecycle;
use crate::oracle::{self, PriceObservation};
use crate::result::{self, ErrorKind};

/// A coin as it crosses the boundary: denom plus decimal string amount.
#[derive(Debug, Deserialize)]
struct CoinInput {
    denom: String,
    amount: String,
}

/// Process-wide harness state: the environment arena and its locks.
pub struct Harness {
    /// Monotonic handle source. Handles start at 1 and are never reused.
    next_handle: AtomicU64,
    /// Handle -> environment arena.
    envs: RwLock<HashMap<u64, Arc<Mutex<Environment>>>>,
    /// Coarse lock serializing every mutation of chain state, across all
    /// handles. The application adapter is not safe for concurrent
    /// mutation, so correctness wins over throughput here.
    advance_lock: Mutex<()>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// An empty harness with no environments.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(0),
            envs: RwLock::new(HashMap::new()),
            advance_lock: Mutex::new(()),
        }
    }

    /// Number of live environments.
    pub fn len(&self) -> usize {
        self.envs.read().len()
    }

    /// Whether no environments are live.
    pub fn is_empty(&self) -> bool {
        self.envs.read().is_empty()
    }

    fn env(&self, handle: u64) -> Result<Arc<Mutex<Environment>>> {
        self.envs
            .read()
            .get(&handle)
            .cloned()
            .ok_or_else(|| anyhow!("environment not found: {handle}"))
    }

    /// Run a pure read against an environment. Takes only the environment
    /// mutex, so reads on distinct handles never contend.
    fn with_env<R>(&self, handle: u64, f: impl FnOnce(&Environment) -> R) -> Result<R> {
        let env = self.env(handle)?;
        let env = env.lock();
        Ok(f(&env))
    }

    /// Run a read-modify-write against an environment under the coarse
    /// advance lock, spanning the lookup, the mutation, and the write-back.
    fn with_env_mut<R>(
        &self,
        handle: u64,
        f: impl FnOnce(&mut Environment) -> Result<R>,
    ) -> Result<R> {
        let _exclusive = self.advance_lock.lock();
        let env = self.env(handle)?;
        let mut env = env.lock();
        f(&mut env)
    }

    /// Create a new environment: build the application, run genesis, prime
    /// the context one block past genesis, commit, and register the
    /// instance. Returns its handle.
    pub fn create_environment(&self) -> Result<u64> {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;

        let working_dir = tempfile::Builder::new()
            .prefix(".cw-sandbox-")
            .tempdir()
            .context("creating environment working directory")?;
        let mut app = ChainApp::new(working_dir.path())?;
        let (context, validator_key) = app.init_chain()?;

        let mut param_types = ParamTypeRegistry::default();
        param_types.register::<TokenFactoryParams>();

        let mut env = Environment {
            id,
            app,
            context,
            validator_key,
            working_dir,
            param_types,
        };

        {
            let _exclusive = self.advance_lock.lock();
            lifecycle::advance(&mut env, None, None, DEFAULT_BLOCK_SECONDS)
                .context("priming genesis block")?;
        }

        self.envs.write().insert(id, Arc::new(Mutex::new(env)));
        info!(env_id = id, "environment created");
        Ok(id)
    }

    /// Destroy an environment. Its working directory is removed and the
    /// handle becomes permanently invalid.
    pub fn destroy_environment(&self, handle: u64) -> Result<()> {
        let removed = self.envs.write().remove(&handle);
        match removed {
            // dropping the environment drops its TempDir, which removes
            // the on-disk state
            Some(_) => {
                info!(env_id = handle, "environment destroyed");
                Ok(())
            }
            None => bail!("environment not found: {handle}"),
        }
    }

    /// Fund a fresh account with the given coins (JSON list of
    /// `{denom, amount}`), returning the new account's private key in
    /// base64. Malformed input is a fixture bug and therefore fatal.
    pub fn fund_account(&self, handle: u64, coins_json: &str) -> Result<String> {
        let inputs: Vec<CoinInput> =
            serde_json::from_str(coins_json).context("parsing coins json")?;
        let mut coins = Vec::with_capacity(inputs.len());
        for coin in &inputs {
            let amount: u128 = coin
                .amount
                .parse()
                .with_context(|| format!("parsing amount for denom {}", coin.denom))?;
            coins.push((coin.denom.clone(), amount));
        }

        let key = SigningKey::random(&mut OsRng);
        let address = derive_address(&key.verifying_key().to_sec1_bytes());

        self.with_env_mut(handle, |env| {
            env.app
                .fund_account(&address, &coins)
                .context("funding account")
        })?;

        debug!(env_id = handle, %address, coins = coins.len(), "account funded");
        Ok(BASE64.encode(key.to_bytes()))
    }

    /// Advance the chain by one empty block, moving time forward by
    /// `seconds`.
    pub fn advance_time(&self, handle: u64, seconds: u64) -> Result<()> {
        self.with_env_mut(handle, |env| lifecycle::advance(env, None, None, seconds))?;
        Ok(())
    }

    /// Submit a transaction (base64) in its own block with the default
    /// time step. Returns the serialized finalize response as an Ok
    /// result buffer.
    pub fn finalize_block(&self, handle: u64, base64_tx: &str) -> Result<Vec<u8>> {
        let tx = BASE64
            .decode(base64_tx)
            .context("decoding transaction base64")?;
        self.with_env_mut(handle, |env| {
            lifecycle::advance(env, None, Some(tx), DEFAULT_BLOCK_SECONDS)
        })
    }

    /// Inject oracle prices (JSON list of `{base, quote, price}`) through
    /// a vote-extension commit carried by one empty block.
    ///
    /// Prices only take effect once the chain has established the
    /// vote-extension mechanism (height ≥ 2); price injection and
    /// transaction submission are mutually exclusive within one advance.
    pub fn set_oracle_prices(&self, handle: u64, prices_json: &str) -> Result<()> {
        let observations: Vec<PriceObservation> =
            serde_json::from_str(prices_json).context("parsing prices json")?;

        self.with_env_mut(handle, |env| {
            let deltas = oracle::price_deltas(env.app.oracle(), &observations)?;
            let blob = crate::app::oracle::build_extended_commit(&env.validator_key, deltas);
            lifecycle::advance(env, Some(blob), None, DEFAULT_BLOCK_SECONDS)
        })?;
        Ok(())
    }

    /// Privileged execution against a contract address. Contract-level
    /// failure is recoverable; a malformed address is fatal.
    pub fn sudo(&self, handle: u64, address: &str, msg_json: &str) -> Result<Vec<u8>> {
        let raw = hex::decode(address).context("decoding contract address")?;
        if raw.len() != 20 {
            bail!("contract address must be 20 bytes, got {}", raw.len());
        }

        self.with_env_mut(handle, |env| {
            Ok(match env.app.wasm_mut().sudo(address, msg_json.as_bytes()) {
                Ok(data) => result::encode_ok(&data),
                Err(msg) => result::encode_err(ErrorKind::Execute, msg),
            })
        })
    }

    /// Route a query (base64 request bytes) through the application's
    /// query router. Missing routes and route failures are recoverable.
    pub fn query(&self, handle: u64, path: &str, base64_query: &str) -> Result<Vec<u8>> {
        let data = BASE64
            .decode(base64_query)
            .context("decoding query base64")?;
        self.with_env(handle, |env| {
            match env.app.route_query(&env.context, path, &data) {
                None => result::encode_err(
                    ErrorKind::Query,
                    format!("no route found for `{path}`"),
                ),
                Some(Err(msg)) => result::encode_err(ErrorKind::Query, msg),
                Some(Ok(value)) => result::encode_ok(&value),
            }
        })
    }

    /// Dry-run gas estimation for a transaction (base64). Simulation
    /// failure is recoverable.
    pub fn simulate(&self, handle: u64, base64_tx: &str) -> Result<Vec<u8>> {
        let tx = BASE64
            .decode(base64_tx)
            .context("decoding transaction base64")?;
        self.with_env_mut(handle, |env| {
            Ok(match env.app.simulate(&tx) {
                Ok(gas) => result::encode_ok(&gas.encode_to_vec()),
                Err(msg) => result::encode_err(ErrorKind::Execute, msg),
            })
        })
    }

    /// Read a param set by subspace and type id. Unknown subspaces and
    /// unregistered types are recoverable.
    pub fn get_param_set(&self, handle: u64, subspace: &str, type_url: &str) -> Result<Vec<u8>> {
        self.with_env(handle, |env| {
            if !env.app.params().has_subspace(subspace) {
                return Ok(result::encode_err(
                    ErrorKind::Execute,
                    format!("no subspace found for `{subspace}`"),
                ));
            }
            let Some(mut param_set) = env.param_types.empty_set(type_url) else {
                return Ok(result::encode_err(
                    ErrorKind::Execute,
                    format!("no param set found for `{type_url}`"),
                ));
            };
            if let Some(stored) = env.app.params().get_raw(subspace, type_url) {
                // stored bytes were produced by this registry; failure to
                // decode them means harness state is corrupt
                param_set
                    .merge_set(stored)
                    .context("decoding stored param set")?;
            }
            Ok(result::encode_ok(&param_set.encode_set()))
        })?
    }

    /// Write a param set (base64-encoded `Any`) into a subspace. Unknown
    /// subspaces, unregistered types, and undecodable payloads are
    /// recoverable.
    pub fn set_param_set(
        &self,
        handle: u64,
        subspace: &str,
        base64_param_set: &str,
    ) -> Result<Vec<u8>> {
        let bytes = BASE64
            .decode(base64_param_set)
            .context("decoding param set base64")?;

        self.with_env_mut(handle, |env| {
            if !env.app.params().has_subspace(subspace) {
                return Ok(result::encode_err(
                    ErrorKind::Execute,
                    format!("no subspace found for `{subspace}`"),
                ));
            }
            let any = match Any::decode(bytes.as_slice()) {
                Ok(any) => any,
                Err(e) => return Ok(result::encode_err(ErrorKind::Execute, e)),
            };
            let Some(mut param_set) = env.param_types.empty_set(&any.type_url) else {
                return Ok(result::encode_err(
                    ErrorKind::Execute,
                    format!("no param set found for `{}`", any.type_url),
                ));
            };
            if let Err(e) = param_set.merge_set(&any.value) {
                return Ok(result::encode_err(ErrorKind::Execute, e));
            }
            env.app
                .params_mut()
                .set_raw(subspace, &any.type_url, param_set.encode_set());
            Ok(result::encode_ok(&[]))
        })
    }

    /// Current block time in nanoseconds.
    pub fn get_block_time(&self, handle: u64) -> Result<i64> {
        self.with_env(handle, |env| env.context.time_ns)
    }

    /// Current block height.
    pub fn get_block_height(&self, handle: u64) -> Result<i64> {
        self.with_env(handle, |env| env.context.height)
    }

    /// Sequence of an existing account. Unknown accounts are fatal.
    pub fn account_sequence(&self, handle: u64, address: &str) -> Result<u64> {
        self.with_env(handle, |env| env.app.accounts().sequence(address))?
    }

    /// Account number of an existing account. Unknown accounts are fatal.
    pub fn account_number(&self, handle: u64, address: &str) -> Result<u64> {
        self.with_env(handle, |env| env.app.accounts().number(address))?
    }

    /// Export the validator's private key, base64 encoded.
    pub fn get_validator_private_key(&self, handle: u64) -> Result<String> {
        self.with_env(handle, |env| BASE64.encode(env.validator_private_key()))
    }

    /// Snapshot of an environment's context, for embedding callers.
    pub fn block_context(&self, handle: u64) -> Result<BlockContext> {
        self.with_env(handle, |env| env.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handles_are_distinct_and_monotonic() {
        let harness = Harness::new();
        let h1 = harness.create_environment().unwrap();
        let h2 = harness.create_environment().unwrap();
        assert!(h2 > h1);
        assert_eq!(harness.len(), 2);
    }

    #[test]
    fn destroyed_handles_are_never_reused() {
        let harness = Harness::new();
        let h1 = harness.create_environment().unwrap();
        harness.destroy_environment(h1).unwrap();
        let h2 = harness.create_environment().unwrap();
        assert!(h2 > h1);
    }

    #[test]
    fn lookup_after_destroy_is_fatal() {
        let harness = Harness::new();
        let handle = harness.create_environment().unwrap();
        harness.destroy_environment(handle).unwrap();

        assert!(harness.get_block_height(handle).is_err());
        assert!(harness.destroy_environment(handle).is_err());
    }

    #[test]
    fn concurrent_creates_get_distinct_handles() {
        let harness = std::sync::Arc::new(Harness::new());
        let mut joins = Vec::new();
        for _ in 0..8 {
            let harness = harness.clone();
            joins.push(thread::spawn(move || harness.create_environment().unwrap()));
        }
        let mut handles: Vec<u64> = joins.into_iter().map(|j| j.join().unwrap()).collect();
        handles.sort_unstable();
        handles.dedup();
        assert_eq!(handles.len(), 8);
    }

    #[test]
    fn concurrent_advances_on_distinct_handles() {
        let harness = std::sync::Arc::new(Harness::new());
        let h1 = harness.create_environment().unwrap();
        let h2 = harness.create_environment().unwrap();

        let a = {
            let harness = harness.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    harness.advance_time(h1, 3).unwrap();
                }
            })
        };
        let b = {
            let harness = harness.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    harness.advance_time(h2, 3).unwrap();
                }
            })
        };
        a.join().unwrap();
        b.join().unwrap();

        assert_eq!(harness.get_block_height(h1).unwrap(), 6);
        assert_eq!(harness.get_block_height(h2).unwrap(), 6);
    }

    #[test]
    fn malformed_coins_json_is_fatal() {
        let harness = Harness::new();
        let handle = harness.create_environment().unwrap();
        assert!(harness.fund_account(handle, "not json").is_err());
        assert!(harness
            .fund_account(handle, r#"[{"denom":"untrn","amount":"not-a-number"}]"#)
            .is_err());
    }

    #[test]
    fn sudo_rejects_malformed_address_fatally() {
        let harness = Harness::new();
        let handle = harness.create_environment().unwrap();
        assert!(harness.sudo(handle, "zzzz", "{}").is_err());
        assert!(harness.sudo(handle, "abcd", "{}").is_err());
    }
}
