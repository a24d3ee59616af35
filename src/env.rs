//! One simulated chain instance and its execution context.

use k256::ecdsa::SigningKey;
use tempfile::TempDir;

use crate::app::params::ParamTypeRegistry;
use crate::app::ChainApp;

/// Chain id every instance runs under.
pub const CHAIN_ID: &str = "cw-sandbox-1";

/// Genesis block time, 2024-01-01T00:00:00Z in nanoseconds.
///
/// Fixed rather than sampled from the wall clock so that two instances
/// created from the same test inputs produce identical block timestamps.
pub const GENESIS_TIME_NS: i64 = 1_704_067_200_000_000_000;

/// Default seconds a block advance moves time forward.
pub const DEFAULT_BLOCK_SECONDS: u64 = 3;

/// Where the simulated chain currently is: the (height, time, chain-id)
/// triple carried between block advances.
///
/// A context is never mutated in place. Every advance builds a fresh value
/// via [`BlockContext::next_block`] and replaces the environment's context
/// wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    /// Current block height.
    pub height: i64,
    /// Current block time in nanoseconds since the Unix epoch.
    pub time_ns: i64,
    /// Chain identifier, fixed at genesis.
    pub chain_id: String,
}

impl BlockContext {
    /// The context the chain starts from before the first block.
    pub fn genesis() -> Self {
        Self {
            height: 0,
            time_ns: GENESIS_TIME_NS,
            chain_id: CHAIN_ID.to_string(),
        }
    }

    /// The context one block later: height +1, time + `delta_secs`.
    pub fn next_block(&self, delta_secs: u64) -> Self {
        Self {
            height: self.height + 1,
            time_ns: self.time_ns + (delta_secs as i64) * 1_000_000_000,
            chain_id: self.chain_id.clone(),
        }
    }
}

/// One isolated simulated chain instance.
///
/// The environment exclusively owns its application and working directory;
/// destroying the environment drops both. The validator key is fixed at
/// genesis and read-only afterwards.
pub struct Environment {
    /// Handle this environment is registered under. Assigned once, never
    /// reused within the process.
    pub id: u64,
    /// The chain application this instance drives.
    pub app: ChainApp,
    /// Current execution context, replaced wholesale on every advance.
    pub context: BlockContext,
    /// The sole validator's signing key, fixed at genesis.
    pub validator_key: SigningKey,
    /// On-disk state for this instance. Removed when the environment is
    /// destroyed (RAII).
    pub working_dir: TempDir,
    /// Registered empty param-set prototypes, populated once at setup.
    pub param_types: ParamTypeRegistry,
}

impl Environment {
    /// Export the validator's raw private key bytes.
    pub fn validator_private_key(&self) -> Vec<u8> {
        self.validator_key.to_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_block_advances_height_and_time() {
        let genesis = BlockContext::genesis();
        let next = genesis.next_block(3);
        assert_eq!(next.height, 1);
        assert_eq!(next.time_ns, GENESIS_TIME_NS + 3_000_000_000);
        assert_eq!(next.chain_id, CHAIN_ID);
        // the prior context is left untouched
        assert_eq!(genesis.height, 0);
    }

    #[test]
    fn zero_delta_keeps_time() {
        let ctx = BlockContext::genesis().next_block(0);
        assert_eq!(ctx.height, 1);
        assert_eq!(ctx.time_ns, GENESIS_TIME_NS);
    }
}
