//! Block lifecycle controller.
//!
//! Advances one environment's context by exactly one block: compute the new
//! block time and height, assemble the ordered transaction list, run
//! begin/finalize/commit against the application, and replace the context.
//!
//! Adapter-level finalize or commit failure is not a testable condition —
//! a corrupted simulated chain cannot be trusted for further assertions —
//! so those errors propagate on the fatal channel.

use anyhow::{Context, Result};
use prost::Message;
use tracing::debug;

use crate::app::FinalizeBlockRequest;
use crate::env::Environment;
use crate::result;

/// Assemble the ordered transaction byte list for the next block.
///
/// The first two blocks establish the vote-extension mechanism before any
/// extension data is accepted, so below height 2 the list is just the
/// caller's transaction (or empty). From height 2 on, the extension-commit
/// slot comes first, with absent slots encoded as empty byte strings. This
/// ordering is an on-chain precondition, not a convention.
pub fn build_tx_list(
    current_height: i64,
    extension_commit: Option<Vec<u8>>,
    tx: Option<Vec<u8>>,
) -> Vec<Vec<u8>> {
    if current_height < 2 {
        tx.into_iter().collect()
    } else {
        vec![extension_commit.unwrap_or_default(), tx.unwrap_or_default()]
    }
}

/// Advance the environment by one block.
///
/// Returns the serialized finalize response wrapped as an Ok result buffer.
/// The context is replaced wholesale; the caller holds whatever locks make
/// this read-modify-write exclusive.
pub fn advance(
    env: &mut Environment,
    extension_commit: Option<Vec<u8>>,
    tx: Option<Vec<u8>>,
    delta_secs: u64,
) -> Result<Vec<u8>> {
    let txs = build_tx_list(env.context.height, extension_commit, tx);
    let new_ctx = env.context.next_block(delta_secs);

    debug!(
        env_id = env.id,
        height = new_ctx.height,
        txs = txs.len(),
        "advancing block"
    );

    env.app.begin_block(&new_ctx);
    let response = env
        .app
        .finalize_block(&FinalizeBlockRequest {
            height: new_ctx.height,
            time_ns: new_ctx.time_ns,
            txs,
        })
        .with_context(|| format!("finalizing block {} for env {}", new_ctx.height, env.id))?;
    env.app
        .commit()
        .with_context(|| format!("committing block {} for env {}", new_ctx.height, env.id))?;

    env.context = new_ctx;
    Ok(result::encode_ok(&response.encode_to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_list_below_activation_height() {
        assert_eq!(build_tx_list(0, None, None), Vec::<Vec<u8>>::new());
        assert_eq!(build_tx_list(1, None, Some(vec![1, 2])), vec![vec![1, 2]]);
        // an extension supplied too early is dropped, matching the chain's
        // requirement that the mechanism is established first
        assert_eq!(build_tx_list(1, Some(vec![9]), None), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn tx_list_at_activation_height_puts_extension_first() {
        let list = build_tx_list(2, Some(vec![9]), Some(vec![1]));
        assert_eq!(list, vec![vec![9], vec![1]]);

        let list = build_tx_list(5, None, None);
        assert_eq!(list, vec![Vec::<u8>::new(), Vec::<u8>::new()]);

        let list = build_tx_list(2, Some(vec![9]), None);
        assert_eq!(list, vec![vec![9], Vec::<u8>::new()]);
    }
}
