//! C ABI over the harness, for callers on the far side of a language
//! boundary.
//!
//! Every export operates on the single process-wide [`Harness`]. String
//! arguments are NUL-terminated UTF-8; byte-carrying arguments and results
//! cross as base64 inside C strings. A returned `*mut c_char` is owned by
//! the caller and must be released with [`cw_sandbox_free`].
//!
//! The fatal error channel does not exist at this boundary: a broken
//! fixture (unknown handle, malformed setup input, finalize failure) prints
//! the error and aborts the process, because continuing would hand the
//! caller a chain it cannot trust. Recoverable errors still come back
//! inside the encoded result buffer.

use std::ffi::{c_char, CStr, CString};
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::harness::Harness;

static HARNESS: OnceLock<Harness> = OnceLock::new();

fn harness() -> &'static Harness {
    HARNESS.get_or_init(Harness::new)
}

fn fatal(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("cw-sandbox fatal: {context}: {err}");
    std::process::abort();
}

/// Read a NUL-terminated UTF-8 argument. Null or non-UTF-8 input is a
/// caller bug, which at this boundary means abort.
///
/// # Safety
/// `ptr` must be null or point at a NUL-terminated string valid for the
/// duration of the call.
unsafe fn arg_str<'a>(ptr: *const c_char, name: &str) -> &'a str {
    if ptr.is_null() {
        fatal(name, "null pointer argument");
    }
    match unsafe { CStr::from_ptr(ptr) }.to_str() {
        Ok(s) => s,
        Err(e) => fatal(name, e),
    }
}

fn out_string(s: String, context: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c) => c.into_raw(),
        Err(e) => fatal(context, e),
    }
}

fn out_buffer(buf: Vec<u8>, context: &str) -> *mut c_char {
    out_string(BASE64.encode(buf), context)
}

fn unwrap_or_abort<T>(result: anyhow::Result<T>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => fatal(context, format!("{e:#}")),
    }
}

/// Create a new environment and return its handle.
#[no_mangle]
pub extern "C" fn cw_sandbox_create_environment() -> u64 {
    unwrap_or_abort(harness().create_environment(), "create_environment")
}

/// Destroy an environment. The handle becomes permanently invalid.
#[no_mangle]
pub extern "C" fn cw_sandbox_destroy_environment(handle: u64) {
    unwrap_or_abort(harness().destroy_environment(handle), "destroy_environment");
}

/// Fund a fresh account from a JSON coin list; returns the new account's
/// private key, base64 encoded.
///
/// # Safety
/// `coins_json` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_fund_account(
    handle: u64,
    coins_json: *const c_char,
) -> *mut c_char {
    let coins = unsafe { arg_str(coins_json, "fund_account coins") };
    let key = unwrap_or_abort(harness().fund_account(handle, coins), "fund_account");
    out_string(key, "fund_account")
}

/// Advance the chain by one empty block of `seconds`.
#[no_mangle]
pub extern "C" fn cw_sandbox_advance_time(handle: u64, seconds: u64) {
    unwrap_or_abort(harness().advance_time(handle, seconds), "advance_time");
}

/// Submit a base64 transaction in its own block; returns the encoded
/// finalize result buffer, base64 encoded.
///
/// # Safety
/// `base64_tx` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_finalize_block(
    handle: u64,
    base64_tx: *const c_char,
) -> *mut c_char {
    let tx = unsafe { arg_str(base64_tx, "finalize_block tx") };
    let buf = unwrap_or_abort(harness().finalize_block(handle, tx), "finalize_block");
    out_buffer(buf, "finalize_block")
}

/// Inject oracle prices from a JSON observation list.
///
/// # Safety
/// `prices_json` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_set_oracle_prices(handle: u64, prices_json: *const c_char) {
    let prices = unsafe { arg_str(prices_json, "set_oracle_prices prices") };
    unwrap_or_abort(
        harness().set_oracle_prices(handle, prices),
        "set_oracle_prices",
    );
}

/// Privileged execution against a contract address; returns the encoded
/// result buffer, base64 encoded.
///
/// # Safety
/// `address` and `msg_json` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_sudo(
    handle: u64,
    address: *const c_char,
    msg_json: *const c_char,
) -> *mut c_char {
    let address = unsafe { arg_str(address, "sudo address") };
    let msg = unsafe { arg_str(msg_json, "sudo msg") };
    let buf = unwrap_or_abort(harness().sudo(handle, address, msg), "sudo");
    out_buffer(buf, "sudo")
}

/// Route a query; returns the encoded result buffer, base64 encoded.
///
/// # Safety
/// `path` and `base64_query` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_query(
    handle: u64,
    path: *const c_char,
    base64_query: *const c_char,
) -> *mut c_char {
    let path = unsafe { arg_str(path, "query path") };
    let data = unsafe { arg_str(base64_query, "query data") };
    let buf = unwrap_or_abort(harness().query(handle, path, data), "query");
    out_buffer(buf, "query")
}

/// Dry-run a base64 transaction; returns the encoded result buffer,
/// base64 encoded.
///
/// # Safety
/// `base64_tx` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_simulate(
    handle: u64,
    base64_tx: *const c_char,
) -> *mut c_char {
    let tx = unsafe { arg_str(base64_tx, "simulate tx") };
    let buf = unwrap_or_abort(harness().simulate(handle, tx), "simulate");
    out_buffer(buf, "simulate")
}

/// Read a param set; returns the encoded result buffer, base64 encoded.
///
/// # Safety
/// `subspace` and `type_url` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_get_param_set(
    handle: u64,
    subspace: *const c_char,
    type_url: *const c_char,
) -> *mut c_char {
    let subspace = unsafe { arg_str(subspace, "get_param_set subspace") };
    let type_url = unsafe { arg_str(type_url, "get_param_set type_url") };
    let buf = unwrap_or_abort(
        harness().get_param_set(handle, subspace, type_url),
        "get_param_set",
    );
    out_buffer(buf, "get_param_set")
}

/// Write a param set from a base64-encoded `Any`; returns the encoded
/// result buffer, base64 encoded.
///
/// # Safety
/// `subspace` and `base64_param_set` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_set_param_set(
    handle: u64,
    subspace: *const c_char,
    base64_param_set: *const c_char,
) -> *mut c_char {
    let subspace = unsafe { arg_str(subspace, "set_param_set subspace") };
    let payload = unsafe { arg_str(base64_param_set, "set_param_set payload") };
    let buf = unwrap_or_abort(
        harness().set_param_set(handle, subspace, payload),
        "set_param_set",
    );
    out_buffer(buf, "set_param_set")
}

/// Current block time in nanoseconds.
#[no_mangle]
pub extern "C" fn cw_sandbox_get_block_time(handle: u64) -> i64 {
    unwrap_or_abort(harness().get_block_time(handle), "get_block_time")
}

/// Current block height.
#[no_mangle]
pub extern "C" fn cw_sandbox_get_block_height(handle: u64) -> i64 {
    unwrap_or_abort(harness().get_block_height(handle), "get_block_height")
}

/// Sequence of an existing account.
///
/// # Safety
/// `address` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_account_sequence(
    handle: u64,
    address: *const c_char,
) -> u64 {
    let address = unsafe { arg_str(address, "account_sequence address") };
    unwrap_or_abort(harness().account_sequence(handle, address), "account_sequence")
}

/// Account number of an existing account.
///
/// # Safety
/// `address` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_account_number(handle: u64, address: *const c_char) -> u64 {
    let address = unsafe { arg_str(address, "account_number address") };
    unwrap_or_abort(harness().account_number(handle, address), "account_number")
}

/// Validator private key, base64 encoded.
#[no_mangle]
pub extern "C" fn cw_sandbox_get_validator_private_key(handle: u64) -> *mut c_char {
    let key = unwrap_or_abort(
        harness().get_validator_private_key(handle),
        "get_validator_private_key",
    );
    out_string(key, "get_validator_private_key")
}

/// Release a string previously returned by this library.
///
/// # Safety
/// `ptr` must be null or a pointer returned by a `cw_sandbox_*` export,
/// released at most once.
#[no_mangle]
pub unsafe extern "C" fn cw_sandbox_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result;

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { cw_sandbox_free(ptr) };
        s
    }

    fn take_buffer(ptr: *mut c_char) -> Vec<u8> {
        BASE64.decode(take_string(ptr)).unwrap()
    }

    #[test]
    fn create_advance_and_read_height() {
        let handle = cw_sandbox_create_environment();
        assert_eq!(cw_sandbox_get_block_height(handle), 1);
        cw_sandbox_advance_time(handle, 5);
        assert_eq!(cw_sandbox_get_block_height(handle), 2);
        cw_sandbox_destroy_environment(handle);
    }

    #[test]
    fn query_crosses_as_base64_result_buffer() {
        let handle = cw_sandbox_create_environment();
        let path = CString::new("/no/such/route").unwrap();
        let data = CString::new("").unwrap();

        let buf = take_buffer(unsafe { cw_sandbox_query(handle, path.as_ptr(), data.as_ptr()) });
        let err = result::decode(&buf).unwrap_err();
        assert!(matches!(err, result::RunnerError::QueryError { .. }));
        cw_sandbox_destroy_environment(handle);
    }

    #[test]
    fn fund_account_returns_base64_key() {
        let handle = cw_sandbox_create_environment();
        let coins = CString::new(r#"[{"denom":"untrn","amount":"100"}]"#).unwrap();
        let key = take_string(unsafe { cw_sandbox_fund_account(handle, coins.as_ptr()) });
        assert_eq!(BASE64.decode(key).unwrap().len(), 32);
        cw_sandbox_destroy_environment(handle);
    }

    #[test]
    fn free_tolerates_null() {
        unsafe { cw_sandbox_free(std::ptr::null_mut()) };
    }
}
