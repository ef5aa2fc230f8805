//! Human-unit ⇄ smallest-unit conversion.
//!
//! Used only at intent and display boundaries; transactions always carry
//! smallest units.

use alloy::primitives::U256;

use crate::transaction::types::{TransactionError, TransactionResult};

fn scale(decimals: u8) -> U256 {
    U256::from(10u8).pow(U256::from(decimals))
}

/// `"1.5"` with 6 decimals → `1500000`. Digits past `decimals` are truncated;
/// an empty string is zero.
pub fn amount_to_std(amount: &str, decimals: u8) -> TransactionResult<U256> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Ok(U256::ZERO);
    }

    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction) {
        return Err(TransactionError::InvalidIntent(format!("invalid amount '{}'", amount)));
    }

    let overflow = || TransactionError::InvalidIntent(format!("amount '{}' out of range", amount));
    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| overflow())?
    };

    let kept: String = fraction.chars().take(decimals as usize).collect();
    let padded = format!("{:0<width$}", kept, width = decimals as usize);
    let fraction = if padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&padded, 10).map_err(|_| overflow())?
    };

    whole
        .checked_mul(scale(decimals))
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(overflow)
}

/// `1500000` with 6 decimals → `"1.5"`.
pub fn amount_from_std(amount: U256, decimals: u8) -> String {
    let scale = scale(decimals);
    let whole = amount / scale;
    let fraction = amount % scale;
    if fraction.is_zero() {
        return whole.to_string();
    }

    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
