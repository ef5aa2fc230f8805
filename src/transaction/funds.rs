//! Available-funds prechecks, run before a transaction is offered for signing.

use alloy::primitives::U256;
use serde::Serialize;

use crate::blockchain::types::{FeeOptions, TokenConfig};

/// Outcome of [`available_funds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FundsCheck {
    /// The amount alone exceeds the token balance.
    pub insufficient_funds: bool,
    /// The amount fits, but not together with the fee.
    pub insufficient_funds_fees: bool,
}

impl FundsCheck {
    pub fn is_sufficient(&self) -> bool {
        !self.insufficient_funds && !self.insufficient_funds_fees
    }
}

/// Check `amount` of `token` against balances, all in smallest units.
///
/// Fees are always paid in the native coin: for native transfers the fee
/// adds to the amount, for token transfers it is checked against
/// `native_balance` alone.
pub fn available_funds(
    amount: U256,
    token: &TokenConfig,
    token_balance: U256,
    native_balance: U256,
    fees: &FeeOptions,
) -> FundsCheck {
    if amount > token_balance {
        return FundsCheck {
            insufficient_funds: true,
            insufficient_funds_fees: false,
        };
    }

    let insufficient_funds_fees = if token.is_native() {
        amount.saturating_add(fees.fee_total()) > token_balance
    } else {
        fees.fee_total() > native_balance
    };

    FundsCheck {
        insufficient_funds: false,
        insufficient_funds_fees,
    }
}

/// Largest sendable amount: the balance, minus the fee for native coins, never below zero.
pub fn available_amount(token: &TokenConfig, token_balance: U256, fees: Option<&FeeOptions>) -> U256 {
    match fees {
        Some(fees) if token.is_native() => token_balance.saturating_sub(fees.fee_total()),
        _ => token_balance,
    }
}
