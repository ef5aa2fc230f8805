//! Staking pool receipt-log parser.
//!
//! Staking pool contracts report what happened only as human readable log
//! lines, e.g. `The deposit and stake of 100 to @pool.near succeeded`.
//! Patterns are grouped per log schema version; an unknown version matches
//! nothing, and a matched line whose amount is not an integer yields an
//! unknown amount rather than a guess.

use alloy::primitives::U256;

use crate::transaction::types::ReceiptOutcome;

/// Log schema understood by the current staking pool contracts.
pub const CURRENT_SCHEMA: u32 = 1;

/// `<prefix><amount><middle>[@]<validator><suffix>`, matched case-insensitively.
#[derive(Debug, Clone, Copy)]
struct TransferPattern {
    name: &'static str,
    prefix: &'static str,
    middle: &'static str,
    suffix: &'static str,
}

static SCHEMA_V1: &[TransferPattern] = &[
    TransferPattern {
        name: "deposit_and_stake",
        prefix: "the deposit and stake of ",
        middle: " to ",
        suffix: " succeeded",
    },
    TransferPattern {
        name: "deposit",
        prefix: "the deposit of ",
        middle: " to ",
        suffix: " succeeded",
    },
    TransferPattern {
        name: "stake",
        prefix: "staking of ",
        middle: " at ",
        suffix: " succeeded",
    },
    TransferPattern {
        name: "withdrawal",
        prefix: "the withdrawal of ",
        middle: " from ",
        suffix: " succeeded",
    },
];

/// Versioned parser over receipt logs.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptLogParser {
    patterns: Option<&'static [TransferPattern]>,
}

impl ReceiptLogParser {
    pub fn for_schema(version: u32) -> Self {
        let patterns = match version {
            1 => Some(SCHEMA_V1),
            _ => None,
        };
        if patterns.is_none() {
            tracing::warn!(schema = version, "Unknown receipt log schema, log parsing disabled");
        }
        Self { patterns }
    }

    pub fn is_supported(&self) -> bool {
        self.patterns.is_some()
    }

    /// Walk every log line; later matches win, as the pool logs in execution order.
    pub fn parse<'a, I>(&self, logs: I) -> Option<ReceiptOutcome>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let patterns = self.patterns?;
        let mut outcome: Option<ReceiptOutcome> = None;

        for line in logs {
            for pattern in patterns {
                if let Some((amount, validator)) = match_transfer(pattern, line) {
                    outcome = Some(ReceiptOutcome {
                        pattern: pattern.name.to_string(),
                        validator: Some(validator.to_string()),
                        amount: parse_amount(amount),
                    });
                }
            }

            if let Some(amount) = match_staking_amount(line) {
                let entry = outcome.get_or_insert_with(|| ReceiptOutcome {
                    pattern: "staking_amount".to_string(),
                    validator: None,
                    amount: None,
                });
                entry.amount = parse_amount(amount);
            }
        }

        outcome
    }
}

fn parse_amount(raw: &str) -> Option<U256> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(raw, 10).ok()
}

/// Up to the next space (or end of line).
fn token(s: &str) -> &str {
    s.split(' ').next().unwrap_or_default()
}

fn match_transfer<'l>(pattern: &TransferPattern, line: &'l str) -> Option<(&'l str, &'l str)> {
    // ASCII lowercasing keeps byte offsets aligned with `line`.
    let lowered = line.to_ascii_lowercase();

    let start = lowered.find(pattern.prefix)? + pattern.prefix.len();
    let amount = token(&line[start..]);
    if amount.is_empty() {
        return None;
    }

    let rest = start + amount.len();
    if !lowered[rest..].starts_with(pattern.middle) {
        return None;
    }

    let mut validator_start = rest + pattern.middle.len();
    if line[validator_start..].starts_with('@') {
        validator_start += 1;
    }
    let validator = token(&line[validator_start..]);
    if validator.is_empty() {
        return None;
    }

    let after = validator_start + validator.len();
    if !lowered[after..].starts_with(pattern.suffix) {
        return None;
    }

    Some((amount, validator))
}

/// `[@]<account> staking <digits>.` at the start of the line.
fn match_staking_amount(line: &str) -> Option<&str> {
    let account = token(line.strip_prefix('@').unwrap_or(line));
    let offset = line.len() - line.strip_prefix('@').unwrap_or(line).len() + account.len();

    let rest = line[offset..].strip_prefix(" staking ")?;
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 || !rest[digits_len..].starts_with('.') {
        return None;
    }
    Some(&rest[..digits_len])
}
