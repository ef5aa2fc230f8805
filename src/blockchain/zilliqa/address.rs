//! Zilliqa address forms.
//!
//! Accounts are shown as bech32 (`zil1...`) but the node API wants the
//! 20-byte hex form. Contract state keys use `0x`-prefixed lowercase hex.

use bech32::{Bech32, Hrp};

use crate::blockchain::types::{BlockchainError, BlockchainResult};

const HRP: Hrp = Hrp::parse_unchecked("zil");

const ADDRESS_LEN: usize = 20;

pub fn is_bech32(address: &str) -> bool {
    address.to_ascii_lowercase().starts_with("zil1") && bech32::decode(address).is_ok()
}

fn bytes_of(address: &str) -> BlockchainResult<Vec<u8>> {
    let bytes = if is_bech32(address) {
        let (hrp, data) = bech32::decode(address)
            .map_err(|e| BlockchainError::InvalidAddress(format!("{}: {}", address, e)))?;
        if hrp != HRP {
            return Err(BlockchainError::InvalidAddress(format!("{}: unexpected prefix {}", address, hrp)));
        }
        data
    } else {
        let digits = address.strip_prefix("0x").unwrap_or(address);
        hex::decode(digits).map_err(|e| BlockchainError::InvalidAddress(format!("{}: {}", address, e)))?
    };

    if bytes.len() != ADDRESS_LEN {
        return Err(BlockchainError::InvalidAddress(format!(
            "{}: expected {} bytes, got {}",
            address,
            ADDRESS_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// `0x`-prefixed lowercase hex, from either form.
pub fn to_hex(address: &str) -> BlockchainResult<String> {
    Ok(format!("0x{}", hex::encode(bytes_of(address)?)))
}

/// Bare lowercase hex as the node API expects it.
pub fn to_rpc(address: &str) -> BlockchainResult<String> {
    Ok(hex::encode(bytes_of(address)?))
}

pub fn to_bech32(address: &str) -> BlockchainResult<String> {
    let bytes = bytes_of(address)?;
    bech32::encode::<Bech32>(HRP, &bytes).map_err(|e| BlockchainError::InvalidAddress(format!("{}: {}", address, e)))
}
