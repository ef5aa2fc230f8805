//! NEAR transaction serialization and signing.
//!
//! Borsh layout of a transaction:
//! `signer_id, public_key, nonce, receiver_id, block_hash, actions`,
//! signed over `sha256(borsh(transaction))` with ed25519.

use alloy::primitives::U256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

use crate::transaction::types::{ChainAction, Transaction, TransactionError, TransactionResult};

/// Gas attached to staking pool function calls (100 Tgas).
pub const DEFAULT_FUNC_CALL_GAS: u64 = 100_000_000_000_000;

const ED25519_PREFIX: &str = "ed25519:";
const KEY_TYPE_ED25519: u8 = 0;
const ACTION_FUNCTION_CALL: u8 = 2;
const ACTION_TRANSFER: u8 = 3;

#[derive(Default)]
struct BorshWriter {
    buf: Vec<u8>,
}

impl BorshWriter {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u128(&mut self, value: u128) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn bytes(&mut self, bytes: &[u8]) -> TransactionResult<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| TransactionError::Encoding("field longer than u32::MAX".into()))?;
        self.u32(len);
        self.fixed(bytes);
        Ok(())
    }

    fn string(&mut self, value: &str) -> TransactionResult<()> {
        self.bytes(value.as_bytes())
    }
}

fn decode_base58(value: &str, what: &str) -> TransactionResult<Vec<u8>> {
    bs58::decode(value)
        .into_vec()
        .map_err(|e| TransactionError::Encoding(format!("{}: {}", what, e)))
}

/// Parse `ed25519:<base58>` holding a 64-byte keypair or a 32-byte seed.
pub fn parse_secret_key(key: &str) -> TransactionResult<SigningKey> {
    let raw = decode_base58(key.trim_start_matches(ED25519_PREFIX), "secret key")
        .map_err(|_| TransactionError::Signing("Invalid private key format".into()))?;
    let seed: [u8; 32] = match raw.len() {
        32 | 64 => raw[..32]
            .try_into()
            .map_err(|_| TransactionError::Signing("Invalid private key length".into()))?,
        _ => return Err(TransactionError::Signing("Invalid private key length".into())),
    };
    Ok(SigningKey::from_bytes(&seed))
}

/// Parse `ed25519:<base58>` public key.
pub fn parse_public_key(key: &str) -> TransactionResult<[u8; 32]> {
    let raw = decode_base58(key.trim_start_matches(ED25519_PREFIX), "public key")?;
    raw.try_into()
        .map_err(|_| TransactionError::Encoding("public key must be 32 bytes".into()))
}

pub fn encode_public_key(key: &[u8; 32]) -> String {
    format!("{}{}", ED25519_PREFIX, bs58::encode(key).into_string())
}

/// Public key string for a secret key.
pub fn public_key_of(secret_key: &str) -> TransactionResult<String> {
    let signing_key = parse_secret_key(secret_key)?;
    Ok(encode_public_key(&signing_key.verifying_key().to_bytes()))
}

fn to_u128(value: U256, what: &str) -> TransactionResult<u128> {
    u128::try_from(value).map_err(|_| TransactionError::Encoding(format!("{} exceeds u128", what)))
}

/// Borsh bytes of the unsigned transaction.
pub fn serialize_transaction(transaction: &Transaction, public_key: &[u8; 32]) -> TransactionResult<Vec<u8>> {
    let block_hash = transaction
        .block_hash
        .as_deref()
        .ok_or_else(|| TransactionError::InvalidIntent("block hash missing".into()))?;
    let block_hash: [u8; 32] = decode_base58(block_hash, "block hash")?
        .try_into()
        .map_err(|_| TransactionError::Encoding("block hash must be 32 bytes".into()))?;

    let actions = transaction.actions();
    if actions.is_empty() {
        return Err(TransactionError::InvalidIntent("transaction has no actions".into()));
    }

    let mut w = BorshWriter::default();
    w.string(&transaction.address)?;
    w.u8(KEY_TYPE_ED25519);
    w.fixed(public_key);
    w.u64(transaction.nonce);
    w.string(&transaction.to_address)?;
    w.fixed(&block_hash);

    w.u32(actions.len() as u32);
    for action in actions {
        match action {
            ChainAction::Transfer => {
                w.u8(ACTION_TRANSFER);
                w.u128(to_u128(transaction.amount, "amount")?);
            }
            ChainAction::FunctionCall {
                method,
                args,
                gas,
                deposit,
            } => {
                let args = serde_json::to_vec(args)
                    .map_err(|e| TransactionError::Encoding(format!("args: {}", e)))?;
                w.u8(ACTION_FUNCTION_CALL);
                w.string(method)?;
                w.bytes(&args)?;
                w.u64(*gas);
                w.u128(to_u128(*deposit, "deposit")?);
            }
        }
    }

    Ok(w.buf)
}

/// Base58 transaction hash, as the node reports it.
pub fn transaction_hash(serialized: &[u8]) -> String {
    bs58::encode(Sha256::digest(serialized)).into_string()
}

/// Sign and return the base64 borsh `SignedTransaction`.
pub fn sign_transaction(transaction: &Transaction, secret_key: &str) -> TransactionResult<String> {
    let signing_key = parse_secret_key(secret_key)?;
    let public_key = match transaction.public_key.as_deref() {
        Some(key) => parse_public_key(key)?,
        None => signing_key.verifying_key().to_bytes(),
    };

    let serialized = serialize_transaction(transaction, &public_key)?;
    let hash = Sha256::digest(&serialized);
    let signature = signing_key.sign(hash.as_slice());

    let mut w = BorshWriter { buf: serialized };
    w.u8(KEY_TYPE_ED25519);
    w.fixed(&signature.to_bytes());

    Ok(STANDARD.encode(w.buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::Blockchain;
    use crate::transaction::types::{fixtures, AdditionalInfo, TransferInfo};

    fn secret() -> String {
        format!("{}{}", ED25519_PREFIX, bs58::encode([7u8; 32]).into_string())
    }

    fn transfer() -> Transaction {
        let mut tx = fixtures::transfer(Blockchain::Near, "alice.near", 12);
        tx.to_address = "bob.near".into();
        tx.block_hash = Some(bs58::encode([1u8; 32]).into_string());
        tx.additional_info = AdditionalInfo::Transfer(TransferInfo {
            actions: vec![ChainAction::Transfer],
        });
        tx
    }

    #[test]
    fn test_borsh_layout() {
        let tx = transfer();
        let bytes = serialize_transaction(&tx, &[2u8; 32]).unwrap();

        // signer id: u32 length + "alice.near"
        assert_eq!(&bytes[..4], &10u32.to_le_bytes());
        assert_eq!(&bytes[4..14], b"alice.near");
        // key type then 32 key bytes
        assert_eq!(bytes[14], KEY_TYPE_ED25519);
        assert_eq!(&bytes[47..55], &12u64.to_le_bytes());
        // one transfer action with amount 1 at the tail
        let tail = &bytes[bytes.len() - 21..];
        assert_eq!(&tail[..4], &1u32.to_le_bytes());
        assert_eq!(tail[4], ACTION_TRANSFER);
        assert_eq!(&tail[5..], &1u128.to_le_bytes());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let tx = transfer();
        let first = sign_transaction(&tx, &secret()).unwrap();
        let second = sign_transaction(&tx, &secret()).unwrap();
        assert_eq!(first, second);

        let decoded = STANDARD.decode(first).unwrap();
        let unsigned = serialize_transaction(&tx, &parse_public_key(&public_key_of(&secret()).unwrap()).unwrap()).unwrap();
        assert_eq!(decoded.len(), unsigned.len() + 65);
        assert_eq!(&decoded[..unsigned.len()], unsigned.as_slice());
    }

    #[test]
    fn test_keypair_form_matches_seed_form() {
        let seed = [9u8; 32];
        let public = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        let mut keypair = seed.to_vec();
        keypair.extend_from_slice(&public);

        let from_seed = public_key_of(&format!("ed25519:{}", bs58::encode(seed).into_string())).unwrap();
        let from_pair = public_key_of(&format!("ed25519:{}", bs58::encode(keypair).into_string())).unwrap();
        assert_eq!(from_seed, from_pair);
    }

    #[test]
    fn test_missing_block_hash() {
        let mut tx = transfer();
        tx.block_hash = None;
        assert!(matches!(
            sign_transaction(&tx, &secret()),
            Err(TransactionError::InvalidIntent(_))
        ));
    }

    #[test]
    fn test_invalid_secret_key() {
        assert!(parse_secret_key("ed25519:abc").is_err());
    }
}
