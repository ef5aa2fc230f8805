//! Zilliqa transaction and message signing.
//!
//! Transactions are signed over the protobuf encoding of their core fields
//! (`ProtoTransactionCoreInfo`) with Schnorr over secp256k1:
//! `r = sha256(kG || pubkey || msg) mod n`, `s = k - r*x mod n`.
//! Both the public key and the signature travel as bare lowercase hex.

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{AffinePoint, FieldBytes, ProjectivePoint, Scalar, SecretKey, U256};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::transaction::types::{TransactionError, TransactionResult};

const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;

#[derive(Default)]
struct ProtoWriter {
    buf: Vec<u8>,
}

impl ProtoWriter {
    fn varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    fn key(&mut self, field: u8, wire: u8) {
        self.varint(u64::from((field << 3) | wire));
    }

    fn uint(&mut self, field: u8, value: u64) {
        self.key(field, WIRE_VARINT);
        self.varint(value);
    }

    fn bytes(&mut self, field: u8, bytes: &[u8]) {
        self.key(field, WIRE_LEN);
        self.varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// `ByteArray { bytes data = 1; }` embedded as field `field`.
    fn byte_array(&mut self, field: u8, data: &[u8]) {
        let mut inner = ProtoWriter::default();
        inner.bytes(1, data);
        self.bytes(field, &inner.buf);
    }
}

/// The signed part of a `CreateTransaction` body.
struct CoreInfo {
    version: u64,
    nonce: u64,
    to_addr: Vec<u8>,
    amount: u128,
    gas_price: u128,
    gas_limit: u64,
    code: String,
    data: String,
}

impl CoreInfo {
    fn from_body(body: &Value) -> TransactionResult<Self> {
        let to_addr = hex::decode(str_field(body, "toAddr")?)
            .map_err(|e| TransactionError::Encoding(format!("toAddr: {}", e)))?;
        Ok(Self {
            version: u64_field(body, "version")?,
            nonce: u64_field(body, "nonce")?,
            to_addr,
            amount: decimal_field(body, "amount")?,
            gas_price: decimal_field(body, "gasPrice")?,
            gas_limit: u64::try_from(decimal_field(body, "gasLimit")?)
                .map_err(|_| TransactionError::Encoding("gasLimit out of range".into()))?,
            code: body["code"].as_str().unwrap_or_default().to_string(),
            data: body["data"].as_str().unwrap_or_default().to_string(),
        })
    }

    fn encode(&self, public_key: &[u8]) -> TransactionResult<Vec<u8>> {
        let version = u32::try_from(self.version)
            .map_err(|_| TransactionError::Encoding(format!("version {} out of range", self.version)))?;

        let mut w = ProtoWriter::default();
        w.uint(1, u64::from(version));
        w.uint(2, self.nonce);
        w.bytes(3, &self.to_addr);
        w.byte_array(4, public_key);
        w.byte_array(5, &self.amount.to_be_bytes());
        w.byte_array(6, &self.gas_price.to_be_bytes());
        w.uint(7, self.gas_limit);
        if !self.code.is_empty() {
            w.bytes(8, self.code.as_bytes());
        }
        if !self.data.is_empty() {
            w.bytes(9, self.data.as_bytes());
        }
        Ok(w.buf)
    }
}

fn str_field<'a>(body: &'a Value, name: &str) -> TransactionResult<&'a str> {
    body[name]
        .as_str()
        .ok_or_else(|| TransactionError::Encoding(format!("{} missing", name)))
}

fn u64_field(body: &Value, name: &str) -> TransactionResult<u64> {
    body[name]
        .as_u64()
        .ok_or_else(|| TransactionError::Encoding(format!("{} missing", name)))
}

fn decimal_field(body: &Value, name: &str) -> TransactionResult<u128> {
    str_field(body, name)?
        .parse()
        .map_err(|e| TransactionError::Encoding(format!("{}: {}", name, e)))
}

/// Hex secp256k1 key, with or without `0x`.
pub fn parse_secret_key(private_key: &str) -> TransactionResult<SecretKey> {
    let digits = private_key.trim().trim_start_matches("0x");
    let bytes = hex::decode(digits).map_err(|_| TransactionError::Signing("Invalid private key format".into()))?;
    SecretKey::from_slice(&bytes).map_err(|_| TransactionError::Signing("Invalid private key format".into()))
}

fn compressed_public_key(secret: &SecretKey) -> Vec<u8> {
    secret.public_key().to_encoded_point(true).as_bytes().to_vec()
}

/// `0x` hex of the last 20 bytes of `sha256(compressed public key)`.
pub fn address_of(secret: &SecretKey) -> String {
    let digest = Sha256::digest(compressed_public_key(secret));
    format!("0x{}", hex::encode(&digest[12..]))
}

fn reduce(digest: &[u8]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(digest))
}

fn challenge(commitment: &ProjectivePoint, public_key: &[u8], message: &[u8]) -> Scalar {
    let point = AffinePoint::from(*commitment).to_encoded_point(true);
    let mut hasher = Sha256::new();
    hasher.update(point.as_bytes());
    hasher.update(public_key);
    hasher.update(message);
    reduce(&hasher.finalize())
}

/// Schnorr signature `r || s` with a nonce derived from the key and message.
fn schnorr_sign(secret: &SecretKey, message: &[u8]) -> [u8; 64] {
    let x: Scalar = *secret.to_nonzero_scalar();
    let public_key = compressed_public_key(secret);
    let message_digest = Sha256::digest(message);
    let secret_bytes = secret.to_bytes();

    let mut counter: u32 = 0;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(secret_bytes.as_slice());
        hasher.update(message_digest.as_slice());
        hasher.update(counter.to_be_bytes());
        let k = reduce(&hasher.finalize());
        counter = counter.wrapping_add(1);
        if k == Scalar::ZERO {
            continue;
        }

        let r = challenge(&(ProjectivePoint::GENERATOR * k), &public_key, message);
        if r == Scalar::ZERO {
            continue;
        }
        let s = k - r * x;
        if s == Scalar::ZERO {
            continue;
        }

        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&r.to_bytes());
        signature[32..].copy_from_slice(&s.to_bytes());
        return signature;
    }
}

/// Complete a `CreateTransaction` body with `pubKey` and `signature`.
pub fn sign_body(body: &Value, private_key: &str) -> TransactionResult<Value> {
    let secret = parse_secret_key(private_key)?;
    let public_key = compressed_public_key(&secret);
    let encoded = CoreInfo::from_body(body)?.encode(&public_key)?;
    let signature = schnorr_sign(&secret, &encoded);

    let mut signed = body.clone();
    signed["pubKey"] = Value::String(hex::encode(&public_key));
    signed["signature"] = Value::String(hex::encode(signature));
    Ok(signed)
}

/// Schnorr signature over raw message bytes, as hex `r || s`.
pub fn sign_message(private_key: &str, message: &[u8]) -> TransactionResult<String> {
    let secret = parse_secret_key(private_key)?;
    Ok(hex::encode(schnorr_sign(&secret, message)))
}
