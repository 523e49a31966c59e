//! In-memory ed25519 wallet.
//!
//! Addresses are the hex-encoded verifying key. A transaction's signature
//! is the hex-encoded ed25519 signature over its JSON message bytes, so the
//! signature is known before the transaction is sent and can always be used
//! to query its status.

use std::collections::HashMap;

use async_trait::async_trait;
use clobgate_types::{Address, GatewayError, Result, SignedTransaction, Transaction, TxSignature};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::traits::Wallet;

/// Holds signing keys by owner address.
#[derive(Default)]
pub struct KeyringWallet {
    keys: HashMap<Address, SigningKey>,
}

impl KeyringWallet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh key and return its address.
    pub fn generate(&mut self) -> Address {
        self.insert(SigningKey::generate(&mut OsRng))
    }

    /// Register a key from its 32-byte secret in hex.
    pub fn import_secret_hex(&mut self, secret_hex: &str) -> Result<Address> {
        let bytes = hex::decode(secret_hex.trim()).map_err(|e| GatewayError::WalletSigning {
            reason: format!("secret is not hex: {e}"),
        })?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| GatewayError::WalletSigning {
                reason: format!("secret must be 32 bytes, got {}", bytes.len()),
            })?;
        Ok(self.insert(SigningKey::from_bytes(&secret)))
    }

    /// Register a signing key and return its address.
    pub fn insert(&mut self, key: SigningKey) -> Address {
        let address = address_of(&key.verifying_key());
        self.keys.insert(address.clone(), key);
        address
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check a signed transaction against the signer's address.
    #[must_use]
    pub fn verify(signed: &SignedTransaction) -> bool {
        let Ok(message) = signed.transaction.message_bytes() else {
            return false;
        };
        let Some(key) = verifying_key(&signed.signer) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(&signed.signature.0) else {
            return false;
        };
        let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        key.verify(&message, &Signature::from_bytes(&sig_array))
            .is_ok()
    }
}

#[async_trait]
impl Wallet for KeyringWallet {
    async fn sign(&self, tx: Transaction, signer: &Address) -> Result<SignedTransaction> {
        let key = self
            .keys
            .get(signer)
            .ok_or_else(|| GatewayError::WalletSigning {
                reason: format!("no key registered for {signer}"),
            })?;
        let message = tx.message_bytes()?;
        let signature = key.sign(&message);
        Ok(SignedTransaction {
            transaction: tx,
            signer: signer.clone(),
            signature: TxSignature(hex::encode(signature.to_bytes())),
        })
    }

    fn has_signer(&self, signer: &Address) -> bool {
        self.keys.contains_key(signer)
    }
}

fn address_of(key: &VerifyingKey) -> Address {
    Address(hex::encode(key.to_bytes()))
}

fn verifying_key(address: &Address) -> Option<VerifyingKey> {
    let bytes = hex::decode(address.as_str()).ok()?;
    let array = <[u8; 32]>::try_from(bytes.as_slice()).ok()?;
    VerifyingKey::from_bytes(&array).ok()
}
