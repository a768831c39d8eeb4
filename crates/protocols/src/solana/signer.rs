use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use cruise_domain::prelude::{SignedTransaction, UnsignedTransaction};
use cruise_execution::ports::TransactionSigner;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use zeroize::Zeroizing;

const SIGNATURE_LEN: usize = 64;
const PUBKEY_LEN: usize = 32;

/// Signs wire transactions with keypairs loaded from JSON keypair files.
///
/// Keys are indexed by their base58 public key, which doubles as the
/// wallet id everywhere else.
#[derive(Default)]
pub struct KeypairSigner {
    keys: HashMap<String, Keypair>,
}

impl KeypairSigner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every keypair file in `paths`.
    pub async fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut signer = Self::new();
        for path in paths {
            let keypair = read_keypair_file(path.as_ref()).await?;
            signer.insert(keypair);
        }
        Ok(signer)
    }

    /// Adds a keypair, returning its wallet id.
    pub fn insert(&mut self, keypair: Keypair) -> String {
        let wallet_id = keypair.pubkey().to_string();
        debug!(wallet = %wallet_id, "Keypair registered");
        self.keys.insert(wallet_id.clone(), keypair);
        wallet_id
    }

    /// Wallet ids this signer can sign for.
    #[must_use]
    pub fn wallets(&self) -> Vec<String> {
        let mut wallets: Vec<String> = self.keys.keys().cloned().collect();
        wallets.sort();
        wallets
    }
}

impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("wallets", &self.wallets())
            .finish()
    }
}

/// Reads a `solana-keygen` JSON keypair file.
pub async fn read_keypair_file(path: &Path) -> Result<Keypair> {
    let raw = Zeroizing::new(
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read keypair file {}", path.display()))?,
    );
    let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON byte array", path.display()))?,
    );
    let keypair = Keypair::try_from(bytes.as_slice())
        .map_err(|e| anyhow!("invalid keypair in {}: {e}", path.display()))?;
    info!(wallet = %keypair.pubkey(), path = %path.display(), "Loaded keypair");
    Ok(keypair)
}

/// Decodes a compact-u16 length prefix, returning the value and its size.
fn decode_compact_u16(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= usize::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Position of `pubkey` among the required signers of a serialized message.
fn signer_index(message: &[u8], pubkey: &Pubkey) -> Result<usize> {
    // Versioned messages carry a prefix byte with the high bit set.
    let mut offset = usize::from(message.first().is_some_and(|b| b & 0x80 != 0));
    let required = usize::from(*message.get(offset).context("message header truncated")?);
    offset += 3;

    let (key_count, prefix) = message
        .get(offset..)
        .and_then(decode_compact_u16)
        .context("malformed account key count")?;
    offset += prefix;

    for index in 0..key_count.min(required) {
        let start = offset + index * PUBKEY_LEN;
        let key = message
            .get(start..start + PUBKEY_LEN)
            .context("account keys truncated")?;
        if key == pubkey.to_bytes().as_slice() {
            return Ok(index);
        }
    }
    bail!("{pubkey} is not a required signer of this transaction")
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    async fn sign(
        &self,
        wallet_id: &str,
        transaction: UnsignedTransaction,
    ) -> Result<SignedTransaction> {
        let keypair = self
            .keys
            .get(wallet_id)
            .with_context(|| format!("no keypair loaded for wallet {wallet_id}"))?;

        let mut bytes = transaction.bytes;
        let (slots, prefix) =
            decode_compact_u16(&bytes).context("malformed signature count")?;
        let message_start = prefix + slots * SIGNATURE_LEN;
        let message = bytes
            .get(message_start..)
            .filter(|m| !m.is_empty())
            .context("transaction has no message")?;

        let index = signer_index(message, &keypair.pubkey())?;
        if index >= slots {
            bail!("transaction has {slots} signature slots, signer index is {index}");
        }
        let signature: Signature = keypair.sign_message(message);

        let slot = prefix + index * SIGNATURE_LEN;
        bytes[slot..slot + SIGNATURE_LEN].copy_from_slice(signature.as_ref());

        debug!(wallet = %wallet_id, signature = %signature, "Transaction signed");
        Ok(SignedTransaction {
            tx_type: transaction.tx_type,
            bytes,
            signature: signature.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruise_domain::enums::TransactionType;
    use std::str::FromStr;

    /// Legacy wire transaction with `signers` empty slots and no instructions.
    fn wire_transaction(signers: &[Pubkey], extra: &Pubkey) -> Vec<u8> {
        let mut bytes = vec![signers.len() as u8];
        bytes.extend(std::iter::repeat_n(0u8, signers.len() * SIGNATURE_LEN));
        bytes.extend([signers.len() as u8, 0, 1]);
        bytes.push((signers.len() + 1) as u8);
        for key in signers.iter().chain(std::iter::once(extra)) {
            bytes.extend_from_slice(key.as_ref());
        }
        bytes.extend([7u8; 32]);
        bytes.push(0);
        bytes
    }

    fn message_of(bytes: &[u8], slots: usize) -> &[u8] {
        &bytes[1 + slots * SIGNATURE_LEN..]
    }

    #[test]
    fn test_compact_u16() {
        assert_eq!(decode_compact_u16(&[0x05]), Some((5, 1)));
        assert_eq!(decode_compact_u16(&[0x80, 0x01]), Some((128, 2)));
        assert_eq!(decode_compact_u16(&[0xff, 0xff, 0x03]), Some((0xffff, 3)));
        assert_eq!(decode_compact_u16(&[0x80]), None);
    }

    #[tokio::test]
    async fn test_signs_fee_payer_slot() {
        let mut signer = KeypairSigner::new();
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        let wallet = signer.insert(keypair);

        let bytes = wire_transaction(&[pubkey], &Pubkey::new_unique());
        let signed = signer
            .sign(
                &wallet,
                UnsignedTransaction {
                    tx_type: TransactionType::Swap,
                    bytes: bytes.clone(),
                },
            )
            .await
            .unwrap();

        let signature = Signature::from_str(&signed.signature).unwrap();
        assert!(signature.verify(pubkey.as_ref(), message_of(&bytes, 1)));
        let signature_bytes: &[u8] = signature.as_ref();
        assert_eq!(&signed.bytes[1..65], signature_bytes);
        assert_eq!(message_of(&signed.bytes, 1), message_of(&bytes, 1));
    }

    #[tokio::test]
    async fn test_signs_second_slot() {
        let mut signer = KeypairSigner::new();
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        let wallet = signer.insert(keypair);
        let payer = Pubkey::new_unique();

        let bytes = wire_transaction(&[payer, pubkey], &Pubkey::new_unique());
        let signed = signer
            .sign(
                &wallet,
                UnsignedTransaction {
                    tx_type: TransactionType::AddLiquidity,
                    bytes,
                },
            )
            .await
            .unwrap();

        assert!(signed.bytes[1..65].iter().all(|b| *b == 0));
        assert!(signed.bytes[65..129].iter().any(|b| *b != 0));
    }

    #[tokio::test]
    async fn test_rejects_non_signer_and_unknown_wallet() {
        let mut signer = KeypairSigner::new();
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        let wallet = signer.insert(keypair);

        let bytes = wire_transaction(&[Pubkey::new_unique()], &pubkey);
        let err = signer
            .sign(
                &wallet,
                UnsignedTransaction {
                    tx_type: TransactionType::Swap,
                    bytes: bytes.clone(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a required signer"));

        let err = signer
            .sign(
                "someone-else",
                UnsignedTransaction {
                    tx_type: TransactionType::Swap,
                    bytes,
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no keypair loaded"));
    }

    #[tokio::test]
    async fn test_loads_keypair_file() {
        let keypair = Keypair::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        tokio::fs::write(&path, json).await.unwrap();

        let signer = KeypairSigner::load(&[&path]).await.unwrap();
        assert_eq!(signer.wallets(), vec![keypair.pubkey().to_string()]);

        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();
        assert!(KeypairSigner::load(&[&path]).await.is_err());
    }
}
