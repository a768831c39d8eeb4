//! Solana implementations of the chain ports.
//!
//! Wallet ids are base58 public keys. Transactions arrive from the builder
//! as serialized wire bytes with empty signature slots; the signer fills
//! the slot of the wallet's key and the sender broadcasts the result as-is.

/// Raw transaction sender.
pub mod sender;
/// Keypair-file signer.
pub mod signer;
/// Native balance reader.
pub mod wallet;

pub use sender::SolanaSender;
pub use signer::KeypairSigner;
pub use wallet::SolanaWalletReader;
