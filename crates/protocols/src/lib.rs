//! Chain adapters for LP Cruise.
//!
//! Implementations of the engine's chain ports:
//! - Solana RPC provider and wallet balance reader
//! - Keypair-file signer for pre-built transactions
//! - Raw transaction sender with signature-status confirmation
//! - Paper-trading chain that simulates fills for dry runs

/// Paper-trading chain.
pub mod paper;
/// Shared RPC provider.
pub mod rpc;
/// Solana implementations of the chain ports.
pub mod solana;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::paper::PaperChain;
    pub use crate::rpc::{RpcConfig, RpcProvider};
    pub use crate::solana::{KeypairSigner, SolanaSender, SolanaWalletReader};
}
