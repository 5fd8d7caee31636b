//! Sighash computation, ECDSA signing and input-script assembly
//!
//! - **sighash** - legacy signature hash over a blanked transaction view
//! - **ecdsa** - signing primitive and DER encoding
//! - **script_sig** - standard and threshold input scripts, signature merging
//! - **state** - unsigned / partially / fully signed inspection
//! - **signer** - ownership-aware signing for one address

pub mod ecdsa;
pub mod script_sig;
pub mod sighash;
pub mod signer;
pub mod state;

pub use ecdsa::{encode_der, is_signature_push, EcdsaSigner, Secp256k1Signer};
pub use script_sig::{
    apply_signature, merge_signed_transaction, threshold_signatures, PartialSignature,
    SpendingCondition,
};
pub use sighash::{compute_sighash, signing_preimage, SIGHASH_ALL};
pub use signer::{sign_input, SigningKey, TransactionSigner};
pub use state::{input_progress, signing_state, SigningState};
