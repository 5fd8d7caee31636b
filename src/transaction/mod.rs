//! Raw transaction model, binary codec and script templates
//!
//! - **codec** - field-exact parse/encode of legacy transactions
//! - **script** - push encoding, standard output templates, multisig redeem scripts
//! - **error** - codec error type

pub mod codec;
pub mod error;
pub mod script;

pub use codec::{write_var_int, RawInput, RawOutput, RawTransaction, Txid, SEQUENCE_FINAL};
pub use error::{CodecError, CodecResult};
pub use script::{
    classify_output_script, decode_redeem_script_address, multisig_redeem_script,
    parse_multisig_redeem_script, parse_script, push_data, script_for_address, ScriptElement,
    ScriptPubKeyType,
};
