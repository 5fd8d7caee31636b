//! Sign-command wire format exchanged between cluster nodes

use crate::errors::AppResult;
use crate::transaction::RawTransaction;
use serde::{Deserialize, Serialize};

/// Ask a node to sign the inputs spending `address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignCommand {
    /// Hex-encoded raw transaction
    pub transaction: String,
    pub address: String,
    /// User identifier context; absent when the node should use its own wallet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl SignCommand {
    pub fn new(transaction: &RawTransaction, address: &str, user_id: Option<&str>) -> Self {
        Self {
            transaction: transaction.to_hex(),
            address: address.to_string(),
            user_id: user_id.map(str::to_string),
        }
    }

    pub fn decode_transaction(&self) -> AppResult<RawTransaction> {
        Ok(RawTransaction::from_hex(&self.transaction)?)
    }
}

/// The transaction as the node left it; unchanged when it could not sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    pub node_id: String,
    pub transaction: String,
}

impl SignResponse {
    pub fn new(node_id: &str, transaction: &RawTransaction) -> Self {
        Self {
            node_id: node_id.to_string(),
            transaction: transaction.to_hex(),
        }
    }

    pub fn decode_transaction(&self) -> AppResult<RawTransaction> {
        Ok(RawTransaction::from_hex(&self.transaction)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{RawInput, RawOutput, Txid};

    #[test]
    fn test_command_json_shape() {
        let tx = RawTransaction {
            inputs: vec![RawInput::spending(Txid::from_wire_bytes([7; 32]), 1)],
            outputs: vec![RawOutput {
                amount: 5_000,
                script: vec![0x51],
            }],
            ..RawTransaction::default()
        };

        let command = SignCommand::new(&tx, "2MzQwSSnBHWHqSAqtTVQ6v47XtaisrJa1Vc", None);
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["address"], "2MzQwSSnBHWHqSAqtTVQ6v47XtaisrJa1Vc");
        assert!(json.get("user_id").is_none());

        let parsed: SignCommand = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.decode_transaction().unwrap(), tx);
    }

    #[test]
    fn test_garbage_transaction_rejected() {
        let response = SignResponse {
            node_id: "b".to_string(),
            transaction: "0100".to_string(),
        };
        assert!(response.decode_transaction().is_err());
    }
}
