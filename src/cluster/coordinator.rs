//! Collecting threshold signatures across the cluster
//!
//! Every node holds one cosigner key. The originator builds the transaction,
//! signs it with the user's derived key, then walks the configured nodes:
//! itself through the local signer, everyone else through the transport.
//! Unreachable or slow nodes simply contribute nothing this round.

use super::command::{SignCommand, SignResponse};
use super::transport::ClusterTransport;
use crate::builder::{Recipient, TransactionBuilder};
use crate::config::{ClusterConfig, ClusterNodeConfig, SigningType};
use crate::errors::{AppError, AppResult};
use crate::rpc::LedgerNode;
use crate::signing::{merge_signed_transaction, signing_state, SigningState, TransactionSigner};
use crate::transaction::{RawTransaction, Txid};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Where a coordination round left the transaction
#[derive(Debug, Clone)]
pub struct CoordinationOutcome {
    pub transaction: RawTransaction,
    pub state: SigningState,
    /// Node ids that added at least one signature this round
    pub signers: Vec<String>,
    /// Broadcasts accepted by the ledger node this round
    pub submitted: Vec<Txid>,
}

pub struct SigningCoordinator {
    node_id: String,
    nodes: Vec<ClusterNodeConfig>,
    signing_type: SigningType,
    node_timeout: Duration,
    builder: TransactionBuilder,
    signer: Arc<TransactionSigner>,
    ledger: Arc<dyn LedgerNode>,
    transport: Arc<dyn ClusterTransport>,
}

impl SigningCoordinator {
    pub fn new(
        cluster: &ClusterConfig,
        builder: TransactionBuilder,
        signer: Arc<TransactionSigner>,
        ledger: Arc<dyn LedgerNode>,
        transport: Arc<dyn ClusterTransport>,
    ) -> Self {
        let node_id = cluster
            .nodes
            .iter()
            .find(|node| node.originator)
            .map(|node| node.id.clone())
            .unwrap_or_else(|| signer.signer_id().to_string());

        Self {
            node_id,
            nodes: cluster.nodes.clone(),
            signing_type: cluster.signing_type,
            node_timeout: Duration::from_secs(cluster.node_timeout_seconds),
            builder,
            signer,
            ledger,
            transport,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn threshold(&self) -> usize {
        self.signer.policy().threshold
    }

    fn submits_each_signature(&self) -> bool {
        self.signing_type == SigningType::SendEach && self.threshold() > 1
    }

    /// Build from `from_addresses` and sign with the user's key for the first of them
    ///
    /// When the user key cannot sign the unsigned transaction is returned as is.
    pub async fn prepare_transaction(
        &self,
        from_addresses: &[String],
        recipients: &[Recipient],
        user_id: &str,
    ) -> AppResult<CoordinationOutcome> {
        let source = from_addresses
            .first()
            .ok_or_else(|| AppError::InvalidData("No source address given".to_string()))?;
        let unsigned = self.builder.build(from_addresses, recipients).await?;

        let signed = self
            .signer
            .sign_for_address(&unsigned, source, Some(user_id))
            .await?;

        let mut outcome = CoordinationOutcome {
            state: signing_state(&signed, self.threshold()),
            transaction: signed,
            signers: Vec::new(),
            submitted: Vec::new(),
        };

        if outcome.transaction == unsigned {
            warn!("User key could not sign for {}", source);
            return Ok(outcome);
        }
        outcome.signers.push(self.node_id.clone());

        if self.submits_each_signature() {
            self.submit_best_effort(&mut outcome).await;
        }
        Ok(outcome)
    }

    /// Collect cosigner signatures for the inputs spending `address`
    ///
    /// Returns whatever was gathered; a transaction still below threshold is
    /// not an error.
    pub async fn approve_transaction(
        &self,
        transaction: &RawTransaction,
        address: &str,
        user_id: Option<&str>,
    ) -> AppResult<CoordinationOutcome> {
        let mut outcome = CoordinationOutcome {
            transaction: transaction.clone(),
            state: signing_state(transaction, self.threshold()),
            signers: Vec::new(),
            submitted: Vec::new(),
        };

        for node in &self.nodes {
            // Signatures beyond the threshold make the input script non-standard
            if outcome.state.is_fully_signed() {
                debug!("Threshold reached, skipping remaining nodes");
                break;
            }

            let Some(returned) = self
                .collect_from(node, &outcome.transaction, address, user_id)
                .await
            else {
                continue;
            };

            let merged = merge_signed_transaction(&mut outcome.transaction, &returned, &node.id);
            let added = match merged {
                Ok(added) => added,
                Err(e) => {
                    warn!("Ignoring response from node {}: {}", node.id, e);
                    continue;
                }
            };
            if added == 0 {
                debug!("Node {} had nothing to add", node.id);
                continue;
            }

            info!("Node {} added {} signatures", node.id, added);
            outcome.signers.push(node.id.clone());
            outcome.state = signing_state(&outcome.transaction, self.threshold());

            if self.submits_each_signature() {
                self.submit_best_effort(&mut outcome).await;
            }
        }

        if !self.submits_each_signature() {
            if outcome.state.is_fully_signed() {
                let txid = self.submit_transaction(&outcome.transaction).await?;
                outcome.submitted.push(txid);
            } else {
                info!(
                    "Transaction {} left {:?} after contacting {} nodes",
                    outcome.transaction.txid(),
                    outcome.state,
                    self.nodes.len()
                );
            }
        }
        Ok(outcome)
    }

    /// Broadcast through the ledger node
    pub async fn submit_transaction(&self, transaction: &RawTransaction) -> AppResult<Txid> {
        let txid = self.ledger.send_raw_transaction(transaction).await?;
        info!("Submitted transaction {}", txid);
        Ok(txid)
    }

    /// Receiving side of the sign-command protocol
    pub async fn handle_sign_command(&self, command: &SignCommand) -> AppResult<SignResponse> {
        let transaction = command.decode_transaction()?;
        let signed = match self
            .signer
            .sign_for_address(&transaction, &command.address, command.user_id.as_deref())
            .await
        {
            Ok(signed) => signed,
            Err(AppError::SigningUnavailable { address }) => {
                debug!("No signer here for {}", address);
                transaction
            }
            Err(e) => return Err(e),
        };
        Ok(SignResponse::new(&self.node_id, &signed))
    }

    /// One node's view of the transaction, or `None` if it failed or timed out
    async fn collect_from(
        &self,
        node: &ClusterNodeConfig,
        transaction: &RawTransaction,
        address: &str,
        user_id: Option<&str>,
    ) -> Option<RawTransaction> {
        let result: AppResult<RawTransaction> = if node.originator {
            match timeout(
                self.node_timeout,
                self.signer.sign_for_address(transaction, address, user_id),
            )
            .await
            {
                Ok(signed) => signed,
                Err(_) => Err(AppError::TransportFailure {
                    node: node.id.clone(),
                    message: format!("local signing exceeded {:?}", self.node_timeout),
                }),
            }
        } else {
            let command = SignCommand::new(transaction, address, user_id);
            match timeout(
                self.node_timeout,
                self.transport.send_sign_command(node, &command),
            )
            .await
            {
                Ok(Ok(response)) => response.decode_transaction(),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(AppError::TransportFailure {
                    node: node.id.clone(),
                    message: format!("no answer within {:?}", self.node_timeout),
                }),
            }
        };

        match result {
            Ok(returned) => Some(returned),
            Err(e) => {
                warn!("Node {} left the transaction unchanged: {}", node.id, e);
                None
            }
        }
    }

    async fn submit_best_effort(&self, outcome: &mut CoordinationOutcome) {
        match self.submit_transaction(&outcome.transaction).await {
            Ok(txid) => outcome.submitted.push(txid),
            Err(e) => warn!(
                "Ledger rejected {:?} transaction {}: {}",
                outcome.state,
                outcome.transaction.txid(),
                e
            ),
        }
    }
}
