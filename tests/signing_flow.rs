//! End-to-end threshold signing: user key, node wallet and remote cosigners

mod common;

use anyhow::Result;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use common::{node, wallet_config, KeyHolder, MockLedger, MockTransport, NodeBehaviour};
use cosigner::builder::Recipient;
use cosigner::cluster::{ClusterTransport, SignCommand, SigningCoordinator};
use cosigner::config::{ClusterConfig, SigningType};
use cosigner::rpc::{LedgerNode, RemoteSigner};
use cosigner::signing::{threshold_signatures, SigningState};
use cosigner::transaction::{parse_script, RawTransaction, ScriptElement};
use cosigner::wallet::CosignerWallet;
use std::sync::Arc;

const USER: &str = "alice@example.com";

struct Fixture {
    ledger: MockLedger,
    wallet: CosignerWallet,
    threshold_address: String,
    payee: String,
}

/// 2-of-3 address (user, cosigner A, cosigner B) holding 0.05 BTC
async fn fixture(originator_wallet: Option<KeyHolder>) -> Result<Fixture> {
    let cosigner_a = KeyHolder::new(0xa1);
    let cosigner_b = KeyHolder::new(0xb2);

    let ledger = match originator_wallet {
        Some(key) => MockLedger::with_wallet_key(key),
        None => MockLedger::new(),
    };
    let ledger_node: Arc<dyn LedgerNode> = Arc::new(ledger.clone());
    let remote: Arc<dyn RemoteSigner> = Arc::new(ledger.clone());

    let wallet = CosignerWallet::new(
        "node-a",
        &wallet_config(&[&cosigner_a, &cosigner_b]),
        ledger_node,
        Some(remote),
        None,
    )?;

    let user_address = wallet.create_address(USER, 0).await?;
    let threshold_address = wallet
        .get_multisig_address(&[user_address], USER)
        .await?;
    ledger.fund(&threshold_address, 5_000_000);

    let payee = wallet.deriver().derive("bob@example.com", 1).address;
    Ok(Fixture {
        ledger,
        wallet,
        threshold_address,
        payee,
    })
}

fn coordinator(
    fixture: &Fixture,
    signing_type: SigningType,
    transport: Arc<dyn ClusterTransport>,
) -> SigningCoordinator {
    let cluster = ClusterConfig {
        signing_type,
        node_timeout_seconds: 1,
        nodes: vec![node("node-a", true), node("node-b", false)],
    };
    SigningCoordinator::new(
        &cluster,
        fixture.wallet.builder(),
        fixture.wallet.signer(),
        fixture.wallet.ledger(),
        transport,
    )
}

/// Check every threshold signature against libsecp and the reference legacy sighash
fn assert_signatures_verify(transaction: &RawTransaction) {
    let secp = Secp256k1::verification_only();
    let reference: bitcoin::Transaction =
        bitcoin::consensus::deserialize(&transaction.encode()).unwrap();
    let cache = bitcoin::sighash::SighashCache::new(&reference);

    for (index, input) in transaction.inputs.iter().enumerate() {
        let (signatures, redeem_script) = threshold_signatures(&input.script).unwrap();
        let (_, keys) =
            cosigner::transaction::parse_multisig_redeem_script(&redeem_script).unwrap();
        let script = bitcoin::ScriptBuf::from_bytes(redeem_script.clone());
        let sighash = cache.legacy_signature_hash(index, &script, 1).unwrap();
        let message = Message::from_digest(sighash.to_byte_array());

        for signature in signatures {
            let parsed = bitcoin::ecdsa::Signature::from_slice(&signature).unwrap();
            let verified = keys.iter().any(|key| {
                let key = PublicKey::from_slice(key).unwrap();
                secp.verify_ecdsa(&message, &parsed.signature, &key).is_ok()
            });
            assert!(verified, "signature on input {} matches no key", index);
        }
    }
}

#[tokio::test]
async fn test_user_signature_leaves_transaction_half_signed() -> Result<()> {
    let fixture = fixture(None).await?;
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(&fixture, SigningType::CollectThenSubmit, transport);

    let outcome = coordinator
        .prepare_transaction(
            &[fixture.threshold_address.clone()],
            &[Recipient::new(fixture.payee.clone(), 3_000_000)],
            USER,
        )
        .await?;

    assert_eq!(
        outcome.state,
        SigningState::PartiallySigned {
            present: 1,
            required: 2
        }
    );
    assert!(outcome.submitted.is_empty());

    // OP_0 <user sig> <redeem script>
    let elements = parse_script(&outcome.transaction.inputs[0].script)?;
    assert_eq!(elements.len(), 3);
    assert_eq!(elements[0], ScriptElement::Op(0));
    let redeem = fixture.wallet.registry().redeem_script(&fixture.threshold_address).unwrap();
    assert_eq!(elements[2], ScriptElement::Push(redeem));

    assert_signatures_verify(&outcome.transaction);
    Ok(())
}

#[tokio::test]
async fn test_originator_wallet_completes_threshold() -> Result<()> {
    let fixture = fixture(Some(KeyHolder::new(0xa1))).await?;
    let transport = Arc::new(
        MockTransport::new().with_node("node-b", NodeBehaviour::Sign(KeyHolder::new(0xb2))),
    );
    let coordinator = coordinator(&fixture, SigningType::CollectThenSubmit, transport.clone());

    let prepared = coordinator
        .prepare_transaction(
            &[fixture.threshold_address.clone()],
            &[Recipient::new(fixture.payee.clone(), 3_000_000)],
            USER,
        )
        .await?;
    let approved = coordinator
        .approve_transaction(&prepared.transaction, &fixture.threshold_address, None)
        .await?;

    assert_eq!(approved.state, SigningState::FullySigned);
    assert_eq!(approved.signers, vec!["node-a".to_string()]);
    // Threshold reached locally, node B never asked
    assert_eq!(transport.calls(), 0);

    // The node wallet only watches the address; the redeem script came with the request
    let redeem = fixture.wallet.registry().redeem_script(&fixture.threshold_address).unwrap();
    let requests = fixture.ledger.sign_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].len(), 1);
    let spent = &requests[0][0];
    assert!(prepared.transaction.inputs[0].spends(&spent.txid, spent.output_index));
    assert_eq!(spent.redeem_script, Some(redeem));

    let broadcasts = fixture.ledger.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(approved.submitted, vec![broadcasts[0].txid()]);

    // User signature first, then the cosigner's
    let (signatures, _) = threshold_signatures(&approved.transaction.inputs[0].script).unwrap();
    let (user_signatures, _) =
        threshold_signatures(&prepared.transaction.inputs[0].script).unwrap();
    assert_eq!(signatures.len(), 2);
    assert_eq!(signatures[0], user_signatures[0]);

    assert_signatures_verify(&approved.transaction);
    Ok(())
}

#[tokio::test]
async fn test_remote_node_supplies_missing_signature() -> Result<()> {
    let fixture = fixture(None).await?;
    let transport = Arc::new(
        MockTransport::new().with_node("node-b", NodeBehaviour::Sign(KeyHolder::new(0xb2))),
    );
    let coordinator = coordinator(&fixture, SigningType::CollectThenSubmit, transport.clone());

    let prepared = coordinator
        .prepare_transaction(
            &[fixture.threshold_address.clone()],
            &[Recipient::new(fixture.payee.clone(), 3_000_000)],
            USER,
        )
        .await?;
    let approved = coordinator
        .approve_transaction(&prepared.transaction, &fixture.threshold_address, None)
        .await?;

    assert_eq!(approved.state, SigningState::FullySigned);
    assert_eq!(approved.signers, vec!["node-b".to_string()]);
    assert_eq!(transport.calls(), 1);
    assert_eq!(fixture.ledger.broadcasts().len(), 1);
    assert_signatures_verify(&approved.transaction);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_nodes_return_best_effort() -> Result<()> {
    for behaviour in [NodeBehaviour::Fail, NodeBehaviour::Hang, NodeBehaviour::Unchanged] {
        let fixture = fixture(None).await?;
        let transport = Arc::new(MockTransport::new().with_node("node-b", behaviour));
        let coordinator = coordinator(&fixture, SigningType::CollectThenSubmit, transport);

        let prepared = coordinator
            .prepare_transaction(
                &[fixture.threshold_address.clone()],
                &[Recipient::new(fixture.payee.clone(), 3_000_000)],
                USER,
            )
            .await?;
        let approved = coordinator
            .approve_transaction(&prepared.transaction, &fixture.threshold_address, None)
            .await?;

        assert_eq!(approved.transaction, prepared.transaction);
        assert!(!approved.state.is_fully_signed());
        assert!(approved.signers.is_empty());
        assert!(fixture.ledger.broadcasts().is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_send_each_broadcasts_every_new_signature() -> Result<()> {
    let fixture = fixture(None).await?;
    let transport = Arc::new(
        MockTransport::new().with_node("node-b", NodeBehaviour::Sign(KeyHolder::new(0xb2))),
    );
    let coordinator = coordinator(&fixture, SigningType::SendEach, transport);

    let prepared = coordinator
        .prepare_transaction(
            &[fixture.threshold_address.clone()],
            &[Recipient::new(fixture.payee.clone(), 3_000_000)],
            USER,
        )
        .await?;
    assert_eq!(prepared.submitted.len(), 1);

    let approved = coordinator
        .approve_transaction(&prepared.transaction, &fixture.threshold_address, None)
        .await?;
    assert_eq!(approved.submitted.len(), 1);
    assert!(approved.state.is_fully_signed());

    let broadcasts = fixture.ledger.broadcasts();
    assert_eq!(broadcasts.len(), 2);
    assert_eq!(broadcasts[1], approved.transaction);
    Ok(())
}

#[tokio::test]
async fn test_wrong_user_cannot_sign() -> Result<()> {
    let fixture = fixture(None).await?;
    let unsigned = fixture
        .wallet
        .create_transaction(
            &[fixture.threshold_address.clone()],
            &[Recipient::new(fixture.payee.clone(), 3_000_000)],
        )
        .await?;

    let signed = fixture
        .wallet
        .sign_transaction(&unsigned, &fixture.threshold_address, Some("mallory"))
        .await?;
    assert_eq!(signed, unsigned);
    assert_eq!(fixture.wallet.signing_state(&signed), SigningState::Unsigned);
    Ok(())
}

#[tokio::test]
async fn test_sign_command_handled_by_receiving_node() -> Result<()> {
    let fixture = fixture(Some(KeyHolder::new(0xa1))).await?;
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(&fixture, SigningType::CollectThenSubmit, transport);

    let unsigned = fixture
        .wallet
        .create_transaction(
            &[fixture.threshold_address.clone()],
            &[Recipient::new(fixture.payee.clone(), 3_000_000)],
        )
        .await?;

    // With the user id the node signs with the derived user key
    let command = SignCommand::new(&unsigned, &fixture.threshold_address, Some(USER));
    let response = coordinator.handle_sign_command(&command).await?;
    assert_eq!(response.node_id, "node-a");
    let user_signed = response.decode_transaction()?;
    assert_eq!(
        fixture.wallet.signing_state(&user_signed),
        SigningState::PartiallySigned {
            present: 1,
            required: 2
        }
    );

    // Without it the node wallet adds the cosigner signature
    let command = SignCommand::new(&user_signed, &fixture.threshold_address, None);
    let response = coordinator.handle_sign_command(&command).await?;
    assert!(fixture
        .wallet
        .signing_state(&response.decode_transaction()?)
        .is_fully_signed());
    Ok(())
}
