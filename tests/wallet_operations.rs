//! Address lifecycle, coin selection and history through the wallet facade

mod common;

use anyhow::Result;
use common::{wallet_config, KeyHolder, MockLedger, NETWORK};
use cosigner::builder::Recipient;
use cosigner::errors::AppError;
use cosigner::keys::{encode_user_key, pubkey_label};
use cosigner::rpc::{LedgerNode, Payment, PaymentCategory, RemoteSigner};
use cosigner::transaction::{script_for_address, RawInput, RawOutput, RawTransaction, Txid};
use cosigner::wallet::CosignerWallet;
use std::sync::Arc;

const USER: &str = "carol@example.com";

fn wallet(ledger: &MockLedger) -> Result<CosignerWallet> {
    let ledger_node: Arc<dyn LedgerNode> = Arc::new(ledger.clone());
    let remote: Arc<dyn RemoteSigner> = Arc::new(ledger.clone());
    Ok(CosignerWallet::new(
        "node-a",
        &wallet_config(&[&KeyHolder::new(0xc3)]),
        ledger_node,
        Some(remote),
        None,
    )?)
}

#[tokio::test]
async fn test_create_address_imports_under_pubkey_label() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;

    let address = wallet.create_address(USER, 0).await?;
    let key = wallet.deriver().derive(USER, 1);
    assert_eq!(address, key.address);
    assert_eq!(
        ledger.accounts().get(&pubkey_label(&key.public_key_hex())),
        Some(&vec![address.clone()])
    );

    // Second call skips the address now known to the index
    let second = wallet.create_address(USER, 0).await?;
    assert_ne!(second, address);
    assert_eq!(second, wallet.deriver().derive(USER, 2).address);
    Ok(())
}

#[tokio::test]
async fn test_failed_import_leaves_address_unissued() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;

    ledger.fail_imports(true);
    assert!(wallet.create_address(USER, 0).await.is_err());
    let first = wallet.deriver().derive(USER, 1);
    assert!(wallet.deriver().index().lookup(&first.address).is_none());

    // The same round is offered again once the node accepts imports
    ledger.fail_imports(false);
    assert_eq!(wallet.create_address(USER, 0).await?, first.address);
    assert!(wallet.deriver().index().lookup(&first.address).is_some());
    Ok(())
}

#[tokio::test]
async fn test_create_address_avoids_ledger_collisions() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;
    let first = wallet.deriver().derive(USER, 1);

    // Address handed out by another process, known only to the ledger
    ledger.add_account(&pubkey_label(&first.public_key_hex()), &[&first.address]);

    let address = wallet.create_address(USER, 0).await?;
    assert_eq!(address, wallet.deriver().derive(USER, 2).address);

    let skipped = wallet.create_address(USER, 4).await?;
    assert_eq!(skipped, wallet.deriver().derive(USER, 5).address);
    Ok(())
}

#[tokio::test]
async fn test_multisig_address_registered_and_labelled() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;
    let user_address = wallet.create_address(USER, 0).await?;

    let threshold = wallet.get_multisig_address(&[user_address], USER).await?;
    assert!(wallet.registry().is_threshold_address(&threshold));
    assert_eq!(wallet.get_addresses(USER).await?, vec![threshold.clone()]);
    assert_eq!(
        ledger.accounts().get(&encode_user_key(USER)),
        Some(&vec![threshold.clone()])
    );

    let entry = wallet.registry().get(&threshold).unwrap();
    assert_eq!(entry.threshold, 2);
    assert_eq!(entry.ordered_public_keys.len(), 2);
    assert_eq!(entry.ordered_public_keys[1], KeyHolder::new(0xc3).public_key);

    // Node wallet holds the same script under the user's label
    let imports = ledger.multisig_imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].address, threshold);
    assert_eq!(imports[0].label, encode_user_key(USER));
    assert_eq!(imports[0].redeem_script, entry.redeem_script);
    Ok(())
}

#[tokio::test]
async fn test_foreign_participant_rejected() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;
    let stranger = wallet.deriver().derive("dave", 1).address;

    let err = wallet.get_multisig_address(&[stranger], USER).await.unwrap_err();
    assert!(matches!(err, AppError::AddressDecode(_)));
    assert!(wallet.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_register_address_and_balance() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;
    let foreign = wallet.deriver().derive("erin", 3).address;

    wallet.register_address(&foreign).await?;
    assert_eq!(ledger.accounts().get(""), Some(&vec![foreign.clone()]));

    ledger.fund(&foreign, 1_250_000);
    ledger.fund(&foreign, 750_000);
    assert_eq!(wallet.get_balance(&foreign).await?, 2_000_000);
    Ok(())
}

#[tokio::test]
async fn test_single_output_scenario() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;
    let source = wallet.create_address(USER, 0).await?;
    let payee = wallet.deriver().derive("frank", 1).address;
    let funding = ledger.fund(&source, 5_000_000);

    let transaction = wallet
        .create_transaction(&[source.clone()], &[Recipient::new(payee.clone(), 3_000_000)])
        .await?;

    assert_eq!(transaction.inputs.len(), 1);
    assert!(transaction.inputs[0].spends(&funding.txid, 0));
    assert_eq!(transaction.outputs.len(), 2);
    assert_eq!(transaction.outputs[0].amount, 3_000_000);
    assert_eq!(transaction.outputs[0].script, script_for_address(&payee, NETWORK)?);
    assert_eq!(transaction.outputs[1].amount, 1_800_000);
    assert_eq!(transaction.outputs[1].script, script_for_address(&source, NETWORK)?);

    // Standard input: <sig> <pubkey>
    let signed = wallet.sign_transaction(&transaction, &source, Some(USER)).await?;
    assert!(wallet.signing_state(&signed).is_fully_signed());

    let txid = wallet.send_transaction(&signed).await?;
    assert_eq!(txid, signed.txid());
    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;
    let source = wallet.create_address(USER, 0).await?;
    ledger.fund(&source, 1_000_000);

    let err = wallet
        .create_transaction(&[source], &[Recipient::new("anyone", 1_000_000)])
        .await
        .unwrap_err();
    match err {
        AppError::InsufficientFunds {
            required,
            available,
        } => {
            assert_eq!(required, 1_200_000);
            assert_eq!(available, 1_000_000);
        }
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

fn spend(parent: Txid, index: u32, to: &str, amount: u64) -> RawTransaction {
    RawTransaction {
        inputs: vec![RawInput::spending(parent, index)],
        outputs: vec![RawOutput {
            amount,
            script: script_for_address(to, NETWORK).unwrap(),
        }],
        ..RawTransaction::default()
    }
}

#[tokio::test]
async fn test_history_resolves_counterparties() -> Result<()> {
    let ledger = MockLedger::new();
    let wallet = wallet(&ledger)?;
    let ours = wallet.deriver().derive(USER, 1).address;
    let theirs = wallet.deriver().derive("grace", 1).address;

    // grace -> ours
    let grace_funds = ledger.fund(&theirs, 900_000);
    let receive = ledger.add_transaction(spend(grace_funds.txid, 0, &ours, 800_000));
    // ours -> ours (change consolidation)
    let consolidate = ledger.add_transaction(spend(receive, 0, &ours, 700_000));
    // ours -> grace
    let send = ledger.add_transaction(spend(consolidate, 0, &theirs, 600_000));
    // unknown parent -> ours
    let orphan = ledger.add_transaction(spend(Txid::from_wire_bytes([0xee; 32]), 3, &ours, 50_000));

    for (txid, category, address, amount) in [
        (receive, PaymentCategory::Receive, &ours, 800_000),
        (consolidate, PaymentCategory::Receive, &ours, 700_000),
        (send, PaymentCategory::Send, &theirs, -600_000),
        (orphan, PaymentCategory::Receive, &ours, 50_000),
    ] {
        ledger.add_payment(Payment {
            txid,
            address: Some(address.clone()),
            category,
            amount,
        });
    }

    let history = wallet.get_transactions(&ours, 10, 0).await?;
    assert_eq!(history.len(), 3);

    assert_eq!(history[0].tx_hash, receive);
    assert_eq!(history[0].from_addresses, vec![Some(theirs.clone())]);
    assert_eq!(history[0].to_addresses, vec![ours.clone()]);

    assert_eq!(history[1].tx_hash, send);
    assert_eq!(history[1].from_addresses, vec![Some(ours.clone())]);
    assert_eq!(history[1].to_addresses, vec![theirs.clone()]);
    assert_eq!(history[1].amount, -600_000);

    assert_eq!(history[2].tx_hash, orphan);
    assert_eq!(history[2].from_addresses, vec![None]);

    let page = wallet.get_transactions(&ours, 1, 1).await?;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].tx_hash, send);
    Ok(())
}
