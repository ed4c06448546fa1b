use hivechain::accounts::delegation_account;
use hivechain::config::OUTPUT_NAMES;
use hivechain::contracts::emit_address;
use hivechain::difficulty::calc_difficulty;
use hivechain::oracle::intrinsic_gas;
use hivechain::reimport::import;
use hivechain::{generate, Chain, Fork, Generator, GeneratorConfig};
use std::collections::HashMap;
use std::fs;
use types::{create_address, decode_chain, encode_chain, keccak256, Transaction, TxType};

fn config(length: u64, last_fork: &str, modifiers: &[&str]) -> GeneratorConfig {
    GeneratorConfig {
        chain_length: length,
        last_fork: last_fork.to_string(),
        modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
        ..GeneratorConfig::default()
    }
}

fn full_chain() -> Chain {
    generate(GeneratorConfig {
        fork_interval: 1,
        ..config(20, "", &[])
    })
    .unwrap()
}

#[test]
fn generation_is_deterministic() {
    let a = full_chain();
    let b = full_chain();
    assert_eq!(
        encode_chain(a.blocks.iter().skip(1)),
        encode_chain(b.blocks.iter().skip(1))
    );
    assert_eq!(
        serde_json::to_string(&a.tx_info).unwrap(),
        serde_json::to_string(&b.tx_info).unwrap()
    );
}

#[test]
fn reimport_round_trip() {
    let chain = full_chain();
    let blocks = decode_chain(&encode_chain(chain.blocks.iter().skip(1))).unwrap();
    let state = import(&chain.genesis, &blocks).unwrap();
    assert_eq!(state.root(), chain.head().header.state_root);
}

#[test]
fn transactions_respect_fork_gates() {
    let chain = full_chain();
    let mut typed = 0;
    for block in &chain.blocks {
        let header = &block.header;
        for tx in &block.transactions {
            let required = match tx.tx_type() {
                TxType::Legacy => continue,
                TxType::AccessList => Fork::Berlin,
                TxType::DynamicFee => Fork::London,
                TxType::Blob => Fork::Cancun,
                TxType::SetCode => Fork::Prague,
            };
            typed += 1;
            assert!(
                chain
                    .schedule
                    .is_active(required, header.number, header.timestamp),
                "{:?} transaction in block {}",
                tx.tx_type(),
                header.number
            );
        }
        if chain.schedule.is_post_merge(header.number) {
            assert!(block.uncles.is_empty());
        }
    }
    assert!(typed > 0);
}

#[test]
fn sender_nonces_have_no_gaps() {
    let chain = full_chain();
    let mut next: HashMap<_, u64> = HashMap::new();
    for block in &chain.blocks {
        for tx in &block.transactions {
            let expected = next.entry(tx.sender().unwrap()).or_insert(0);
            assert_eq!(tx.transaction.nonce(), *expected);
            *expected += 1;
        }
    }
    assert!(!next.is_empty());
}

#[test]
fn every_firing_modifier_reports() {
    let chain = full_chain();
    for name in ["deploy-callme", "tx-emit-eip1559", "tx-eip7702", "tx-request-eip7002"] {
        assert!(!chain.tx_info[name].is_null(), "{}", name);
    }
    let emit = &chain.tx_info["tx-emit-legacy"][0];
    assert!(emit["logtopic0"].is_string());
    assert!(emit["indexInBlock"].is_number());
}

/// The emit contract runs 1287 gas of code for the 12-byte calldata every emit modifier
/// sends, on every fork.
#[test]
fn emit_receipts_charge_executed_gas() {
    let chain = full_chain();
    let mut checked = 0;
    for block in &chain.blocks[1..] {
        let header = &block.header;
        let receipts = &chain.outcomes[&header.number].receipts;
        let mut previous = 0;
        for (tx, receipt) in block.transactions.iter().zip(receipts) {
            let used = receipt.cumulative_gas_used - previous;
            previous = receipt.cumulative_gas_used;
            if tx.transaction.to() != Some(emit_address()) {
                continue;
            }
            let intrinsic =
                intrinsic_gas(&chain.schedule, header.number, header.timestamp, &tx.transaction);
            assert_eq!(used, intrinsic + 1_287, "block {}", header.number);
            assert!(used < tx.transaction.gas());
            checked += 1;
        }
    }
    assert!(checked > 0);
}

#[test]
fn transfer_recipient_is_derived_from_block_and_index() {
    let chain = generate(GeneratorConfig {
        tx_count: 1,
        ..config(10, "", &["tx-transfer-legacy"])
    })
    .unwrap();
    let block = &chain.blocks[5];
    assert_eq!(block.transactions.len(), 1);

    let mut input = 5u64.to_be_bytes().to_vec();
    input.extend_from_slice(&0u64.to_be_bytes());
    let mut random = [0u8; 8];
    random.copy_from_slice(&keccak256(&input).as_bytes()[..8]);
    let index = u64::from_be_bytes(random) % chain.accounts.len() as u64;
    assert_eq!(
        block.transactions[0].transaction.to(),
        Some(chain.accounts[index as usize].address)
    );
}

#[test]
fn uncles_in_proof_of_work_blocks() {
    let chain = generate(config(10, "byzantium", &["uncles"])).unwrap();
    let mut counter = 0;
    for block in &chain.blocks {
        if block.number() < 3 {
            assert!(block.uncles.is_empty());
            continue;
        }
        assert_eq!(block.uncles.len(), 2, "block {}", block.number());
        for uncle in &block.uncles {
            assert_eq!(
                uncle.extra_data,
                format!("hivechain uncle {}", counter).into_bytes()
            );
            assert_eq!(uncle.number, block.number() - 1);
            let uncle_parent = &chain.blocks[uncle.number as usize - 1].header;
            assert_eq!(
                uncle.difficulty,
                calc_difficulty(&chain.schedule, uncle.timestamp, uncle_parent)
            );
            counter += 1;
        }
    }
    assert_eq!(counter, 16);
}

#[test]
fn eip7702_triplet_in_first_prague_block() {
    let chain = generate(config(4, "prague", &["tx-eip7702"])).unwrap();
    let block = &chain.blocks[1];
    assert_eq!(block.transactions.len(), 3);
    let sender = chain.accounts[0].address;
    let delegation = delegation_account().unwrap();

    let deploy = &block.transactions[0];
    assert_eq!(deploy.sender().unwrap(), sender);
    assert_eq!(deploy.transaction.to(), None);
    let proxy = create_address(sender, deploy.transaction.nonce());

    let authorize = &block.transactions[1];
    match &authorize.transaction {
        Transaction::SetCode(tx) => {
            assert_eq!(tx.authorization_list.len(), 1);
            let auth = &tx.authorization_list[0];
            assert_eq!(auth.authorization.address, proxy);
            assert_eq!(auth.authority().unwrap(), delegation.address);
        }
        other => panic!("expected set-code transaction, got {:?}", other.tx_type()),
    }

    let invoke = &block.transactions[2];
    assert_eq!(invoke.transaction.to(), Some(delegation.address));
    assert_eq!(invoke.transaction.data(), b"invoked");

    for later in &chain.blocks[2..] {
        assert!(later.transactions.is_empty());
    }
    assert_eq!(chain.tx_info["tx-eip7702"]["proxyAddr"], serde_json::json!(proxy));
    assert_eq!(
        chain.tx_info["tx-eip7702"]["authorizeTx"],
        serde_json::json!(authorize.hash())
    );
}

#[test]
fn outputs_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Generator::new(GeneratorConfig {
        out_dir: dir.path().to_path_buf(),
        ..config(6, "", &[])
    })
    .unwrap()
    .run()
    .unwrap();

    for name in OUTPUT_NAMES {
        let file = match *name {
            "chain" | "powchain" => format!("{}.rlp", name),
            other => format!("{}.json", other),
        };
        assert!(dir.path().join(&file).exists(), "{}", file);
    }

    let rlp = fs::read(dir.path().join("chain.rlp")).unwrap();
    assert_eq!(decode_chain(&rlp).unwrap().len(), 6);
    // merge at genesis, so there are no proof-of-work blocks
    assert!(fs::read(dir.path().join("powchain.rlp")).unwrap().is_empty());

    let accounts: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("accounts.json")).unwrap()).unwrap();
    assert_eq!(accounts.as_object().unwrap().len(), chain.accounts.len());

    let payloads: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("newpayload.json")).unwrap()).unwrap();
    let payloads = payloads.as_array().unwrap();
    assert_eq!(payloads.len(), 6);
    assert_eq!(payloads[0]["id"], "np1");
    assert_eq!(payloads[5]["method"], "engine_newPayloadV4");

    let headfcu: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("headfcu.json")).unwrap()).unwrap();
    assert_eq!(headfcu["id"], "fcu6");
}

#[test]
fn pow_chain_stops_before_the_merge() {
    let dir = tempfile::tempdir().unwrap();
    Generator::new(GeneratorConfig {
        fork_interval: 1,
        tx_interval: 0,
        out_dir: dir.path().to_path_buf(),
        outputs: vec!["powchain".into(), "newpayload".into()],
        ..config(16, "", &[])
    })
    .unwrap()
    .run()
    .unwrap();

    // merge is the 13th fork, activated at height 12
    let pow = decode_chain(&fs::read(dir.path().join("powchain.rlp")).unwrap()).unwrap();
    assert_eq!(pow.len(), 11);
    assert_eq!(pow.last().unwrap().number(), 11);

    let payloads: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("newpayload.json")).unwrap()).unwrap();
    assert_eq!(payloads.as_array().unwrap().len(), 5);
}
