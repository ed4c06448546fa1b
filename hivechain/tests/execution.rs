use hivechain::contracts::{emit_address, emit_topic, EMIT_CODE};
use hivechain::oracle::{EvmOracle, StateTransition, TX_GAS};
use hivechain::state::{State, StateAccount};
use hivechain::{Activation, Fork, ForkSchedule};
use types::{
    bloom_contains, keccak256, Address, Header, LegacyTx, PrivateKey, ReceiptOutcome, Signer,
    Transaction, Uint256,
};

const CHAIN_ID: u64 = 1;

fn key() -> PrivateKey {
    PrivateKey::from_hex("4552dbe6ca4699322b5d923d0c9bcdd24644f5db8bf89a085b67c6c49b8a1b91")
        .unwrap()
}

fn constantinople_to_berlin() -> ForkSchedule {
    ForkSchedule::from_activations(
        [
            Fork::Homestead,
            Fork::TangerineWhistle,
            Fork::SpuriousDragon,
            Fork::Byzantium,
            Fork::Constantinople,
            Fork::Petersburg,
            Fork::Istanbul,
            Fork::MuirGlacier,
            Fork::Berlin,
        ]
        .into_iter()
        .map(|fork| (fork, Activation::Block(0))),
    )
    .unwrap()
}

fn emit_contract() -> StateAccount {
    StateAccount {
        nonce: 1,
        code: EMIT_CODE.to_vec(),
        ..StateAccount::default()
    }
}

/// A legacy call into the emit contract, checked against gas and a post state worked out
/// without running any code.
#[test]
fn emit_call_matches_hand_computed_state() {
    let sender = key().address();
    let beneficiary = Address::repeat_byte(0xcc);
    let funds = Uint256::exp10(20);

    let mut pre = State::default();
    pre.add_balance(sender, funds);
    pre.insert(emit_address(), emit_contract());

    let mut data = vec![0, 0, 0, 0, 0, 0, 0, 1];
    data.extend_from_slice(b"emit");
    let tx = Transaction::Legacy(LegacyTx {
        nonce: 0,
        gas_price: Uint256::one(),
        gas: 100_000,
        to: Some(emit_address()),
        value: Uint256::from(2),
        data: data.clone(),
    });
    let tx = Signer::new(CHAIN_ID, true).sign(tx, &key()).unwrap();

    let header = Header {
        number: 1,
        timestamp: 10,
        gas_limit: 8_000_000,
        beneficiary,
        difficulty: Uint256::from(0x10),
        ..Header::default()
    };
    let oracle = EvmOracle::new(CHAIN_ID, constantinople_to_berlin(), false);
    let (post, outcome) = oracle
        .apply(&pre, &[], &header, &[tx], &[], &[])
        .unwrap();

    // Intrinsic: 21000 plus 7 zero bytes at 4 and 5 non-zero bytes at 16.
    // Code: CALLDATASIZE, PUSH1 x2, CALLDATACOPY (3 + 3 copy + 3 memory), CALLDATASIZE,
    // PUSH1, SHA3 (30 + 6), PUSH4, CALLDATASIZE, PUSH1, LOG2 (375 + 2 * 375 + 8 * 12).
    let execution = 2 + 3 + 3 + 9 + 2 + 3 + 36 + 3 + 2 + 3 + 1_221;
    let expected_gas = TX_GAS + 7 * 4 + 5 * 16 + execution;
    assert_eq!(expected_gas, 22_395);
    assert_eq!(outcome.gas_used, expected_gas);

    let receipt = &outcome.receipts[0];
    assert_eq!(receipt.outcome, ReceiptOutcome::Status(true));
    assert_eq!(receipt.cumulative_gas_used, expected_gas);
    assert_eq!(receipt.logs.len(), 1);
    assert_eq!(receipt.logs[0].topics, vec![emit_topic(), keccak256(&data)]);
    assert_eq!(receipt.logs[0].data, data);
    assert!(bloom_contains(&outcome.logs_bloom, emit_address().as_bytes()));
    assert!(bloom_contains(&outcome.logs_bloom, emit_topic().as_bytes()));

    let fee = Uint256::from(expected_gas);
    let mut expected = State::default();
    expected.insert(
        sender,
        StateAccount {
            nonce: 1,
            balance: funds - fee - Uint256::from(2),
            ..StateAccount::default()
        },
    );
    expected.insert(
        emit_address(),
        StateAccount {
            balance: Uint256::from(2),
            ..emit_contract()
        },
    );
    expected.insert(
        beneficiary,
        StateAccount {
            balance: Uint256::exp10(18) * 2 + fee,
            ..StateAccount::default()
        },
    );
    assert_eq!(outcome.state_root, expected.root());
    assert_eq!(post.root(), expected.root());
}

/// An exhausted gas limit fails the call, keeps the fee and reverts the value.
#[test]
fn failed_call_charges_the_whole_limit() {
    let sender = key().address();
    let mut pre = State::default();
    pre.add_balance(sender, Uint256::exp10(20));
    pre.insert(emit_address(), emit_contract());

    let gas = TX_GAS + 100;
    let tx = Transaction::Legacy(LegacyTx {
        nonce: 0,
        gas_price: Uint256::one(),
        gas,
        to: Some(emit_address()),
        value: Uint256::from(2),
        data: vec![],
    });
    let tx = Signer::new(CHAIN_ID, true).sign(tx, &key()).unwrap();
    let header = Header {
        number: 1,
        timestamp: 10,
        gas_limit: 8_000_000,
        beneficiary: Address::repeat_byte(0xcc),
        ..Header::default()
    };
    let oracle = EvmOracle::new(CHAIN_ID, constantinople_to_berlin(), false);
    let (post, outcome) = oracle
        .apply(&pre, &[], &header, &[tx], &[], &[])
        .unwrap();

    assert_eq!(outcome.receipts[0].outcome, ReceiptOutcome::Status(false));
    assert_eq!(outcome.gas_used, gas);
    assert_eq!(post.balance(&emit_address()), Uint256::zero());
    assert_eq!(
        post.balance(&sender),
        Uint256::exp10(20) - Uint256::from(gas)
    );
}
