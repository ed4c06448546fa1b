//! Addresses and bytecode of the contracts used by the generated chains.
//!
//! The test contracts avoid `PUSH0` so that they run on every fork the generator supports. The
//! system contracts are the canonical deployments of EIP-4788, EIP-2935, EIP-7002 and EIP-7251.
use alloy_eips::{eip2935, eip4788, eip7002, eip7251};
use types::{Address, Hash256};

/// Emits `LOG2(calldata, "emit", keccak(calldata))`.
pub const EMIT_CODE: &[u8] = &[
    0x36, 0x60, 0x00, 0x60, 0x00, 0x37, 0x36, 0x60, 0x00, 0x20, 0x63, 0x65, 0x6d, 0x69, 0x74, 0x36,
    0x60, 0x00, 0xa2, 0x00,
];

/// Emits a single `LOG0` of `LARGE_LOG_SIZE` zero bytes.
pub const LARGE_LOGS_CODE: &[u8] = &[0x62, 0x02, 0xe6, 0x20, 0x60, 0x00, 0xa0, 0x00];

pub const LARGE_LOG_SIZE: usize = 0x02e620;

/// Constructor prefix that returns everything following it as the contract code.
pub const DEPLOYER_CODE: &[u8] = &[
    0x60, 0x0d, 0x38, 0x03, 0x80, 0x60, 0x0d, 0x60, 0x00, 0x39, 0x60, 0x00, 0xf3,
];

/// Stores the first calldata word in slot 0.
pub const CALLME_CODE: &[u8] = &[0x60, 0x00, 0x35, 0x60, 0x00, 0x55, 0x00];

/// Returns the block timestamp and number.
pub const CALLENV_CODE: &[u8] = &[
    0x42, 0x60, 0x00, 0x52, 0x43, 0x60, 0x20, 0x52, 0x60, 0x40, 0x60, 0x00, 0xf3,
];

pub const CALLREVERT_CODE: &[u8] = &[0x60, 0x00, 0x60, 0x00, 0xfd];

/// Delegation target: with input, stores the first calldata word in slot 0, otherwise returns
/// the executing address and the slot.
pub const DELEGATE_ACCOUNT_CODE: &[u8] = &[
    0x36, 0x60, 0x13, 0x57, 0x30, 0x60, 0x00, 0x52, 0x60, 0x00, 0x54, 0x60, 0x20, 0x52, 0x60, 0x40,
    0x60, 0x00, 0xf3, 0x5b, 0x60, 0x00, 0x35, 0x60, 0x00, 0x55, 0x00,
];

/// Initcode that logs `keccak(address)` and deploys nothing.
pub const GENLOGS_CODE: &[u8] = &[
    0x30, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0x20, 0x60, 0x00, 0x60, 0x00, 0xa1, 0x00,
];

/// Initcode that deploys `keccak(address)` as the contract code.
pub const GENCODE_CODE: &[u8] = &[
    0x30, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0x20, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00,
    0xf3,
];

/// Initcode that stores `keccak(address)` in slot 0.
pub const GENSTORAGE_CODE: &[u8] = &[
    0x30, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0x20, 0x60, 0x00, 0x55, 0x00,
];

/// Prefix of an EIP-7702 delegation designator.
pub const DELEGATION_PREFIX: &[u8] = &[0xef, 0x01, 0x00];

/// ASCII "emit", the first topic of every emit-contract log.
pub fn emit_topic() -> Hash256 {
    Hash256::from_low_u64_be(0x656d6974)
}

pub fn emit_address() -> Address {
    Address::from([
        0x7d, 0xcd, 0x17, 0x43, 0x37, 0x42, 0xf4, 0xc0, 0xca, 0x53, 0x12, 0x2a, 0xb5, 0x41, 0xd0,
        0xba, 0x67, 0xfc, 0x27, 0xdf,
    ])
}

pub fn large_logs_address() -> Address {
    Address::from([
        0x8d, 0xd4, 0xdc, 0x5f, 0xa8, 0xd8, 0xe2, 0xab, 0x4c, 0xa5, 0xdf, 0xb8, 0xd4, 0xb0, 0xfa,
        0x0c, 0xee, 0x10, 0xc5, 0xc4,
    ])
}

/// A system contract: where it lives and the code the genesis allocation installs there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemContract {
    address: [u8; 20],
    pub code: &'static [u8],
}

impl SystemContract {
    pub fn address(&self) -> Address {
        Address::from(self.address)
    }
}

/// EIP-4788 beacon block roots.
pub fn beacon_roots() -> SystemContract {
    SystemContract {
        address: eip4788::BEACON_ROOTS_ADDRESS.into_array(),
        code: &eip4788::BEACON_ROOTS_CODE,
    }
}

/// EIP-2935 history of block hashes.
pub fn history_storage() -> SystemContract {
    SystemContract {
        address: eip2935::HISTORY_STORAGE_ADDRESS.into_array(),
        code: &eip2935::HISTORY_STORAGE_CODE,
    }
}

/// EIP-7002 withdrawal request queue.
pub fn withdrawal_queue() -> SystemContract {
    SystemContract {
        address: eip7002::WITHDRAWAL_REQUEST_PREDEPLOY_ADDRESS.into_array(),
        code: &eip7002::WITHDRAWAL_REQUEST_PREDEPLOY_CODE,
    }
}

/// EIP-7251 consolidation request queue.
pub fn consolidation_queue() -> SystemContract {
    SystemContract {
        address: eip7251::CONSOLIDATION_REQUEST_PREDEPLOY_ADDRESS.into_array(),
        code: &eip7251::CONSOLIDATION_REQUEST_PREDEPLOY_CODE,
    }
}

pub fn system_contracts() -> [SystemContract; 4] {
    [
        beacon_roots(),
        history_storage(),
        withdrawal_queue(),
        consolidation_queue(),
    ]
}

pub fn beacon_roots_address() -> Address {
    beacon_roots().address()
}

pub fn withdrawal_queue_address() -> Address {
    withdrawal_queue().address()
}

/// Code stored for an account that delegates to `target`.
pub fn delegation_code(target: Address) -> Vec<u8> {
    let mut code = DELEGATION_PREFIX.to_vec();
    code.extend_from_slice(target.as_bytes());
    code
}

/// The delegation target if `code` is a delegation designator.
pub fn delegation_target(code: &[u8]) -> Option<Address> {
    (code.len() == DELEGATION_PREFIX.len() + 20 && code.starts_with(DELEGATION_PREFIX))
        .then(|| Address::from_slice(&code[DELEGATION_PREFIX.len()..]))
}

/// Prepends the deployer stub to `code`.
pub fn deploy_constructor(code: &[u8]) -> Vec<u8> {
    let mut constructor = DEPLOYER_CODE.to_vec();
    constructor.extend_from_slice(code);
    constructor
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emit_topic_is_ascii() {
        assert_eq!(&emit_topic().as_bytes()[28..], b"emit");
        assert_eq!(&EMIT_CODE[11..15], b"emit");
    }

    #[test]
    fn large_log_size_matches_code() {
        assert_eq!(LARGE_LOG_SIZE, 189_984);
        assert_eq!(LARGE_LOG_SIZE % 32, 0);
        let pushed = u32::from_be_bytes([0, LARGE_LOGS_CODE[1], LARGE_LOGS_CODE[2], LARGE_LOGS_CODE[3]]);
        assert_eq!(pushed as usize, LARGE_LOG_SIZE);
    }

    #[test]
    fn deployer_skips_itself() {
        assert_eq!(usize::from(DEPLOYER_CODE[1]), DEPLOYER_CODE.len());
        assert_eq!(usize::from(DEPLOYER_CODE[6]), DEPLOYER_CODE.len());
        let constructor = deploy_constructor(CALLME_CODE);
        assert_eq!(&constructor[DEPLOYER_CODE.len()..], CALLME_CODE);
    }

    #[test]
    fn delegate_account_jump_lands_on_jumpdest() {
        let dest = usize::from(DELEGATE_ACCOUNT_CODE[2]);
        assert_eq!(DELEGATE_ACCOUNT_CODE[dest], 0x5b);
    }

    #[test]
    fn no_push0() {
        for code in [
            EMIT_CODE,
            LARGE_LOGS_CODE,
            DEPLOYER_CODE,
            CALLME_CODE,
            CALLENV_CODE,
            CALLREVERT_CODE,
            DELEGATE_ACCOUNT_CODE,
            GENLOGS_CODE,
            GENCODE_CODE,
            GENSTORAGE_CODE,
        ] {
            assert!(!code.contains(&0x5f));
        }
    }

    #[test]
    fn delegation_designator() {
        let target = Address::repeat_byte(0x42);
        let code = delegation_code(target);
        assert_eq!(code.len(), 23);
        assert_eq!(delegation_target(&code), Some(target));
        assert_eq!(delegation_target(EMIT_CODE), None);
    }

    #[test]
    fn system_contract_addresses() {
        assert_eq!(
            format!("{:?}", beacon_roots_address()),
            "0x000f3df6d732807ef1319fb7b8bb8522d0beac02"
        );
        assert_eq!(
            format!("{:?}", withdrawal_queue_address()),
            "0x00000961ef480eb55e80d19ad83579a64c007002"
        );
        assert!(system_contracts().iter().all(|c| !c.code.is_empty()));
    }
}
