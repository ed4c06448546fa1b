//! Glue between the generator's `State` and revm.
//!
//! `StateDb` serves accounts, code and storage out of a `State` and writes revm's change sets
//! back into it. The conversions translate between the ethers-style types the rest of the
//! crate uses and the alloy primitives revm works with.
use crate::contracts::delegation_target;
use crate::forks::{Fork, ForkSchedule};
use crate::state::State;
use revm::database_interface::{Database, DatabaseCommit};
use revm::primitives::{hardfork::SpecId, Address, StorageKey, StorageValue, B256, U256};
use revm::state::{Account, AccountInfo, Bytecode};
use types::{Hash256, Uint256};

pub fn to_address(address: types::Address) -> Address {
    Address::from(address.to_fixed_bytes())
}

pub fn from_address(address: Address) -> types::Address {
    types::Address::from(address.into_array())
}

pub fn to_b256(hash: Hash256) -> B256 {
    B256::from(hash.to_fixed_bytes())
}

pub fn from_b256(hash: B256) -> Hash256 {
    Hash256::from(hash.0)
}

pub fn to_u256(value: Uint256) -> U256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    U256::from_be_bytes(bytes)
}

pub fn from_u256(value: U256) -> Uint256 {
    Uint256::from_big_endian(&value.to_be_bytes::<32>())
}

/// A storage word as the state keeps it.
pub fn word(value: U256) -> Hash256 {
    Hash256::from(value.to_be_bytes::<32>())
}

/// The revm hardfork in effect for a block.
pub fn spec_id(schedule: &ForkSchedule, number: u64, timestamp: u64) -> SpecId {
    match schedule.active_fork(number, timestamp) {
        None => SpecId::FRONTIER,
        Some(Fork::Homestead) => SpecId::HOMESTEAD,
        Some(Fork::TangerineWhistle) => SpecId::TANGERINE,
        Some(Fork::SpuriousDragon) => SpecId::SPURIOUS_DRAGON,
        Some(Fork::Byzantium) => SpecId::BYZANTIUM,
        Some(Fork::Constantinople) => SpecId::CONSTANTINOPLE,
        Some(Fork::Petersburg) => SpecId::PETERSBURG,
        Some(Fork::Istanbul) => SpecId::ISTANBUL,
        Some(Fork::MuirGlacier) => SpecId::MUIR_GLACIER,
        Some(Fork::Berlin) => SpecId::BERLIN,
        Some(Fork::London) => SpecId::LONDON,
        Some(Fork::ArrowGlacier) => SpecId::ARROW_GLACIER,
        Some(Fork::GrayGlacier) => SpecId::GRAY_GLACIER,
        Some(Fork::Merge) => SpecId::MERGE,
        Some(Fork::Shanghai) => SpecId::SHANGHAI,
        Some(Fork::Cancun) => SpecId::CANCUN,
        Some(Fork::Prague) => SpecId::PRAGUE,
    }
}

fn bytecode(code: &[u8]) -> Bytecode {
    match delegation_target(code) {
        Some(target) => Bytecode::new_eip7702(to_address(target)),
        None => Bytecode::new_legacy(code.to_vec().into()),
    }
}

/// revm's view of a `State` while a block executes.
pub struct StateDb<'a> {
    state: &'a mut State,
    /// Hashes of the ancestors of the executing block, indexed by block number.
    block_hashes: &'a [Hash256],
    /// EIP-161: touched accounts left empty are deleted.
    clear_empty: bool,
}

impl<'a> StateDb<'a> {
    pub fn new(state: &'a mut State, block_hashes: &'a [Hash256], clear_empty: bool) -> Self {
        Self {
            state,
            block_hashes,
            clear_empty,
        }
    }
}

impl Database for StateDb<'_> {
    type Error = core::convert::Infallible;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let info = self.state.account(&from_address(address)).map(|account| {
            let code = bytecode(&account.code);
            AccountInfo::new(to_u256(account.balance), account.nonce, code.hash_slow(), code)
        });
        Ok(info)
    }

    // Every account is served with its code, so revm never asks by hash.
    fn code_by_hash(&mut self, _code_hash: B256) -> Result<Bytecode, Self::Error> {
        Ok(Bytecode::default())
    }

    fn storage(&mut self, address: Address, index: StorageKey) -> Result<StorageValue, Self::Error> {
        let value = self.state.storage(&from_address(address), word(index));
        Ok(U256::from_be_bytes(value.to_fixed_bytes()))
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        let hash = self
            .block_hashes
            .get(number as usize)
            .copied()
            .unwrap_or_else(Hash256::zero);
        Ok(to_b256(hash))
    }
}

impl DatabaseCommit for StateDb<'_> {
    fn commit(&mut self, changes: revm::primitives::HashMap<Address, Account>) {
        for (address, account) in changes {
            if !account.is_touched() {
                continue;
            }
            let address = from_address(address);
            if account.is_selfdestructed() || (self.clear_empty && account.is_empty()) {
                self.state.remove(&address);
                continue;
            }

            let entry = self.state.account_mut(address);
            if account.is_created() {
                entry.storage.clear();
            }
            for (slot, value) in account.changed_storage_slots() {
                if value.present_value.is_zero() {
                    entry.storage.remove(&word(*slot));
                } else {
                    entry.storage.insert(word(*slot), word(value.present_value));
                }
            }
            entry.nonce = account.info.nonce;
            entry.balance = from_u256(account.info.balance);
            if let Some(code) = &account.info.code {
                entry.code = code.original_byte_slice().to_vec();
            }
        }
    }
}
