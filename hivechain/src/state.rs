use serde::Serialize;
use std::collections::BTreeMap;
use types::rlp::{self, RlpStream};
use types::{keccak256, sec_trie_root, Address, Hash256, Uint256};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateAccount {
    pub nonce: u64,
    pub balance: Uint256,
    pub code: Vec<u8>,
    pub storage: BTreeMap<Hash256, Hash256>,
}

impl StateAccount {
    /// EIP-161 emptiness.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code.is_empty()
    }

    pub fn code_hash(&self) -> Hash256 {
        keccak256(&self.code)
    }

    pub fn storage_root(&self) -> Hash256 {
        sec_trie_root(
            self.storage
                .iter()
                .filter(|(_, value)| !value.is_zero())
                .map(|(slot, value)| {
                    let value = Uint256::from_big_endian(value.as_bytes());
                    (slot.as_bytes().to_vec(), rlp::encode(&value).to_vec())
                }),
        )
    }

    fn rlp_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(4);
        stream.append(&self.nonce);
        stream.append(&self.balance);
        stream.append(&self.storage_root());
        stream.append(&self.code_hash());
        stream.out().to_vec()
    }
}

/// World state: every account keyed by address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct State {
    accounts: BTreeMap<Address, StateAccount>,
}

impl State {
    pub fn account(&self, address: &Address) -> Option<&StateAccount> {
        self.accounts.get(address)
    }

    pub fn account_mut(&mut self, address: Address) -> &mut StateAccount {
        self.accounts.entry(address).or_default()
    }

    pub fn insert(&mut self, address: Address, account: StateAccount) {
        self.accounts.insert(address, account);
    }

    pub fn remove(&mut self, address: &Address) -> Option<StateAccount> {
        self.accounts.remove(address)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map_or(0, |a| a.nonce)
    }

    pub fn balance(&self, address: &Address) -> Uint256 {
        self.account(address).map_or_else(Uint256::zero, |a| a.balance)
    }

    pub fn code(&self, address: &Address) -> &[u8] {
        self.account(address).map_or(&[], |a| a.code.as_slice())
    }

    pub fn storage(&self, address: &Address, slot: Hash256) -> Hash256 {
        self.account(address)
            .and_then(|a| a.storage.get(&slot).copied())
            .unwrap_or_else(Hash256::zero)
    }

    pub fn set_storage(&mut self, address: Address, slot: Hash256, value: Hash256) {
        self.account_mut(address).storage.insert(slot, value);
    }

    /// Credits `amount`. Crediting zero to a missing account leaves the state untouched.
    pub fn add_balance(&mut self, address: Address, amount: Uint256) {
        if amount.is_zero() && !self.accounts.contains_key(&address) {
            return;
        }
        let account = self.account_mut(address);
        account.balance = account.balance.saturating_add(amount);
    }

    /// Root of the secure account trie.
    pub fn root(&self) -> Hash256 {
        sec_trie_root(
            self.accounts
                .iter()
                .map(|(address, account)| (address.as_bytes().to_vec(), account.rlp_bytes())),
        )
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &StateAccount)> {
        self.accounts.iter()
    }

    pub fn dump(&self) -> StateDump {
        StateDump {
            root: self.root(),
            accounts: self
                .accounts
                .iter()
                .map(|(address, account)| {
                    let dumped = DumpAccount {
                        balance: account.balance.to_string(),
                        nonce: account.nonce,
                        root: account.storage_root(),
                        code_hash: account.code_hash(),
                        code: account.code.clone(),
                        storage: account.storage.clone(),
                        key: keccak256(address.as_bytes()),
                    };
                    (*address, dumped)
                })
                .collect(),
        }
    }
}

/// `headstate.json` layout.
#[derive(Debug, Clone, Serialize)]
pub struct StateDump {
    pub root: Hash256,
    pub accounts: BTreeMap<Address, DumpAccount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpAccount {
    /// Decimal wei.
    pub balance: String,
    pub nonce: u64,
    pub root: Hash256,
    pub code_hash: Hash256,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        with = "serde_utils::hex_vec"
    )]
    pub code: Vec<u8>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<Hash256, Hash256>,
    pub key: Hash256,
}

#[cfg(test)]
mod test {
    use super::*;
    use types::{empty_trie_root, keccak_empty};

    #[test]
    fn empty_state_root() {
        assert_eq!(State::default().root(), empty_trie_root());
        let account = StateAccount::default();
        assert_eq!(account.storage_root(), empty_trie_root());
        assert_eq!(account.code_hash(), keccak_empty());
    }

    #[test]
    fn balance_accounting() {
        let mut state = State::default();
        let a = Address::repeat_byte(1);
        state.add_balance(a, Uint256::zero());
        assert!(state.account(&a).is_none());

        state.add_balance(a, Uint256::from(10));
        state.add_balance(a, Uint256::MAX);
        assert_eq!(state.balance(&a), Uint256::MAX);
        assert!(state.remove(&a).is_some());
        assert!(state.account(&a).is_none());
    }

    #[test]
    fn zero_storage_does_not_change_root() {
        let mut with_zero = StateAccount::default();
        with_zero
            .storage
            .insert(Hash256::repeat_byte(1), Hash256::zero());
        assert_eq!(with_zero.storage_root(), empty_trie_root());
    }

    #[test]
    fn root_changes_with_state() {
        let mut state = State::default();
        state.add_balance(Address::repeat_byte(1), Uint256::from(1));
        let first = state.root();
        state.account_mut(Address::repeat_byte(1)).nonce += 1;
        assert_ne!(first, state.root());
        assert_eq!(state.dump().root, state.root());
    }
}
