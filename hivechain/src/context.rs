use crate::forks::{Fork, ForkSchedule};
use crate::oracle::data_gas;
use crate::state::State;
use crate::Error;
use std::collections::HashMap;
use types::{
    keccak256, Account, Address, Block, Header, SignedTransaction, Signer, Transaction, Uint256,
    Withdrawal,
};

/// Everything a modifier may read or add while one block is being built.
pub struct BlockContext<'a> {
    number: u64,
    timestamp: u64,
    gas_limit: u64,
    base_fee: Option<Uint256>,
    chain: &'a [Block],
    state: &'a State,
    schedule: &'a ForkSchedule,
    chain_id: u64,
    accounts: &'a [Account],
    clique: bool,
    gas_used: u64,
    pending_nonces: HashMap<Address, u64>,
    pub(crate) transactions: Vec<SignedTransaction>,
    pub(crate) uncles: Vec<Header>,
    pub(crate) withdrawals: Vec<Withdrawal>,
}

impl<'a> BlockContext<'a> {
    /// `chain` holds every block before this one, starting at genesis.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        header: &Header,
        chain: &'a [Block],
        state: &'a State,
        schedule: &'a ForkSchedule,
        chain_id: u64,
        accounts: &'a [Account],
        clique: bool,
    ) -> Self {
        Self {
            number: header.number,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            base_fee: header.base_fee_per_gas,
            chain,
            state,
            schedule,
            chain_id,
            accounts,
            clique,
            gas_used: 0,
            pending_nonces: HashMap::new(),
            transactions: vec![],
            uncles: vec![],
            withdrawals: vec![],
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn base_fee(&self) -> Option<Uint256> {
        self.base_fee
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn schedule(&self) -> &ForkSchedule {
        self.schedule
    }

    pub fn is_active(&self, fork: Fork) -> bool {
        self.schedule.is_active(fork, self.number, self.timestamp)
    }

    pub fn is_post_merge(&self) -> bool {
        self.schedule.is_post_merge(self.number)
    }

    pub fn is_clique(&self) -> bool {
        self.clique
    }

    pub fn accounts(&self) -> &[Account] {
        self.accounts
    }

    /// Header of the block `back` generations above this one; `ancestor(1)` is the parent.
    pub fn ancestor(&self, back: u64) -> Option<&Header> {
        let number = self.number.checked_sub(back)?;
        self.chain.get(number as usize).map(|block| &block.header)
    }

    pub fn parent(&self) -> Option<&Header> {
        self.ancestor(1)
    }

    /// Whether more than `gas` is left in the block.
    pub fn has_gas(&self, gas: u64) -> bool {
        self.gas_limit.saturating_sub(self.gas_used) > gas
    }

    /// Number of transactions added to the block so far.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// The account that sends all generated transactions.
    pub fn tx_sender_account(&self) -> &'a Account {
        &self.accounts[0]
    }

    /// State nonce of `address` plus the transactions it already has in this block.
    pub fn account_nonce(&self, address: Address) -> u64 {
        self.state.nonce(&address) + self.pending_nonces.get(&address).copied().unwrap_or(0)
    }

    /// A fee cap that is always sufficient: one wei above the base fee.
    pub fn tx_gas_fee_cap(&self) -> Uint256 {
        self.base_fee.unwrap_or_default() + Uint256::one()
    }

    pub fn tx_create_intrinsic_gas(&self, data: &[u8]) -> u64 {
        data_gas(self.schedule, self.number, self.timestamp, data, true)
    }

    /// Deterministic pseudo-random value for the next transaction: the first eight bytes of
    /// `keccak256(number || tx_index)`, both big-endian `u64`.
    pub fn tx_random_value(&self) -> u64 {
        let mut input = [0u8; 16];
        input[..8].copy_from_slice(&self.number.to_be_bytes());
        input[8..].copy_from_slice(&(self.tx_count() as u64).to_be_bytes());
        let hash = keccak256(&input);
        let mut value = [0u8; 8];
        value.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_be_bytes(value)
    }

    /// Homestead signatures before Spurious Dragon, EIP-155 afterwards.
    pub fn signer(&self) -> Signer {
        Signer::new(self.chain_id, self.is_active(Fork::SpuriousDragon))
    }

    /// Signs `tx` with `sender`'s key and appends it to the block.
    pub fn add_new_tx(
        &mut self,
        sender: &Account,
        tx: Transaction,
    ) -> Result<SignedTransaction, Error> {
        let signed = self.signer().sign(tx, &sender.key)?;
        self.gas_used += signed.transaction.gas();
        *self.pending_nonces.entry(sender.address).or_insert(0) += 1;
        self.transactions.push(signed.clone());
        Ok(signed)
    }

    pub fn add_uncle(&mut self, uncle: Header) {
        self.uncles.push(uncle);
    }

    pub fn uncle_count(&self) -> usize {
        self.uncles.len()
    }

    pub fn add_withdrawal(&mut self, withdrawal: Withdrawal) {
        self.withdrawals.push(withdrawal);
    }

    pub fn withdrawal_count(&self) -> usize {
        self.withdrawals.len()
    }
}
