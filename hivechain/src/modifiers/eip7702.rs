//! EIP-7702 code delegation, spread over as many blocks as gas allows.
//!
//! First a contract is deployed to serve as account code. Then a set-code transaction
//! delegates the delegation account to that contract, and finally the delegating account is
//! called, which runs the contract in the context of the account. The contract stores its
//! input in slot 0 when called with data.
use super::deploy::code_to_deploy;
use super::{to_json, BlockModifier};
use crate::accounts::delegation_account;
use crate::context::BlockContext;
use crate::contracts::DELEGATE_ACCOUNT_CODE;
use crate::forks::Fork;
use crate::oracle::intrinsic_gas;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use types::{
    create_address, Account, Address, Authorization, Hash256, LegacyTx, SetCodeTx, Transaction,
    Uint256,
};

const INVOKE_GAS: u64 = 70_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Deploy,
    Authorize,
    Invoke,
    Done,
}

impl Stage {
    fn next(self) -> Self {
        match self {
            Stage::Deploy => Stage::Authorize,
            Stage::Authorize => Stage::Invoke,
            Stage::Invoke | Stage::Done => Stage::Done,
        }
    }
}

pub struct Eip7702 {
    account: Account,
    stage: Stage,
    proxy: Address,
    authorize_tx: Hash256,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Eip7702Info {
    account: Address,
    proxy_addr: Address,
    authorize_tx: Hash256,
}

impl Eip7702 {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            account: delegation_account()?,
            stage: Stage::Deploy,
            proxy: Address::zero(),
            authorize_tx: Hash256::zero(),
        })
    }

    fn deploy(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        let (constructor, gas) = code_to_deploy(ctx, DELEGATE_ACCOUNT_CODE);
        if !ctx.has_gas(gas) {
            return Ok(false);
        }
        let sender = ctx.tx_sender_account();
        let nonce = ctx.account_nonce(sender.address);
        ctx.add_new_tx(
            sender,
            Transaction::Legacy(LegacyTx {
                nonce,
                gas_price: ctx.tx_gas_fee_cap(),
                gas,
                to: None,
                value: Uint256::zero(),
                data: constructor,
            }),
        )?;
        self.proxy = create_address(sender.address, nonce);
        Ok(true)
    }

    fn authorize(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        let auth = Authorization {
            chain_id: ctx.chain_id(),
            address: self.proxy,
            nonce: ctx.account_nonce(self.account.address),
        }
        .sign(&self.account.key)?;

        let sender = ctx.tx_sender_account();
        let mut tx = SetCodeTx {
            chain_id: ctx.chain_id(),
            nonce: ctx.account_nonce(sender.address),
            max_priority_fee_per_gas: Uint256::one(),
            max_fee_per_gas: ctx.tx_gas_fee_cap(),
            gas: 0,
            to: Address::zero(),
            value: Uint256::zero(),
            data: vec![],
            access_list: vec![],
            authorization_list: vec![auth],
        };
        tx.gas = intrinsic_gas(
            ctx.schedule(),
            ctx.number(),
            ctx.timestamp(),
            &Transaction::SetCode(tx.clone()),
        );
        if !ctx.has_gas(tx.gas) {
            return Ok(false);
        }
        let signed = ctx.add_new_tx(sender, Transaction::SetCode(tx))?;
        self.authorize_tx = signed.hash();
        Ok(true)
    }

    fn invoke(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if !ctx.has_gas(INVOKE_GAS) {
            return Ok(false);
        }
        let sender = ctx.tx_sender_account();
        ctx.add_new_tx(
            sender,
            Transaction::Legacy(LegacyTx {
                nonce: ctx.account_nonce(sender.address),
                gas_price: ctx.tx_gas_fee_cap(),
                gas: INVOKE_GAS,
                to: Some(self.account.address),
                value: Uint256::zero(),
                data: b"invoked".to_vec(),
            }),
        )?;
        Ok(true)
    }
}

impl BlockModifier for Eip7702 {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if !ctx.is_active(Fork::Prague) {
            return Ok(false);
        }

        let start = self.stage;
        while self.stage < Stage::Done {
            let done = match self.stage {
                Stage::Deploy => self.deploy(ctx)?,
                Stage::Authorize => self.authorize(ctx)?,
                Stage::Invoke => self.invoke(ctx)?,
                Stage::Done => true,
            };
            if !done {
                break;
            }
            self.stage = self.stage.next();
        }
        Ok(self.stage > start)
    }

    fn tx_info(&self) -> Value {
        if self.stage < Stage::Done {
            return Value::Null;
        }
        to_json(&Eip7702Info {
            account: self.account.address,
            proxy_addr: self.proxy,
            authorize_tx: self.authorize_tx,
        })
    }
}
