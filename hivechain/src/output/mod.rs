//! Files written after a successful generator run.
mod engine;
mod forkenv;

use crate::generator::Chain;
use crate::Error;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use types::encode_chain;

pub use engine::{fcu_request, new_payload_request, RpcRequest};
pub use forkenv::fork_env;

/// Writes the outputs named in `names` to `dir`. All names are checked before anything is
/// written.
pub fn write(chain: &Chain, dir: &Path, names: &[String]) -> Result<(), Error> {
    let mut writers: Vec<(&str, fn(&Chain, &Path) -> Result<(), Error>)> = vec![];
    for name in names {
        let writer: fn(&Chain, &Path) -> Result<(), Error> = match name.as_str() {
            "accounts" => write_accounts,
            "chain" => write_chain,
            "fcu" => engine::write_fcu,
            "forkenv" => forkenv::write_fork_env,
            "genesis" => write_genesis,
            "headblock" => write_head_block,
            "headfcu" => engine::write_head_fcu,
            "headnewpayload" => engine::write_head_new_payload,
            "headstate" => write_head_state,
            "newpayload" => engine::write_new_payload,
            "powchain" => write_pow_chain,
            "txinfo" => write_tx_info,
            other => return Err(Error::UnknownOutput(other.to_string())),
        };
        writers.push((name.as_str(), writer));
    }

    fs::create_dir_all(dir)?;
    for (name, writer) in writers {
        info!("writing {}", name);
        writer(chain, dir)?;
    }
    Ok(())
}

pub(crate) fn write_json<T: Serialize + ?Sized>(
    dir: &Path,
    file: &str,
    value: &T,
) -> Result<(), Error> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(dir.join(file), json)?;
    Ok(())
}

fn write_genesis(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(dir, "genesis.json", &chain.genesis)
}

#[derive(Serialize)]
struct AccountKey {
    key: String,
}

fn write_accounts(chain: &Chain, dir: &Path) -> Result<(), Error> {
    let keys: BTreeMap<_, _> = chain
        .accounts
        .iter()
        .map(|account| {
            let key = format!("0x{}", hex::encode(account.key.to_bytes()));
            (account.address, AccountKey { key })
        })
        .collect();
    write_json(dir, "accounts.json", &keys)
}

fn write_head_state(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(dir, "headstate.json", &chain.state.dump())
}

fn write_head_block(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(dir, "headblock.json", &chain.head().header)
}

fn write_tx_info(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(dir, "txinfo.json", &chain.tx_info)
}

/// Blocks 1 through head.
fn write_chain(chain: &Chain, dir: &Path) -> Result<(), Error> {
    fs::write(dir.join("chain.rlp"), encode_chain(chain.blocks.iter().skip(1)))?;
    Ok(())
}

/// Proof-of-work blocks only: 1 up to the block before the merge, or the whole chain.
fn write_pow_chain(chain: &Chain, dir: &Path) -> Result<(), Error> {
    let end = chain
        .merge_block()
        .map_or(chain.blocks.len(), |merge| (merge as usize).min(chain.blocks.len()));
    let blocks = chain.blocks.get(1..end).unwrap_or_default();
    fs::write(dir.join("powchain.rlp"), encode_chain(blocks))?;
    Ok(())
}
