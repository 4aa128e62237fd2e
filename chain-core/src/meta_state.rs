//! In-memory account and sqlchain registry state, mutated only under a
//! durable write transaction so it stays consistent with the block that
//! caused the mutation.
//!
//! Transactions flow through two stages: they arrive on the producer's
//! intake queue and are dry-validated into the pending pool by
//! [`MetaState::stage_tx`]; [`MetaState::pull_txs`] drains that pool when a
//! new block is assembled. The actual balance/nonce mutation and durable
//! persistence happens once, in [`MetaState::apply_transaction`], called for
//! every transaction in a block at push time — whether the block was
//! produced locally or received over the wire. This keeps "apply" singular
//! regardless of which path a transaction took to get into a block.
//!
//! A locally-originated transaction's nonce comes from
//! [`MetaState::reserve_nonce`], a separate counter from the confirmed
//! `next_nonce` on `Account`: it advances the instant it's handed out, so
//! two transactions built back-to-back for the same address — before
//! either has reached the pending pool, let alone a pushed block — never
//! collide.

use crate::error::{Error, Result};
use crate::store::{ReadTxn, WriteTxn};
use crate::types::{Account, Address, SqlChainMeta, TxKind};
use std::collections::{HashMap, VecDeque};

/// In-memory projection of the durable `account_index` and `sqlchain_index`
/// buckets, plus the not-yet-included transaction pool.
pub struct MetaState {
    accounts: HashMap<Address, Account>,
    sqlchains: HashMap<String, SqlChainMeta>,
    pending: VecDeque<TxKind>,
    /// Next nonce to hand out per address via [`MetaState::reserve_nonce`],
    /// independent of `accounts`' confirmed `next_nonce` and of `pending`:
    /// a reservation is live from the moment it's handed out, before the
    /// transaction built from it has even reached the pending pool.
    reserved: HashMap<Address, u64>,
}

impl MetaState {
    /// An empty meta-state, with no accounts or sqlchains loaded.
    pub fn empty() -> Self {
        Self {
            accounts: HashMap::new(),
            sqlchains: HashMap::new(),
            pending: VecDeque::new(),
            reserved: HashMap::new(),
        }
    }

    /// Rebuild the in-memory account and sqlchain maps from the persisted
    /// sub-buckets. The pending-tx pool is transient and is not restored;
    /// any transaction that had not yet reached a pushed block at shutdown
    /// must be resubmitted.
    pub fn reload(&mut self, read: &ReadTxn) -> Result<()> {
        self.accounts.clear();
        self.sqlchains.clear();
        for account in read.iter_accounts()? {
            self.accounts.insert(account.address, account);
        }
        for meta in read.iter_sqlchains()? {
            self.sqlchains.insert(meta.database_id.clone(), meta);
        }
        Ok(())
    }

    /// The next unused nonce for `address` as of the last applied block,
    /// lazily creating the account record if this is the first reference to
    /// it. Does not account for transactions already reserved or staged but
    /// not yet applied — callers building a new transaction for `address`
    /// should use [`MetaState::reserve_nonce`] instead.
    pub fn next_nonce(&mut self, address: Address) -> u64 {
        self.accounts.entry(address).or_insert_with(|| Account::new(address)).next_nonce
    }

    /// Hand out the next nonce for a transaction about to be built for
    /// `address`, advancing the reservation counter so no subsequent call
    /// (concurrent or not) can be handed the same value before this
    /// transaction is ever staged. The reservation counter floors at the
    /// confirmed `next_nonce`, so it resyncs forward whenever confirmation
    /// catches up or outpaces it.
    pub fn reserve_nonce(&mut self, address: Address) -> u64 {
        let confirmed = self.next_nonce(address);
        let next = self.reserved.get(&address).copied().unwrap_or(confirmed).max(confirmed);
        self.reserved.insert(address, next + 1);
        next
    }

    /// The nonce an incoming transaction from `address` is expected to
    /// carry to be staged: the confirmed next-nonce advanced past every one
    /// of `address`'s own transactions already sitting in the pending pool.
    fn expected_staging_nonce(&mut self, address: Address) -> u64 {
        let base = self.next_nonce(address);
        let already_pending = self.pending.iter().filter(|tx| tx.account() == address).count() as u64;
        base + already_pending
    }

    /// Look up an account by address, without creating it.
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Look up a registered sqlchain by database id.
    pub fn sqlchain(&self, database_id: &str) -> Option<&SqlChainMeta> {
        self.sqlchains.get(database_id)
    }

    /// Dry-validate an incoming transaction (signature against current
    /// state; nonce against the confirmed next-nonce plus this address's
    /// own already-pending transactions, no mutation) and add it to the
    /// pending pool for inclusion in the next locally-produced block.
    pub fn stage_tx(&mut self, tx: TxKind) -> Result<()> {
        verify_signature(&tx)?;
        let expected = self.expected_staging_nonce(tx.account());
        check_nonce(&tx, expected)?;
        self.pending.push_back(tx);
        Ok(())
    }

    /// Drain the entire pending pool, in arrival order, for inclusion in a
    /// new block.
    pub fn pull_txs(&mut self) -> Vec<TxKind> {
        self.pending.drain(..).collect()
    }

    /// Apply one transaction's effects (signature + nonce check, balance
    /// mutation, nonce advance) and persist the result under `write`. Called
    /// once per transaction in a pushed block, for both self-produced and
    /// peer-sourced blocks.
    pub fn apply_transaction(&mut self, tx: &TxKind, write: &WriteTxn) -> Result<()> {
        verify_signature(tx)?;
        let expected = self.next_nonce(tx.account());
        check_nonce(tx, expected)?;

        match tx {
            TxKind::Billing(billing) => {
                for (receiver, fee) in &billing.fees {
                    self.credit(*receiver, *fee);
                }
                for (receiver, reward) in &billing.rewards {
                    self.credit(*receiver, *reward);
                }
                self.advance_nonce(billing.account);
                write.put_account(self.accounts.get(&billing.account).expect("account just touched"))?;
                for (receiver, _) in billing.fees.iter().chain(billing.rewards.iter()) {
                    if *receiver != billing.account {
                        write.put_account(self.accounts.get(receiver).expect("account just credited"))?;
                    }
                }
            }
            TxKind::CreateDatabase(create) => {
                self.advance_nonce(create.account);
                write.put_account(self.accounts.get(&create.account).expect("account just touched"))?;

                let meta = SqlChainMeta {
                    database_id: create.database_id.clone(),
                    instance_meta: create.instance_meta.clone(),
                    created_at_height: 0,
                };
                self.sqlchains.insert(meta.database_id.clone(), meta.clone());
                write.put_sqlchain(&meta)?;
            }
        }

        write.put_tx(tx)?;
        Ok(())
    }

    fn credit(&mut self, address: Address, amount: u64) {
        let account = self.accounts.entry(address).or_insert_with(|| Account::new(address));
        account.balance += amount;
    }

    fn advance_nonce(&mut self, address: Address) {
        let account = self.accounts.entry(address).or_insert_with(|| Account::new(address));
        account.next_nonce += 1;
    }

    /// Mark `txs` as accepted into a pushed block, removing any of them
    /// still sitting in the pending pool. A no-op for transactions that
    /// `pull_txs` already removed; exists to cover transactions that
    /// arrived in a peer-sourced block without ever passing through this
    /// node's own intake queue.
    pub fn partial_commit(&mut self, txs: &[TxKind]) {
        if self.pending.is_empty() {
            return;
        }
        let committed: std::collections::HashSet<[u8; 32]> = txs.iter().map(|tx| tx.hash()).collect();
        self.pending.retain(|tx| !committed.contains(&tx.hash()));
    }
}

fn verify_signature(tx: &TxKind) -> Result<()> {
    if !tx.verify_signature() {
        return Err(Error::TxSignatureInvalid(format!(
            "tx from account {} failed signature check",
            tx.account()
        )));
    }
    Ok(())
}

fn check_nonce(tx: &TxKind, expected: u64) -> Result<()> {
    if tx.nonce() != expected {
        return Err(Error::TxNonceMismatch {
            account: tx.account().to_string(),
            expected,
            got: tx.nonce(),
        });
    }
    Ok(())
}
