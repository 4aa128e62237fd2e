//! Durable store layout over an embedded, B+tree-style KV store (`redb`).
//!
//! redb has no native nested buckets, so the logical sub-buckets
//! (`block_index`, `tx_index/<kind>`, `account_index`, `sqlchain_index`)
//! are modeled as separate top-level [`redb::TableDefinition`]s;
//! the scalar `state` key lives in its own single-row table. All tables are
//! created (if missing) on [`Store::open`].

use crate::error::Result;
use crate::types::{Account, Address, Block, ChainState, SqlChainMeta, TxKind};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("state");
const BLOCK_INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("block_index");
const TX_INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tx_index");
const ACCOUNT_INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("account_index");
const SQLCHAIN_INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sqlchain_index");

const STATE_KEY: &str = "state";

/// Durable store handle. All mutations that must be atomic with respect to
/// a single block push go through [`Store::write_txn`]; reads that must see
/// a consistent snapshot go through [`Store::read_txn`].
pub struct Store {
    db: Database,
}

/// Encodes the block index key: `height.to_be_bytes() ++ hash`, so bucket
/// iteration order is height order, which replay relies on.
pub fn block_index_key(height: u64, hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 32);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(hash);
    key
}

/// Encodes the tx index key: `kind_tag ++ tx_hash`, emulating a per-kind
/// sub-bucket via key prefix.
pub fn tx_index_key(kind_tag: u8, tx_hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32);
    key.push(kind_tag);
    key.extend_from_slice(tx_hash);
    key
}

impl Store {
    /// Open or create the durable store at `path`, creating any missing
    /// tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())?;

        // Touch every table so it exists even before any writer uses it.
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(STATE_TABLE)?;
            let _ = txn.open_table(BLOCK_INDEX_TABLE)?;
            let _ = txn.open_table(TX_INDEX_TABLE)?;
            let _ = txn.open_table(ACCOUNT_INDEX_TABLE)?;
            let _ = txn.open_table(SQLCHAIN_INDEX_TABLE)?;
        }
        txn.commit()?;

        tracing::info!(path = %path.as_ref().display(), "opened durable store");

        Ok(Self { db })
    }

    /// Begin an atomic write transaction covering all mutations for a single
    /// block push (state + block_index + account_index + tx_index +
    /// sqlchain_index).
    pub fn write_txn(&self) -> Result<WriteTxn> {
        Ok(WriteTxn {
            inner: self.db.begin_write()?,
        })
    }

    /// Begin a read-only snapshot view.
    pub fn read_txn(&self) -> Result<ReadTxn> {
        Ok(ReadTxn {
            inner: self.db.begin_read()?,
        })
    }
}

/// A single atomic write transaction over the durable store.
pub struct WriteTxn {
    inner: redb::WriteTransaction,
}

impl WriteTxn {
    /// Write the chain state snapshot
    pub fn put_state(&self, state: &ChainState) -> Result<()> {
        let mut table = self.inner.open_table(STATE_TABLE)?;
        let bytes = bincode::serialize(state)?;
        table.insert(STATE_KEY, bytes.as_slice())?;
        Ok(())
    }

    /// Write a block under `block_index[height|hash]`
    pub fn put_block(&self, height: u64, hash: &[u8; 32], block: &Block) -> Result<()> {
        let mut table = self.inner.open_table(BLOCK_INDEX_TABLE)?;
        let key = block_index_key(height, hash);
        let bytes = bincode::serialize(block)?;
        table.insert(key.as_slice(), bytes.as_slice())?;
        Ok(())
    }

    /// Stage a transaction under its kind's sub-bucket
    pub fn put_tx(&self, tx: &TxKind) -> Result<()> {
        let mut table = self.inner.open_table(TX_INDEX_TABLE)?;
        let key = tx_index_key(tx.kind_tag(), &tx.hash());
        let bytes = tx.serialize()?;
        table.insert(key.as_slice(), bytes.as_slice())?;
        Ok(())
    }

    /// Upsert an account record
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let mut table = self.inner.open_table(ACCOUNT_INDEX_TABLE)?;
        let key = account.address.as_bytes().to_vec();
        let bytes = bincode::serialize(account)?;
        table.insert(key.as_slice(), bytes.as_slice())?;
        Ok(())
    }

    /// Upsert a sqlchain registry record
    pub fn put_sqlchain(&self, meta: &SqlChainMeta) -> Result<()> {
        let mut table = self.inner.open_table(SQLCHAIN_INDEX_TABLE)?;
        let bytes = bincode::serialize(meta)?;
        table.insert(meta.database_id.as_bytes(), bytes.as_slice())?;
        Ok(())
    }

    /// Commit all writes made through this transaction atomically
    pub fn commit(self) -> Result<()> {
        self.inner.commit()?;
        Ok(())
    }
}

/// A read-only snapshot view of the durable store.
pub struct ReadTxn {
    inner: redb::ReadTransaction,
}

impl ReadTxn {
    /// Read the chain state snapshot, if one has been persisted
    pub fn get_state(&self) -> Result<Option<ChainState>> {
        let table = self.inner.open_table(STATE_TABLE)?;
        match table.get(STATE_KEY)? {
            Some(value) => Ok(Some(bincode::deserialize(value.value())?)),
            None => Ok(None),
        }
    }

    /// Iterate the block index in key order (height order), yielding
    /// `(height, hash, block)`.
    pub fn iter_blocks(&self) -> Result<Vec<(u64, [u8; 32], Block)>> {
        let table = self.inner.open_table(BLOCK_INDEX_TABLE)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let key_bytes = key.value();
            let mut height_bytes = [0u8; 8];
            height_bytes.copy_from_slice(&key_bytes[0..8]);
            let height = u64::from_be_bytes(height_bytes);
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&key_bytes[8..40]);
            let block: Block = bincode::deserialize(value.value())?;
            out.push((height, hash, block));
        }
        Ok(out)
    }

    /// Get an account record by address
    pub fn get_account(&self, address: &Address) -> Result<Option<Account>> {
        let table = self.inner.open_table(ACCOUNT_INDEX_TABLE)?;
        match table.get(address.as_bytes().as_slice())? {
            Some(value) => Ok(Some(bincode::deserialize(value.value())?)),
            None => Ok(None),
        }
    }

    /// Iterate all account records
    pub fn iter_accounts(&self) -> Result<Vec<Account>> {
        let table = self.inner.open_table(ACCOUNT_INDEX_TABLE)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            out.push(bincode::deserialize(value.value())?);
        }
        Ok(out)
    }

    /// Iterate all sqlchain registry records
    pub fn iter_sqlchains(&self) -> Result<Vec<SqlChainMeta>> {
        let table = self.inner.open_table(SQLCHAIN_INDEX_TABLE)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            out.push(bincode::deserialize(value.value())?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, BlockHeader, Signature};

    fn sample_block(height: u64, parent_hash: [u8; 32]) -> Block {
        let header = BlockHeader {
            version: 1,
            producer_address: Address([1u8; 32]),
            parent_hash,
            merkle_root: [0u8; 32],
            timestamp: height as i64,
        };
        Block {
            header,
            signature: Signature([0u8; 64]),
            transactions: vec![],
        }
    }

    #[test]
    fn open_creates_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("chain.redb")).unwrap();
        let read = store.read_txn().unwrap();
        assert!(read.get_state().unwrap().is_none());
        assert!(read.iter_blocks().unwrap().is_empty());
    }

    #[test]
    fn write_txn_is_atomic_across_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("chain.redb")).unwrap();

        let block = sample_block(1, [0u8; 32]);
        let hash = block.compute_hash();
        let state = ChainState {
            head_hash: hash,
            height: 1,
        };

        {
            let txn = store.write_txn().unwrap();
            txn.put_state(&state).unwrap();
            txn.put_block(1, &hash, &block).unwrap();
            txn.commit().unwrap();
        }

        let read = store.read_txn().unwrap();
        let got_state = read.get_state().unwrap().unwrap();
        assert_eq!(got_state.height, 1);
        let blocks = read.iter_blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].0, 1);
    }

    #[test]
    fn blocks_iterate_in_height_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("chain.redb")).unwrap();

        for height in [3u64, 1, 2] {
            let block = sample_block(height, [0u8; 32]);
            let hash = block.compute_hash();
            let txn = store.write_txn().unwrap();
            txn.put_block(height, &hash, &block).unwrap();
            txn.commit().unwrap();
        }

        let read = store.read_txn().unwrap();
        let heights: Vec<u64> = read.iter_blocks().unwrap().into_iter().map(|(h, _, _)| h).collect();
        assert_eq!(heights, vec![1, 2, 3]);
    }
}
