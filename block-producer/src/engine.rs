//! C9 — Block Producer Engine, and C10's head-sync/stash integration.
//!
//! State is shared, not owned, across three cooperative tasks: the main
//! cycle paces production against the slot scheduler and drives head sync;
//! the block worker is the single place any block — self-produced or
//! peer-sourced — is actually pushed, so pushes stay serialized even when
//! production and peer delivery race; the tx worker dry-validates incoming
//! billing transactions into the pending pool. All three hold a cheap
//! clone of [`Core`] (every field behind an `Arc`).
//!
//! Queues are bounded to one in flight, so a slow consumer applies
//! backpressure to its producer rather than buffering unboundedly.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::scheduler::SlotScheduler;
use crate::stash::Stash;
use crate::transport::PeerTransport;
use chain_core::crypto::{merkle_root, KeyPair};
use chain_core::{Address, BillingRequest, Block, BlockHeader, BlockIndex, ChainState, MetaState, Signature, Store, TxBilling, TxKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};

const CHANNEL_DEPTH: usize = 1;

fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Which of the two intake queues a block arrived on, for the block
/// worker's dispatch rule.
enum BlockSource {
    SelfProduced,
    Rpc,
}

struct BlockSubmission {
    height: u64,
    block: Block,
    source: BlockSource,
    ack: Option<oneshot::Sender<Result<()>>>,
}

/// Shared engine state. Cloning is cheap — every field is an `Arc` (or
/// plain `Clone` data), never owned storage.
#[derive(Clone)]
struct Core {
    node_id: String,
    peers: Vec<String>,
    gas_price: u64,
    store: Arc<Store>,
    index: Arc<RwLock<BlockIndex>>,
    meta: Arc<Mutex<MetaState>>,
    keypair: Arc<KeyPair>,
    scheduler: Arc<SlotScheduler>,
    stash: Arc<Mutex<Stash>>,
    transport: Arc<dyn PeerTransport>,
}

impl Core {
    async fn head_hash(&self) -> [u8; 32] {
        self.index.read().await.head_hash().unwrap_or([0u8; 32])
    }

    /// The height this node still needs: one past its current head, or
    /// `0` before any block (including genesis) has been pushed.
    async fn next_height(&self) -> u64 {
        self.index.read().await.height().map(|h| h + 1).unwrap_or(0)
    }

    fn other_peers(&self) -> impl Iterator<Item = &String> {
        self.peers.iter().filter(move |p| **p != self.node_id)
    }

    /// Parent hash and merkle root only. Producer-signature verification
    /// happens once, on replay (`BlockIndex::link`) — see `DESIGN.md` for
    /// why the online path does not repeat it.
    async fn check_block(&self, block: &Block) -> Result<()> {
        let head_hash = self.head_hash().await;
        if block.header.parent_hash != head_hash {
            return Err(Error::ParentNotMatch);
        }
        if BlockIndex::expected_merkle_root(block) != block.header.merkle_root {
            return Err(Error::InvalidMerkleRoot);
        }
        Ok(())
    }

    /// One KV write transaction: chain state, the block itself, and every
    /// transaction's account/sqlchain effects — then link the block onto
    /// the in-memory index.
    async fn push_block(&self, height: u64, block: Block) -> Result<()> {
        let hash = block.compute_hash();
        let write = self.store.write_txn()?;
        write.put_state(&ChainState { head_hash: hash, height })?;
        write.put_block(height, &hash, &block)?;
        {
            let mut meta = self.meta.lock().await;
            for tx in &block.transactions {
                meta.apply_transaction(tx, &write)?;
            }
            meta.partial_commit(&block.transactions);
        }
        write.commit()?;
        self.index.write().await.push(height, hash, block)?;
        Ok(())
    }

    /// Build and sign a block over the current head and pending tx pool.
    /// Does not push or gossip it — the caller does both, in that order,
    /// through the block worker.
    async fn produce_block(&self, now: i64) -> Result<Block> {
        let head_hash = self.head_hash().await;
        let txs = self.meta.lock().await.pull_txs();
        let tx_hashes: Vec<[u8; 32]> = txs.iter().map(|t| t.hash()).collect();
        let header = BlockHeader {
            version: 1,
            producer_address: self.keypair.address(),
            parent_hash: head_hash,
            merkle_root: merkle_root(&tx_hashes),
            timestamp: now,
        };
        let signature = self.keypair.sign(&header.canonical_bytes());
        Ok(Block {
            header,
            signature,
            transactions: txs,
        })
    }

    /// Advise every other configured peer of a newly pushed block.
    /// Per-peer failures are logged, never fatal to the caller.
    async fn gossip(&self, block: &Block) {
        for peer in self.other_peers() {
            let transport = self.transport.clone();
            let peer = peer.clone();
            let block = block.clone();
            tokio::spawn(async move {
                if let Err(err) = transport.advise_new_block(&peer, &block).await {
                    tracing::warn!(peer = %peer, error = %err, "advise_new_block failed");
                }
            });
        }
    }

    /// If the local chain is behind the scheduler's current turn, ask
    /// peers in configured order for the missing block. Returns the first
    /// one that answers; a peer error or miss just moves on to the next.
    async fn sync_head(&self) -> Option<(u64, Block)> {
        let missing = self.next_height().await;
        if missing >= self.scheduler.next_turn() {
            return None;
        }
        for peer in self.other_peers() {
            match self.transport.fetch_block(peer, missing).await {
                Ok(Some(block)) => return Some((missing, block)),
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(peer = %peer, height = missing, error = %err, "fetch_block failed");
                    continue;
                }
            }
        }
        None
    }
}

/// A not-yet-spawned engine: storage and in-memory state are loaded, but
/// no cooperative task is running yet.
pub struct Engine {
    core: Core,
}

impl Engine {
    /// Open durable storage, replay the block index, and reload account
    /// and sqlchain state from it.
    pub fn open(config: &EngineConfig, keypair: KeyPair, transport: Arc<dyn PeerTransport>) -> Result<Self> {
        let store = Store::open(&config.data_file)?;
        let (index, meta) = {
            let read = store.read_txn()?;
            let index = BlockIndex::replay(&read)?;
            let mut meta = MetaState::empty();
            meta.reload(&read)?;
            (index, meta)
        };
        let scheduler = SlotScheduler::new(config);

        Ok(Self {
            core: Core {
                node_id: config.node_id.clone(),
                peers: config.peers.node_ids.clone(),
                gas_price: config.gas_price,
                store: Arc::new(store),
                index: Arc::new(RwLock::new(index)),
                meta: Arc::new(Mutex::new(meta)),
                keypair: Arc::new(keypair),
                scheduler: Arc::new(scheduler),
                stash: Arc::new(Mutex::new(Stash::new())),
                transport,
            },
        })
    }
}

/// Spawn the main cycle, block worker, and tx worker as cooperative tasks
/// sharing this engine's state, and return a handle for submitting work
/// to them and stopping them.
pub fn spawn_engine(engine: Engine) -> EngineHandle {
    let (self_tx, self_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (rpc_tx, rpc_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (tx_tx, tx_rx) = mpsc::channel::<TxKind>(CHANNEL_DEPTH);
    let (stop_tx, _) = broadcast::channel(1);

    let core = engine.core;

    tokio::spawn(main_cycle(core.clone(), self_tx.clone(), rpc_tx.clone(), stop_tx.subscribe()));
    tokio::spawn(block_worker(core.clone(), self_rx, rpc_rx, stop_tx.subscribe()));
    tokio::spawn(tx_worker(core.clone(), tx_rx, stop_tx.subscribe()));

    EngineHandle {
        core,
        blocks_from_rpc: rpc_tx,
        pending_txs: tx_tx,
        stop: stop_tx,
    }
}

async fn main_cycle(
    core: Core,
    self_tx: mpsc::Sender<BlockSubmission>,
    rpc_tx: mpsc::Sender<BlockSubmission>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        if stop.try_recv().is_ok() {
            tracing::info!("main cycle stopping");
            return;
        }

        if let Some((height, block)) = core.sync_head().await {
            let (ack_tx, _ack_rx) = oneshot::channel();
            let submission = BlockSubmission {
                height,
                block,
                source: BlockSource::Rpc,
                ack: Some(ack_tx),
            };
            if rpc_tx.send(submission).await.is_err() {
                tracing::error!("block worker channel closed, stopping main cycle");
                return;
            }
        }

        let (now, wait) = core.scheduler.next_tick(unix_now());
        let _ = now;
        if wait > Duration::ZERO {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop.recv() => return,
            }
            continue;
        }

        run_current_turn(&core, &self_tx).await;
    }
}

async fn run_current_turn(core: &Core, self_tx: &mpsc::Sender<BlockSubmission>) {
    if !core.scheduler.is_my_turn() {
        core.scheduler.set_next_turn();
        return;
    }

    match core.produce_block(unix_now()).await {
        Ok(block) => {
            let height = core.next_height().await;
            core.scheduler.set_next_turn();

            let (ack_tx, ack_rx) = oneshot::channel();
            let submission = BlockSubmission {
                height,
                block: block.clone(),
                source: BlockSource::SelfProduced,
                ack: Some(ack_tx),
            };
            if self_tx.send(submission).await.is_err() {
                tracing::error!("block worker channel closed, dropping self-produced block");
                return;
            }

            match ack_rx.await {
                Ok(Ok(())) => core.gossip(&block).await,
                Ok(Err(err)) => tracing::error!(error = %err, "self-produced block rejected by block worker"),
                Err(_) => tracing::error!("block worker dropped without acking self-produced block"),
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "produce_block failed");
            core.scheduler.set_next_turn();
        }
    }
}

async fn block_worker(
    core: Core,
    mut from_self: mpsc::Receiver<BlockSubmission>,
    mut from_rpc: mpsc::Receiver<BlockSubmission>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = stop.recv() => {
                tracing::info!("block worker stopping");
                return;
            }
            Some(submission) = from_self.recv() => handle_submission(&core, submission).await,
            Some(submission) = from_rpc.recv() => handle_submission(&core, submission).await,
            else => return,
        }
    }
}

async fn handle_submission(core: &Core, submission: BlockSubmission) {
    let BlockSubmission { height, block, source, ack } = submission;
    let result = match source {
        BlockSource::SelfProduced => core.push_block(height, block).await,
        BlockSource::Rpc => apply_rpc_block(core, height, block).await,
    };
    if let Some(ack) = ack {
        let _ = ack.send(result);
    }
}

/// Outcome of one [`apply_rpc_block_step`] call, distinguishing an actual
/// push from the two cases that leave the chain head untouched — needed so
/// [`apply_rpc_block`]'s drain loop only keeps going when it's actually
/// making progress.
enum StepOutcome {
    /// Pushed onto the local chain.
    Applied,
    /// Still ahead of the local head; re-enqueued in the stash.
    Stashed,
    /// Behind the local head; discarded.
    Dropped,
}

/// Apply one peer-sourced block, then drain and retry any stashed blocks
/// the push may have unblocked, in their original arrival order. Draining
/// stops as soon as a block fails to apply: a block that's still ahead of
/// head re-enqueues itself in the stash rather than making progress, so
/// only an actual push justifies pulling in more of the stash. Only the
/// originally-submitted block's outcome is returned to the caller;
/// failures among drained blocks are logged, not propagated.
async fn apply_rpc_block(core: &Core, height: u64, block: Block) -> Result<()> {
    let outcome = apply_rpc_block_step(core, height, block).await?;
    if !matches!(outcome, StepOutcome::Applied) {
        return Ok(());
    }

    let mut queue: std::collections::VecDeque<(u64, Block)> = core.stash.lock().await.drain().into();
    while let Some((h, b)) = queue.pop_front() {
        match apply_rpc_block_step(core, h, b).await {
            Ok(StepOutcome::Applied) => {
                queue.extend(core.stash.lock().await.drain());
            }
            Ok(StepOutcome::Stashed) | Ok(StepOutcome::Dropped) => {}
            Err(err) => {
                tracing::warn!(height = h, error = %err, "stashed block failed on drain");
            }
        }
    }
    Ok(())
}

async fn apply_rpc_block_step(core: &Core, height: u64, block: Block) -> Result<StepOutcome> {
    let missing = core.next_height().await;
    if height > missing {
        core.stash.lock().await.enqueue(height, block);
        return Ok(StepOutcome::Stashed);
    }
    if height < missing {
        tracing::warn!(height, missing, "dropping stale peer block");
        return Ok(StepOutcome::Dropped);
    }
    core.check_block(&block).await?;
    core.push_block(height, block).await?;
    Ok(StepOutcome::Applied)
}

async fn tx_worker(core: Core, mut rx: mpsc::Receiver<TxKind>, mut stop: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = stop.recv() => {
                tracing::info!("tx worker stopping");
                return;
            }
            maybe_tx = rx.recv() => {
                match maybe_tx {
                    Some(tx) => {
                        if let Err(err) = core.meta.lock().await.stage_tx(tx) {
                            tracing::warn!(error = %err, "tx rejected at intake");
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

/// Minimal acceptance check for a billing request: at least one signature,
/// and every signature verifies against at least one receiver address
/// named in the request. Full verification against a per-database miner
/// roster is not modeled here (see `DESIGN.md`).
fn verify_billing_request(request: &BillingRequest) -> bool {
    if request.signatures.is_empty() {
        return false;
    }
    let bytes = match bincode::serialize(&request.header) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    request.signatures.iter().all(|sig| {
        request
            .header
            .gas_amounts
            .iter()
            .any(|(addr, _)| chain_core::crypto::verify_signature(&bytes, sig, addr.as_bytes()))
    })
}

/// Handle for interacting with a spawned engine's cooperative tasks.
#[derive(Clone)]
pub struct EngineHandle {
    core: Core,
    blocks_from_rpc: mpsc::Sender<BlockSubmission>,
    pending_txs: mpsc::Sender<TxKind>,
    stop: broadcast::Sender<()>,
}

impl EngineHandle {
    /// Current local head height, if any block has been pushed yet.
    pub async fn head_height(&self) -> Option<u64> {
        self.core.index.read().await.height()
    }

    /// Submit a peer-sourced block (however it reached this node —
    /// `AdviseNewBlock` push or a `FetchBlock` response) to the block
    /// worker's stash / check-and-push / drop dispatch.
    pub async fn submit_rpc_block(&self, height: u64, block: Block) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.blocks_from_rpc
            .send(BlockSubmission {
                height,
                block,
                source: BlockSource::Rpc,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| Error::MailboxClosed)?;
        ack_rx.await.map_err(|_| Error::MailboxClosed)?
    }

    /// Countersign a miner-submitted billing request into a `TxBilling`,
    /// enqueue it on the pending pool, and return the countersigned
    /// record. `fees[i] = gas_amounts[i].1 * gas_price`; rewards are
    /// always zero under the current policy (see `DESIGN.md`).
    ///
    /// Nonce allocation and the handoff to the tx worker happen under the
    /// same meta-state lock acquisition: [`chain_core::MetaState::reserve_nonce`]
    /// hands out a strictly increasing value the instant it's called, and
    /// holding the lock across the `pending_txs` send guarantees this
    /// transaction reaches the tx worker before any later reservation for
    /// the same account can be made — without that, two requests racing
    /// for the same account could be handed, and sign, the same nonce.
    pub async fn produce_tx_billing(&self, request: &BillingRequest) -> Result<TxBilling> {
        if !verify_billing_request(request) {
            return Err(Error::TxSignatureInvalid);
        }

        let gas_price = self.core.gas_price;
        let fees: Vec<(Address, u64)> = request.header.gas_amounts.iter().map(|(addr, gas)| (*addr, *gas * gas_price)).collect();
        let rewards: Vec<(Address, u64)> = request.header.gas_amounts.iter().map(|(addr, _)| (*addr, 0)).collect();
        let account = self.core.keypair.address();

        let mut meta = self.core.meta.lock().await;
        let nonce = meta.reserve_nonce(account);

        let mut tx = TxBilling {
            account,
            nonce,
            fees,
            rewards,
            signature: Signature::from_bytes([0u8; 64]),
        };
        let unsigned = TxKind::Billing(tx.clone());
        let bytes = bincode::serialize(&unsigned).map_err(chain_core::Error::from)?;
        tx.signature = self.core.keypair.sign(&bytes);

        self.pending_txs.send(TxKind::Billing(tx.clone())).await.map_err(|_| Error::MailboxClosed)?;
        drop(meta);
        Ok(tx)
    }

    /// Signal every cooperative task to stop.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}
