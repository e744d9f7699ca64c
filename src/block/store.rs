use std::collections::VecDeque;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use burrow_core::{BlockId, StoreConfig, StoreError, WriteSeq};

use super::header::{Header, NO_BLOCK, RAW_LEN};
use super::pipeline::{self, WriteOp};

/// Free-list chain entry: the first 4 bytes of a free block point at the
/// next free block.
const CHAIN_LEN: usize = 4;

struct Meta {
    header: Header,
    free: VecDeque<BlockId>,
    blocks: u32,
}

struct Inner {
    file: Arc<Mutex<File>>,
    block_size: u32,
    meta: std::sync::Mutex<Meta>,
    queue: std::sync::Mutex<Option<mpsc::Sender<WriteOp>>>,
    submitted: AtomicU64,
    watermark: watch::Receiver<WriteSeq>,
    disposed: AtomicBool,
    cancel: CancellationToken,
    drainer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Fixed-size block storage over a single file, with a write-behind
/// pipeline. See the module docs for the read-after-write contract.
#[derive(Clone)]
pub struct BlockStore {
    inner: Arc<Inner>,
}

impl BlockStore {
    /// Opens or creates the store at the configured path. The cancellation
    /// token is the ambient signal for every operation on this store.
    pub async fn open(config: &StoreConfig, cancel: CancellationToken) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.path)
            .await?;

        let len = file.metadata().await?.len();

        let (header, blocks) = if len == 0 {
            let header = Header::new(config.block_size());
            file.write_all(&header.encode()).await?;
            file.flush().await?;
            (header, 1)
        } else {
            let mut raw = [0u8; RAW_LEN];
            file.seek(SeekFrom::Start(0)).await?;
            file.read_exact(&mut raw)
                .await
                .map_err(|_| StoreError::ShortRead(0))?;

            let header = Header::decode(&raw)?;

            if len % header.block_size as u64 != 0 {
                return Err(StoreError::InvalidHeader(format!(
                    "file length {len} is not a multiple of block size {}",
                    header.block_size
                )));
            }

            let block_count = (len / header.block_size as u64) as u32;
            (header, block_count)
        };

        let block_size = header.block_size;
        let free = walk_free_list(&mut file, &header, blocks).await?;

        info!(
            path = %config.path.display(),
            block_size,
            blocks,
            free = free.len(),
            "block store open"
        );

        let file = Arc::new(Mutex::new(file));
        let (queue_tx, queue_rx) = mpsc::channel(config.write_queue());
        let (watermark_tx, watermark_rx) = watch::channel(0);

        let inner = Arc::new(Inner {
            file: file.clone(),
            block_size,
            meta: std::sync::Mutex::new(Meta {
                header,
                free,
                blocks,
            }),
            queue: std::sync::Mutex::new(Some(queue_tx)),
            submitted: AtomicU64::new(0),
            watermark: watermark_rx,
            disposed: AtomicBool::new(false),
            cancel: cancel.clone(),
            drainer: std::sync::Mutex::new(None),
        });

        let handle = tokio::spawn(pipeline::drain(
            file,
            block_size,
            queue_rx,
            watermark_tx,
            cancel,
        ));

        *inner.drainer.lock().map_err(|_| StoreError::LockPoisoned)? = Some(handle);

        Ok(Self { inner })
    }

    pub fn block_size(&self) -> u32 {
        self.inner.block_size
    }

    /// Number of blocks currently backed by the file, header included.
    pub fn block_count(&self) -> Result<u32, StoreError> {
        Ok(self.meta()?.blocks)
    }

    /// Sequence of the last write the drainer has processed.
    pub fn drained(&self) -> WriteSeq {
        *self.inner.watermark.borrow()
    }

    fn meta(&self) -> Result<std::sync::MutexGuard<'_, Meta>, StoreError> {
        self.inner.meta.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn ensure_live(&self) -> Result<(), StoreError> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed);
        }

        if self.inner.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        Ok(())
    }

    /// Reads block `id` directly from the file, bypassing the write queue.
    /// Returns exactly `block_size` bytes or fails.
    pub async fn read(&self, id: BlockId) -> Result<Vec<u8>, StoreError> {
        self.ensure_live()?;

        let mut buf = vec![0u8; self.inner.block_size as usize];
        let mut file = self.inner.file.lock().await;

        file.seek(SeekFrom::Start(id as u64 * self.inner.block_size as u64))
            .await?;
        file.read_exact(&mut buf).await.map_err(|error| {
            if error.kind() == std::io::ErrorKind::UnexpectedEof {
                StoreError::ShortRead(id)
            } else {
                StoreError::Io(error)
            }
        })?;

        Ok(buf)
    }

    /// Submits a full-block write. Returns once the bounded queue accepted
    /// the operation, blocking the caller while the queue is full.
    pub async fn write(&self, id: BlockId, payload: Vec<u8>) -> Result<WriteSeq, StoreError> {
        self.ensure_live()?;

        if payload.len() != self.inner.block_size as usize {
            return Err(StoreError::BadBlockSize {
                got: payload.len(),
                want: self.inner.block_size as usize,
            });
        }

        self.submit(id, payload).await
    }

    async fn submit(&self, block: BlockId, payload: Vec<u8>) -> Result<WriteSeq, StoreError> {
        let sender = {
            let queue = self
                .inner
                .queue
                .lock()
                .map_err(|_| StoreError::LockPoisoned)?;
            queue.clone().ok_or(StoreError::Disposed)?
        };

        let seq = self.inner.submitted.fetch_add(1, Ordering::AcqRel) + 1;

        sender
            .send(WriteOp {
                seq,
                block,
                payload,
            })
            .await
            .map_err(|_| {
                if self.inner.cancel.is_cancelled() {
                    StoreError::Cancelled
                } else {
                    StoreError::Disposed
                }
            })?;

        Ok(seq)
    }

    /// Hands out a block id, reusing the free list before growing the file.
    pub async fn allocate(&self) -> Result<BlockId, StoreError> {
        self.ensure_live()?;

        let reused = {
            let mut meta = self.meta()?;
            match meta.free.pop_front() {
                Some(id) => {
                    meta.header.free_head = meta.free.front().copied();
                    Some((id, meta.header.clone()))
                }
                None => None,
            }
        };

        if let Some((id, header)) = reused {
            self.persist_header(header).await?;
            debug!(block = id, "block reused from free list");
            return Ok(id);
        }

        // the file lock serializes the reserve-and-grow pair
        let file = self.inner.file.lock().await;

        let (id, grown_len) = {
            let mut meta = self.meta()?;
            let id = meta.blocks;
            meta.blocks += 1;
            (id, meta.blocks as u64 * self.inner.block_size as u64)
        };

        file.set_len(grown_len).await?;

        debug!(block = id, "file extended for new block");
        Ok(id)
    }

    /// Returns a block to the free list, chaining it in front of the
    /// current head.
    pub async fn free(&self, id: BlockId) -> Result<(), StoreError> {
        self.ensure_live()?;

        let (chain, header) = {
            let mut meta = self.meta()?;

            let old_head = meta.header.free_head.unwrap_or(NO_BLOCK);
            meta.header.free_head = Some(id);
            meta.free.push_front(id);

            let mut chain = vec![0u8; self.inner.block_size as usize];
            chain[..CHAIN_LEN].copy_from_slice(&old_head.to_le_bytes());

            (chain, meta.header.clone())
        };

        self.submit(id, chain).await?;
        self.persist_header(header).await?;

        Ok(())
    }

    pub fn root_id(&self) -> Result<Option<BlockId>, StoreError> {
        Ok(self.meta()?.header.root)
    }

    /// Dedicated header update for the node manager's root pointer, so the
    /// header block keeps a single writer path.
    pub async fn set_root(&self, root: Option<BlockId>) -> Result<(), StoreError> {
        self.ensure_live()?;

        let header = {
            let mut meta = self.meta()?;
            meta.header.root = root;
            meta.header.clone()
        };

        self.persist_header(header).await
    }

    async fn persist_header(&self, header: Header) -> Result<(), StoreError> {
        self.submit(0, header.encode()).await?;
        Ok(())
    }

    /// Waits until the drainer has processed everything submitted so far.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.ensure_live()?;

        let target = self.inner.submitted.load(Ordering::Acquire);
        let mut watermark = self.inner.watermark.clone();

        while *watermark.borrow() < target {
            watermark.changed().await.map_err(|_| {
                if self.inner.cancel.is_cancelled() {
                    StoreError::Cancelled
                } else {
                    StoreError::Disposed
                }
            })?;
        }

        Ok(())
    }

    /// Tears the store down: refuses new submissions, lets the drainer
    /// finish the backlog (best-effort if cancellation fired), then syncs
    /// and releases the file. Idempotent.
    pub async fn close(&self) -> Result<(), StoreError> {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let sender = self
            .inner
            .queue
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .take();
        drop(sender);

        let handle = self
            .inner
            .drainer
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .take();

        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(%error, "write pipeline task failed");
            }
        }

        let file = self.inner.file.lock().await;
        file.sync_all().await?;

        info!("block store closed");
        Ok(())
    }
}

async fn walk_free_list(
    file: &mut File,
    header: &Header,
    blocks: u32,
) -> Result<VecDeque<BlockId>, StoreError> {
    let mut free = VecDeque::new();
    let mut cursor = header.free_head;

    while let Some(id) = cursor {
        if id == 0 || id >= blocks || free.len() >= blocks as usize {
            return Err(StoreError::InvalidHeader(format!(
                "free list points at invalid block {id}"
            )));
        }

        free.push_back(id);

        let mut raw = [0u8; CHAIN_LEN];
        file.seek(SeekFrom::Start(id as u64 * header.block_size as u64))
            .await?;
        file.read_exact(&mut raw)
            .await
            .map_err(|_| StoreError::ShortRead(id))?;

        let next = u32::from_le_bytes(raw);
        cursor = (next != NO_BLOCK).then_some(next);
    }

    Ok(free)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> StoreConfig {
        let mut config = StoreConfig::new(dir.path().join("blocks.db"));
        config.block_size = Some(512);
        config
    }

    fn payload(store: &BlockStore, fill: u8) -> Vec<u8> {
        vec![fill; store.block_size() as usize]
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(&test_config(&dir), CancellationToken::new())
            .await
            .unwrap();

        let id = store.allocate().await.unwrap();
        assert_eq!(id, 1);

        store.write(id, payload(&store, 0xAB)).await.unwrap();
        store.flush().await.unwrap();

        let read = store.read(id).await.unwrap();
        assert_eq!(read, payload(&store, 0xAB));

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn writes_drain_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(&test_config(&dir), CancellationToken::new())
            .await
            .unwrap();

        let id = store.allocate().await.unwrap();

        for fill in 0..50u8 {
            store.write(id, payload(&store, fill)).await.unwrap();
        }

        store.flush().await.unwrap();
        assert_eq!(store.read(id).await.unwrap(), payload(&store, 49));

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_wrong_payload_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(&test_config(&dir), CancellationToken::new())
            .await
            .unwrap();

        let err = store.write(1, vec![0u8; 13]).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::BadBlockSize { got: 13, want: 512 }
        ));

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn short_read_past_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(&test_config(&dir), CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            store.read(9).await,
            Err(StoreError::ShortRead(9))
        ));

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn free_list_reuses_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(&test_config(&dir), CancellationToken::new())
            .await
            .unwrap();

        let a = store.allocate().await.unwrap();
        let b = store.allocate().await.unwrap();
        let c = store.allocate().await.unwrap();
        assert_eq!((a, b, c), (1, 2, 3));

        store.free(b).await.unwrap();
        store.free(a).await.unwrap();

        // most recently freed comes back first
        assert_eq!(store.allocate().await.unwrap(), a);
        assert_eq!(store.allocate().await.unwrap(), b);
        assert_eq!(store.allocate().await.unwrap(), 4);

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn header_and_free_list_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        {
            let store = BlockStore::open(&config, CancellationToken::new())
                .await
                .unwrap();

            let a = store.allocate().await.unwrap();
            let b = store.allocate().await.unwrap();
            store.write(a, payload(&store, 1)).await.unwrap();
            store.write(b, payload(&store, 2)).await.unwrap();
            store.free(a).await.unwrap();
            store.set_root(Some(b)).await.unwrap();

            store.close().await.unwrap();
        }

        let store = BlockStore::open(&config, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.root_id().unwrap(), Some(2));
        assert_eq!(store.block_count().unwrap(), 3);
        assert_eq!(store.allocate().await.unwrap(), 1);
        assert_eq!(store.read(2).await.unwrap(), payload(&store, 2));

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_respects_header_block_size() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        {
            let store = BlockStore::open(&config, CancellationToken::new())
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        // a different configured size loses against the persisted header
        let mut reopened = config.clone();
        reopened.block_size = Some(8192);

        let store = BlockStore::open(&reopened, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.block_size(), 512);

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn disposed_store_refuses_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(&test_config(&dir), CancellationToken::new())
            .await
            .unwrap();

        store.close().await.unwrap();

        assert!(matches!(store.read(1).await, Err(StoreError::Disposed)));
        assert!(matches!(
            store.write(1, vec![0u8; 512]).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(store.allocate().await, Err(StoreError::Disposed)));

        // closing twice is fine
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_fails_reads_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let store = BlockStore::open(&test_config(&dir), cancel.clone())
            .await
            .unwrap();

        let id = store.allocate().await.unwrap();
        store.write(id, vec![0u8; 512]).await.unwrap();

        cancel.cancel();

        assert!(matches!(store.read(id).await, Err(StoreError::Cancelled)));
        assert!(matches!(
            store.write(id, vec![0u8; 512]).await,
            Err(StoreError::Cancelled)
        ));
    }
}
