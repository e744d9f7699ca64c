use std::io::SeekFrom;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use burrow_core::{BlockId, StoreError, WriteSeq};

pub(crate) struct WriteOp {
    pub seq: WriteSeq,
    pub block: BlockId,
    pub payload: Vec<u8>,
}

/// Single consumer of the write queue.
///
/// Pulls operations in submission order, persists each one, and publishes
/// the drain watermark. An I/O error drops the offending operation and the
/// pipeline keeps going; the watermark still advances so `flush` callers
/// never stall on a failed write.
///
/// The loop ends when the queue is closed (teardown: the backlog drains to
/// completion first) or when the cancellation token fires (any queued
/// operations are dropped).
pub(crate) async fn drain(
    file: Arc<Mutex<File>>,
    block_size: u32,
    mut queue: mpsc::Receiver<WriteOp>,
    watermark: watch::Sender<WriteSeq>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = queue.recv() => next,
        };

        let Some(op) = next else { break };

        if let Err(error) = persist(&file, block_size, &op).await {
            warn!(%error, block = op.block, "block write failed, dropping operation");
        }

        watermark.send_modify(|current| *current = (*current).max(op.seq));
    }

    debug!("write pipeline stopped");
}

async fn persist(file: &Mutex<File>, block_size: u32, op: &WriteOp) -> Result<(), StoreError> {
    let mut file = file.lock().await;

    file.seek(SeekFrom::Start(op.block as u64 * block_size as u64))
        .await?;
    file.write_all(&op.payload).await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::WriteZero {
            StoreError::ShortWrite(op.block)
        } else {
            StoreError::Io(error)
        }
    })?;
    file.flush().await?;

    Ok(())
}
