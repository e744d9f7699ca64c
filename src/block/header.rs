use burrow_core::{BlockId, StoreError};

pub(crate) const MAGIC: u32 = 0x4244_4E31;
pub(crate) const VERSION: u16 = 1;

/// Sentinel block id for "no root" and "empty free list".
pub(crate) const NO_BLOCK: u32 = u32::MAX;

/// Bytes actually used by the header: magic, version, block size, root id,
/// free-list head. The rest of block 0 is reserved zero.
pub(crate) const RAW_LEN: usize = 18;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Header {
    pub block_size: u32,
    pub root: Option<BlockId>,
    pub free_head: Option<BlockId>,
}

impl Header {
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            root: None,
            free_head: None,
        }
    }

    /// Serializes the header into a full block-size buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.block_size as usize);

        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&self.block_size.to_le_bytes());
        buf.extend_from_slice(&self.root.unwrap_or(NO_BLOCK).to_le_bytes());
        buf.extend_from_slice(&self.free_head.unwrap_or(NO_BLOCK).to_le_bytes());
        buf.resize(self.block_size as usize, 0);

        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self, StoreError> {
        if raw.len() < RAW_LEN {
            return Err(StoreError::InvalidHeader(format!(
                "truncated header of {} bytes",
                raw.len()
            )));
        }

        let magic = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(StoreError::InvalidHeader(format!("bad magic 0x{magic:08x}")));
        }

        let version = u16::from_le_bytes(raw[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(StoreError::InvalidHeader(format!(
                "unsupported version {version}"
            )));
        }

        let block_size = u32::from_le_bytes(raw[6..10].try_into().unwrap());
        if (block_size as usize) < RAW_LEN {
            return Err(StoreError::InvalidHeader(format!(
                "implausible block size {block_size}"
            )));
        }

        let root = u32::from_le_bytes(raw[10..14].try_into().unwrap());
        let free_head = u32::from_le_bytes(raw[14..18].try_into().unwrap());

        Ok(Self {
            block_size,
            root: (root != NO_BLOCK).then_some(root),
            free_head: (free_head != NO_BLOCK).then_some(free_head),
        })
    }
}
