use burrow_core::{BlockId, Codec, CodecError, Node, TreeError};

/// Fixed node header: `{is_leaf: u8, key_count: u32, value_bytes: u32,
/// children_count: u32}`. The key and value sections follow as concatenated
/// self-describing encodings, then the child ids as little-endian u32s.
const NODE_HEADER_LEN: usize = 13;

pub(crate) fn encode_node<K: Codec, V: Codec>(
    node: &Node<K, V>,
    block_size: usize,
) -> Result<Vec<u8>, TreeError> {
    let value_bytes: usize = node.values.iter().map(Codec::encoded_len).sum();

    let mut buf = Vec::with_capacity(block_size);
    buf.push(node.is_leaf as u8);
    buf.extend_from_slice(&(node.keys.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value_bytes as u32).to_le_bytes());
    buf.extend_from_slice(&(node.children.len() as u32).to_le_bytes());

    for key in &node.keys {
        key.encode(&mut buf);
    }

    for value in &node.values {
        value.encode(&mut buf);
    }

    for child in &node.children {
        buf.extend_from_slice(&child.to_le_bytes());
    }

    if buf.len() > block_size {
        return Err(TreeError::NodeOverflow {
            needed: buf.len(),
            limit: block_size,
        });
    }

    buf.resize(block_size, 0);
    Ok(buf)
}

pub(crate) fn decode_node<K: Codec, V: Codec>(
    id: BlockId,
    raw: &[u8],
) -> Result<Node<K, V>, TreeError> {
    if raw.len() < NODE_HEADER_LEN {
        return Err(CodecError::ShortBuffer {
            needed: NODE_HEADER_LEN,
            had: raw.len(),
        }
        .into());
    }

    let is_leaf = raw[0] != 0;
    let key_count = u32::from_le_bytes(raw[1..5].try_into().unwrap()) as usize;
    let value_bytes = u32::from_le_bytes(raw[5..9].try_into().unwrap()) as usize;
    let children_count = u32::from_le_bytes(raw[9..13].try_into().unwrap()) as usize;

    let mut offset = NODE_HEADER_LEN;

    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        let (key, used) = K::decode(&raw[offset..])?;
        keys.push(key);
        offset += used;
    }

    let value_end = offset + value_bytes;

    let mut values = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        let (value, used) = V::decode(&raw[offset..])?;
        values.push(value);
        offset += used;
    }

    if offset != value_end {
        return Err(CodecError::Invalid(format!(
            "value section of node {id} ended at byte {offset}, header says {value_end}"
        ))
        .into());
    }

    let mut children = Vec::with_capacity(children_count);
    for _ in 0..children_count {
        if raw.len() < offset + 4 {
            return Err(CodecError::ShortBuffer {
                needed: offset + 4,
                had: raw.len(),
            }
            .into());
        }

        children.push(u32::from_le_bytes(raw[offset..offset + 4].try_into().unwrap()));
        offset += 4;
    }

    Ok(Node {
        id,
        is_leaf,
        keys,
        values,
        children,
    })
}
