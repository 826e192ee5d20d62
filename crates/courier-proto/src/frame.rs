//! Frame-level helpers shared by the read and write paths.

use bytes::{BufMut, Bytes, BytesMut};

/// Separator between messages coalesced into a single write.
pub const BATCH_SEPARATOR: u8 = b'\n';

/// Fold newlines into spaces and strip surrounding whitespace.
///
/// Clients sometimes send pretty-printed JSON; a message must never contain
/// the batch separator once it has been through the relay.
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    let folded: Vec<u8> = raw
        .iter()
        .map(|&b| if b == BATCH_SEPARATOR { b' ' } else { b })
        .collect();
    folded.trim_ascii().to_vec()
}

/// Join encoded messages into one newline-delimited batch.
pub fn join_frames(frames: &[Bytes]) -> Bytes {
    match frames {
        [] => Bytes::new(),
        [single] => single.clone(),
        _ => {
            let len = frames.iter().map(Bytes::len).sum::<usize>() + frames.len() - 1;
            let mut batch = BytesMut::with_capacity(len);
            for (i, frame) in frames.iter().enumerate() {
                if i > 0 {
                    batch.put_u8(BATCH_SEPARATOR);
                }
                batch.put_slice(frame);
            }
            batch.freeze()
        },
    }
}
