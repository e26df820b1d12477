//! Threshold-gated payload compression for remote relay. Local delivery
//! never compresses; only payloads crossing the Channel Broker are
//! candidates, and only once they exceed `compressionThreshold` bytes.

#[cfg(feature = "compression")]
pub fn maybe_compress(payload: &[u8], threshold: usize) -> (Vec<u8>, bool) {
    if payload.len() <= threshold {
        return (payload.to_vec(), false);
    }
    match zstd::stream::encode_all(payload, 0) {
        Ok(compressed) if compressed.len() < payload.len() => (compressed, true),
        _ => (payload.to_vec(), false),
    }
}

#[cfg(not(feature = "compression"))]
pub fn maybe_compress(payload: &[u8], _threshold: usize) -> (Vec<u8>, bool) {
    (payload.to_vec(), false)
}

#[cfg(feature = "compression")]
pub fn decompress(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    zstd::stream::decode_all(payload)
}

#[cfg(not(feature = "compression"))]
pub fn decompress(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    Ok(payload.to_vec())
}
