/// Deterministic tie-break hash of `(requestId, providerId)` (§4.4 step 5):
/// spreads load across equal-weight candidates while keeping a given
/// request's ordering stable across retries of the same request, since the
/// hash is a pure function of immutable inputs rather than process state.
pub fn tie_break_hash(request_id: u64, provider_id: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&request_id.to_le_bytes());
    hasher.update(provider_id.as_bytes());
    let digest = hasher.finalize();
    let bytes = digest.as_bytes();
    u64::from_le_bytes(bytes[..8].try_into().expect("blake3 digest is 32 bytes"))
}
