pub mod constants;

use rand::Rng;

/// Generate a fresh request id: a random base-36 suffix, one per public call.
pub(crate) fn new_request_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    (0..10)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
