/// Generate a binding password using a CSPRNG (ChaCha12 via `thread_rng`).
///
/// 32-char alphanumeric (~190 bits of entropy). Alphanumeric only, so the
/// password never needs escaping inside a connection string.
pub fn generate_secret() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const LENGTH: usize = 32;
    let mut rng = rand::thread_rng();
    (0..LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
