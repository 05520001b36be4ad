use rand::Rng;

/// Characters used for invite and certificate codes
pub const ALPHABET: &[u8] = b"QWERTYUIOPASDFGHJKLZXCVBNM1234567890";

/// Random code of `len` characters from [`ALPHABET`]
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
