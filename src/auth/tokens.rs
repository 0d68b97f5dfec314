use rand::{rngs::OsRng, RngCore};

/// Bytes of CSPRNG output behind each one-time token.
pub const ONE_TIME_TOKEN_BYTES: usize = 40;

/// Opaque single-use token bound to one user and one purpose (email
/// verification or password reset). Hex-encoded, 80 characters.
pub fn one_time_token() -> String {
    let mut buf = [0u8; ONE_TIME_TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
