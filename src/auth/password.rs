use sha2::{Digest, Sha256};

/// SHA-256 applications per hash
const ROUNDS: u32 = 10_000;
const SALT_LEN: usize = 16;

/// Salted, stretched SHA-256 of `password`, stored as `hex(salt)$hex(digest)`.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!(
        "{}${}",
        hex::encode(salt),
        hex::encode(stretch(&salt, password))
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };

    constant_time_eq(&stretch(&salt, password), &expected)
}

fn stretch(salt: &[u8], password: &str) -> [u8; 32] {
    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize()
        .into();

    for _ in 1..ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .finalize()
            .into();
    }

    digest
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("correct horse");
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("correct horsE", &stored));
        assert!(!verify_password("", &stored));
    }

    #[test]
    fn test_salt_differs_per_hash() {
        assert_ne!(hash_password("pw"), hash_password("pw"));
    }

    #[test]
    fn test_garbage_never_verifies() {
        for stored in ["", "$", "nothex$abcd", "abcd", "00$zz"] {
            assert!(!verify_password("pw", stored));
        }
    }
}
