use rand::RngExt;
use rand::seq::SliceRandom;

pub const PASSWORD_LENGTH: usize = 10;

// Look-alike characters (i, l, 1, L, o, 0, O and friends) are left out.
const LOWERCASE: &[u8] = b"abcdefghjkmnpqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()+_-=}{[]?";

/// Console password for a new account: every character class appears at
/// least once.
pub fn generate() -> String {
    let mut rng = rand::rng();
    let classes = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];
    let mut chars = Vec::with_capacity(PASSWORD_LENGTH);
    for class in classes {
        chars.push(class[rng.random_range(0..class.len())]);
    }
    let pool = classes.concat();
    while chars.len() < PASSWORD_LENGTH {
        chars.push(pool[rng.random_range(0..pool.len())]);
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_cover_every_class() {
        for _ in 0..50 {
            let password = generate();
            assert_eq!(password.len(), PASSWORD_LENGTH);
            assert!(password.bytes().any(|b| LOWERCASE.contains(&b)));
            assert!(password.bytes().any(|b| UPPERCASE.contains(&b)));
            assert!(password.bytes().any(|b| DIGITS.contains(&b)));
            assert!(password.bytes().any(|b| SYMBOLS.contains(&b)));
            assert!(!password.contains(['l', '1', 'I', '0', 'O', 'o']));
        }
    }
}
