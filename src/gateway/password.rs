use rand::seq::SliceRandom;
use rand::Rng;

use crate::constants::MIN_PASSWORD_LENGTH;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_-=+;:,.?";

/// Random password with at least one character from each class. Lengths below
/// the minimum are raised to it.
pub fn generate_password(length: usize) -> String {
    let length = length.max(MIN_PASSWORD_LENGTH);
    let classes = [LOWER, UPPER, DIGITS, SYMBOLS];
    let mut rng = rand::thread_rng();

    let mut chars: Vec<u8> = classes.iter().map(|class| class[rng.gen_range(0..class.len())]).collect();
    let all: Vec<u8> = classes.concat();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meets_length_and_complexity() {
        for _ in 0..50 {
            let password = generate_password(12);
            assert_eq!(password.len(), 12);
            assert!(password.bytes().any(|b| LOWER.contains(&b)));
            assert!(password.bytes().any(|b| UPPER.contains(&b)));
            assert!(password.bytes().any(|b| DIGITS.contains(&b)));
            assert!(password.bytes().any(|b| SYMBOLS.contains(&b)));
        }
    }

    #[test]
    fn short_lengths_are_raised() {
        assert_eq!(generate_password(3).len(), MIN_PASSWORD_LENGTH);
    }
}
