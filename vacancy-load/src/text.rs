use rand::seq::SliceRandom;
use rand::Rng;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random strings for request payloads.
///
/// Without `repeated`, characters are drawn without replacement, so `length`
/// is capped at the alphabet size.
pub struct RandomText;

impl RandomText {
    pub fn lowercase<R: Rng>(rng: &mut R, length: usize, repeated: bool) -> String {
        Self::pick(rng, LOWERCASE, length, repeated)
    }

    pub fn uppercase<R: Rng>(rng: &mut R, length: usize, repeated: bool) -> String {
        Self::pick(rng, UPPERCASE, length, repeated)
    }

    pub fn randomcase<R: Rng>(rng: &mut R, length: usize, repeated: bool) -> String {
        Self::pick(rng, LETTERS, length, repeated)
    }

    /// Characters drawn with replacement from `alphabet`. Empty if the
    /// alphabet is.
    pub fn from_alphabet<R: Rng>(rng: &mut R, length: usize, alphabet: &str) -> String {
        let chars: Vec<char> = alphabet.chars().collect();
        (0..length)
            .filter_map(|_| chars.choose(rng).copied())
            .collect()
    }

    fn pick<R: Rng>(rng: &mut R, alphabet: &[u8], length: usize, repeated: bool) -> String {
        if repeated {
            (0..length)
                .filter_map(|_| alphabet.choose(rng).map(|b| *b as char))
                .collect()
        } else {
            alphabet
                .choose_multiple(rng, length)
                .map(|b| *b as char)
                .collect()
        }
    }
}
