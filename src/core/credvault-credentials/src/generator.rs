//! Random password and salt generation.

use rand::{rngs::OsRng, seq::SliceRandom, Rng};
use zeroize::Zeroizing;

use crate::error::CredentialError;
use crate::params::StringGenerationParameters;

/// Length used when the parameters do not set one.
pub const DEFAULT_PASSWORD_LENGTH: usize = 30;

/// Shortest password the generator produces.
pub const MIN_PASSWORD_LENGTH: usize = 4;

/// Longest password the generator produces.
pub const MAX_PASSWORD_LENGTH: usize = 200;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const SALT_CHARS: &[u8] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of generated user salts.
pub const SALT_LENGTH: usize = 16;

/// Generates a password from the OS CSPRNG.
///
/// The result contains at least one character of every included class.
///
/// # Errors
///
/// Returns [`CredentialError::InvalidParameters`] when the length is out of
/// bounds or every character class is excluded.
pub fn generate_password(
    params: &StringGenerationParameters,
) -> Result<Zeroizing<String>, CredentialError> {
    let length = params.length.unwrap_or(DEFAULT_PASSWORD_LENGTH);
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(CredentialError::InvalidParameters(format!(
            "length must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH}, got {length}"
        )));
    }

    let mut classes: Vec<&[u8]> = Vec::with_capacity(4);
    if !params.exclude_lower {
        classes.push(LOWER);
    }
    if !params.exclude_upper {
        classes.push(UPPER);
    }
    if !params.exclude_number {
        classes.push(DIGITS);
    }
    if params.include_special {
        classes.push(SPECIAL);
    }

    if classes.is_empty() {
        return Err(CredentialError::InvalidParameters(
            "at least one character class must be included".into(),
        ));
    }

    let alphabet: Vec<u8> = classes.concat();
    let mut rng = OsRng;

    let mut chars: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(length));
    for class in &classes {
        chars.push(class[rng.gen_range(0..class.len())]);
    }
    while chars.len() < length {
        chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    chars.shuffle(&mut rng);

    let password = chars.iter().map(|&b| b as char).collect::<String>();
    Ok(Zeroizing::new(password))
}

/// Generates a cleartext salt for user credentials.
pub fn generate_salt() -> String {
    let mut rng = OsRng;
    (0..SALT_LENGTH)
        .map(|_| SALT_CHARS[rng.gen_range(0..SALT_CHARS.len())] as char)
        .collect()
}
