use rand::Rng;

pub const MIN_CODE_DIGITS: usize = 4;
pub const MAX_CODE_DIGITS: usize = 6;

/// Generate a numeric one-time code with exactly `digits` digits.
///
/// Leading zeros are kept, so "0042" is a valid 4-digit code. `digits`
/// is clamped to the supported 4..=6 range.
pub fn generate_numeric_code(digits: usize) -> String {
    let digits = digits.clamp(MIN_CODE_DIGITS, MAX_CODE_DIGITS);
    let mut rng = rand::thread_rng();
    (0..digits)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// True when `code` is a 4 to 6 digit ASCII numeric string
pub fn is_valid_code_format(code: &str) -> bool {
    (MIN_CODE_DIGITS..=MAX_CODE_DIGITS).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_digit())
}
