use std::fmt::Display;

use crate::{
    charset::{DIGITS, LOWERCASE, SPECIAL, UPPERCASE},
    error::{ConfigError, ConfigResult},
    Charset, MAX_PASSWORD_LENGTH_ALLOWED,
};

/// The symbols of `?a`: lowercase, uppercase, digits and specials.
const ALL_PRINTABLE: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\
0123456789!@#$%^&*()_+-=[]{}|;:,.<>?";

/// The placeholders accepted in a mask, after a `?`.
pub const MASK_PLACEHOLDERS: [(char, &str); 7] = [
    ('l', LOWERCASE),
    ('u', UPPERCASE),
    ('d', DIGITS),
    ('s', SPECIAL),
    ('a', ALL_PRINTABLE),
    ('h', "0123456789abcdef"),
    ('H', "0123456789ABCDEF"),
];

/// Fixed-length candidates with one charset per position, such as `?u?l?l?d?d`.
///
/// Any other character is a literal, and `??` is a literal question mark.
/// Candidates are ordered lexicographically by charset position, the last
/// position varying fastest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pattern: String,
    positions: Vec<Charset>,
    size: u128,
}

impl Mask {
    pub fn parse(pattern: &str) -> ConfigResult<Self> {
        let mut positions = Vec::new();
        let mut chars = pattern.chars();

        while let Some(c) = chars.next() {
            if c != '?' {
                positions.push(Charset::new(&c.to_string())?);
                continue;
            }

            let symbols = match chars.next() {
                Some('?') => "?",
                Some(placeholder) => MASK_PLACEHOLDERS
                    .iter()
                    .find(|(name, _)| *name == placeholder)
                    .map(|(_, symbols)| *symbols)
                    .ok_or_else(|| ConfigError::MaskPlaceholder(format!("?{placeholder}")))?,
                None => return Err(ConfigError::MaskPlaceholder("?".to_owned())),
            };

            positions.push(Charset::new(symbols)?);
        }

        if positions.is_empty() {
            return Err(ConfigError::EmptyMask);
        }

        if positions.len() > MAX_PASSWORD_LENGTH_ALLOWED as usize {
            return Err(ConfigError::MaxLengthExceeded(MAX_PASSWORD_LENGTH_ALLOWED));
        }

        let size = positions
            .iter()
            .try_fold(1u128, |size, charset| size.checked_mul(charset.len() as u128))
            .ok_or_else(|| {
                let bits: f64 = positions.iter().map(|c| (c.len() as f64).log2()).sum();
                ConfigError::Space(bits.ceil() as u32)
            })?;

        Ok(Self {
            pattern: pattern.to_owned(),
            positions,
            size,
        })
    }

    /// The charset of each position. Literals are single-symbol charsets.
    pub fn positions(&self) -> &[Charset] {
        &self.positions
    }

    /// The length of every candidate.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The total number of candidates.
    pub fn size(&self) -> u128 {
        self.size
    }

    /// Writes the digits of the candidate at `index` into `digits`.
    /// Returns false if the index is past the end of the mask.
    pub fn digits_at(&self, index: u128, digits: &mut Vec<usize>) -> bool {
        if index >= self.size {
            return false;
        }

        let mut counter = index;
        digits.clear();
        digits.resize(self.positions.len(), 0);

        for (digit, charset) in digits.iter_mut().zip(&self.positions).rev() {
            let base = charset.len() as u128;
            *digit = (counter % base) as usize;
            counter /= base;
        }

        true
    }

    /// Moves the digits to the next candidate. Returns false when they wrap around.
    pub fn increment(&self, digits: &mut [usize]) -> bool {
        for (digit, charset) in digits.iter_mut().zip(&self.positions).rev() {
            *digit += 1;
            if *digit < charset.len() {
                return true;
            }
            *digit = 0;
        }

        false
    }

    pub fn candidate_at(&self, index: u128) -> Option<String> {
        let mut digits = Vec::with_capacity(self.positions.len());
        self.digits_at(index, &mut digits)
            .then(|| self.render(&digits))
    }

    /// Finds the index of a candidate.
    /// Returns `None` if the candidate cannot be produced by this mask.
    pub fn index_of(&self, candidate: &str) -> Option<u128> {
        if candidate.chars().count() != self.positions.len() {
            return None;
        }

        candidate
            .chars()
            .zip(&self.positions)
            .try_fold(0u128, |counter, (c, charset)| {
                Some(counter * charset.len() as u128 + charset.digit(c)? as u128)
            })
    }

    pub fn render(&self, digits: &[usize]) -> String {
        digits
            .iter()
            .zip(&self.positions)
            .map(|(&d, charset)| charset.symbol(d))
            .collect()
    }
}

impl Display for Mask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use crate::{
        charset::{DIGITS, LOWERCASE, SPECIAL, UPPERCASE},
        ConfigError, Mask,
    };

    #[test]
    fn test_parse() {
        let mask = Mask::parse("?u?l?d!").unwrap();

        assert_eq!(mask.len(), 4);
        assert_eq!(mask.size(), 26 * 26 * 10);
        assert_eq!(mask.positions()[0].to_string(), UPPERCASE);
        assert_eq!(mask.positions()[3].to_string(), "!");
        assert_eq!(mask.to_string(), "?u?l?d!");
    }

    #[test]
    fn test_all_printable() {
        let mask = Mask::parse("?a").unwrap();

        assert_eq!(
            mask.positions()[0].to_string(),
            [LOWERCASE, UPPERCASE, DIGITS, SPECIAL].concat()
        );
    }

    #[test]
    fn test_literal_question_mark() {
        let mask = Mask::parse("a??").unwrap();

        assert_eq!(mask.size(), 1);
        assert_eq!(mask.candidate_at(0).as_deref(), Some("a?"));
    }

    #[test]
    fn test_invalid_masks() {
        assert_eq!(Mask::parse(""), Err(ConfigError::EmptyMask));
        assert_eq!(
            Mask::parse("?x"),
            Err(ConfigError::MaskPlaceholder("?x".to_owned()))
        );
        assert_eq!(
            Mask::parse("ab?"),
            Err(ConfigError::MaskPlaceholder("?".to_owned()))
        );
        assert_eq!(
            Mask::parse(&"?d".repeat(17)),
            Err(ConfigError::MaxLengthExceeded(16))
        );
    }

    #[test]
    fn test_enumeration_order() {
        let mask = Mask::parse("?h-?d").unwrap();
        let candidates = (0..mask.size())
            .map(|i| mask.candidate_at(i).unwrap())
            .collect_vec();

        assert_eq!(candidates.len(), 160);
        assert_eq!(candidates[..3], ["0-0", "0-1", "0-2"]);
        assert_eq!(candidates[10], "1-0");
        assert_eq!(candidates[159], "f-9");
        assert_eq!(mask.candidate_at(160), None);
    }

    #[test]
    fn test_increment_matches_indexing() {
        let mask = Mask::parse("?d?hx").unwrap();
        let mut digits = Vec::new();
        mask.digits_at(0, &mut digits);

        for i in 0..mask.size() {
            assert_eq!(mask.render(&digits), mask.candidate_at(i).unwrap());
            assert_eq!(mask.index_of(&mask.render(&digits)), Some(i));
            assert_eq!(mask.increment(&mut digits), i + 1 < mask.size());
        }

        assert_eq!(mask.index_of("0a"), None);
        assert_eq!(mask.index_of("0gx"), None);
    }
}
