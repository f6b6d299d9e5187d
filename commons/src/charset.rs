use std::fmt::Display;

use crate::error::{ConfigError, ConfigResult};

/// The default charset: ASCII letters, digits and twelve symbols.
pub const DEFAULT_CHARSET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()-_";

/// The default maximum password length.
pub const DEFAULT_MAX_PASSWORD_LENGTH: u8 = 6;

/// The maximum password size allowed.
pub const MAX_PASSWORD_LENGTH_ALLOWED: u8 = 16;

pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DIGITS: &str = "0123456789";
pub const SPECIAL: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Named charsets accepted by [`Charset::preset`].
pub const PRESETS: [(&str, &str); 7] = [
    ("lowercase", LOWERCASE),
    ("uppercase", UPPERCASE),
    ("digits", DIGITS),
    ("special", SPECIAL),
    (
        "alphanumeric",
        "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
    ),
    ("space", " "),
    ("default", DEFAULT_CHARSET),
];

/// An ordered set of distinct symbols.
/// The position of a symbol is its digit value when enumerating candidates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Charset {
    symbols: Vec<char>,
}

impl Default for Charset {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_CHARSET.chars().collect(),
        }
    }
}

impl Charset {
    /// Creates a charset, keeping the order of the symbols.
    pub fn new(symbols: &str) -> ConfigResult<Self> {
        if symbols.is_empty() {
            return Err(ConfigError::EmptyCharset);
        }

        let mut seen = Vec::new();
        for c in symbols.chars() {
            if seen.contains(&c) {
                return Err(ConfigError::DuplicateSymbol(c));
            }
            seen.push(c);
        }

        Ok(Self { symbols: seen })
    }

    /// Creates a charset from one of the [`PRESETS`].
    pub fn preset(name: &str) -> ConfigResult<Self> {
        PRESETS
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, symbols)| Self::new(symbols))
            .unwrap_or_else(|| Err(ConfigError::UnknownPreset(name.to_owned())))
    }

    /// The number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The symbols, in enumeration order.
    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    /// Converts a digit to its symbol.
    #[inline]
    pub fn symbol(&self, digit: usize) -> char {
        self.symbols[digit]
    }

    /// Converts a symbol to its digit.
    #[inline]
    pub fn digit(&self, c: char) -> Option<usize> {
        self.symbols.iter().position(|x| *x == c)
    }
}

impl Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.symbols.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

/// All the strings of length 1 to `max_length` over a charset.
///
/// Candidates are grouped by increasing length, and ordered lexicographically
/// by charset position within a length. Any index can be converted back and
/// forth without enumerating the candidates before it.
#[derive(Clone, Debug)]
pub struct Keyspace {
    charset: Charset,
    max_length: u8,
    /// `search_spaces[l - 1]` is the index of the first candidate of length `l`.
    /// The last element is the size of the keyspace.
    search_spaces: Vec<u128>,
}

impl Keyspace {
    /// Creates a keyspace, making sure its size fits in 128 bits.
    pub fn new(charset: Charset, max_length: u8) -> ConfigResult<Self> {
        if max_length > MAX_PASSWORD_LENGTH_ALLOWED {
            return Err(ConfigError::MaxLengthExceeded(MAX_PASSWORD_LENGTH_ALLOWED));
        }

        let base = charset.len() as u128;
        let overflow = || {
            let bits = (charset.len() as f64).log2() * max_length as f64;
            ConfigError::Space(bits.ceil() as u32)
        };

        let mut n: u128 = 0;
        let mut search_spaces = vec![n];
        for len in 1..=max_length as u32 {
            let width = base.checked_pow(len).ok_or_else(overflow)?;
            n = n.checked_add(width).ok_or_else(overflow)?;
            search_spaces.push(n);
        }

        Ok(Self {
            charset,
            max_length,
            search_spaces,
        })
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    pub fn max_length(&self) -> u8 {
        self.max_length
    }

    /// The total number of candidates.
    pub fn size(&self) -> u128 {
        self.search_spaces[self.search_spaces.len() - 1]
    }

    /// The index of the first candidate of the given length.
    pub fn block_start(&self, len: u8) -> Option<u128> {
        (1..=self.max_length)
            .contains(&len)
            .then(|| self.search_spaces[len as usize - 1])
    }

    /// Writes the digits of the candidate at `index` into `digits`, most significant first.
    /// Returns false if the index is past the end of the keyspace.
    pub fn digits_at(&self, index: u128, digits: &mut Vec<usize>) -> bool {
        if index >= self.size() {
            return false;
        }

        let len = self.search_spaces.partition_point(|start| *start <= index);
        let base = self.charset.len() as u128;
        let mut counter = index - self.search_spaces[len - 1];

        digits.clear();
        digits.resize(len, 0);
        for digit in digits.iter_mut().rev() {
            *digit = (counter % base) as usize;
            counter /= base;
        }

        true
    }

    /// Creates the candidate at `index`.
    pub fn candidate_at(&self, index: u128) -> Option<String> {
        let mut digits = Vec::with_capacity(self.max_length as usize);
        self.digits_at(index, &mut digits)
            .then(|| self.render(&digits))
    }

    /// Finds the index of a candidate.
    /// Returns `None` if the candidate cannot be produced by this keyspace.
    pub fn index_of(&self, candidate: &str) -> Option<u128> {
        let len = candidate.chars().count();
        if len == 0 || len > self.max_length as usize {
            return None;
        }

        let base = self.charset.len() as u128;
        let mut counter: u128 = 0;
        for c in candidate.chars() {
            counter = counter * base + self.charset.digit(c)? as u128;
        }

        Some(self.search_spaces[len - 1] + counter)
    }

    /// Converts digits to the candidate they represent.
    pub fn render(&self, digits: &[usize]) -> String {
        digits.iter().map(|&d| self.charset.symbol(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use crate::{Charset, ConfigError, Keyspace, DEFAULT_CHARSET, MAX_PASSWORD_LENGTH_ALLOWED};

    fn build_test_keyspace() -> Keyspace {
        Keyspace::new(Charset::new("abc").unwrap(), 3).unwrap()
    }

    #[test]
    fn test_default_charset() {
        let charset = Charset::default();

        assert_eq!(charset.len(), 74);
        assert_eq!(charset.to_string(), DEFAULT_CHARSET);
    }

    #[test]
    fn test_duplicate_symbol() {
        assert_eq!(Charset::new("abca"), Err(ConfigError::DuplicateSymbol('a')));
        assert_eq!(Charset::new(""), Err(ConfigError::EmptyCharset));
    }

    #[test]
    fn test_presets() {
        assert_eq!(Charset::preset("digits").unwrap().len(), 10);
        assert_eq!(Charset::preset("Default").unwrap(), Charset::default());
        assert!(matches!(
            Charset::preset("klingon"),
            Err(ConfigError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_sizes() {
        let keyspace = build_test_keyspace();

        assert_eq!(keyspace.size(), 3 + 9 + 27);
        assert_eq!(keyspace.block_start(1), Some(0));
        assert_eq!(keyspace.block_start(2), Some(3));
        assert_eq!(keyspace.block_start(3), Some(12));
        assert_eq!(keyspace.block_start(4), None);
    }

    #[test]
    fn test_enumeration_order() {
        let keyspace = Keyspace::new(Charset::new("ab").unwrap(), 2).unwrap();
        let expected = ["a", "b", "aa", "ab", "ba", "bb"];

        assert!(expected
            .into_iter()
            .eq((0..keyspace.size()).map(|i| keyspace.candidate_at(i).unwrap())));
        assert_eq!(keyspace.candidate_at(6), None);
    }

    #[test]
    fn test_charset_order_is_kept() {
        let keyspace = Keyspace::new(Charset::new("ba").unwrap(), 2).unwrap();

        assert_eq!(
            (0..keyspace.size())
                .map(|i| keyspace.candidate_at(i).unwrap())
                .collect_vec(),
            ["b", "a", "bb", "ba", "ab", "aa"]
        );
    }

    #[test]
    fn test_index_round_trip() {
        let keyspace = build_test_keyspace();

        for i in 0..keyspace.size() {
            let candidate = keyspace.candidate_at(i).unwrap();
            assert_eq!(keyspace.index_of(&candidate), Some(i));
        }

        assert_eq!(keyspace.index_of(""), None);
        assert_eq!(keyspace.index_of("abcd"), None);
        assert_eq!(keyspace.index_of("abz"), None);
    }

    #[test]
    fn test_max_length_zero() {
        let keyspace = Keyspace::new(Charset::default(), 0).unwrap();

        assert_eq!(keyspace.size(), 0);
        assert_eq!(keyspace.candidate_at(0), None);
    }

    #[test]
    fn test_large_keyspace() {
        let keyspace = Keyspace::new(Charset::default(), MAX_PASSWORD_LENGTH_ALLOWED).unwrap();
        let last = keyspace.size() - 1;
        let first_of_longest = keyspace.block_start(16).unwrap();

        assert_eq!(keyspace.candidate_at(last).unwrap(), "_".repeat(16));
        assert_eq!(keyspace.candidate_at(first_of_longest).unwrap(), "a".repeat(16));
        assert_eq!(keyspace.index_of(&"_".repeat(16)), Some(last));
    }

    #[test]
    fn test_limits() {
        assert_eq!(
            Keyspace::new(Charset::default(), 17).unwrap_err(),
            ConfigError::MaxLengthExceeded(16)
        );

        let huge: String = ('\u{100}'..'\u{1100}').collect();
        assert!(matches!(
            Keyspace::new(Charset::new(&huge).unwrap(), 16),
            Err(ConfigError::Space(_))
        ));
    }
}
