use std::{fs::File, io::BufReader, path::PathBuf};

use hashrecover_commons::{Keyspace, Mask};
use tracing::debug;

use crate::{
    error::CrackResult,
    session::Affix,
    wordlist::{count_words, WordReader},
};

/// A candidate and its position in the sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub value: String,
    pub index: u128,
}

/// An ordered, lazy and restartable sequence of candidates.
///
/// After `seek(n)`, `next()` yields exactly what the n-th call to `next()`
/// would have yielded from the start.
pub trait CandidateSource: Send {
    /// Returns the next candidate, or `None` once the source is exhausted.
    fn next(&mut self) -> CrackResult<Option<Candidate>>;

    /// Positions the source so that the next candidate is the one at `index`.
    fn seek(&mut self, index: u128) -> CrackResult<()>;

    /// The total number of candidates, if it is known.
    fn total(&self) -> Option<u128>;
}

/// All the candidates of a keyspace, shortest first.
pub struct BruteForceSource {
    keyspace: Keyspace,
    digits: Vec<usize>,
    index: u128,
}

impl BruteForceSource {
    pub fn new(keyspace: Keyspace) -> Self {
        let mut digits = Vec::with_capacity(keyspace.max_length() as usize);
        keyspace.digits_at(0, &mut digits);

        Self {
            keyspace,
            digits,
            index: 0,
        }
    }

    /// Moves the digits to the next candidate, growing them when a length is exhausted.
    fn increment(&mut self) {
        let base = self.keyspace.charset().len();

        for digit in self.digits.iter_mut().rev() {
            *digit += 1;
            if *digit < base {
                return;
            }
            *digit = 0;
        }

        // every digit wrapped around, so this is the first candidate of the next length
        self.digits.push(0);
    }
}

impl CandidateSource for BruteForceSource {
    fn next(&mut self) -> CrackResult<Option<Candidate>> {
        if self.index >= self.keyspace.size() {
            return Ok(None);
        }

        let candidate = Candidate {
            value: self.keyspace.render(&self.digits),
            index: self.index,
        };

        self.index += 1;
        self.increment();

        Ok(Some(candidate))
    }

    fn seek(&mut self, index: u128) -> CrackResult<()> {
        self.index = index;
        if !self.keyspace.digits_at(index, &mut self.digits) {
            self.digits.clear();
        }

        Ok(())
    }

    fn total(&self) -> Option<u128> {
        Some(self.keyspace.size())
    }
}

/// The words of several wordlists, one wordlist after the other.
pub struct DictionarySource {
    wordlists: Vec<PathBuf>,
    /// The number of words of each wordlist, once it has been read entirely.
    counts: Vec<Option<u128>>,
    current: usize,
    reader: Option<WordReader<BufReader<File>>>,
    read_in_current: u128,
    index: u128,
}

impl DictionarySource {
    pub fn new(wordlists: Vec<PathBuf>) -> Self {
        Self {
            counts: vec![None; wordlists.len()],
            wordlists,
            current: 0,
            reader: None,
            read_in_current: 0,
            index: 0,
        }
    }

    /// Counts the words of every wordlist not read entirely yet, so the total becomes known.
    pub fn count(&mut self) -> CrackResult<u128> {
        for (path, count) in self.wordlists.iter().zip(self.counts.iter_mut()) {
            if count.is_none() {
                *count = Some(count_words(path)? as u128);
            }
        }

        Ok(self.counts.iter().flatten().sum())
    }

    /// Advances to the next word without allocating it.
    /// Returns false once every wordlist has been read.
    fn advance(&mut self) -> CrackResult<bool> {
        self.next_word().map(|word| word.is_some())
    }

    fn next_word(&mut self) -> CrackResult<Option<&str>> {
        loop {
            if self.reader.is_none() {
                let Some(path) = self.wordlists.get(self.current) else {
                    return Ok(None);
                };

                debug!(path = %path.display(), "opening wordlist");
                self.reader = Some(WordReader::open(path)?);
                self.read_in_current = 0;
            }

            let exhausted = match &mut self.reader {
                Some(reader) => reader.next_word()?.is_none(),
                None => true,
            };

            if exhausted {
                self.counts[self.current] = Some(self.read_in_current);
                self.current += 1;
                self.reader = None;
                continue;
            }

            break;
        }

        self.read_in_current += 1;
        self.index += 1;

        Ok(self.reader.as_ref().and_then(|reader| reader.current()))
    }
}

impl CandidateSource for DictionarySource {
    fn next(&mut self) -> CrackResult<Option<Candidate>> {
        let index = self.index;

        Ok(self.next_word()?.map(|word| Candidate {
            value: word.to_owned(),
            index,
        }))
    }

    fn seek(&mut self, index: u128) -> CrackResult<()> {
        self.current = 0;
        self.reader = None;
        self.index = 0;

        // wordlists of a known size are skipped without being opened
        while let Some(Some(count)) = self.counts.get(self.current) {
            if self.index + count > index {
                break;
            }
            self.index += count;
            self.current += 1;
        }

        debug!(
            index,
            wordlist = self.current,
            lines = index - self.index,
            "seeking in wordlists"
        );

        while self.index < index {
            if !self.advance()? {
                break;
            }
        }

        Ok(())
    }

    fn total(&self) -> Option<u128> {
        self.counts.iter().copied().sum()
    }
}

/// Every candidate of a mask, the last position varying fastest.
pub struct MaskSource {
    mask: Mask,
    digits: Vec<usize>,
    index: u128,
}

impl MaskSource {
    pub fn new(mask: Mask) -> Self {
        let mut digits = Vec::with_capacity(mask.len());
        mask.digits_at(0, &mut digits);

        Self {
            mask,
            digits,
            index: 0,
        }
    }
}

impl CandidateSource for MaskSource {
    fn next(&mut self) -> CrackResult<Option<Candidate>> {
        if self.index >= self.mask.size() {
            return Ok(None);
        }

        let candidate = Candidate {
            value: self.mask.render(&self.digits),
            index: self.index,
        };

        self.index += 1;
        self.mask.increment(&mut self.digits);

        Ok(Some(candidate))
    }

    fn seek(&mut self, index: u128) -> CrackResult<()> {
        self.index = index;
        self.mask.digits_at(index, &mut self.digits);

        Ok(())
    }

    fn total(&self) -> Option<u128> {
        Some(self.mask.size())
    }
}

/// Each word of the wordlists, combined in turn with every candidate of a mask.
pub struct HybridSource {
    words: DictionarySource,
    mask: Mask,
    affix: Affix,
    word: Option<String>,
    digits: Vec<usize>,
    /// The mask candidate the next word starts at. Only non-zero right after a seek.
    first_variant: u128,
    index: u128,
}

impl HybridSource {
    pub fn new(words: DictionarySource, mask: Mask, affix: Affix) -> Self {
        Self {
            words,
            digits: Vec::with_capacity(mask.len()),
            mask,
            affix,
            word: None,
            first_variant: 0,
            index: 0,
        }
    }

    fn combine(&self, word: &str) -> String {
        let variant = self.mask.render(&self.digits);

        match self.affix {
            Affix::Prefix => variant + word,
            Affix::Suffix => format!("{word}{variant}"),
        }
    }
}

impl CandidateSource for HybridSource {
    fn next(&mut self) -> CrackResult<Option<Candidate>> {
        if self.word.is_none() {
            let Some(word) = self.words.next_word()? else {
                return Ok(None);
            };

            self.word = Some(word.to_owned());
            self.mask.digits_at(self.first_variant, &mut self.digits);
            self.first_variant = 0;
        }

        let value = match &self.word {
            Some(word) => self.combine(word),
            None => return Ok(None),
        };

        let candidate = Candidate {
            value,
            index: self.index,
        };

        self.index += 1;
        if !self.mask.increment(&mut self.digits) {
            self.word = None;
        }

        Ok(Some(candidate))
    }

    fn seek(&mut self, index: u128) -> CrackResult<()> {
        let size = self.mask.size();

        self.words.seek(index / size)?;
        self.first_variant = index % size;
        self.word = None;
        self.index = index;

        Ok(())
    }

    fn total(&self) -> Option<u128> {
        self.words
            .total()
            .map(|words| words.saturating_mul(self.mask.size()))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use hashrecover_commons::{Charset, Keyspace, Mask};
    use itertools::Itertools;

    use crate::{
        Affix, BruteForceSource, CandidateSource, DictionarySource, HybridSource, MaskSource,
    };

    fn drain(source: &mut dyn CandidateSource) -> Vec<String> {
        let mut values = Vec::new();
        while let Some(candidate) = source.next().unwrap() {
            assert_eq!(candidate.index, values.len() as u128);
            values.push(candidate.value);
        }

        values
    }

    fn temp_wordlist(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "hashrecover-candidate-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();

        path
    }

    #[test]
    fn test_brute_force_order() {
        let keyspace = Keyspace::new(Charset::new("ab").unwrap(), 2).unwrap();

        assert_eq!(
            drain(&mut BruteForceSource::new(keyspace)),
            ["a", "b", "aa", "ab", "ba", "bb"]
        );
    }

    #[test]
    fn test_brute_force_exhausts_after_keyspace() {
        let keyspace = Keyspace::new(Charset::new("xyz").unwrap(), 4).unwrap();
        let mut source = BruteForceSource::new(keyspace);

        assert_eq!(drain(&mut source).len(), 3 + 9 + 27 + 81);
        assert_eq!(source.next().unwrap(), None);
    }

    #[test]
    fn test_brute_force_empty() {
        let keyspace = Keyspace::new(Charset::new("ab").unwrap(), 0).unwrap();

        assert_eq!(BruteForceSource::new(keyspace).next().unwrap(), None);
    }

    #[test]
    fn test_brute_force_seek() {
        let keyspace = Keyspace::new(Charset::new("abc").unwrap(), 3).unwrap();
        let all = drain(&mut BruteForceSource::new(keyspace.clone()));

        for n in 0..all.len() {
            let mut source = BruteForceSource::new(keyspace.clone());
            source.seek(n as u128).unwrap();

            assert!(all[n..]
                .iter()
                .cloned()
                .eq(std::iter::from_fn(|| source.next().unwrap()).map(|c| c.value)));
        }

        let mut source = BruteForceSource::new(keyspace);
        source.seek(1_000).unwrap();
        assert_eq!(source.next().unwrap(), None);
    }

    #[test]
    fn test_dictionary_concatenation() {
        let first = temp_wordlist("concat-1.txt", "abc\n\ntest\r\n");
        let second = temp_wordlist("concat-2.txt", "xyz\n");
        let mut source = DictionarySource::new(vec![first.clone(), second.clone()]);

        assert_eq!(source.total(), None);
        assert_eq!(drain(&mut source), ["abc", "test", "xyz"]);
        assert_eq!(source.total(), Some(3));

        std::fs::remove_file(first).unwrap();
        std::fs::remove_file(second).unwrap();
    }

    #[test]
    fn test_dictionary_seek() {
        let first = temp_wordlist("seek-1.txt", "a\nb\nc\n");
        let second = temp_wordlist("seek-2.txt", "d\n\ne\n");
        let wordlists = vec![first.clone(), second.clone()];
        let all = drain(&mut DictionarySource::new(wordlists.clone()));

        for n in 0..=all.len() {
            // fresh source: every line is skipped by reading
            let mut cold = DictionarySource::new(wordlists.clone());
            cold.seek(n as u128).unwrap();
            assert_eq!(drain_from(&mut cold), all[n..]);

            // counted source: known wordlists are skipped without reading
            let mut warm = DictionarySource::new(wordlists.clone());
            assert_eq!(warm.count().unwrap(), 5);
            warm.seek(n as u128).unwrap();
            assert_eq!(drain_from(&mut warm), all[n..]);
        }

        std::fs::remove_file(first).unwrap();
        std::fs::remove_file(second).unwrap();
    }

    fn drain_from(source: &mut dyn CandidateSource) -> Vec<String> {
        std::iter::from_fn(|| source.next().unwrap())
            .map(|c| c.value)
            .collect_vec()
    }

    #[test]
    fn test_dictionary_missing_wordlist() {
        let mut source = DictionarySource::new(vec![PathBuf::from("/nonexistent/words.txt")]);

        assert_eq!(source.next().unwrap_err().kind(), crate::ErrorKind::Resource);
    }

    #[test]
    fn test_mask_order() {
        let mask = Mask::parse("?dx?d").unwrap();
        let all = drain(&mut MaskSource::new(mask.clone()));

        assert_eq!(all.len(), 100);
        assert_eq!(all[..3], ["0x0", "0x1", "0x2"]);
        assert_eq!(all[99], "9x9");

        for n in [0, 1, 9, 10, 57, 99, 100] {
            let mut source = MaskSource::new(mask.clone());
            source.seek(n).unwrap();
            assert_eq!(drain_from(&mut source), all[n as usize..]);
        }
    }

    #[test]
    fn test_hybrid_suffix() {
        let path = temp_wordlist("hybrid-suffix.txt", "pass\nword\n");
        let words = DictionarySource::new(vec![path.clone()]);
        let mut source = HybridSource::new(words, Mask::parse("?d").unwrap(), Affix::Suffix);

        let all = drain(&mut source);
        std::fs::remove_file(path).unwrap();

        assert_eq!(all.len(), 20);
        assert_eq!(all[..2], ["pass0", "pass1"]);
        assert_eq!(all[10], "word0");
        assert_eq!(source.total(), Some(20));
    }

    #[test]
    fn test_hybrid_prefix_seek() {
        let first = temp_wordlist("hybrid-seek-1.txt", "a\nb\n");
        let second = temp_wordlist("hybrid-seek-2.txt", "c\n");
        let wordlists = vec![first.clone(), second.clone()];
        let mask = Mask::parse("?h").unwrap();
        let new_source = || {
            HybridSource::new(
                DictionarySource::new(wordlists.clone()),
                mask.clone(),
                Affix::Prefix,
            )
        };

        let all = drain(&mut new_source());
        assert_eq!(all.len(), 48);
        assert_eq!(all[..2], ["0a", "1a"]);
        assert_eq!(all[47], "fc");

        for n in 0..=all.len() {
            let mut source = new_source();
            source.seek(n as u128).unwrap();
            assert_eq!(drain_from(&mut source), all[n..]);
        }

        std::fs::remove_file(first).unwrap();
        std::fs::remove_file(second).unwrap();
    }
}
