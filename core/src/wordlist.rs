use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::warn;

use crate::error::{CrackError, CrackResult};

/// The wordlists of a "use all wordlists" attack, in the order they are tried.
pub const DEFAULT_WORDLISTS: [&str; 7] = [
    "common.txt",
    "rockyou-lite.txt",
    "best110.txt",
    "best1050.txt",
    "10k-most-common.txt",
    "100k-most-used-passwords-NCSC.txt",
    "darkc0de.txt",
];

/// Lists the [`DEFAULT_WORDLISTS`] present in `dir`, in order.
pub fn default_wordlists(dir: &Path) -> Vec<PathBuf> {
    DEFAULT_WORDLISTS
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Reads the words of a wordlist, one per line.
///
/// The line terminator (`\n` or `\r\n`) is removed and nothing else is touched.
/// Blank lines and lines that are not valid UTF-8 are skipped.
pub struct WordReader<R> {
    reader: R,
    path: PathBuf,
    buf: Vec<u8>,
    word_len: Option<usize>,
    line: u64,
    malformed: u64,
}

impl WordReader<BufReader<File>> {
    /// Opens the wordlist at `path`.
    pub fn open(path: &Path) -> CrackResult<Self> {
        let file = File::open(path).map_err(|source| CrackError::Wordlist {
            path: path.to_owned(),
            source,
        })?;

        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> WordReader<R> {
    pub fn new(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_owned(),
            buf: Vec::new(),
            word_len: None,
            line: 0,
            malformed: 0,
        }
    }

    /// Returns the next word, or `None` at the end of the file.
    pub fn next_word(&mut self) -> CrackResult<Option<&str>> {
        let len = loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(|source| CrackError::Wordlist {
                    path: self.path.clone(),
                    source,
                })?;

            if read == 0 {
                self.word_len = None;
                return Ok(None);
            }
            self.line += 1;

            let mut len = self.buf.len();
            if self.buf[..len].ends_with(b"\n") {
                len -= 1;
            }
            if self.buf[..len].ends_with(b"\r") {
                len -= 1;
            }

            if len == 0 {
                continue;
            }

            if std::str::from_utf8(&self.buf[..len]).is_err() {
                self.malformed += 1;
                warn!(
                    path = %self.path.display(),
                    line = self.line,
                    "skipping a line that is not valid UTF-8"
                );
                continue;
            }

            break len;
        };

        self.word_len = Some(len);

        Ok(self.current())
    }

    /// The word returned by the last call to `next_word`.
    pub fn current(&self) -> Option<&str> {
        self.word_len
            .and_then(|len| std::str::from_utf8(&self.buf[..len]).ok())
    }

    /// The number of lines skipped because they were not valid UTF-8.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

/// Counts the words of a wordlist.
pub fn count_words(path: &Path) -> CrackResult<u64> {
    let mut reader = WordReader::open(path)?;
    let mut count = 0;
    while reader.next_word()?.is_some() {
        count += 1;
    }

    Ok(count)
}

/// Statistics about a wordlist.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WordlistInfo {
    pub path: PathBuf,
    pub word_count: u64,
    pub file_size: u64,
    pub min_length: usize,
    pub max_length: usize,
    pub avg_length: f64,
    pub malformed_lines: u64,
}

impl WordlistInfo {
    /// Reads the whole wordlist to gather its statistics.
    pub fn inspect(path: &Path) -> CrackResult<Self> {
        let file_size = std::fs::metadata(path)
            .map_err(|source| CrackError::Wordlist {
                path: path.to_owned(),
                source,
            })?
            .len();

        let mut reader = WordReader::open(path)?;
        let mut word_count = 0;
        let mut total_length = 0;
        let mut min_length = usize::MAX;
        let mut max_length = 0;

        while let Some(word) = reader.next_word()? {
            let len = word.chars().count();
            word_count += 1;
            total_length += len;
            min_length = min_length.min(len);
            max_length = max_length.max(len);
        }

        Ok(Self {
            path: path.to_owned(),
            word_count,
            file_size,
            min_length: if word_count == 0 { 0 } else { min_length },
            max_length,
            avg_length: if word_count == 0 {
                0.
            } else {
                total_length as f64 / word_count as f64
            },
            malformed_lines: reader.malformed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, path::Path};

    use crate::{wordlist::WordReader, WordlistInfo};

    fn words(content: &[u8]) -> Vec<String> {
        let mut reader = WordReader::new(Cursor::new(content.to_vec()), Path::new("test.txt"));
        let mut words = Vec::new();
        while let Some(word) = reader.next_word().unwrap() {
            words.push(word.to_owned());
        }

        words
    }

    #[test]
    fn test_line_endings() {
        assert_eq!(words(b"abc\ntest\r\nxyz"), ["abc", "test", "xyz"]);
    }

    #[test]
    fn test_blank_lines() {
        assert_eq!(words(b"\n\nabc\n\r\n\nxyz\n"), ["abc", "xyz"]);
        assert!(words(b"").is_empty());
    }

    #[test]
    fn test_no_other_normalization() {
        assert_eq!(words(b" padded \n#comment\n"), [" padded ", "#comment"]);
    }

    #[test]
    fn test_malformed_lines() {
        let mut reader = WordReader::new(
            Cursor::new(b"good\n\xff\xfe\nalso good\n".to_vec()),
            Path::new("test.txt"),
        );

        assert_eq!(reader.next_word().unwrap(), Some("good"));
        assert_eq!(reader.next_word().unwrap(), Some("also good"));
        assert_eq!(reader.next_word().unwrap(), None);
        assert_eq!(reader.malformed(), 1);
    }

    #[test]
    fn test_inspect() {
        let path = std::env::temp_dir().join(format!(
            "hashrecover-inspect-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "a\nabc\n\nabcde\n").unwrap();

        let info = WordlistInfo::inspect(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(info.word_count, 3);
        assert_eq!(info.file_size, 13);
        assert_eq!(info.min_length, 1);
        assert_eq!(info.max_length, 5);
        assert_eq!(info.avg_length, 3.);
    }

    #[test]
    fn test_missing_wordlist() {
        let err = WordlistInfo::inspect(Path::new("/nonexistent/wordlist.txt")).unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::Resource);
    }
}
