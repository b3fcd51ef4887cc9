use core::{fmt, str::FromStr};

/// Default identifier alphabet: `[A-Za-z0-9_-]`, 64 characters.
pub const DEFAULT_ALPHABET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz-";

/// Smallest alphabet that still carries entropy per character.
pub const MIN_ALPHABET_LEN: usize = 2;

/// Identifiers are ASCII, so no alphabet can exceed the ASCII range.
pub const MAX_ALPHABET_LEN: usize = 128;

/// Reasons a character set is rejected as an identifier alphabet.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AlphabetError {
    #[error("alphabet must have between {MIN_ALPHABET_LEN} and {MAX_ALPHABET_LEN} characters, got {0}")]
    Length(usize),

    #[error("character {0:?} is not allowed in identifiers")]
    Unsupported(char),

    #[error("character {0:?} appears more than once")]
    Duplicate(char),
}

/// A validated, fixed set of identifier characters.
///
/// Every character must be URL-unreserved (ASCII alphanumeric, `-`, `_`,
/// `.` or `~`) so that minted identifiers are always safe to embed as a path
/// segment. Membership is answered from a 128-entry lookup table.
#[derive(Clone, PartialEq, Eq)]
pub struct Alphabet {
    chars: Box<[u8]>,
    lookup: [bool; 128],
}

impl Alphabet {
    /// Builds an alphabet from `chars`, preserving order.
    ///
    /// # Errors
    ///
    /// Returns an [`AlphabetError`] for sets that are too short or too long,
    /// contain a character that is not URL-unreserved, or repeat a character.
    pub fn new(chars: &str) -> Result<Self, AlphabetError> {
        let mut lookup = [false; 128];
        for c in chars.chars() {
            if !is_unreserved(c) {
                return Err(AlphabetError::Unsupported(c));
            }
            let slot = &mut lookup[c as usize];
            if *slot {
                return Err(AlphabetError::Duplicate(c));
            }
            *slot = true;
        }

        let len = chars.len();
        if !(MIN_ALPHABET_LEN..=MAX_ALPHABET_LEN).contains(&len) {
            return Err(AlphabetError::Length(len));
        }

        Ok(Self {
            chars: chars.as_bytes().into(),
            lookup,
        })
    }

    /// Number of characters in the set.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Character at `index`, in construction order.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn char_at(&self, index: usize) -> char {
        char::from(self.chars[index])
    }

    /// Whether `byte` belongs to the set.
    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.lookup.get(byte as usize).copied().unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII.
        core::str::from_utf8(&self.chars).unwrap_or_default()
    }
}

const fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHABET).unwrap_or_else(|_| unreachable!("default alphabet is valid"))
    }
}

impl FromStr for Alphabet {
    type Err = AlphabetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Alphabet").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
