//! Generation of the synthetic key set a run operates on.

use std::fmt;
use std::ops::Deref;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// The namespace every generated key lives in, unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: &str = "foo/";

/// The characters a key suffix is drawn from.
const ALPHABET: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A synthetic key: the namespace prefix followed by a random alphabetic suffix.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Key(String);

impl Key {
    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Key {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ordered, immutable list of keys used by every phase of a run.
///
/// Uniqueness is probabilistic. Collisions are possible for short suffixes and are not
/// defended against.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeySet {
    keys: Vec<Key>,
    size: usize,
}

impl KeySet {
    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set contains no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Length of the random suffix of every key.
    pub fn key_size(&self) -> usize {
        self.size
    }

    /// Iterates the keys in generation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

impl std::ops::Index<usize> for KeySet {
    type Output = Key;

    fn index(&self, index: usize) -> &Self::Output {
        &self.keys[index]
    }
}

/// Source of random keys and value payloads.
///
/// Create one generator per process and reuse it. The RNG is seeded exactly once, so rapid
/// successive calls never produce correlated sequences.
#[derive(Debug)]
pub struct KeyGenerator {
    prefix: String,
    seed: u64,
    rng: SmallRng,
}

impl KeyGenerator {
    /// Creates a generator with a deterministic seed and the default prefix.
    pub fn new(seed: u64) -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_owned(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Creates a generator seeded from the thread-local entropy source.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Replaces the namespace prefix of all subsequently generated keys.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// The seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates `count` keys, each with a random suffix of `size` letters.
    pub fn generate(&mut self, count: usize, size: usize) -> KeySet {
        let keys = (0..count)
            .map(|_| {
                let mut key = String::with_capacity(self.prefix.len() + size);
                key.push_str(&self.prefix);
                key.extend((0..size).map(|_| self.letter()));
                Key(key)
            })
            .collect();

        KeySet { keys, size }
    }

    /// Generates a value payload of `len` random letters.
    pub fn payload(&mut self, len: usize) -> Bytes {
        (0..len)
            .map(|_| self.letter() as u8)
            .collect::<Vec<_>>()
            .into()
    }

    fn letter(&mut self) -> char {
        ALPHABET[self.rng.random_range(0..ALPHABET.len())] as char
    }
}
