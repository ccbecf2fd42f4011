// src/hash.rs

//! Cryptographic digests for source archive integrity
//!
//! Formulas pin their source archive with a hex digest, optionally prefixed
//! with the algorithm (`sha256:...`). Unprefixed digests are SHA-256.
//!
//! | Algorithm | Hex length | Notes |
//! |-----------|------------|-------|
//! | SHA-256   | 64         | Default; what upstream release pages publish |
//! | SHA-512   | 128        | Accepted for formulas that pin stronger digests |

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in bytes
    const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Digest parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Unknown hash algorithm name
    UnknownAlgorithm(String),
    /// Hash string has wrong length for algorithm
    InvalidLength { expected: usize, got: usize },
    /// Hash string contains invalid hex characters
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// A digest value with its algorithm
///
/// The hex value is always stored lowercase, so comparing two `Hash`es is
/// case-insensitive with respect to how they were written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl Hash {
    /// Create a new hash value, validating length and hex characters
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        let expected_len = algorithm.hex_len();

        if value.len() != expected_len {
            return Err(HashError::InvalidLength {
                expected: expected_len,
                got: value.len(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }

        Ok(Self {
            algorithm,
            value: value.to_lowercase(),
        })
    }

    fn new_unchecked(algorithm: HashAlgorithm, value: String) -> Self {
        Self { algorithm, value }
    }

    /// Parse a possibly prefixed digest (`sha256:abc...` or bare `abc...`)
    pub fn parse_prefixed(s: &str) -> Result<Self, HashError> {
        let s = s.trim();
        if let Some((algo, hash)) = s.split_once(':') {
            let algorithm = algo.parse()?;
            Self::new(algorithm, hash)
        } else {
            Self::new(HashAlgorithm::Sha256, s)
        }
    }

    /// Format as a prefixed string (e.g., "sha256:abc123...")
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.value)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_prefixed(s)
    }
}

/// Incremental hasher over any supported algorithm
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Sha512(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        let value = match self.state {
            HasherState::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            HasherState::Sha512(hasher) => format!("{:x}", hasher.finalize()),
        };
        Hash::new_unchecked(self.algorithm, value)
    }
}

/// Compute hash of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute hash of data from a reader
fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Hash> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Hash a file without loading it into memory
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<Hash> {
    let mut file = File::open(path)?;
    hash_reader(algorithm, &mut file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD_SHA256: &str =
        "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    #[test]
    fn test_sha256_known_value() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");
        assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
        assert_eq!(hash.value, HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_sha512_length() {
        let hash = hash_bytes(HashAlgorithm::Sha512, b"Hello, World!");
        assert_eq!(hash.value.len(), 128);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let data = vec![7u8; 100_000];
        let first = hash_bytes(HashAlgorithm::Sha256, &data);
        let second = hash_bytes(HashAlgorithm::Sha256, &data);
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_byte_mutation_changes_digest() {
        let mut data = b"formula archive bytes".to_vec();
        let before = hash_bytes(HashAlgorithm::Sha256, &data);
        data[3] ^= 0x01;
        assert_ne!(before, hash_bytes(HashAlgorithm::Sha256, &data));
    }

    #[test]
    fn test_hasher_incremental() {
        let full_hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");

        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(full_hash, hasher.finalize());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_validation() {
        assert!(Hash::new(HashAlgorithm::Sha256, HELLO_WORLD_SHA256).is_ok());
        assert!(matches!(
            Hash::new(HashAlgorithm::Sha256, "abc123"),
            Err(HashError::InvalidLength { .. })
        ));
        assert!(matches!(
            Hash::new(
                HashAlgorithm::Sha256,
                "gggg6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
            ),
            Err(HashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_prefixed_and_case_insensitive() {
        let upper = HELLO_WORLD_SHA256.to_uppercase();
        let prefixed = Hash::parse_prefixed(&format!("sha256:{upper}")).unwrap();
        let bare = Hash::parse_prefixed(HELLO_WORLD_SHA256).unwrap();
        assert_eq!(prefixed, bare);
        assert_eq!(bare.to_prefixed_string(), format!("sha256:{HELLO_WORLD_SHA256}"));
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.tar.gz");
        std::fs::write(&path, b"Hello, World!").unwrap();
        let hash = hash_file(HashAlgorithm::Sha256, &path).unwrap();
        assert_eq!(hash.value, HELLO_WORLD_SHA256);
    }
}
