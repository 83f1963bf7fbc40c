use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::Result;

const READ_BUFFER_BYTES: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    /// Manifests carry MD5 digests; a 64 hex char digest is SHA-256.
    pub fn for_expected(expected: &str) -> Self {
        if expected.trim().len() == 64 {
            DigestAlgorithm::Sha256
        } else {
            DigestAlgorithm::Md5
        }
    }
}

pub fn normalize_digest(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

pub fn digests_match(expected: &str, actual: &str) -> bool {
    let expected = normalize_digest(expected);
    !expected.is_empty() && expected == normalize_digest(actual)
}

/// Lowercase hex digest of a file, streamed in fixed-size blocks.
pub fn file_digest(path: &Path, algorithm: DigestAlgorithm) -> Result<String> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0_u8; READ_BUFFER_BYTES];
    match algorithm {
        DigestAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                context.consume(&buffer[..read]);
            }
            Ok(format!("{:x}", context.compute()))
        }
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

/// Digest of `path` computed with the algorithm implied by `expected`.
pub fn digest_for(path: &Path, expected: &str) -> Result<String> {
    file_digest(path, DigestAlgorithm::for_expected(expected))
}

pub fn file_matches(path: &Path, expected: &str) -> Result<bool> {
    let actual = digest_for(path, expected)?;
    Ok(digests_match(expected, &actual))
}
