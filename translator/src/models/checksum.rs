//! SHA-256 content verification for model artifacts.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use super::error::ModelError;

/// Digest values that mean "not filled in yet".
const PLACEHOLDER_DIGESTS: &[&str] = &["PUT_THE_EXACT_SHA256", "TBD"];

const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// Hex-encoded (lowercase) SHA-256 of `contents`.
pub fn digest(contents: &[u8]) -> String {
    format!("{:x}", Sha256::digest(contents))
}

/// Case-insensitive comparison of `contents` against an expected hex digest.
pub fn matches(contents: &[u8], expected: &str) -> bool {
    digest(contents).eq_ignore_ascii_case(expected.trim())
}

/// True when the configured digest means verification is intentionally off.
pub fn should_skip(expected: &str) -> bool {
    let trimmed = expected.trim();
    if trimmed.is_empty() {
        return true;
    }
    let upper = trimmed.to_ascii_uppercase();
    PLACEHOLDER_DIGESTS
        .iter()
        .any(|placeholder| upper.contains(placeholder))
}

/// Stream a file through SHA-256 without loading it into memory.
pub async fn digest_file(path: &Path) -> Result<String, ModelError> {
    let mut file = tokio::fs::File::open(path).await?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_BYTES];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a file on disk, returning the computed digest on mismatch.
pub async fn verify_file(path: &Path, expected: &str) -> Result<(), ModelError> {
    let actual = digest_file(path).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ModelError::InvalidChecksum {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(digest(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn matches_ignores_case_and_whitespace() {
        assert!(matches(b"hello", &HELLO_SHA256.to_uppercase()));
        assert!(matches(b"hello", &format!("  {}\n", HELLO_SHA256)));
        assert!(!matches(b"hello!", HELLO_SHA256));
    }

    #[test]
    fn skip_detection() {
        let cases = [
            ("", true),
            ("   \n\t", true),
            ("PUT_THE_EXACT_SHA256_HERE", true),
            ("put_the_exact_sha256", true),
            ("TBD", true),
            (HELLO_SHA256, false),
        ];
        for (input, expected) in cases {
            assert_eq!(should_skip(input), expected, "input {:?}", input);
        }
    }

    #[tokio::test]
    async fn file_digest_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.gguf");
        let payload: Vec<u8> = (0..3 * READ_BUFFER_BYTES + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).unwrap();

        assert_eq!(digest_file(&path).await.unwrap(), digest(&payload));
        assert!(verify_file(&path, &digest(&payload).to_uppercase()).await.is_ok());
    }

    #[tokio::test]
    async fn verify_reports_both_digests_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.gguf");
        std::fs::write(&path, b"hello").unwrap();

        let err = verify_file(&path, "ABCDEF").await.unwrap_err();
        match err {
            ModelError::InvalidChecksum { expected, actual } => {
                assert_eq!(expected, "abcdef");
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
