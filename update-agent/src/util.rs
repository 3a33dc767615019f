use std::{
    fs::File,
    io::copy,
    path::Path,
};

use eyre::{bail, WrapErr as _};
use sha2::{Digest as _, Sha256};

/// Verifies that the file at `path_to_blob` hashes to `expected_hex_hash`.
pub fn check_hash<P: AsRef<Path>>(
    path_to_blob: P,
    expected_hex_hash: &str,
) -> eyre::Result<()> {
    let display_path = path_to_blob.as_ref().display();
    let decoded_hash = hex::decode(expected_hex_hash).wrap_err_with(|| {
        format!("failed to decode hex string as hash: {expected_hex_hash}")
    })?;
    let mut hasher = Sha256::new();
    let mut blob = File::open(&path_to_blob)
        .wrap_err_with(|| format!("failed opening `{display_path}` for hashing"))?;
    copy(&mut blob, &mut hasher).wrap_err("failed to copy object blob into hasher")?;
    let result = hasher.finalize();
    if *result != decoded_hash {
        let encoded_result = hex::encode(result);
        bail!(
            "mismatch between recorded and actual hashes of `{display_path}`; expected \
             `{expected_hex_hash}`, calculated `{encoded_result}`"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_hash_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"payload").unwrap();
        let expected = hex::encode(Sha256::digest(b"payload"));
        check_hash(&path, &expected).unwrap();
    }

    #[test]
    fn mismatching_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"payload").unwrap();
        let expected = hex::encode(Sha256::digest(b"other"));
        assert!(check_hash(&path, &expected).is_err());
    }
}
