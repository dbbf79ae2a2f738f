use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use dossier_types::ContentDigest;

const CHUNK_SIZE: usize = 64 * 1024;

/// Stream a file once, returning its BLAKE3 digest and byte length.
pub fn digest_file(path: &Path) -> io::Result<(ContentDigest, u64)> {
    let mut file = File::open(path)?;
    digest_reader(&mut file)
}

/// Digest any reader in fixed-size chunks.
pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<(ContentDigest, u64)> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((ContentDigest::from_hash(*hasher.finalize().as_bytes()), total))
}
