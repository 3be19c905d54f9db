//! Digest Engine: streaming SHA-256 over an assembled upload, run off the
//! async executor via `spawn_blocking` so a large file never blocks the
//! reactor.

use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUF_SIZE: usize = 64 * 1024;

pub async fn digest_file(path: &Path) -> std::io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || digest_file_blocking(&path))
        .await
        .expect("blocking task panicked")
}

fn digest_file_blocking(path: &Path) -> std::io::Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
