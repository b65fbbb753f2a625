use std::fs::File;
use std::io::{self, Read};

use camino::Utf8Path;
use sha2::{Digest, Sha256};

use crate::error::GwError;

/// First whitespace-delimited token of a `sha256sum`-style response.
pub fn parse_digest(output: &str) -> Option<&str> {
    output.split_whitespace().next()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex(&Sha256::digest(bytes))
}

/// Stream a local file through SHA-256.
pub fn sha256_file(path: &Utf8Path) -> io::Result<String> {
    let mut file = File::open(path.as_std_path())?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex(&hasher.finalize()))
}

/// Local checksum with the same shape as the remote one: a digest, then
/// whitespace, then the path.
pub fn local_sha256(path: &Utf8Path) -> Result<String, GwError> {
    let digest = sha256_file(path).map_err(|err| {
        GwError::LocalChecksum(format!(
            "LOCAL_SHA256 ERROR at {}. STDERR: \n{err}\n",
            crate::transfer::utc_stamp()
        ))
    })?;
    Ok(format!("{digest}  {path}"))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
