//! Byte-for-byte file copy for non-media entries.

use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Copies `source` to `destination` and syncs it to disk.
///
/// Returns the number of bytes written. `destination` is created or truncated.
pub async fn copy_file(source: &Path, destination: &Path) -> std::io::Result<u64> {
    let source_file = File::open(source).await?;
    let dest_file = File::create(destination).await?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, source_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    let mut total_bytes = 0u64;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }

        writer.write_all(&buffer[..bytes_read]).await?;
        total_bytes += bytes_read as u64;
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    Ok(total_bytes)
}
