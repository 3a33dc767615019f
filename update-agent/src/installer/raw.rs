//! The `raw` install mode: write the payload straight onto a block device.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read as _, Seek as _, Write as _},
    path::Path,
};

use eyre::{ensure, eyre, WrapErr as _};
use nix::unistd::Uid;
use ota_update_agent_core::ObjectMetadata;
use tracing::debug;

use super::{InstallMode, InstallableObject};
use crate::filesystem::FilesystemManager;

/// Write granularity when the metadata does not specify a chunk size.
const DEFAULT_CHUNK_SIZE: u64 = 128 * 1024;

pub fn mode() -> InstallMode {
    InstallMode {
        name: "raw",
        check_requirements,
        get_object,
    }
}

fn check_requirements() -> eyre::Result<()> {
    ensure!(
        Uid::effective().is_root(),
        "the raw install mode writes to block devices and requires root",
    );
    Ok(())
}

fn get_object(
    metadata: &ObjectMetadata,
) -> eyre::Result<Box<dyn InstallableObject>> {
    Ok(Box::new(RawObject {
        target: metadata.target.clone(),
        chunk_size: metadata.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
        seek: metadata.seek,
        skip: metadata.skip,
    }))
}

struct RawObject {
    target: String,
    chunk_size: u64,
    /// Chunks to skip on the target device before writing.
    seek: u64,
    /// Chunks to skip in the source payload before reading.
    skip: u64,
}

impl InstallableObject for RawObject {
    fn install(&self, source: &Path, _fs: &FilesystemManager) -> eyre::Result<()> {
        let mut src = File::open(source)
            .wrap_err_with(|| format!("failed to open `{}`", source.display()))?;
        let mut block_dev = OpenOptions::new()
            .write(true)
            .open(&self.target)
            .wrap_err_with(|| format!("failed to open target `{}`", self.target))?;

        let src_len = src.seek(io::SeekFrom::End(0))?;
        let block_dev_len = block_dev.seek(io::SeekFrom::End(0))?;

        // Offsets come from untrusted metadata and must not wrap.
        let read_offset = self.skip.checked_mul(self.chunk_size).ok_or_else(|| {
            eyre!(
                "skip of {} chunks of {} bytes overflows the read offset",
                self.skip,
                self.chunk_size,
            )
        })?;
        let write_offset = self.seek.checked_mul(self.chunk_size).ok_or_else(|| {
            eyre!(
                "seek of {} chunks of {} bytes overflows the write offset",
                self.seek,
                self.chunk_size,
            )
        })?;
        debug!(
            "-- raw write of {src_len} bytes (skipping {read_offset}) to `{}` at offset {write_offset}",
            self.target,
        );
        ensure!(
            src_len >= read_offset,
            "payload is {} bytes, smaller than the configured skip of {} bytes",
            src_len,
            read_offset,
        );
        let required = (src_len - read_offset)
            .checked_add(write_offset)
            .ok_or_else(|| {
                eyre!(
                    "writing {} bytes at offset {} overflows the device size",
                    src_len - read_offset,
                    write_offset,
                )
            })?;
        ensure!(
            block_dev_len >= required,
            "block device is too small to write {} bytes starting at offset {}",
            src_len - read_offset,
            write_offset,
        );

        src.seek(io::SeekFrom::Start(read_offset))
            .wrap_err("failed to seek to read offset in payload")?;
        block_dev
            .seek(io::SeekFrom::Start(write_offset))
            .wrap_err_with(|| {
                format!(
                    "failed to seek to offset `{write_offset}` of block device `{}`",
                    self.target,
                )
            })?;

        let mut buffer = vec![0u8; self.chunk_size as usize];
        loop {
            let read = src.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            block_dev.write_all(&buffer[..read]).wrap_err_with(|| {
                format!("I/O copy failed for raw write to `{}`", self.target)
            })?;
        }

        block_dev
            .flush()
            .wrap_err_with(|| format!("block device `{}` flush failed", self.target))?;
        block_dev
            .sync_all()
            .wrap_err_with(|| format!("block device `{}` sync failed", self.target))?;

        Ok(())
    }
}
