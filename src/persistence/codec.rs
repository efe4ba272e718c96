//! Framing for persisted classifier files.
//!
//! ```text
//! [magic: 4 bytes "PLSF"][version: 1 byte]
//! [length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```

use std::io::{Read, Write};

use crc32fast::Hasher;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;

/// Current file format version.
pub(crate) const FORMAT_VERSION: u8 = 1;

/// Magic bytes identifying a persisted safety classifier.
pub(crate) const MAGIC: [u8; 4] = *b"PLSF";

/// Largest payload accepted on load.
const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

pub(crate) fn write_header(writer: &mut impl Write) -> Result<(), PersistenceError> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[FORMAT_VERSION])?;
    Ok(())
}

pub(crate) fn read_header(reader: &mut impl Read) -> Result<(), PersistenceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(PersistenceError::Corrupted {
            reason: format!("invalid magic bytes {magic:?}"),
        });
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: version[0],
            expected: FORMAT_VERSION,
        });
    }
    Ok(())
}

pub(crate) fn write_frame<T: Serialize>(writer: &mut impl Write, value: &T) -> Result<(), PersistenceError> {
    let data = serde_json::to_vec(value).map_err(|e| PersistenceError::Corrupted {
        reason: format!("serialization failed: {e}"),
    })?;
    let len = u32::try_from(data.len()).map_err(|_| PersistenceError::Corrupted {
        reason: format!("payload of {} bytes is too large", data.len()),
    })?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&data)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_frame<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, PersistenceError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(PersistenceError::Corrupted {
            reason: format!("payload size {len} exceeds maximum {MAX_PAYLOAD_SIZE}"),
        });
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let mut hasher = Hasher::new();
    hasher.update(&data);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(PersistenceError::Corrupted {
            reason: format!("CRC mismatch: stored={stored:08x}, computed={computed:08x}"),
        });
    }

    serde_json::from_slice(&data).map_err(|e| PersistenceError::Corrupted {
        reason: format!("deserialization failed: {e}"),
    })
}
