//! Versioned, fragmented blobs on top of [`StoragePort`].
//!
//! ```text
//!  value ─postcard─▶ bytes ─split─▶ "<name>.0" … "<name>.N-1"
//!                          └─sha256─▶ "<name>.h" {format, len, fragments, digest}
//! ```
//!
//! Fragments are written first and the header last, so a power cut during
//! a save leaves the previous header pointing at a digest the new fragments
//! cannot match: the load fails cleanly instead of returning a blend of two
//! versions.  Every load failure falls back to defaults.

use core::fmt::Write as _;

use heapless::String;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, StorageError, StoragePort};
use crate::config::{SystemConfig, TankConfig};
use crate::tank::calibration::CalibrationTable;

pub const NAMESPACE: &str = "dropster";
pub const CONFIG_BLOB: &str = "cfg";
pub const CALIBRATION_BLOB: &str = "cal";

/// Bumped whenever a persisted struct changes shape.
const FORMAT_VERSION: u8 = 1;
/// Bytes per storage fragment.
pub const FRAGMENT_SIZE: usize = 64;
/// Largest blob accepted.
const MAX_BLOB: usize = 1024;
const HEADER_SIZE: usize = 48;

type Key = String<16>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobHeader {
    format: u8,
    len: u16,
    fragments: u8,
    digest: [u8; 32],
}

/// Live configuration plus the version of the last applied remote transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub config: SystemConfig,
    pub applied_version: u32,
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            config: SystemConfig::DEFAULTS,
            applied_version: 0,
        }
    }
}

fn key(name: &str, suffix: impl core::fmt::Display) -> Result<Key, StorageError> {
    let mut k = Key::new();
    write!(k, "{name}.{suffix}").map_err(|_| StorageError::BufferTooSmall)?;
    Ok(k)
}

/// Encode and store `value` under `name`.
pub fn save_blob<T: Serialize>(
    storage: &mut impl StoragePort,
    name: &str,
    value: &T,
) -> Result<(), ConfigError> {
    let mut buf = [0u8; MAX_BLOB];
    let bytes = postcard::to_slice(value, &mut buf).map_err(|_| StorageError::Full)?;
    let len = bytes.len();

    let mut fragments = 0u8;
    for (i, chunk) in bytes.chunks(FRAGMENT_SIZE).enumerate() {
        storage.write(NAMESPACE, &key(name, i)?, chunk)?;
        fragments += 1;
    }

    let header = BlobHeader {
        format: FORMAT_VERSION,
        len: len as u16,
        fragments,
        digest: hmac_sha256::Hash::hash(&buf[..len]),
    };
    let mut hbuf = [0u8; HEADER_SIZE];
    let hbytes = postcard::to_slice(&header, &mut hbuf).map_err(|_| StorageError::Full)?;
    storage.write(NAMESPACE, &key(name, "h")?, hbytes)?;
    Ok(())
}

/// Reassemble, verify and decode the blob stored under `name`.
pub fn load_blob<T: DeserializeOwned>(
    storage: &impl StoragePort,
    name: &str,
) -> Result<T, ConfigError> {
    let mut hbuf = [0u8; HEADER_SIZE];
    let n = storage.read(NAMESPACE, &key(name, "h")?, &mut hbuf)?;
    let header: BlobHeader = postcard::from_bytes(&hbuf[..n]).map_err(|_| ConfigError::Corrupted)?;

    let len = header.len as usize;
    if header.format != FORMAT_VERSION
        || len > MAX_BLOB
        || usize::from(header.fragments) != len.div_ceil(FRAGMENT_SIZE)
    {
        return Err(ConfigError::Corrupted);
    }

    let mut buf = [0u8; MAX_BLOB];
    let mut filled = 0;
    for i in 0..header.fragments {
        let want = (len - filled).min(FRAGMENT_SIZE);
        let got = storage
            .read(NAMESPACE, &key(name, i)?, &mut buf[filled..filled + want])
            .map_err(|e| match e {
                // A header without its fragments is damage, not first boot.
                StorageError::NotFound => ConfigError::Corrupted,
                other => ConfigError::Storage(other),
            })?;
        if got != want {
            return Err(ConfigError::Corrupted);
        }
        filled += got;
    }

    if hmac_sha256::Hash::hash(&buf[..len]) != header.digest {
        return Err(ConfigError::Corrupted);
    }
    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Load the persisted configuration, falling back to defaults on any failure.
pub fn load_config(storage: &impl StoragePort) -> PersistedConfig {
    match load_blob::<PersistedConfig>(storage, CONFIG_BLOB) {
        Ok(p) => match p.config.validate() {
            Ok(()) => {
                info!("Persistence: config loaded (transfer version {})", p.applied_version);
                p
            }
            Err(e) => {
                warn!("Persistence: stored config invalid ({e}), using defaults");
                PersistedConfig::default()
            }
        },
        Err(ConfigError::NotFound) => {
            info!("Persistence: no stored config, using defaults");
            PersistedConfig::default()
        }
        Err(e) => {
            warn!("Persistence: config load failed ({e}), using defaults");
            PersistedConfig::default()
        }
    }
}

pub fn save_config(storage: &mut impl StoragePort, cfg: &PersistedConfig) -> Result<(), ConfigError> {
    cfg.config.validate()?;
    save_blob(storage, CONFIG_BLOB, cfg)
}

/// Load the calibration table; an unreadable or inconsistent table is
/// discarded and the tank level stays unknown until recalibrated.
pub fn load_calibration(storage: &impl StoragePort, tank: &TankConfig) -> CalibrationTable {
    match load_blob::<CalibrationTable>(storage, CALIBRATION_BLOB) {
        Ok(table) if table.is_consistent(tank) => {
            info!("Persistence: {} calibration points loaded", table.len());
            table
        }
        Ok(_) => {
            warn!("Persistence: stored calibration inconsistent with tank config, discarded");
            CalibrationTable::new()
        }
        Err(ConfigError::NotFound) => CalibrationTable::new(),
        Err(e) => {
            warn!("Persistence: calibration load failed ({e})");
            CalibrationTable::new()
        }
    }
}

pub fn save_calibration(
    storage: &mut impl StoragePort,
    table: &CalibrationTable,
) -> Result<(), ConfigError> {
    save_blob(storage, CALIBRATION_BLOB, table)
}
