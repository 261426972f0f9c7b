//! Configuration transfer reassembly.
//!
//! A configuration document larger than one control message arrives as
//! `config_fragment{version, index, total, chunk}` messages:
//!
//! ```text
//! Fragment 0/3: {"deadband":2.5,
//! Fragment 1/3: "max_on":900,
//! Fragment 2/3: "alert_tank_full":85}
//! ```
//!
//! Only one transfer is assembled at a time.  The document is released
//! only once every index `0..total` is present; a transfer that is still
//! incomplete `transfer_timeout_ms` after its first fragment is dropped
//! whole.  A newer version replaces the one in flight.  Versions at or
//! below the last applied one are stale, so a retransmitted transfer is
//! never applied twice.

use log::{debug, info, warn};

use crate::app::ports::ConfigError;
use crate::config::{ConfigPatch, SystemConfig};
use crate::error::TransferError;
use crate::time::Millis;

/// Wire name of the fragment message.
pub const KIND: &str = "config_fragment";
/// Most fragments one transfer may announce.
pub const MAX_FRAGMENTS: u8 = 16;
/// Largest chunk accepted per fragment (bytes).
pub const MAX_CHUNK: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFragment {
    pub version: u32,
    pub index: u8,
    pub total: u8,
    pub chunk: String,
}

/// What one accepted fragment did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Stored; more fragments expected.
    Pending { received: u8, total: u8 },
    /// Same index already stored; ignored.
    Duplicate,
    /// Last missing fragment arrived.
    Complete { version: u32, document: Vec<u8> },
}

/// Result of [`TransferAssembler::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fed {
    pub progress: Progress,
    /// Version of an in-flight transfer this fragment replaced.
    pub superseded: Option<u32>,
}

/// An incomplete transfer dropped by [`TransferAssembler::expire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub version: u32,
    pub received: u8,
    pub total: u8,
}

struct Transfer {
    version: u32,
    total: u8,
    started_at: Millis,
    fragments: [Option<String>; MAX_FRAGMENTS as usize],
}

impl Transfer {
    fn received(&self) -> u8 {
        self.fragments.iter().filter(|f| f.is_some()).count() as u8
    }

    fn is_complete(&self) -> bool {
        self.fragments[..usize::from(self.total)]
            .iter()
            .all(Option::is_some)
    }

    fn assemble(&mut self) -> Vec<u8> {
        let mut doc = Vec::new();
        for chunk in self.fragments.iter_mut().flat_map(Option::take) {
            doc.extend_from_slice(chunk.as_bytes());
        }
        doc
    }
}

#[derive(Default)]
pub struct TransferAssembler {
    active: Option<Transfer>,
}

impl TransferAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one fragment.
    ///
    /// `last_applied` is the version of the configuration currently live.
    /// On error the fragment is dropped; a total mismatch also drops the
    /// in-flight transfer.
    pub fn feed(
        &mut self,
        fragment: ConfigFragment,
        last_applied: u32,
        now: Millis,
    ) -> Result<Fed, TransferError> {
        let ConfigFragment {
            version,
            index,
            total,
            chunk,
        } = fragment;

        if total == 0 || total > MAX_FRAGMENTS || index >= total {
            return Err(TransferError::InvalidFragment);
        }
        if chunk.len() > MAX_CHUNK {
            return Err(TransferError::ChunkTooLarge);
        }
        if version <= last_applied {
            debug!("TRANSFER v{version}: already applied, fragment {index} ignored");
            return Err(TransferError::Stale);
        }

        let mut superseded = None;
        match &self.active {
            Some(t) if version < t.version => {
                debug!("TRANSFER v{version}: older than in-flight v{}", t.version);
                return Err(TransferError::Stale);
            }
            Some(t) if version > t.version => {
                warn!("TRANSFER v{}: superseded by v{version}", t.version);
                superseded = Some(t.version);
                self.active = None;
            }
            Some(t) if total != t.total => {
                warn!(
                    "TRANSFER v{version}: total {total} disagrees with {}, dropped",
                    t.total
                );
                self.active = None;
                return Err(TransferError::TotalMismatch);
            }
            _ => {}
        }

        let transfer = self.active.get_or_insert_with(|| {
            info!("TRANSFER v{version}: started, {total} fragments");
            Transfer {
                version,
                total,
                started_at: now,
                fragments: core::array::from_fn(|_| None),
            }
        });

        let slot = &mut transfer.fragments[usize::from(index)];
        if slot.is_some() {
            return Ok(Fed {
                progress: Progress::Duplicate,
                superseded,
            });
        }
        *slot = Some(chunk);

        let progress = if transfer.is_complete() {
            let document = transfer.assemble();
            self.active = None;
            info!("TRANSFER v{version}: complete, {} bytes", document.len());
            Progress::Complete { version, document }
        } else {
            Progress::Pending {
                received: transfer.received(),
                total,
            }
        };
        Ok(Fed {
            progress,
            superseded,
        })
    }

    /// Drop the in-flight transfer once `timeout_ms` has passed since its
    /// first fragment.
    pub fn expire(&mut self, now: Millis, timeout_ms: u32) -> Option<Expired> {
        let t = self.active.as_ref()?;
        if !now.has_elapsed(t.started_at, timeout_ms) {
            return None;
        }
        let expired = Expired {
            version: t.version,
            received: t.received(),
            total: t.total,
        };
        warn!(
            "TRANSFER v{}: timed out with {}/{} fragments, discarded",
            expired.version, expired.received, expired.total
        );
        self.active = None;
        Some(expired)
    }

    /// Version currently being assembled.
    pub fn in_flight(&self) -> Option<u32> {
        self.active.as_ref().map(|t| t.version)
    }
}

/// Turn an assembled document into a validated candidate configuration.
///
/// The document is a partial config; absent fields keep their `live`
/// value.  Nothing is applied here.
pub fn decode_document(document: &[u8], live: &SystemConfig) -> Result<SystemConfig, TransferError> {
    let patch: ConfigPatch =
        serde_json::from_slice(document).map_err(|_| TransferError::Malformed)?;
    let candidate = patch.apply_to(live);
    candidate.validate().map_err(|e| match e {
        ConfigError::ValidationFailed(msg) => TransferError::Invalid(msg),
        _ => TransferError::Malformed,
    })?;
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(version: u32, index: u8, total: u8, chunk: &str) -> ConfigFragment {
        ConfigFragment {
            version,
            index,
            total,
            chunk: chunk.into(),
        }
    }

    #[test]
    fn out_of_order_fragments_assemble() {
        let mut asm = TransferAssembler::new();
        let fed = asm.feed(frag(1, 1, 2, r#""max_on":900}"#), 0, Millis(0)).unwrap();
        assert_eq!(fed.progress, Progress::Pending { received: 1, total: 2 });
        let fed = asm.feed(frag(1, 0, 2, r#"{"deadband":2.5,"#), 0, Millis(10)).unwrap();
        let Progress::Complete { version, document } = fed.progress else {
            panic!("expected completion");
        };
        assert_eq!(version, 1);
        assert_eq!(document, br#"{"deadband":2.5,"max_on":900}"#);
        assert!(asm.in_flight().is_none());
    }

    #[test]
    fn duplicate_fragment_ignored() {
        let mut asm = TransferAssembler::new();
        asm.feed(frag(1, 0, 3, "a"), 0, Millis(0)).unwrap();
        let fed = asm.feed(frag(1, 0, 3, "b"), 0, Millis(5)).unwrap();
        assert_eq!(fed.progress, Progress::Duplicate);
    }

    #[test]
    fn invalid_indices_rejected() {
        let mut asm = TransferAssembler::new();
        assert_eq!(
            asm.feed(frag(1, 2, 2, "x"), 0, Millis(0)),
            Err(TransferError::InvalidFragment)
        );
        assert_eq!(
            asm.feed(frag(1, 0, 0, "x"), 0, Millis(0)),
            Err(TransferError::InvalidFragment)
        );
        assert_eq!(
            asm.feed(frag(1, 0, MAX_FRAGMENTS + 1, "x"), 0, Millis(0)),
            Err(TransferError::InvalidFragment)
        );
        let long = "x".repeat(MAX_CHUNK + 1);
        assert_eq!(
            asm.feed(frag(1, 0, 2, &long), 0, Millis(0)),
            Err(TransferError::ChunkTooLarge)
        );
    }

    #[test]
    fn newer_version_supersedes() {
        let mut asm = TransferAssembler::new();
        asm.feed(frag(4, 0, 2, "a"), 0, Millis(0)).unwrap();
        let fed = asm.feed(frag(5, 0, 2, "b"), 0, Millis(10)).unwrap();
        assert_eq!(fed.superseded, Some(4));
        assert_eq!(asm.in_flight(), Some(5));
        assert_eq!(
            asm.feed(frag(4, 1, 2, "c"), 0, Millis(20)),
            Err(TransferError::Stale)
        );
    }

    #[test]
    fn applied_version_is_stale() {
        let mut asm = TransferAssembler::new();
        assert_eq!(
            asm.feed(frag(3, 0, 1, "{}"), 3, Millis(0)),
            Err(TransferError::Stale)
        );
        assert!(asm.in_flight().is_none());
    }

    #[test]
    fn total_mismatch_drops_transfer() {
        let mut asm = TransferAssembler::new();
        asm.feed(frag(2, 0, 3, "a"), 0, Millis(0)).unwrap();
        assert_eq!(
            asm.feed(frag(2, 1, 4, "b"), 0, Millis(5)),
            Err(TransferError::TotalMismatch)
        );
        assert!(asm.in_flight().is_none());
    }

    #[test]
    fn timeout_counts_from_first_fragment() {
        let mut asm = TransferAssembler::new();
        asm.feed(frag(1, 0, 4, "a"), 0, Millis(1_000)).unwrap();
        asm.feed(frag(1, 1, 4, "b"), 0, Millis(14_000)).unwrap();
        assert!(asm.expire(Millis(15_999), 15_000).is_none());
        assert_eq!(
            asm.expire(Millis(16_000), 15_000),
            Some(Expired {
                version: 1,
                received: 2,
                total: 4
            })
        );
        assert!(asm.in_flight().is_none());
    }

    #[test]
    fn document_merges_and_validates() {
        let live = SystemConfig::DEFAULTS;
        let cfg = decode_document(br#"{"deadband":2.5}"#, &live).unwrap();
        assert!((cfg.control.deadband_c - 2.5).abs() < f32::EPSILON);
        assert_eq!(cfg.tank, live.tank);

        assert!(matches!(
            decode_document(br#"{"deadband":2.5,"alpha":7}"#, &live),
            Err(TransferError::Invalid(msg)) if msg.contains("alpha")
        ));
        assert_eq!(
            decode_document(br#"{"deadband":"#, &live),
            Err(TransferError::Malformed)
        );
        assert_eq!(
            decode_document(br#"{"colour":"red"}"#, &live),
            Err(TransferError::Malformed)
        );
    }
}
