//! SNR to PER lookup tables.
//!
//! Tables live in one directory as `{BCC|LDPC}{32|1458}mcs{n}.txt`, one
//! `SNR_dB PER` row per line in ascending SNR order. Files are read on first
//! use and cached; one cache is shared by every PHY of a simulation.

use crate::config::CodingType;
use crate::error::{PhyError, PhyResult};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SNR_TOLERANCE_DB: f64 = 1e-9;

/// Frame size above which the long-frame table applies (bytes).
pub const SHORT_FRAME_LIMIT: u32 = 400;

/// Frame-size class used in table names.
pub fn size_class(coding: CodingType, frame_size: u32) -> u32 {
    if coding == CodingType::Bcc && frame_size < SHORT_FRAME_LIMIT {
        32
    } else {
        1458
    }
}

/// Linear SNR to the dB key used for row lookup, truncated to one decimal.
pub fn snr_key_db(snr: f64) -> f64 {
    (10.0 * snr.log10() * 10.0).trunc() / 10.0
}

/// Identifies one table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerTableKey {
    /// Code family.
    pub coding: CodingType,
    /// Frame-size class (32 or 1458).
    pub size_class: u32,
    /// MCS index.
    pub mcs: u8,
}

impl PerTableKey {
    /// File name of this table.
    pub fn file_name(&self) -> String {
        format!("{}{}mcs{}.txt", self.coding.file_prefix(), self.size_class, self.mcs)
    }
}

/// Result of looking an SNR up in a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerLookup {
    /// SNR below the first row.
    BelowFloor,
    /// Exact row match.
    Row(f64),
    /// No row for this SNR.
    Missing,
}

/// One SNR to PER curve.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerTable {
    rows: Vec<(f64, f64)>,
}

impl PerTable {
    /// Build a table from `(snr_db, per)` rows in ascending SNR order.
    pub fn from_rows(rows: Vec<(f64, f64)>) -> Self {
        debug_assert!(rows.windows(2).all(|w| w[0].0 <= w[1].0), "PER rows must ascend");
        PerTable { rows }
    }

    /// Parse the text format. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut rows = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let parse = |field: Option<&str>| field.and_then(|f| f.parse::<f64>().ok());
            match (parse(fields.next()), parse(fields.next())) {
                (Some(snr), Some(per)) => rows.push((snr, per)),
                _ => return Err(format!("line {}: expected `SNR PER`, got {:?}", lineno + 1, line)),
            }
        }
        if rows.windows(2).any(|w| w[0].0 > w[1].0) {
            return Err("SNR column is not ascending".to_string());
        }
        Ok(PerTable { rows })
    }

    /// Load and parse a file.
    pub fn load(path: &Path) -> PhyResult<Result<Self, String>> {
        let text = std::fs::read_to_string(path).map_err(|source| PhyError::LutIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a dB key.
    pub fn lookup(&self, snr_db: f64) -> PerLookup {
        match self.rows.first() {
            Some(&(floor, _)) if snr_db < floor - SNR_TOLERANCE_DB => PerLookup::BelowFloor,
            _ => self
                .rows
                .iter()
                .find(|(snr, _)| (snr - snr_db).abs() < SNR_TOLERANCE_DB)
                .map_or(PerLookup::Missing, |&(_, per)| PerLookup::Row(per)),
        }
    }
}

/// Lazily loaded set of PER tables.
#[derive(Debug, Default)]
pub struct PerLookupTables {
    dir: PathBuf,
    tables: RwLock<HashMap<PerTableKey, Option<Arc<PerTable>>>>,
    warned: RwLock<HashSet<PerTableKey>>,
}

impl PerLookupTables {
    /// Tables read from `dir` on demand.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PerLookupTables {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Install a table directly, bypassing the file system.
    pub fn insert(&self, key: PerTableKey, table: PerTable) {
        self.tables.write().insert(key, Some(Arc::new(table)));
    }

    /// Table directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table(&self, key: PerTableKey) -> Option<Arc<PerTable>> {
        if let Some(cached) = self.tables.read().get(&key) {
            return cached.clone();
        }
        let path = self.dir.join(key.file_name());
        let loaded = match PerTable::load(&path) {
            Ok(Ok(table)) => {
                tracing::debug!(path = %path.display(), rows = table.len(), "loaded PER table");
                Some(Arc::new(table))
            }
            Ok(Err(reason)) => {
                tracing::warn!(path = %path.display(), %reason, "malformed PER table");
                None
            }
            Err(err) => {
                tracing::warn!(%err, "PER table unavailable");
                None
            }
        };
        self.tables.write().entry(key).or_insert(loaded).clone()
    }

    /// PER for a chunk at linear SNR `snr`.
    ///
    /// Below the first row the chunk is lost (1.0). Without an exact row,
    /// or without a usable table, the chunk is assumed clean (0.0).
    pub fn per(&self, key: PerTableKey, snr: f64) -> f64 {
        let snr_db = snr_key_db(snr);
        let lookup = self.table(key).map_or(PerLookup::Missing, |table| table.lookup(snr_db));
        match lookup {
            PerLookup::BelowFloor => 1.0,
            PerLookup::Row(per) => per,
            PerLookup::Missing => {
                if self.warned.write().insert(key) {
                    tracing::warn!(table = %key.file_name(), snr_db, "no PER row for SNR, assuming no error");
                }
                0.0
            }
        }
    }
}
