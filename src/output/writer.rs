//! Durable snapshot persistence.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::compute::FieldStats;
use crate::error::SolverResult;

/// One durable record: the scalar time state plus this rank's interior field
/// data. Borrowed from the solver; writing never mutates simulation state.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub nout: u64,
    pub rank: usize,
    pub t: f64,
    pub dt: f64,
    /// Global index of the first interior cell of this rank's block.
    pub origin: (usize, usize, usize),
    /// Interior extent of this rank's block.
    pub extent: (usize, usize, usize),
    pub stats: FieldStats,
    /// Interior conserved fields, `(i, j, k, field)` with field fastest.
    pub fields: &'a [f64],
}

/// Storage backend for snapshots. The format is injected; the engine only
/// guarantees the cadence and the one-record-per-`nout` correspondence.
pub trait SnapshotWriter: Send {
    fn write(&mut self, snapshot: &Snapshot<'_>) -> SolverResult<()>;
}

/// Writes one JSON file per snapshot under a directory.
///
/// Records are written to a temporary file and renamed into place, so a
/// failed write leaves no partial snapshot behind.
pub struct JsonSnapshotWriter {
    dir: PathBuf,
    prefix: String,
}

impl JsonSnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> SolverResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    fn path_for(&self, rank: usize, nout: u64) -> PathBuf {
        self.dir
            .join(format!("{}_r{rank:03}_n{nout:04}.json", self.prefix))
    }
}

impl SnapshotWriter for JsonSnapshotWriter {
    fn write(&mut self, snapshot: &Snapshot<'_>) -> SolverResult<()> {
        let path = self.path_for(snapshot.rank, snapshot.nout);
        let tmp = path.with_extension("json.tmp");

        let result = (|| {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writer.flush()?;
            fs::rename(&tmp, &path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result.map_err(Into::into)
    }
}

/// Discards snapshots but counts them. Used in tests and benchmarks.
#[derive(Debug, Default)]
pub struct NullSnapshotWriter {
    pub written: u64,
}

impl SnapshotWriter for NullSnapshotWriter {
    fn write(&mut self, _snapshot: &Snapshot<'_>) -> SolverResult<()> {
        self.written += 1;
        Ok(())
    }
}
