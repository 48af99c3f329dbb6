//! The shared output archive.
//!
//! All tiles of a run go into one zip file. Entries are written to a
//! temporary file next to the target and only renamed over it by
//! [`TileArchive::finish`], so an aborted or failed run leaves no archive
//! behind. Appends from concurrent workers are serialized by a mutex around
//! the writer.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::locator::TILE_EXTENSION;
use crate::log::Logger;
use crate::{tlog, tlog_debug, tlog_warn, Error, Result};

/// Index used for tiles whose name carries no number.
pub const MISSING_INDEX: &str = "0000";

/// What to do with an archive already present at the target path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Carry existing entries over into the new archive.
    #[default]
    Append,
    /// Ignore the existing file; it is replaced on finish.
    Fresh,
}

/// Last all-digit `_`-separated token of a tile's file stem.
pub fn tile_index(file_stem: &str) -> &str {
    file_stem
        .rsplit('_')
        .find(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(MISSING_INDEX)
}

/// `<logical>/<logical>_<index>.png`
pub fn entry_name(logical_name: &str, index: &str) -> String {
    format!("{0}/{0}_{1}.{2}", logical_name, index, TILE_EXTENSION)
}

struct WriterState {
    writer: ZipWriter<NamedTempFile>,
    names: HashSet<String>,
    written: usize,
}

/// Result of a finished archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Entries written by this run.
    pub written: usize,
    /// Entries in the archive, including carried-over ones.
    pub total: usize,
}

pub struct TileArchive {
    target: PathBuf,
    state: Mutex<WriterState>,
    logger: Logger,
}

impl TileArchive {
    /// Open a new archive that will land at `target` on [`finish`](Self::finish).
    pub fn create(target: &Path, mode: ArchiveMode, logger: Logger) -> Result<Self> {
        let parent = match target.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let temp = NamedTempFile::new_in(&parent)?;
        let mut writer = ZipWriter::new(temp);
        let mut names = HashSet::new();

        if mode == ArchiveMode::Append && target.is_file() {
            let existing = File::open(target)?;
            let mut archive = ZipArchive::new(existing).map_err(|e| {
                Error::Archive(format!(
                    "cannot append to {}: {}",
                    target.display(),
                    e
                ))
            })?;
            for i in 0..archive.len() {
                let file = archive.by_index_raw(i)?;
                names.insert(file.name().to_string());
                writer.raw_copy_file(file)?;
            }
            tlog!(
                logger,
                "Appending to existing archive {} ({} entries)",
                target.display(),
                names.len()
            );
        }

        Ok(Self {
            target: target.to_path_buf(),
            state: Mutex::new(WriterState {
                writer,
                names,
                written: 0,
            }),
            logger,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Write `tiles` under `<logical_name>/`, returning the entry names used.
    ///
    /// Tiles that would map to an entry already in the archive get a `-<n>`
    /// suffix instead of overwriting it.
    pub fn append_tiles(&self, logical_name: &str, tiles: &[PathBuf]) -> Result<Vec<String>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Archive("archive lock poisoned".to_string()))?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut entries = Vec::with_capacity(tiles.len());
        for tile in tiles {
            let stem = tile
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let wanted = entry_name(logical_name, tile_index(&stem));
            let entry = unique_name(&state.names, &wanted);
            if entry != wanted {
                tlog_warn!(
                    self.logger,
                    "Entry {} already exists, writing {} as {}",
                    wanted,
                    tile.display(),
                    entry
                );
            }

            let mut source = File::open(tile)?;
            state.writer.start_file(entry.clone(), options)?;
            io::copy(&mut source, &mut state.writer)?;
            tlog_debug!(self.logger, "Added {} as {}", tile.display(), entry);

            state.names.insert(entry.clone());
            state.written += 1;
            entries.push(entry);
        }

        tlog!(
            self.logger,
            "Appended {} tiles from {} to {}",
            entries.len(),
            logical_name,
            self.target.display()
        );
        Ok(entries)
    }

    /// Number of entries written so far by this run.
    pub fn written(&self) -> usize {
        self.state.lock().map(|s| s.written).unwrap_or(0)
    }

    /// Finalize the central directory and move the archive into place.
    pub fn finish(self) -> Result<ArchiveSummary> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| Error::Archive("archive lock poisoned".to_string()))?;
        let total = state.names.len();
        let temp = state.writer.finish()?;
        temp.persist(&self.target).map_err(|e| Error::Io(e.error))?;

        tlog!(
            self.logger,
            "Wrote archive {} ({} new entries, {} total)",
            self.target.display(),
            state.written,
            total
        );
        Ok(ArchiveSummary {
            path: self.target,
            written: state.written,
            total,
        })
    }
}

fn unique_name(taken: &HashSet<String>, wanted: &str) -> String {
    if !taken.contains(wanted) {
        return wanted.to_string();
    }
    let base = wanted
        .strip_suffix(&format!(".{}", TILE_EXTENSION))
        .unwrap_or(wanted);
    (1..)
        .map(|n| format!("{}-{}.{}", base, n, TILE_EXTENSION))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| wanted.to_string())
}
