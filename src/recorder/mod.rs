//! # Channel Recorder Module
//!
//! Records received channel frames to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting channel data as JSONL (JSON Lines)
//! - Writing to rotating log files (max N records per file)
//! - Retaining only the last M files

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::srxl::channels::ChannelData;
use crate::srxl::protocol::ChannelValues;

const FILE_PREFIX: &str = "channels_";
const FILE_SUFFIX: &str = ".jsonl";

/// Name collisions tolerated before rotation gives up
const MAX_NAME_ATTEMPTS: u32 = 16;

/// One line of the channel log
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRecord {
    pub timestamp: String,
    pub bus: usize,
    pub mask: u32,
    pub values: ChannelValues,
    pub rssi: i8,
    pub frame_losses: u16,
    pub failsafe: bool,
}

impl ChannelRecord {
    pub fn new(bus: usize, data: &ChannelData) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            bus,
            mask: data.mask,
            values: data.values,
            rssi: data.rssi,
            frame_losses: data.frame_losses,
            failsafe: data.failsafe,
        }
    }
}

pub struct ChannelRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    sequence: u32,
    /// Log files on disk, oldest first
    files: VecDeque<PathBuf>,
}

impl std::fmt::Debug for ChannelRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRecorder")
            .field("dir", &self.dir)
            .field("records_in_file", &self.records_in_file)
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

impl ChannelRecorder {
    /// Create a recorder writing into `dir`
    ///
    /// Existing channel logs in `dir` count towards `max_files_to_keep`.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or listed
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut existing = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) && entry.file_type()?.is_file() {
                existing.push(entry.path());
            }
        }
        // Names embed the creation time, so lexical order is age order
        existing.sort();
        let sequence = existing
            .iter()
            .filter_map(|path| file_sequence(path))
            .max()
            .map_or(0, |last| last.wrapping_add(1));

        debug!("Channel recorder in {} ({} existing logs)", dir.display(), existing.len());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            sequence,
            files: existing.into(),
        })
    }

    /// Append one channel frame
    pub fn record(&mut self, bus: usize, data: &ChannelData) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = ChannelRecord::new(bus, data);
        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let mut attempts = 0;
        let (path, file) = loop {
            let name = format!(
                "{}{}_{:04}{}",
                FILE_PREFIX,
                Utc::now().format("%Y%m%d_%H%M%S"),
                self.sequence,
                FILE_SUFFIX
            );
            self.sequence = self.sequence.wrapping_add(1);

            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempts < MAX_NAME_ATTEMPTS => {
                    debug!("{} already exists, trying next sequence", path.display());
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files.push_back(path);

        while self.files.len() > self.max_files_to_keep {
            if let Some(old) = self.files.pop_front() {
                info!("Removing old channel log {}", old.display());
                if let Err(e) = fs::remove_file(&old) {
                    debug!("Failed to remove {}: {}", old.display(), e);
                }
            }
        }
        Ok(())
    }

    /// Log files currently kept, oldest first
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }
}

/// Sequence number of a `channels_<date>_<time>_<seq>.jsonl` name
fn file_sequence(path: &Path) -> Option<u32> {
    let stem = path.file_name()?.to_str()?.strip_suffix(FILE_SUFFIX)?;
    stem.rsplit('_').next()?.parse().ok()
}

impl Drop for ChannelRecorder {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> ChannelData {
        let mut data = ChannelData::default();
        data.mask = 0b11;
        data.values[0] = 1000;
        data.values[1] = 2000;
        data.rssi = -52;
        data
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().map_or(false, |e| e == "jsonl"))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_record_writes_json_lines() {
        let dir = tempdir().unwrap();
        let mut recorder = ChannelRecorder::new(dir.path(), 100, 5).unwrap();

        recorder.record(0, &sample()).unwrap();
        recorder.record(1, &sample()).unwrap();
        recorder.flush().unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 1);

        let contents = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["bus"], 0);
        assert_eq!(first["mask"], 3);
        assert_eq!(first["values"][1], 2000);
        assert_eq!(first["values"].as_array().unwrap().len(), 32);
        assert_eq!(first["rssi"], -52);
        assert_eq!(first["failsafe"], false);
        assert!(first["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = tempdir().unwrap();
        let mut recorder = ChannelRecorder::new(dir.path(), 2, 3).unwrap();

        for _ in 0..10 {
            recorder.record(0, &sample()).unwrap();
        }
        recorder.flush().unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 3);
        assert_eq!(recorder.files().count(), 3);

        let newest = fs::read_to_string(files.last().unwrap()).unwrap();
        assert_eq!(newest.lines().count(), 2);
    }

    #[test]
    fn test_existing_logs_count_towards_retention() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("channels_00000000_000000_0000.jsonl"), "{}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let mut recorder = ChannelRecorder::new(dir.path(), 10, 1).unwrap();
        recorder.record(0, &sample()).unwrap();

        assert_eq!(log_files(dir.path()).len(), 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_restart_keeps_previous_log() {
        let dir = tempdir().unwrap();

        let mut first = ChannelRecorder::new(dir.path(), 10, 5).unwrap();
        first.record(0, &sample()).unwrap();
        first.record(0, &sample()).unwrap();
        drop(first);

        let mut second = ChannelRecorder::new(dir.path(), 10, 5).unwrap();
        second.record(1, &sample()).unwrap();
        second.flush().unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 2);
        assert_eq!(second.files().count(), 2);
        assert_eq!(fs::read_to_string(&files[0]).unwrap().lines().count(), 2);
        assert_eq!(fs::read_to_string(&files[1]).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_existing_name_is_not_truncated() {
        let dir = tempdir().unwrap();
        let mut recorder = ChannelRecorder::new(dir.path(), 10, 5).unwrap();
        let taken = dir.path().join(format!(
            "{}{}_0000{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            FILE_SUFFIX
        ));
        fs::write(&taken, "kept\n").unwrap();

        recorder.record(0, &sample()).unwrap();

        assert_eq!(fs::read_to_string(&taken).unwrap(), "kept\n");
        assert!(recorder.files().all(|path| path != taken));
    }

    #[test]
    fn test_file_sequence_parsing() {
        assert_eq!(file_sequence(Path::new("logs/channels_20240101_120000_0042.jsonl")), Some(42));
        assert_eq!(file_sequence(Path::new("channels_20240101_120000_x.jsonl")), None);
        assert_eq!(file_sequence(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let mut recorder = ChannelRecorder::new(&nested, 10, 1).unwrap();
        recorder.record(0, &sample()).unwrap();
        assert!(nested.is_dir());
    }
}
