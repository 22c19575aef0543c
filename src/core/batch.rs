use std::path::PathBuf;

/// A small file held in memory until its batch is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub relative_path: PathBuf,
    pub data: Vec<u8>,
}

/// Ordered group of small files written to disk as one unit
#[derive(Debug, Default)]
pub struct Batch {
    records: Vec<FileRecord>,
    size: u64,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, relative_path: PathBuf, data: Vec<u8>) {
        self.size += data.len() as u64;
        self.records.push(FileRecord { relative_path, data });
    }

    /// Cumulative payload size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FileRecord> {
        self.records
    }
}
