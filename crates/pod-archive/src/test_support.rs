//! Synthetic archive construction for tests.

use std::io::{self, Write};

use zerocopy::IntoBytes;

use crate::header::{TableRecord, FILE_COUNT_OFFSET, MAGIC, TABLE_OFFSET_OFFSET};

/// Smallest header that covers every known field.
pub(crate) const HEADER_LEN: usize = 268;

/// Builds POD v5 images in memory.
///
/// Layout: header (padded to the table offset), records, name table, bodies.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveBuilder {
    files: Vec<(String, Vec<u8>)>,
    table_offset: usize,
    version: u8,
    reverse_names: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            table_offset: HEADER_LEN,
            version: b'5',
            reverse_names: false,
        }
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.files.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn table_offset(mut self, offset: usize) -> Self {
        assert!(offset >= HEADER_LEN);
        self.table_offset = offset;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Store names in reverse record order so relative offsets decrease.
    pub fn reverse_names(mut self) -> Self {
        self.reverse_names = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let count = self.files.len();

        let mut names = Vec::new();
        let mut name_offsets = vec![0usize; count];
        let order: Vec<usize> = if self.reverse_names {
            (0..count).rev().collect()
        } else {
            (0..count).collect()
        };
        for i in order {
            name_offsets[i] = names.len();
            names.extend_from_slice(self.files[i].0.as_bytes());
            names.push(0);
        }

        let body_start = self.table_offset + count * 28 + names.len();
        let mut records = Vec::new();
        let mut bodies = Vec::new();
        for (i, (_, data)) in self.files.iter().enumerate() {
            let record = TableRecord {
                name_offset: (name_offsets[i] as i32).to_le(),
                size: (data.len() as i32).to_le(),
                offset: ((body_start + bodies.len()) as i32).to_le(),
                size2: (data.len() as i32).to_le(),
                unknown1: [i as u8, 0xAA, 0xBB, 0xCC],
                unknown2: [0; 4],
                unknown3: [0xFF; 4],
            };
            records.extend_from_slice(record.as_bytes());
            bodies.extend_from_slice(data);
        }

        let mut out = vec![0u8; self.table_offset];
        out[..3].copy_from_slice(&MAGIC);
        out[3] = self.version;
        put_i32(&mut out, FILE_COUNT_OFFSET as usize, count as i32);
        put_i32(&mut out, TABLE_OFFSET_OFFSET as usize, self.table_offset as i32);
        out.extend_from_slice(&records);
        out.extend_from_slice(&names);
        out.extend_from_slice(&bodies);
        out
    }
}

pub(crate) fn put_i32(buf: &mut [u8], at: usize, value: i32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// A sink that accepts `limit` bytes and then fails.
pub(crate) struct FailingSink {
    pub written: Vec<u8>,
    pub limit: usize,
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.limit - self.written.len();
        if room == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        let n = buf.len().min(room);
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
