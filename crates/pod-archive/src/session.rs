//! Cached archive session over shared, immutable bytes.
//!
//! [`PodArchive`] reads the header and table once and keeps the entries in
//! memory. Bodies are never cached: every extraction streams through a
//! fresh [`ArchiveReader`] whose cursor belongs to the caller alone, so
//! several readers can work on the same bytes at once.

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::info;

use crate::archive::ArchiveReader;
use crate::entry::FileEntry;
use crate::header::ArchiveHeader;
use crate::{Error, Result};

/// Immutable archive bytes shared between readers.
#[derive(Debug, Clone)]
pub enum ArchiveBytes {
    /// Memory-mapped file.
    Mapped(Arc<Mmap>),
    /// Owned buffer.
    Owned(Arc<[u8]>),
}

impl AsRef<[u8]> for ArchiveBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            ArchiveBytes::Mapped(mmap) => &mmap[..],
            ArchiveBytes::Owned(bytes) => &bytes[..],
        }
    }
}

/// Reader type handed out by [`PodArchive::reader`].
pub type SharedReader = ArchiveReader<Cursor<ArchiveBytes>>;

/// An opened POD archive with its table of contents cached.
pub struct PodArchive {
    /// Archive bytes
    data: ArchiveBytes,
    /// Archive file name
    name: String,
    /// Header as read at open
    header: ArchiveHeader,
    /// Entries in table order
    entries: Vec<FileEntry>,
}

impl PodArchive {
    /// Open and index a POD archive on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // The map is read-only and the archive is not expected to change
        // while it is open.
        let mmap = unsafe { Mmap::map(&file)? };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self::load(name, ArchiveBytes::Mapped(Arc::new(mmap)))
    }

    /// Index a POD archive already held in memory.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        Self::load(name.into(), ArchiveBytes::Owned(data.into()))
    }

    fn load(name: String, data: ArchiveBytes) -> Result<Self> {
        let mut reader = ArchiveReader::open(Cursor::new(data.clone()))?;
        let header = reader.header()?;
        let entries = reader.read_entries()?;

        info!(
            archive = %name,
            version = header.version,
            entries = entries.len(),
            "loaded POD archive"
        );

        Ok(Self {
            data,
            name,
            header,
            entries,
        })
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the header read at open.
    #[inline]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Get the format version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Get the archive length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.data.as_ref().len() as u64
    }

    /// Get the number of entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Get all entries in table order.
    #[inline]
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Iterate over entries in table order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        self.entries.iter()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.entries.get(index)
    }

    /// Find an entry by name (case-insensitive, either separator).
    pub fn find(&self, name: &str) -> Option<&FileEntry> {
        let normalized = name.replace('/', "\\");
        self.entries
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(&normalized))
    }

    /// Entries whose bodies extend past the end of the archive.
    pub fn out_of_bounds(&self) -> impl Iterator<Item = (usize, &FileEntry)> + '_ {
        let len = self.len();
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| !e.fits_within(len))
    }

    /// Create an independent reader over the archive bytes.
    pub fn reader(&self) -> SharedReader {
        ArchiveReader::with_version(Cursor::new(self.data.clone()), self.header.version)
    }

    /// Stream the body of entry `index` into `sink`.
    pub fn extract<W: Write + ?Sized>(&self, index: usize, sink: &mut W) -> Result<u64> {
        let entry = self.entry(index)?;
        self.reader().extract_entry(entry, sink)
    }

    /// Read the body of entry `index` into memory.
    pub fn read(&self, index: usize) -> Result<Vec<u8>> {
        let entry = self.entry(index)?;
        self.reader().read_entry(entry)
    }

    /// Extract many entries in parallel.
    ///
    /// Each worker thread gets its own reader. `open_sink` is called once
    /// per entry to create its destination, and `callback` receives every
    /// outcome; calls to it are serialized. A failing entry does not stop
    /// the others, the caller decides what to do with the errors.
    #[cfg(feature = "parallel")]
    pub fn extract_parallel<S, W, C>(
        &self,
        indices: &[usize],
        open_sink: S,
        callback: C,
    ) -> Result<()>
    where
        S: Fn(&FileEntry) -> std::io::Result<W> + Sync,
        W: Write,
        C: FnMut(usize, &FileEntry, Result<u64>) + Send,
    {
        use parking_lot::Mutex;
        use rayon::prelude::*;
        use tracing::debug;

        for &index in indices {
            self.entry(index)?;
        }
        debug!(count = indices.len(), "parallel extraction");

        let callback = Mutex::new(callback);

        indices.par_iter().for_each_init(
            || self.reader(),
            |reader, &index| {
                let entry = &self.entries[index];
                let result = open_sink(entry)
                    .map_err(|source| Error::WriteError {
                        name: entry.name().to_string(),
                        written: 0,
                        source,
                    })
                    .and_then(|mut sink| {
                        let copied = reader.extract_entry(entry, &mut sink)?;
                        sink.flush().map_err(|source| Error::WriteError {
                            name: entry.name().to_string(),
                            written: copied,
                            source,
                        })?;
                        Ok(copied)
                    });

                let mut callback = callback.lock();
                (*callback)(index, entry, result);
            },
        );

        Ok(())
    }

    fn entry(&self, index: usize) -> Result<&FileEntry> {
        self.entries
            .get(index)
            .ok_or_else(|| Error::EntryNotFound(format!("#{index}")))
    }
}

impl std::fmt::Debug for PodArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodArchive")
            .field("name", &self.name)
            .field("version", &self.header.version)
            .field("entries", &self.entries.len())
            .finish()
    }
}
