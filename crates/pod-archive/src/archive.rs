//! POD archive reader.
//!
//! [`ArchiveReader`] decodes the header and table of contents of a POD v5
//! archive and streams entry bodies out of it. It owns a single cursor, so
//! every operation takes `&mut self`; give each thread its own reader.

use std::io::{Read, Seek, Write};

use pod_common::ByteStream;
use tracing::{debug, trace, warn};

use crate::entry::FileEntry;
use crate::error::TablePass;
use crate::header::{
    ArchiveHeader, TableRecord, FILE_COUNT_OFFSET, MAGIC, SUPPORTED_VERSION, TABLE_OFFSET_OFFSET,
    VERSION_OFFSET,
};
use crate::{Error, Result};

/// Chunk size for body copies.
pub const COPY_CHUNK: usize = 1024;

/// Upper bound on up-front allocation driven by untrusted header values.
const MAX_PREALLOC: usize = 1 << 16;

/// Reader for a validated POD archive.
///
/// Constructing one through [`open`](Self::open) is the only way to obtain
/// it, so an `ArchiveReader` always refers to a source with a good magic and
/// a supported version.
///
/// # Example
///
/// ```no_run
/// use std::fs::File;
/// use pod_archive::ArchiveReader;
///
/// let mut reader = ArchiveReader::open(File::open("game.pod")?)?;
/// for entry in reader.read_entries()? {
///     let mut out = Vec::new();
///     reader.extract_entry(&entry, &mut out)?;
///     println!("{}: {} bytes", entry.name(), out.len());
/// }
/// # Ok::<(), pod_archive::Error>(())
/// ```
#[derive(Debug)]
pub struct ArchiveReader<R> {
    stream: ByteStream<R>,
    version: u32,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Validate the header of `source` and return a ready reader.
    pub fn open(source: R) -> Result<Self> {
        let mut stream = ByteStream::new(source);

        stream.seek(0)?;
        let magic = match stream.read_bytes(MAGIC.len()) {
            Ok(magic) => magic,
            Err(e) if e.is_unexpected_eof() => {
                return Err(Error::InvalidFormat { found: Vec::new() })
            }
            Err(e) => return Err(e.into()),
        };
        if magic != MAGIC {
            debug!(?magic, "bad magic");
            return Err(Error::InvalidFormat { found: magic });
        }

        stream.seek(VERSION_OFFSET)?;
        let raw = stream.read_u8()?;
        let version = char::from(raw)
            .to_digit(10)
            .filter(|&v| v == SUPPORTED_VERSION)
            .ok_or(Error::UnsupportedVersion(raw))?;

        debug!(version, "opened POD archive");
        Ok(Self::with_version(stream.into_inner(), version))
    }

    /// Wrap a source whose header has already been validated.
    pub(crate) fn with_version(source: R, version: u32) -> Self {
        Self {
            stream: ByteStream::new(source),
            version,
        }
    }

    /// Get the format version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Get a reference to the underlying source.
    #[inline]
    pub fn get_ref(&self) -> &R {
        self.stream.get_ref()
    }

    /// Unwrap the reader, returning the underlying source.
    #[inline]
    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }

    /// Read the number of table records.
    pub fn file_count(&mut self) -> Result<u32> {
        self.read_header_field(FILE_COUNT_OFFSET, "file count")
    }

    /// Read the absolute offset of the table of contents.
    pub fn table_offset(&mut self) -> Result<u32> {
        self.read_header_field(TABLE_OFFSET_OFFSET, "table offset")
    }

    /// Read every known header field.
    pub fn header(&mut self) -> Result<ArchiveHeader> {
        Ok(ArchiveHeader {
            magic: MAGIC,
            version: self.version,
            file_count: self.file_count()?,
            table_offset: self.table_offset()?,
        })
    }

    /// Get the total length of the archive in bytes.
    pub fn stream_len(&mut self) -> Result<u64> {
        Ok(self.stream.stream_len()?)
    }

    /// Decode the table of contents and resolve every entry name.
    ///
    /// Records are read front to back first. Names are then resolved
    /// relative to the end of the record array, in record order; their
    /// offsets need not be sorted.
    pub fn read_entries(&mut self) -> Result<Vec<FileEntry>> {
        let count = self.file_count()? as usize;
        let table_offset = self.table_offset()?;
        debug!(count, table_offset, "reading table of contents");

        self.stream
            .seek(table_offset as i64)
            .map_err(malformed(TablePass::Records, 0))?;

        let mut records = Vec::with_capacity(count.min(MAX_PREALLOC));
        for index in 0..count {
            let record: TableRecord = self
                .stream
                .read_struct()
                .map_err(malformed(TablePass::Records, index))?;
            records.push(record);
        }

        let name_table = self
            .stream
            .tell()
            .map_err(malformed(TablePass::Records, count))?;

        let mut entries = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let position = name_table as i64 + record.name_offset() as i64;
            self.stream
                .seek(position)
                .map_err(malformed(TablePass::Names, index))?;
            let name = self
                .stream
                .read_null_terminated_bytes()
                .map_err(malformed(TablePass::Names, index))?;

            let entry = FileEntry::from_record(name, record);
            trace!(index, name = entry.name(), size = record.size(), offset = record.offset(), "entry");
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Copy the body of `entry` into `sink`, returning the bytes copied.
    ///
    /// Exactly [`FileEntry::size`] bytes are written on success. A source
    /// that ends early yields [`Error::UnexpectedEof`]; anything already
    /// written to `sink` stays there.
    pub fn extract_entry<W: Write + ?Sized>(
        &mut self,
        entry: &FileEntry,
        sink: &mut W,
    ) -> Result<u64> {
        let expected = u64::try_from(entry.size()).map_err(|_| Error::InvalidEntryField {
            name: entry.name().to_string(),
            field: "size",
            value: entry.size(),
        })?;

        self.stream.seek(entry.offset() as i64)?;

        let mut buffer = [0u8; COPY_CHUNK];
        let mut copied = 0u64;
        while copied < expected {
            let want = (expected - copied).min(COPY_CHUNK as u64) as usize;
            let read = self.stream.read_some(&mut buffer[..want])?;
            if read == 0 {
                warn!(name = entry.name(), expected, copied, "archive ended inside entry");
                return Err(Error::UnexpectedEof {
                    name: entry.name().to_string(),
                    expected,
                    copied,
                });
            }

            sink.write_all(&buffer[..read])
                .map_err(|source| Error::WriteError {
                    name: entry.name().to_string(),
                    written: copied,
                    source,
                })?;
            copied += read as u64;
        }

        trace!(name = entry.name(), copied, "extracted");
        Ok(copied)
    }

    /// Read the body of `entry` into memory.
    pub fn read_entry(&mut self, entry: &FileEntry) -> Result<Vec<u8>> {
        let capacity = usize::try_from(entry.size()).unwrap_or(0).min(MAX_PREALLOC);
        let mut data = Vec::with_capacity(capacity);
        self.extract_entry(entry, &mut data)?;
        Ok(data)
    }

    /// Check up front that the body of `entry` lies inside the archive.
    ///
    /// [`extract_entry`](Self::extract_entry) does not call this; it only
    /// notices truncation once the copy runs dry.
    pub fn check_bounds(&mut self, entry: &FileEntry) -> Result<()> {
        let archive_len = self.stream_len()?;
        if entry.fits_within(archive_len) {
            Ok(())
        } else {
            Err(Error::EntryOutOfBounds {
                name: entry.name().to_string(),
                offset: entry.offset(),
                size: entry.size(),
                archive_len,
            })
        }
    }

    fn read_header_field(&mut self, offset: i64, field: &'static str) -> Result<u32> {
        self.stream.seek(offset)?;
        let value = self.stream.read_i32_le()?;
        u32::try_from(value).map_err(|_| Error::InvalidHeaderField { field, value })
    }
}

fn malformed(pass: TablePass, index: usize) -> impl FnOnce(pod_common::Error) -> Error {
    move |source| Error::MalformedTable {
        pass,
        index,
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, SeekFrom};

    use super::*;
    use crate::test_support::{put_i32, ArchiveBuilder, FailingSink};

    fn open(data: Vec<u8>) -> ArchiveReader<Cursor<Vec<u8>>> {
        ArchiveReader::open(Cursor::new(data)).unwrap()
    }

    /// Counts read calls made against the wrapped source.
    #[derive(Debug)]
    struct CountingSource {
        inner: Cursor<Vec<u8>>,
        reads: usize,
    }

    impl Read for CountingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            self.inner.read(buf)
        }
    }

    impl Seek for CountingSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_open_valid() {
        let reader = open(ArchiveBuilder::new().build());
        assert_eq!(reader.version(), 5);
    }

    #[test]
    fn test_open_bad_magic_stops_reading() {
        let mut data = ArchiveBuilder::new().file("a", b"x").build();
        data[..3].copy_from_slice(b"ZIP");

        let mut source = CountingSource {
            inner: Cursor::new(data),
            reads: 0,
        };
        let err = ArchiveReader::open(&mut source).unwrap_err();

        match err {
            Error::InvalidFormat { found } => assert_eq!(found, b"ZIP"),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
        assert_eq!(source.reads, 1);
    }

    #[test]
    fn test_open_short_source() {
        let err = ArchiveReader::open(Cursor::new(b"PO".to_vec())).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
    }

    #[test]
    fn test_open_unsupported_version() {
        for version in [b'4', b'6', b'0', b'x', 0] {
            let data = ArchiveBuilder::new().version(version).build();
            match ArchiveReader::open(Cursor::new(data)) {
                Err(Error::UnsupportedVersion(found)) => assert_eq!(found, version),
                other => panic!("expected UnsupportedVersion, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_header() {
        let data = ArchiveBuilder::new()
            .file("a", b"1")
            .file("b", b"22")
            .table_offset(300)
            .build();
        let header = open(data).header().unwrap();

        assert_eq!(header.magic, *b"POD");
        assert_eq!(header.version, 5);
        assert_eq!(header.file_count, 2);
        assert_eq!(header.table_offset, 300);
    }

    #[test]
    fn test_negative_file_count() {
        let mut data = ArchiveBuilder::new().build();
        put_i32(&mut data, 88, -3);

        match open(data).file_count() {
            Err(Error::InvalidHeaderField { field, value }) => {
                assert_eq!(field, "file count");
                assert_eq!(value, -3);
            }
            other => panic!("expected InvalidHeaderField, got {other:?}"),
        }
    }

    #[test]
    fn test_file_count_matches_entries() {
        let data = ArchiveBuilder::new()
            .file("one", b"1")
            .file("two", b"22")
            .file("three", b"333")
            .build();
        let mut reader = open(data);

        let count = reader.file_count().unwrap();
        assert_eq!(reader.read_entries().unwrap().len(), count as usize);
    }

    #[test]
    fn test_empty_archive() {
        let mut reader = open(ArchiveBuilder::new().build());
        assert!(reader.read_entries().unwrap().is_empty());
    }

    #[test]
    fn test_two_entry_layout() {
        // Hand-built: header, table at 300, name table, then two bodies.
        let mut data = vec![0u8; 300];
        data[..4].copy_from_slice(b"POD5");
        put_i32(&mut data, 88, 2);
        put_i32(&mut data, 264, 300);

        let names: &[u8] = b"readme.txt\0data\\file.bin\0";
        let first_body = 300 + 2 * 28 + names.len();
        let bodies: [&[u8]; 2] = [b"hello pod", b"\x00\x01\x02\x03\x04"];
        let offsets = [first_body, first_body + bodies[0].len()];
        let name_offsets = [0, 11];

        for i in 0..2 {
            let mut record = [0u8; 28];
            put_i32(&mut record, 0, name_offsets[i]);
            put_i32(&mut record, 4, bodies[i].len() as i32);
            put_i32(&mut record, 8, offsets[i] as i32);
            put_i32(&mut record, 12, bodies[i].len() as i32);
            data.extend_from_slice(&record);
        }
        data.extend_from_slice(names);
        data.extend_from_slice(bodies[0]);
        data.extend_from_slice(bodies[1]);

        let mut reader = open(data);
        let entries = reader.read_entries().unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name(), "readme.txt");
        assert_eq!(entries[1].name(), "data\\file.bin");
        assert_eq!(entries[0].size(), 9);
        assert_eq!(entries[1].size(), 5);
        assert_eq!(entries[0].offset() as usize, offsets[0]);

        for (entry, body) in entries.iter().zip(bodies) {
            let mut out = Vec::new();
            let copied = reader.extract_entry(entry, &mut out).unwrap();
            assert_eq!(copied, body.len() as u64);
            assert_eq!(out, body);
        }
    }

    #[test]
    fn test_round_trip() {
        let big: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 251) as u8).collect();
        let exact: Vec<u8> = vec![0x5A; COPY_CHUNK];
        let files: Vec<(&str, &[u8])> = vec![
            (r"sound\engine.wav", &big[..]),
            ("empty.txt", &b""[..]),
            (r"maps\level1\terrain.raw", &exact[..]),
            ("tiny", &b"t"[..]),
        ];

        let mut builder = ArchiveBuilder::new();
        for (name, data) in &files {
            builder = builder.file(name, data);
        }
        let mut reader = open(builder.build());
        let entries = reader.read_entries().unwrap();

        assert_eq!(entries.len(), files.len());
        for (entry, (name, data)) in entries.iter().zip(&files) {
            assert_eq!(entry.name(), *name);
            assert_eq!(
                entry.output_path().to_string_lossy(),
                name.replace('\\', "/")
            );
            assert_eq!(reader.read_entry(entry).unwrap(), *data);
        }
    }

    #[test]
    fn test_opaque_fields_preserved() {
        let data = ArchiveBuilder::new().file("a", b"1").file("b", b"2").build();
        let entries = open(data).read_entries().unwrap();

        assert_eq!(entries[1].unknown1(), [1, 0xAA, 0xBB, 0xCC]);
        assert_eq!(entries[1].unknown2(), [0; 4]);
        assert_eq!(entries[1].unknown3(), [0xFF; 4]);
        assert_eq!(entries[1].size2(), 1);
    }

    #[test]
    fn test_names_in_reverse_order() {
        let data = ArchiveBuilder::new()
            .file("first", b"1")
            .file(r"second\file", b"2")
            .file("third.bin", b"3")
            .reverse_names()
            .build();
        let entries = open(data).read_entries().unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["first", r"second\file", "third.bin"]);
    }

    #[test]
    fn test_non_utf8_names_stay_distinct() {
        let mut data = ArchiveBuilder::new()
            .file("a1.txt", b"one")
            .file("a2.txt", b"two")
            .build();
        for (needle, byte) in [(b"a1.txt\0", 0xFF), (b"a2.txt\0", 0xFE)] {
            let pos = data.windows(7).position(|w| w == needle).unwrap();
            data[pos + 1] = byte;
        }

        let mut reader = open(data);
        let entries = reader.read_entries().unwrap();

        assert_eq!(entries[0].name(), entries[1].name());
        assert_eq!(entries[0].name_bytes(), b"a\xff.txt");
        assert_eq!(entries[1].name_bytes(), b"a\xfe.txt");
        assert_eq!(reader.read_entry(&entries[1]).unwrap(), b"two");
    }

    #[test]
    fn test_read_entries_is_repeatable() {
        let data = ArchiveBuilder::new().file("a", b"abc").file("b", b"de").build();
        let mut reader = open(data);

        let first = reader.read_entries().unwrap();
        let mut sink = Vec::new();
        reader.extract_entry(&first[0], &mut sink).unwrap();
        assert_eq!(reader.read_entries().unwrap(), first);
    }

    #[test]
    fn test_truncated_records() {
        let mut data = ArchiveBuilder::new().file("a", b"1").file("b", b"2").build();
        data.truncate(268 + 28 + 10);

        match open(data).read_entries() {
            Err(Error::MalformedTable { pass, index, source }) => {
                assert_eq!(pass, TablePass::Records);
                assert_eq!(index, 1);
                assert!(source.is_unexpected_eof());
            }
            other => panic!("expected MalformedTable, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_name_terminator() {
        let mut data = ArchiveBuilder::new().file("name", b"").build();
        data.pop();

        let err = open(data).read_entries().unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedTable {
                pass: TablePass::Names,
                index: 0,
                ..
            }
        ));
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn test_negative_name_offset() {
        let mut data = ArchiveBuilder::new().file("a", b"1").build();
        put_i32(&mut data, 268, -1000);

        match open(data).read_entries() {
            Err(Error::MalformedTable {
                pass: TablePass::Names,
                source: pod_common::Error::SeekFailure { .. },
                ..
            }) => {}
            other => panic!("expected MalformedTable seek failure, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_body() {
        let mut data = ArchiveBuilder::new().file("big", &[7u8; 3000]).build();
        data.truncate(data.len() - 100);
        let mut reader = open(data);
        let entries = reader.read_entries().unwrap();

        let mut out = Vec::new();
        match reader.extract_entry(&entries[0], &mut out) {
            Err(Error::UnexpectedEof {
                expected, copied, ..
            }) => {
                assert_eq!(expected, 3000);
                assert_eq!(copied, 2900);
            }
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
        assert_eq!(out.len(), 2900);
        assert!(reader.check_bounds(&entries[0]).is_err());
    }

    #[test]
    fn test_sink_failure() {
        let data = ArchiveBuilder::new().file("big", &[1u8; 4000]).build();
        let mut reader = open(data);
        let entries = reader.read_entries().unwrap();

        let mut sink = FailingSink {
            written: Vec::new(),
            limit: 1500,
        };
        match reader.extract_entry(&entries[0], &mut sink) {
            Err(Error::WriteError { name, written, .. }) => {
                assert_eq!(name, "big");
                assert_eq!(written, 1024);
            }
            other => panic!("expected WriteError, got {other:?}"),
        }
        assert_eq!(sink.written.len(), 1500);
    }

    #[test]
    fn test_negative_entry_offset() {
        let mut data = ArchiveBuilder::new().file("a", b"abc").build();
        put_i32(&mut data, 268 + 8, -5);
        let mut reader = open(data);
        let entries = reader.read_entries().unwrap();

        let err = reader.extract_entry(&entries[0], &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Stream(pod_common::Error::SeekFailure { offset: -5, .. })
        ));
    }

    #[test]
    fn test_negative_entry_size() {
        let mut data = ArchiveBuilder::new().file("a", b"abc").build();
        put_i32(&mut data, 268 + 4, -1);
        let mut reader = open(data);
        let entries = reader.read_entries().unwrap();

        let err = reader.read_entry(&entries[0]).unwrap_err();
        assert!(matches!(err, Error::InvalidEntryField { field: "size", .. }));
    }

    #[test]
    fn test_check_bounds() {
        let data = ArchiveBuilder::new().file("a", b"abc").build();
        let mut reader = open(data);
        let entries = reader.read_entries().unwrap();

        assert!(reader.check_bounds(&entries[0]).is_ok());
    }
}
