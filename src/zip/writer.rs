//! ZIP archive writer.
//!
//! Entries are prepared (read, checksummed, compressed) independently of the
//! writer so callers may prepare several at once; committing them with
//! [`ZipWriter::add_entry`] is sequential and fixes their order in the archive.

use std::io::{Read, Write};

use anyhow::{Result, bail};
use chrono::{Local, NaiveDateTime};
use flate2::Compression;
use flate2::write::DeflateEncoder;

use super::structures::*;

/// Largest value that fits a classic (non-ZIP64) size or offset field.
const MAX_CLASSIC_SIZE: u64 = 0xFFFF_FFFE;
/// Largest entry count that fits the classic EOCD.
const MAX_CLASSIC_ENTRIES: usize = 0xFFFE;

/// An entry whose data is checksummed and compressed, ready to be committed.
#[derive(Debug, Clone)]
pub struct PreparedEntry {
    file_name: String,
    compression_method: CompressionMethod,
    crc32: u32,
    uncompressed_size: u64,
    data: Vec<u8>,
    is_directory: bool,
}

impl PreparedEntry {
    /// Read `reader` to the end and compress it with `method`.
    ///
    /// Deflated output that is not smaller than the input is stored instead.
    /// A name ending in `/` denotes a directory and must not carry data.
    pub fn from_reader<R: Read>(
        file_name: String,
        method: CompressionMethod,
        mut reader: R,
    ) -> Result<Self> {
        if file_name.len() > u16::MAX as usize {
            bail!("Entry name is longer than {} bytes", u16::MAX);
        }

        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;

        let is_directory = file_name.ends_with('/');
        if is_directory && !raw.is_empty() {
            bail!("Directory entry {} cannot carry data", file_name);
        }
        if raw.len() as u64 > MAX_CLASSIC_SIZE {
            bail!("Entry {} exceeds the 4 GiB member limit", file_name);
        }

        let crc32 = crc32fast::hash(&raw);
        let uncompressed_size = raw.len() as u64;

        let (compression_method, data) = match method {
            CompressionMethod::Deflate if !raw.is_empty() => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&raw)?;
                let compressed = encoder.finish()?;
                if compressed.len() < raw.len() {
                    (CompressionMethod::Deflate, compressed)
                } else {
                    (CompressionMethod::Stored, raw)
                }
            }
            CompressionMethod::Deflate | CompressionMethod::Stored => {
                (CompressionMethod::Stored, raw)
            }
            CompressionMethod::Unknown(code) => bail!("Unsupported compression method: {}", code),
        };

        Ok(Self {
            file_name,
            compression_method,
            crc32,
            uncompressed_size,
            data,
            is_directory,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn compression_method(&self) -> CompressionMethod {
        self.compression_method
    }
}

/// Streaming ZIP writer over any [`Write`] sink.
pub struct ZipWriter<W: Write> {
    inner: W,
    /// Bytes written so far; the next local header starts here
    offset: u64,
    central: Vec<(EntryHeader, u32)>,
    last_mod_time: u16,
    last_mod_date: u16,
}

impl<W: Write> ZipWriter<W> {
    /// Create a writer stamping every entry with the current local time.
    pub fn new(inner: W) -> Self {
        Self::with_timestamp(inner, Local::now().naive_local())
    }

    pub fn with_timestamp(inner: W, modified: NaiveDateTime) -> Self {
        let (last_mod_time, last_mod_date) = to_dos_datetime(modified);
        Self {
            inner,
            offset: 0,
            central: Vec::new(),
            last_mod_time,
            last_mod_date,
        }
    }

    /// Append a prepared entry: local header followed by its data.
    pub fn add_entry(&mut self, entry: PreparedEntry) -> Result<()> {
        if self.central.len() >= MAX_CLASSIC_ENTRIES {
            bail!("Archive cannot hold more than {} entries", MAX_CLASSIC_ENTRIES);
        }
        if self.offset > MAX_CLASSIC_SIZE {
            bail!("Archive exceeds the 4 GiB size limit");
        }
        let lfh_offset = self.offset as u32;

        let header = EntryHeader {
            file_name: entry.file_name,
            compression_method: entry.compression_method,
            last_mod_time: self.last_mod_time,
            last_mod_date: self.last_mod_date,
            crc32: entry.crc32,
            compressed_size: entry.data.len() as u32,
            uncompressed_size: entry.uncompressed_size as u32,
            is_directory: entry.is_directory,
        };

        let written = header.write_local(&mut self.inner)?;
        self.inner.write_all(&entry.data)?;
        self.offset += (written + entry.data.len()) as u64;

        self.central.push((header, lfh_offset));
        Ok(())
    }

    /// Prepare and append an entry in one step.
    pub fn add_reader<R: Read>(
        &mut self,
        file_name: String,
        method: CompressionMethod,
        reader: R,
    ) -> Result<()> {
        let entry = PreparedEntry::from_reader(file_name, method, reader)?;
        self.add_entry(entry)
    }

    /// Write the Central Directory and EOCD, returning the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        let cd_offset = self.offset;

        let mut cd_size = 0u64;
        for (header, lfh_offset) in &self.central {
            cd_size += header.write_central(&mut self.inner, *lfh_offset)? as u64;
        }

        if cd_offset > MAX_CLASSIC_SIZE || cd_size > MAX_CLASSIC_SIZE {
            bail!("Archive exceeds the 4 GiB size limit");
        }

        let entries = self.central.len() as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: cd_size as u32,
            cd_offset: cd_offset as u32,
            comment_len: 0,
        }
        .write_to(&mut self.inner)?;

        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_archive_is_a_bare_eocd() {
        let zip = ZipWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(zip.len(), EndOfCentralDirectory::SIZE);
        let eocd = EndOfCentralDirectory::from_bytes(&zip).unwrap();
        assert_eq!(eocd.total_entries, 0);
        assert_eq!(eocd.cd_offset, 0);
    }

    #[test]
    fn compressible_data_is_deflated() {
        let data = vec![b'a'; 4096];
        let entry =
            PreparedEntry::from_reader("a.txt".into(), CompressionMethod::Deflate, &data[..])
                .unwrap();
        assert_eq!(entry.compression_method(), CompressionMethod::Deflate);
        assert!(entry.data.len() < data.len());
        assert_eq!(entry.crc32, crc32fast::hash(&data));
    }

    #[test]
    fn incompressible_data_is_stored() {
        let entry =
            PreparedEntry::from_reader("tiny".into(), CompressionMethod::Deflate, &b"xy"[..])
                .unwrap();
        assert_eq!(entry.compression_method(), CompressionMethod::Stored);
        assert_eq!(entry.data, b"xy");
    }

    #[test]
    fn directory_with_data_is_rejected() {
        let err = PreparedEntry::from_reader("dir/".into(), CompressionMethod::Stored, &b"x"[..]);
        assert!(err.is_err());

        let dir = PreparedEntry::from_reader("dir/".into(), CompressionMethod::Stored, &b""[..])
            .unwrap();
        assert!(dir.is_directory);
    }

    #[test]
    fn eocd_points_at_central_directory() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_reader("one.txt".into(), CompressionMethod::Stored, &b"hello"[..])
            .unwrap();
        writer
            .add_reader("two.txt".into(), CompressionMethod::Stored, &b"world!"[..])
            .unwrap();
        let zip = writer.finish().unwrap();

        let eocd =
            EndOfCentralDirectory::from_bytes(&zip[zip.len() - EndOfCentralDirectory::SIZE..])
                .unwrap();
        assert_eq!(eocd.total_entries, 2);
        // Two local headers with their data precede the directory
        let expected_cd_offset = (LFH_SIZE + 7 + 5) + (LFH_SIZE + 7 + 6);
        assert_eq!(eocd.cd_offset as usize, expected_cd_offset);
        assert_eq!(eocd.cd_size as usize, 2 * (CDFH_MIN_SIZE + 7));
        assert_eq!(&zip[eocd.cd_offset as usize..][..4], CDFH_SIGNATURE);
    }
}
