//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Every offset and length taken from the archive is checked against the
//! size of the source before it is used, so a corrupt directory fails with
//! an error rather than a huge allocation or a short read.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// This struct handles reading and parsing ZIP structures from
/// a data source. It's generic over the reader type so the same code
/// serves uploads held in memory and archives read from disk.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let entries = parser.list_files().await?;
/// for entry in entries {
///     let offset = parser.get_data_offset(&entry).await?;
///     // Read file data from offset...
/// }
/// ```
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// Returns an error if no valid EOCD can be found, indicating
    /// the file is not a valid ZIP archive.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            bail!("Not a valid ZIP file");
        }

        // Optimization: First try the simple case where there's no comment.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;

        // Check for signature and zero-length comment
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // EOCD not at expected location - the archive carries a comment.
        // Search backwards from the end of the file.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment must fit in the remaining bytes; anything after it is ignored.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if i + EndOfCentralDirectory::SIZE + comment_len <= buf.len() {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions may be needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF). Returns `None` when no locator
    /// precedes the EOCD, in which case the classic values are taken as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the locator is present but the ZIP64 EOCD it
    /// points at is missing or invalid.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Option<(Zip64EOCD, u64)>> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            return Ok(None);
        };
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;
        if &locator_buf[0..4] != Zip64EOCDLocator::SIGNATURE {
            return Ok(None);
        }

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;
        if locator.total_disks > 1 {
            bail!("Split archives are not supported");
        }
        if locator.eocd64_offset > locator_offset {
            bail!("ZIP64 End of Central Directory lies past its locator");
        }

        // Read the actual ZIP64 EOCD from the offset specified in the locator
        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Ok(Some((Zip64EOCD::from_bytes(&eocd64_buf)?, locator.eocd64_offset)))
    }

    /// Offset of the first byte of the archive proper.
    ///
    /// Data prepended to an archive (a self-extractor stub, say) shifts every
    /// stored offset. The shift is the gap between where the directory ends
    /// and where its recorded offset and size say it should end. A directory
    /// header found at the unshifted offset wins over a computed shift.
    async fn base_offset(&self, dir_end: u64, cd_offset: u64, cd_size: u64) -> Result<u64> {
        let base = dir_end
            .checked_sub(cd_size)
            .and_then(|v| v.checked_sub(cd_offset))
            .context("Central Directory extends past the end of the archive")?;

        if base > 0 && cd_size >= 4 {
            let mut sig = [0u8; 4];
            let found = self.reader.read_exact_at(cd_offset, &mut sig).await.is_ok();
            if found && sig == CDFH_SIGNATURE {
                return Ok(0);
            }
        }
        Ok(base)
    }

    /// List all entries in the ZIP archive, directories included.
    ///
    /// Reads the EOCD first, then fetches and parses the entire
    /// Central Directory. Entries are returned in directory order.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is invalid or any directory
    /// record is malformed. No partial listing is returned.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        if eocd.is_multi_disk() {
            bail!("Split archives are not supported");
        }

        // Get Central Directory info, using ZIP64 if needed. `dir_end` is where
        // the directory is expected to stop: the first end record after it.
        let zip64 = if eocd.is_zip64() {
            self.read_zip64_eocd(eocd_offset).await?
        } else {
            None
        };
        let (cd_offset, cd_size, total_entries, dir_end) = match zip64 {
            Some((eocd64, eocd64_offset)) => (
                eocd64.cd_offset,
                eocd64.cd_size,
                eocd64.total_entries,
                eocd64_offset,
            ),
            None => (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
                eocd_offset,
            ),
        };

        let base_offset = self.base_offset(dir_end, cd_offset, cd_size).await?;
        let cd_start = base_offset
            .checked_add(cd_offset)
            .context("Central Directory bounds overflow")?;
        let cd_end = cd_start
            .checked_add(cd_size)
            .context("Central Directory bounds overflow")?;
        if cd_end > dir_end {
            bail!("Central Directory extends past the end of the archive");
        }
        // Each record needs at least CDFH_MIN_SIZE bytes
        if total_entries > cd_size / CDFH_MIN_SIZE as u64 {
            bail!(
                "Central Directory of {} bytes cannot hold {} entries",
                cd_size,
                total_entries
            );
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_start, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..total_entries {
            let mut entry = self
                .parse_cdfh(&mut cursor)
                .with_context(|| format!("Malformed Central Directory record #{}", index))?;
            entry.lfh_offset = entry
                .lfh_offset
                .checked_add(base_offset)
                .with_context(|| format!("Local header offset overflow in record #{}", index))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// The CDFH contains metadata about a file in the archive, including
    /// its name, sizes, and location of the actual file data.
    fn parse_cdfh(&self, cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        // Read and verify the signature (PK\x01\x02)
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        // Read fixed-size header fields
        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        // Bit 0: traditional encryption, bit 6: strong encryption
        if flags & 0x0041 != 0 {
            bail!("Encrypted entries are not supported");
        }

        // Read the variable-length file name
        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Use lossy conversion to handle non-UTF8 filenames gracefully
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        let is_directory = file_name.ends_with('/') || is_directory_attr(version_made_by, external_attrs);

        // A saturated field means the real value sits in the ZIP64 extra block
        let mut need_uncompressed = uncompressed_size == 0xFFFFFFFF;
        let mut need_compressed = compressed_size == 0xFFFFFFFF;
        let mut need_offset = lfh_offset == 0xFFFFFFFF;

        // Parse extra field for ZIP64 extended information (header ID 0x0001)
        let extra_field_end = cursor.position() + extra_field_length as u64;
        if extra_field_end > cursor.get_ref().len() as u64 {
            bail!("Extra field runs past the Central Directory");
        }

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;
            let field_end = cursor.position() + field_size as u64;
            if field_end > extra_field_end {
                bail!("Extra field block overruns its header");
            }

            if header_id == ZIP64_EXTRA_ID {
                // Values appear in this order, only for the saturated fields
                if need_uncompressed {
                    uncompressed_size = read_zip64_value(cursor, field_end)?;
                    need_uncompressed = false;
                }
                if need_compressed {
                    compressed_size = read_zip64_value(cursor, field_end)?;
                    need_compressed = false;
                }
                if need_offset {
                    lfh_offset = read_zip64_value(cursor, field_end)?;
                    need_offset = false;
                }
            }
            cursor.set_position(field_end);
        }

        // A missing uncompressed size is tolerated; the other two locate data
        if need_compressed {
            bail!("Compressed size needs a ZIP64 extra field, none found");
        }
        if need_offset {
            bail!("Local header offset needs a ZIP64 extra field, none found");
        }

        // Ensure cursor is positioned after extra field
        cursor.set_position(extra_field_end);

        // Skip over the file comment (we don't use it)
        let comment_end = cursor.position() + file_comment_length as u64;
        if comment_end > cursor.get_ref().len() as u64 {
            bail!("File comment runs past the Central Directory");
        }
        cursor.set_position(comment_end);

        Ok(ZipFileEntry {
            file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            is_directory,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry.
    /// This method reads the LFH to calculate where the actual file
    /// data begins.
    ///
    /// # Errors
    ///
    /// Returns an error if the LFH is invalid or the data would extend
    /// past the end of the archive.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        // Read the Local File Header
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;

        // Verify LFH signature (PK\x03\x04)
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header");
        }

        // Read the variable field lengths from fixed positions in LFH
        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        match data_offset.checked_add(entry.compressed_size) {
            Some(end) if end <= self.size => Ok(data_offset),
            _ => bail!("Data for {} extends past the end of the archive", entry.file_name),
        }
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Header ID of the ZIP64 extended information extra block.
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Read one 8-byte value from a ZIP64 extra block ending at `field_end`.
fn read_zip64_value(cursor: &mut Cursor<&[u8]>, field_end: u64) -> Result<u64> {
    if cursor.position() + 8 > field_end {
        bail!("ZIP64 extra field is too short");
    }
    Ok(cursor.read_u64::<LittleEndian>()?)
}

/// Check the external attributes for a directory marker.
///
/// MS-DOS/NTFS/VFAT creators (host 0, 10, 14) use attribute bit 0x10;
/// Unix and macOS creators (host 3, 19) keep the file mode in the upper
/// 16 bits.
fn is_directory_attr(version_made_by: u16, external_attrs: u32) -> bool {
    match version_made_by >> 8 {
        0 | 10 | 14 => external_attrs & DOS_DIRECTORY_ATTR != 0,
        3 | 19 => (external_attrs >> 16) & 0o170000 == 0o040000,
        _ => false,
    }
}
