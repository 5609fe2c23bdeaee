//! Store file format constants and footer helpers.
//!
//! ```text
//! [record_count: u64 LE][index_offset: u64 LE][magic: u32 LE = "CDB1"]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Result as IoResult, Seek, SeekFrom, Write};

/// Magic number identifying store files (ASCII "CDB1").
pub const STORE_MAGIC: u32 = 0x4344_4231;

/// Footer size in bytes: 8 (`record_count`) + 8 (`index_offset`) + 4 (`magic`).
pub const FOOTER_BYTES: u64 = 8 + 8 + 4;

/// Maximum key size allocated during reads (64 KiB). Guards against corrupt files.
pub const MAX_KEY_BYTES: usize = 64 * 1024;

/// Maximum value size allocated during reads (10 MiB).
pub const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Parsed store footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub record_count: u64,
    pub index_offset: u64,
}

pub fn write_footer<W: Write>(w: &mut W, record_count: u64, index_offset: u64) -> IoResult<()> {
    w.write_u64::<LittleEndian>(record_count)?;
    w.write_u64::<LittleEndian>(index_offset)?;
    w.write_u32::<LittleEndian>(STORE_MAGIC)?;
    Ok(())
}

/// Reads the footer from the end of `r`, checking size and magic.
pub fn read_footer<R: Read + Seek>(r: &mut R) -> IoResult<Footer> {
    let filesize = r.seek(SeekFrom::End(0))?;
    if filesize < FOOTER_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file too small for store footer",
        ));
    }

    r.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
    let record_count = r.read_u64::<LittleEndian>()?;
    let index_offset = r.read_u64::<LittleEndian>()?;
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != STORE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown store magic: {:#x}", magic),
        ));
    }
    Ok(Footer {
        record_count,
        index_offset,
    })
}
