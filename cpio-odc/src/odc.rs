// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable ASCII format / old character / odc archive support.
//!
//! This module implements support for the *Portable ASCII format* as
//! standardized in version 2 of the Single UNIX Specification (SUSv2).
//! It is also commonly referred to as *old character* or *odc*.

use {
    crate::{CpioHeader, CpioReader, CpioResult, Error},
    std::{
        ffi::CStr,
        io::{Read, Take, Write},
    },
};

/// Header magic for odc entries.
pub const MAGIC: &[u8] = b"070707";

/// Name of the terminator record.
pub const TRAILER: &str = "TRAILER!!!";

fn u32_from_octal(data: &[u8]) -> CpioResult<u32> {
    let s = std::str::from_utf8(data).map_err(|_| Error::BadHeaderString)?;
    u32::from_str_radix(s, 8).map_err(|_| Error::BadHeaderOctal(s.to_string()))
}

fn read_octal(reader: &mut impl Read, count: usize) -> CpioResult<u32> {
    let mut buffer = vec![0u8; count];
    reader.read_exact(&mut buffer)?;

    u32_from_octal(&buffer)
}

/// Render a value as a zero-padded octal ASCII field of fixed width.
///
/// Values that do not fit in the field are an error, never truncated.
fn octal_field(field: &'static str, value: u64, width: usize) -> CpioResult<String> {
    let s = format!("{:0>width$o}", value, width = width);

    if s.len() > width {
        Err(Error::ValueTooLarge(field))
    } else {
        Ok(s)
    }
}

/// Parsed portable ASCII format header.
#[derive(Clone, Debug)]
pub struct OdcHeader {
    pub dev: u32,
    pub inode: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub rdev: u32,
    pub mtime: u32,
    pub file_size: u32,
    pub name: String,
}

impl OdcHeader {
    /// Parse a header from a reader.
    ///
    /// The reader should be positioned after the 6 byte magic.
    pub fn from_reader(reader: &mut impl Read) -> CpioResult<Self> {
        let dev = read_octal(reader, 6)?;
        let inode = read_octal(reader, 6)?;
        let mode = read_octal(reader, 6)?;
        let uid = read_octal(reader, 6)?;
        let gid = read_octal(reader, 6)?;
        let nlink = read_octal(reader, 6)?;
        let rdev = read_octal(reader, 6)?;
        let mtime = read_octal(reader, 11)?;
        let name_length = read_octal(reader, 6)?;
        let file_size = read_octal(reader, 11)?;

        let mut name_data = vec![0u8; name_length as usize];
        reader.read_exact(&mut name_data)?;

        let name = CStr::from_bytes_with_nul(&name_data)
            .map_err(|_| Error::FilenameDecode)?
            .to_string_lossy()
            .to_string();

        Ok(Self {
            dev,
            inode,
            mode,
            uid,
            gid,
            nlink,
            rdev,
            mtime,
            file_size,
            name,
        })
    }

    /// Encode this header, including the magic and the member name.
    pub fn write(&self, writer: &mut impl Write) -> CpioResult<u64> {
        let mut fields = String::with_capacity(70);
        fields.push_str(&octal_field("device number", self.dev as _, 6)?);
        fields.push_str(&octal_field("inode", self.inode as _, 6)?);
        fields.push_str(&octal_field("file mode", self.mode as _, 6)?);
        fields.push_str(&octal_field("uid", self.uid as _, 6)?);
        fields.push_str(&octal_field("gid", self.gid as _, 6)?);
        fields.push_str(&octal_field("link count", self.nlink as _, 6)?);
        fields.push_str(&octal_field("rdev", self.rdev as _, 6)?);
        fields.push_str(&octal_field("mtime", self.mtime as _, 11)?);
        fields.push_str(&octal_field(
            "name length",
            self.name.len() as u64 + 1,
            6,
        )?);
        fields.push_str(&octal_field("file size", self.file_size as _, 11)?);

        writer.write_all(MAGIC)?;
        writer.write_all(fields.as_bytes())?;
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b"\0")?;

        Ok((MAGIC.len() + fields.len() + self.name.len() + 1) as u64)
    }
}

impl CpioHeader for OdcHeader {
    fn device(&self) -> u32 {
        self.dev
    }

    fn inode(&self) -> u32 {
        self.inode
    }

    fn mode(&self) -> u32 {
        self.mode
    }

    fn uid(&self) -> u32 {
        self.uid
    }

    fn gid(&self) -> u32 {
        self.gid
    }

    fn nlink(&self) -> u32 {
        self.nlink
    }

    fn rdev(&self) -> u32 {
        self.rdev
    }

    fn mtime(&self) -> u32 {
        self.mtime
    }

    fn file_size(&self) -> u32 {
        self.file_size
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A cpio archive reader for *Portable ASCII format* archives.
pub struct OdcReader<T: Read + Sized> {
    archive_reader: Option<T>,
    entry_reader: Option<Take<T>>,
    seen_trailer: bool,
}

impl<T: Read + Sized> CpioReader<T> for OdcReader<T> {
    fn new(reader: T) -> Self {
        Self {
            archive_reader: Some(reader),
            entry_reader: None,
            seen_trailer: false,
        }
    }

    fn read_next(&mut self) -> CpioResult<Option<Box<dyn CpioHeader>>> {
        self.finish()?;

        if let Some(mut reader) = self.archive_reader.take() {
            let mut magic = [0u8; 6];

            match reader.read_exact(&mut magic) {
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(e.into());
                }
            }

            if magic != MAGIC {
                return Err(Error::BadMagic);
            }

            let header = OdcHeader::from_reader(&mut reader)?;

            if header.name == TRAILER {
                self.seen_trailer = true;
                Ok(None)
            } else {
                self.entry_reader = Some(reader.take(header.file_size as _));
                Ok(Some(Box::new(header)))
            }
        } else {
            Ok(None)
        }
    }

    fn finish(&mut self) -> CpioResult<()> {
        if let Some(mut reader) = self.entry_reader.take() {
            let mut buffer = vec![0u8; 32768];
            loop {
                if reader.read(&mut buffer)? == 0 {
                    break;
                }
            }

            // Only restore the archive reader if we haven't seen the trailer,
            // as the trailer indicates end of archive.
            if !self.seen_trailer {
                self.archive_reader = Some(reader.into_inner());
            }
        }

        Ok(())
    }
}

impl<T: Read + Sized> Iterator for OdcReader<T> {
    type Item = CpioResult<Box<dyn CpioHeader>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(r)) => Some(Ok(r)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T: Read + Sized> Read for OdcReader<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        if let Some(reader) = &mut self.entry_reader {
            reader.read(buf)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no current archive entry to read from",
            ))
        }
    }
}

/// Writes *Portable ASCII format* archives.
///
/// Members are appended with [Self::append_file] and the terminator record
/// is emitted by [Self::finish], which returns the inner writer.
///
/// Inode numbers are synthesized sequentially, since members are in-memory
/// blobs without a backing filesystem identity.
pub struct OdcBuilder<W: Write + Sized> {
    writer: W,
    next_inode: u32,
    mtime: u32,
}

impl<W: Write + Sized> OdcBuilder<W> {
    /// Construct a new builder emitting to a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            next_inode: 1,
            mtime: 0,
        }
    }

    /// Set the modification time recorded for subsequent members.
    ///
    /// Defaults to 0 so archive output is deterministic.
    pub fn mtime(&mut self, mtime: u32) {
        self.mtime = mtime;
    }

    /// Append a regular file member.
    ///
    /// `mode` is the full mode word, including the file type bits
    /// (e.g. `0o100755` for an executable script).
    pub fn append_file(
        &mut self,
        name: impl ToString,
        mode: u32,
        uid: u32,
        gid: u32,
        data: &[u8],
    ) -> CpioResult<()> {
        let header = OdcHeader {
            dev: 0,
            inode: self.next_inode,
            mode,
            uid,
            gid,
            nlink: 1,
            rdev: 0,
            mtime: self.mtime,
            file_size: data
                .len()
                .try_into()
                .map_err(|_| Error::ValueTooLarge("file size"))?,
            name: name.to_string(),
        };

        header.write(&mut self.writer)?;
        self.writer.write_all(data)?;
        self.next_inode += 1;

        Ok(())
    }

    /// Emit the trailer record and return the inner writer.
    pub fn finish(mut self) -> CpioResult<W> {
        let trailer = OdcHeader {
            dev: 0,
            inode: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            nlink: 1,
            rdev: 0,
            mtime: 0,
            file_size: 0,
            name: TRAILER.to_string(),
        };

        trailer.write(&mut self.writer)?;

        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::reader};

    const HEADER_LEN: usize = 76;

    #[test]
    fn header_layout() -> CpioResult<()> {
        let mut builder = OdcBuilder::new(Vec::new());
        builder.append_file("./postinstall", 0o100755, 0, 80, b"#!/bin/sh\n")?;
        let data = builder.finish()?;

        assert_eq!(&data[0..6], MAGIC);
        // dev is zero-padded to its full field width.
        assert_eq!(&data[6..12], b"000000");
        // mode is at offset 18.
        assert_eq!(&data[18..24], b"100755");
        // name follows the fixed-width header and is NUL terminated.
        assert_eq!(&data[HEADER_LEN..HEADER_LEN + 14], b"./postinstall\0");
        // file content immediately follows the name.
        assert_eq!(&data[HEADER_LEN + 14..HEADER_LEN + 24], b"#!/bin/sh\n");

        // Trailer record has a zero file size and the sentinel name.
        let trailer = &data[HEADER_LEN + 24..];
        assert_eq!(&trailer[0..6], MAGIC);
        assert_eq!(&trailer[65..76], b"00000000000");
        assert_eq!(&trailer[76..87], b"TRAILER!!!\0");
        assert_eq!(trailer.len(), 87);

        Ok(())
    }

    #[test]
    fn round_trip() -> CpioResult<()> {
        let mut builder = OdcBuilder::new(Vec::new());
        builder.mtime(1_600_000_000);
        builder.append_file("./postinstall", 0o100755, 0, 80, b"#!/bin/bash\necho hi\n")?;
        let data = builder.finish()?;

        let mut reader = reader(std::io::Cursor::new(data))?;

        let header = reader.read_next()?.expect("entry should be present");
        assert_eq!(header.name(), "./postinstall");
        assert_eq!(header.mode(), 0o100755);
        assert_eq!(header.uid(), 0);
        assert_eq!(header.gid(), 80);
        assert_eq!(header.mtime(), 1_600_000_000);
        assert_eq!(header.file_size(), 20);

        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"#!/bin/bash\necho hi\n");

        // The trailer is consumed, not surfaced.
        assert!(reader.read_next()?.is_none());

        Ok(())
    }

    #[test]
    fn oversized_field_is_rejected() {
        let mut builder = OdcBuilder::new(Vec::new());
        // 0o1000000 needs 7 octal digits; the mode field holds 6.
        let res = builder.append_file("f", 0o1000000, 0, 0, b"");
        assert!(matches!(res, Err(Error::ValueTooLarge("file mode"))));
    }

    #[test]
    fn sniffing_rejects_other_formats() {
        let res = reader(std::io::Cursor::new(b"070701rest".to_vec()));
        assert!(matches!(res, Err(Error::BadMagic)));
    }
}
