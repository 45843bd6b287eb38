use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use aligned_vec::{AVec as AlignedVec, RuntimeAlign};

#[cfg(target_os = "linux")]
use std::os::unix::fs::OpenOptionsExt;

use crate::error::{Result, ScanError};
use crate::SECTOR_SIZE;

pub const DIRECT_IO_ALIGNMENT: usize = 4096;

/// Sequential access to a device, one sector at a time.
pub trait SectorDevice {
    /// Fill as much of `buf` as the device allows and return the byte count.
    /// A count below `buf.len()` or an error both mean the sector is unreadable.
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the read cursor to an absolute byte offset.
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;
}

/// Size query for a device node, kept behind a trait so each target can do it its own way.
pub trait DeviceInfo {
    fn query_total_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// A read-only handle on a block device or image file.
#[derive(Debug)]
pub struct BlockDevice {
    file: File,
    path: PathBuf,
}

impl BlockDevice {
    pub fn open<P: AsRef<Path>>(path: P, direct_io: bool) -> io::Result<Self> {
        let path = path.as_ref();
        let mut opts = OpenOptions::new();
        opts.read(true);
        if direct_io {
            #[cfg(target_os = "linux")]
            {
                opts.custom_flags(libc::O_DIRECT);
            }
        }
        let file = opts.open(path)?;
        Ok(Self { file, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SectorDevice for BlockDevice {
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    if filled == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(filled)
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

/// The single reusable sector buffer of a scan session.
pub struct SectorBuffer {
    buf: AlignedVec<u8, RuntimeAlign>,
}

impl SectorBuffer {
    pub fn new(direct_io: bool) -> Self {
        let alignment = if direct_io { DIRECT_IO_ALIGNMENT } else { 1 };
        let mut buf = AlignedVec::with_capacity(alignment, SECTOR_SIZE as usize);
        for _ in 0..SECTOR_SIZE {
            buf.push(0);
        }
        Self { buf }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Size query for the host OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsDeviceInfo;

impl DeviceInfo for OsDeviceInfo {
    fn query_total_bytes(&self, path: &Path) -> io::Result<u64> {
        let file = File::open(path)?;
        let md = file.metadata()?;
        if md.is_file() {
            return Ok(md.len());
        }
        block_device_size(file)
    }
}

/// Query the size of `path` and open it for scanning.
///
/// A size that cannot be queried, or that holds no whole sector, is an
/// error rather than an empty scan.
pub fn open_for_scan<I: DeviceInfo + ?Sized>(info: &I, path: &Path, direct_io: bool) -> Result<(BlockDevice, u64)> {
    let total_bytes = info
        .query_total_bytes(path)
        .map_err(|source| ScanError::SizeQuery { path: path.to_path_buf(), source })?;
    if total_bytes < SECTOR_SIZE {
        return Err(ScanError::EmptyDevice { path: path.to_path_buf() });
    }
    let device = BlockDevice::open(path, direct_io).map_err(|source| ScanError::Open { path: path.to_path_buf(), source })?;
    Ok((device, total_bytes))
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        fn block_device_size(file: File) -> io::Result<u64> {
            use std::os::unix::io::AsRawFd;
            // _IOR('d', 24, uint32_t) and _IOR('d', 25, uint64_t)
            const DKIOCGETBLOCKSIZE: libc::c_ulong = 0x4004_6418;
            const DKIOCGETBLOCKCOUNT: libc::c_ulong = 0x4008_6419;

            let fd = file.as_raw_fd();
            let mut block_size: u32 = 0;
            let mut block_count: u64 = 0;
            if unsafe { libc::ioctl(fd, DKIOCGETBLOCKSIZE, &mut block_size as *mut u32) } == -1 {
                return Err(io::Error::last_os_error());
            }
            if unsafe { libc::ioctl(fd, DKIOCGETBLOCKCOUNT, &mut block_count as *mut u64) } == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(block_count.saturating_mul(block_size as u64))
        }
    } else if #[cfg(unix)] {
        fn block_device_size(mut file: File) -> io::Result<u64> {
            // Block device nodes report their capacity as the end-of-file offset.
            file.seek(SeekFrom::End(0))
        }
    } else {
        fn block_device_size(_file: File) -> io::Result<u64> {
            Err(io::Error::new(ErrorKind::Unsupported, "device size query not supported on this OS"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn regular_file_size_is_its_length() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; 3 * SECTOR_SIZE as usize]).unwrap();
        tmp.flush().unwrap();
        assert_eq!(OsDeviceInfo.query_total_bytes(tmp.path()).unwrap(), 3 * SECTOR_SIZE);
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(OsDeviceInfo.query_total_bytes(Path::new("/nonexistent/badblocks-dev")).is_err());
    }

    #[test]
    fn short_tail_read_is_reported() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&vec![7u8; SECTOR_SIZE as usize + 100]).unwrap();
        tmp.flush().unwrap();

        let mut dev = BlockDevice::open(tmp.path(), false).unwrap();
        let mut buf = SectorBuffer::new(false);
        assert_eq!(buf.len(), SECTOR_SIZE as usize);
        assert_eq!(dev.read_block(buf.as_mut_slice()).unwrap(), SECTOR_SIZE as usize);
        assert_eq!(dev.read_block(buf.as_mut_slice()).unwrap(), 100);

        dev.seek_to(0).unwrap();
        assert_eq!(dev.read_block(buf.as_mut_slice()).unwrap(), SECTOR_SIZE as usize);
        assert!(buf.as_mut_slice().iter().all(|&b| b == 7));
    }
}
