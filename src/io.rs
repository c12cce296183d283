use crate::OError;
use std::cmp::min;
use std::fs::File;
use std::io::SeekFrom;
use std::os::unix::fs::MetadataExt;
use std::sync::{Arc, Mutex};

// sink the segment writer serializes into. read/seek exist so tests
// (and the catalog's segment loader) can get the bytes back.
pub trait Storage: Send + Sync + 'static {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, OError>;

    fn seek(&mut self, offset: u64) -> Result<(), OError>;

    fn size(&self) -> Result<u64, OError>;

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), OError> {
        let mut start = 0;
        while start < buf.len() {
            let s = self.read(buf[start..].as_mut())?;
            if s == 0 {
                return Err(OError::IO(std::io::Error::from(
                    std::io::ErrorKind::UnexpectedEof,
                )));
            }
            start += s;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OError> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, OError>;

    fn write_all(&mut self, data: &[u8]) -> Result<(), OError> {
        let mut start = 0;
        while start < data.len() {
            let s = self.write(data[start..].as_ref())?;
            start += s;
        }
        Ok(())
    }
}

impl Storage for File {
    fn seek(&mut self, offset: u64) -> Result<(), OError> {
        std::io::Seek::seek(self, SeekFrom::Start(offset))?;
        Ok(())
    }

    fn size(&self) -> Result<u64, OError> {
        Ok(self.metadata()?.size())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), OError> {
        std::io::Write::write_all(self, data).map_err(OError::from)
    }

    fn flush(&mut self) -> Result<(), OError> {
        std::io::Write::flush(self).map_err(OError::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, OError> {
        std::io::Read::read(self, buf).map_err(OError::from)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, OError> {
        std::io::Write::write(self, data).map_err(OError::from)
    }
}

// only used for testing
pub type MemFile = Arc<Mutex<(Vec<u8>, usize)>>;

impl Storage for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, OError> {
        let mut f = self
            .lock()
            .map_err(|e| OError::Internal(e.to_string()))?;
        let len = min(f.0.len() - f.1, buf.len());
        let pos = f.1;
        buf[..len].copy_from_slice(&f.0[pos..pos + len]);
        f.1 += len;
        Ok(len)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, OError> {
        let mut f = self
            .lock()
            .map_err(|e| OError::Internal(e.to_string()))?;
        f.0.extend_from_slice(data);
        Ok(data.len())
    }

    fn size(&self) -> Result<u64, OError> {
        let f = self
            .lock()
            .map_err(|e| OError::Internal(e.to_string()))?;
        Ok(f.0.len() as u64)
    }

    fn seek(&mut self, offset: u64) -> Result<(), OError> {
        let mut f = self
            .lock()
            .map_err(|e| OError::Internal(e.to_string()))?;
        f.1 = offset as usize;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{MemFile, Storage};

    #[test]
    fn test_mem_file() {
        let mut f = MemFile::default();
        f.write_all(b"hello").unwrap();
        f.write_all(b" world").unwrap();
        assert_eq!(f.size().unwrap(), 11);
        f.seek(6).unwrap();
        let mut buf = [0u8; 5];
        f.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }
}
