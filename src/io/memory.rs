use super::ReadAt;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Random access reader over a buffer already held in memory
pub struct MemoryReader {
    data: Bytes,
}

impl MemoryReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }

        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_read_at_tail() {
        let reader = MemoryReader::new(b"hello world".to_vec());
        let mut buf = [0u8; 8];
        let n = reader.read_at(6, &mut buf).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..n], b"world");
        assert_eq!(reader.read_at(11, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_exact_at_rejects_out_of_range() {
        let reader = MemoryReader::new(Bytes::from_static(b"abc"));
        let mut buf = [0u8; 2];
        reader.read_exact_at(1, &mut buf).await.unwrap();
        assert_eq!(&buf, b"bc");
        assert!(reader.read_exact_at(2, &mut buf).await.is_err());
        assert!(reader.read_exact_at(u64::MAX, &mut buf).await.is_err());
    }
}
