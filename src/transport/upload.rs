use crate::async_ops::{CancellationToken, CHUNK_SIZE};
use std::io::{self, Read};

/// Request body reader that hands the HTTP client at most one chunk per
/// read and stops as soon as the operation is cancelled.
pub(crate) struct UploadReader<R> {
    inner: R,
    cancel: CancellationToken,
    sent: u64,
}

impl<R: Read> UploadReader<R> {
    pub(crate) fn new(inner: R, cancel: CancellationToken) -> Self {
        Self {
            inner,
            cancel,
            sent: 0,
        }
    }
}

impl<R: Read> Read for UploadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            tracing::debug!(
                user_data = %self.cancel.user_data(),
                sent = self.sent,
                "Aborting upload, operation cancelled"
            );
            return Err(io::Error::other("operation cancelled during upload"));
        }

        let limit = buf.len().min(CHUNK_SIZE);
        let n = self.inner.read(&mut buf[..limit])?;
        self.sent += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_ops::{OperationContext, OperationRegistry};
    use std::io::Cursor;
    use std::sync::Arc;

    fn token(registry: &Arc<OperationRegistry>) -> CancellationToken {
        let (ctx, _rx) = OperationContext::channel();
        registry.register("up".into(), ctx).unwrap();
        CancellationToken::new(registry.clone(), "up".into())
    }

    #[test]
    fn test_reads_in_chunks() {
        let registry = Arc::new(OperationRegistry::new());
        let mut reader = UploadReader::new(Cursor::new(vec![1u8; 10_000]), token(&registry));
        let mut buf = vec![0u8; 65_536];

        assert_eq!(reader.read(&mut buf).unwrap(), CHUNK_SIZE);
        assert_eq!(reader.read(&mut buf).unwrap(), CHUNK_SIZE);
        assert_eq!(reader.read(&mut buf).unwrap(), 10_000 - 2 * CHUNK_SIZE);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_cancel_stops_upload() {
        let registry = Arc::new(OperationRegistry::new());
        let mut reader = UploadReader::new(Cursor::new(vec![1u8; 10_000]), token(&registry));
        let mut buf = vec![0u8; CHUNK_SIZE];

        assert!(reader.read(&mut buf).is_ok());
        registry.cancel(&"up".into());
        assert!(reader.read(&mut buf).is_err());
    }
}
