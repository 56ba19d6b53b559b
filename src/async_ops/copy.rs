use crate::async_ops::error::CopyError;
use crate::async_ops::progress::{percent_complete, ProgressTarget};
use crate::async_ops::registry::CancellationToken;
use std::io::{Cursor, ErrorKind, Read, Write};

/// Bytes read per copy-loop iteration, also the cancellation-check granularity.
pub const CHUNK_SIZE: usize = 4096;

/// Copies a response body into memory in [`CHUNK_SIZE`] chunks.
///
/// See [`copy_chunked`].
pub fn copy_response_to_memory<R: Read>(
    source: Option<R>,
    content_length: Option<u64>,
    progress: Option<&ProgressTarget>,
    cancel: &CancellationToken,
) -> Result<Option<Cursor<Vec<u8>>>, CopyError> {
    copy_chunked(source, content_length, progress, cancel, CHUNK_SIZE)
}

/// Copies `source` into an in-memory buffer, `chunk_size` bytes at a time.
///
/// # Behavior
///
/// - `None` source → `Ok(None)`, nothing is read
/// - After every chunk the operation must still be registered, otherwise the
///   copy stops with [`CopyError::Cancelled`] and the source is not read again
/// - With a `progress` consumer, each chunk is reported; a report that is not
///   delivered is the cancellation signal. Without one, `cancel` is checked
/// - The percentage is only computed when `content_length` exceeds one chunk
/// - On end of stream the buffer is rewound to position 0
///
/// A blocking read already in progress is never interrupted; cancellation
/// takes effect once it returns.
pub fn copy_chunked<R: Read>(
    source: Option<R>,
    content_length: Option<u64>,
    progress: Option<&ProgressTarget>,
    cancel: &CancellationToken,
    chunk_size: usize,
) -> Result<Option<Cursor<Vec<u8>>>, CopyError> {
    let Some(mut source) = source else {
        return Ok(None);
    };

    let capacity = content_length
        .map(|len| len.min(64 * 1024 * 1024) as usize)
        .unwrap_or(0);
    let mut buffer = Cursor::new(Vec::with_capacity(capacity));
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut bytes_written: u64 = 0;

    loop {
        let read = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Io(e)),
        };
        buffer.write_all(&chunk[..read])?;
        bytes_written += read as u64;

        let still_active = match progress {
            Some(target) => {
                let percent = percent_complete(bytes_written, content_length, chunk_size);
                target.report(bytes_written, content_length, percent)
            }
            None => !cancel.is_cancelled(),
        };

        if !still_active {
            tracing::debug!(
                user_data = %cancel.user_data(),
                bytes_written = bytes_written,
                "Aborting copy, operation cancelled"
            );
            return Err(CopyError::Cancelled);
        }
    }

    buffer.set_position(0);
    Ok(Some(buffer))
}
