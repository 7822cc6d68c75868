use bytes::BytesMut;
use std::borrow::Cow;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("The collector task could not be joined: {0}")]
    TaskJoin(#[source] tokio::task::JoinError),
}

/// Which stream a [`Collector`] is draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamType {
    StdOut,
    StdErr,
}

impl StreamType {
    fn as_str(self) -> &'static str {
        match self {
            StreamType::StdOut => "stdout",
            StreamType::StdErr => "stderr",
        }
    }
}

/// Drains a child's output stream to EOF on a background task.
///
/// Every stream the executor owns gets its own collector, so stdout and stderr are read
/// concurrently with each other and with waiting for the process. A child blocked on writing
/// to a full stderr pipe can therefore never stall a reader busy with stdout.
///
/// For proper cleanup, call `drain()` once the process exited. If dropped without calling
/// `drain()`, the task is aborted.
#[derive(Debug)]
pub(crate) struct Collector {
    task: Option<JoinHandle<BytesMut>>,
    stop: Option<oneshot::Sender<()>>,
}

/// Everything a [`Collector`] read.
#[derive(Debug)]
pub(crate) struct Drained {
    pub(crate) bytes: BytesMut,

    /// `false` if the stream was still open when the deadline passed.
    pub(crate) complete: bool,
}

impl Collector {
    pub(crate) fn spawn<R>(
        mut stream: R,
        ty: StreamType,
        process_name: Cow<'static, str>,
        read_buffer_size: usize,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut buf = BytesMut::with_capacity(read_buffer_size);
            loop {
                let read = tokio::select! {
                    _ = &mut stopped => break,
                    read = stream.read_buf(&mut buf) => read,
                };
                match read {
                    Ok(0) => break,
                    Ok(_bytes_read) => {
                        if buf.capacity() == buf.len() {
                            buf.reserve(read_buffer_size);
                        }
                    }
                    Err(err) => {
                        // Keep what was read so far, the process status is still authoritative.
                        tracing::warn!(
                            process = %process_name,
                            stream = ty.as_str(),
                            error = %err,
                            "Could not read from stream"
                        );
                        break;
                    }
                }
            }
            buf
        });
        Self {
            task: Some(task),
            stop: Some(stop),
        }
    }

    /// Waits until the stream reached EOF and returns everything that was read.
    ///
    /// EOF is only seen once every writer of the stream is gone, which includes background
    /// children the process left behind. With a `deadline`, reading stops at that instant and
    /// whatever was read so far is returned as incomplete.
    pub(crate) async fn drain(
        mut self,
        deadline: Option<Instant>,
    ) -> Result<Drained, CollectorError> {
        let Some(mut task) = self.task.take() else {
            return Ok(Drained {
                bytes: BytesMut::new(),
                complete: true,
            });
        };

        let joined = match deadline {
            None => Ok((&mut task).await),
            Some(deadline) => tokio::time::timeout_at(deadline, &mut task).await,
        };
        match joined {
            Ok(bytes) => Ok(Drained {
                bytes: bytes.map_err(CollectorError::TaskJoin)?,
                complete: true,
            }),
            Err(_elapsed) => {
                if let Some(stop) = self.stop.take() {
                    // The task may have finished in the meantime, in which case nobody listens.
                    let _ = stop.send(());
                }
                Ok(Drained {
                    bytes: task.await.map_err(CollectorError::TaskJoin)?,
                    complete: false,
                })
            }
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
