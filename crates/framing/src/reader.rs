use crate::{FramedOutput, FramingDecoder};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Demultiplexed output of a container process, one channel per stream.
pub struct OutputStreams {
    pub stdout: mpsc::Receiver<Bytes>,
    pub stderr: mpsc::Receiver<Bytes>,
}

/// Producer half handed to whoever reads the container engine's stream.
#[derive(Clone)]
pub struct OutputWriters {
    pub stdout: mpsc::Sender<Bytes>,
    pub stderr: mpsc::Sender<Bytes>,
}

pub fn output_channel(capacity: usize) -> (OutputWriters, OutputStreams) {
    let (stdout_tx, stdout_rx) = mpsc::channel(capacity);
    let (stderr_tx, stderr_rx) = mpsc::channel(capacity);
    (
        OutputWriters {
            stdout: stdout_tx,
            stderr: stderr_tx,
        },
        OutputStreams {
            stdout: stdout_rx,
            stderr: stderr_rx,
        },
    )
}

impl OutputStreams {
    /// Streams that are already closed, for processes with no attached output.
    pub fn closed() -> Self {
        let (_, streams) = output_channel(1);
        streams
    }
}

enum Frame {
    Stdout(Bytes),
    Stderr(Bytes),
}

fn spawn_reader(
    mut rx: mpsc::Receiver<Bytes>,
    wrap: fn(Bytes) -> Frame,
    tx: mpsc::UnboundedSender<Frame>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        if tx.send(wrap(chunk)).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    })
}

/// Runs one reader task per stream, feeding a single decoder until both
/// streams close. Dropping the returned future, or cancelling `cancel`,
/// stops both readers.
pub async fn decode_streams(
    streams: OutputStreams,
    mut decoder: FramingDecoder,
    cancel: CancellationToken,
) -> FramedOutput {
    let cancel = cancel.child_token();
    let _guard = cancel.clone().drop_guard();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let stdout = spawn_reader(streams.stdout, Frame::Stdout, tx.clone(), cancel.clone());
    let stderr = spawn_reader(streams.stderr, Frame::Stderr, tx, cancel.clone());

    while let Some(frame) = rx.recv().await {
        match frame {
            Frame::Stdout(chunk) => decoder.feed_stdout(&chunk),
            Frame::Stderr(chunk) => decoder.feed_stderr(&chunk),
        }
    }

    if cancel.is_cancelled() {
        debug!("output readers cancelled before streams closed");
    }
    let _ = tokio::join!(stdout, stderr);

    decoder.finish()
}
