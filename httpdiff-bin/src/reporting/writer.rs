use crate::task::pending::PendingWork;
use crate::task::signal::Signal;
use crate::task::TaskError;
use serde::Serialize;
use slog::{debug, error, o, Logger};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

/// Sole owner of one output file, appending each record as one JSON line.
pub struct RecordWriter<T> {
    path: PathBuf,
    queue: mpsc::Receiver<T>,
    keep: fn(&T) -> bool,
    pending: Arc<PendingWork>,
    stop: Signal,
    logger: Logger,
}

impl<T: Serialize> RecordWriter<T> {
    pub fn new(
        path: PathBuf,
        queue: mpsc::Receiver<T>,
        pending: Arc<PendingWork>,
        stop: Signal,
        logger: &Logger,
    ) -> RecordWriter<T> {
        let logger = logger.new(o!("file" => path.display().to_string()));
        RecordWriter {
            path,
            queue,
            keep: |_| true,
            pending,
            stop,
            logger,
        }
    }

    /// Records rejected by `keep` are still drained and counted, just not written.
    pub fn filter(mut self, keep: fn(&T) -> bool) -> RecordWriter<T> {
        self.keep = keep;
        self
    }

    async fn write(&self, out: &mut BufWriter<File>, record: &T) -> Result<(), String> {
        let mut line = serde_json::to_vec(record).map_err(|e| e.to_string())?;
        line.push(b'\n');
        out.write_all(&line).await.map_err(|e| e.to_string())
    }

    /// Drain until the task stops or every producer is gone, then flush and sync the file.
    pub async fn run(mut self) -> Result<(), TaskError> {
        let path = self.path.clone();
        let io_err = |source| TaskError::Io {
            path: path.clone(),
            source,
        };
        let mut out = BufWriter::new(File::create(&self.path).await.map_err(io_err)?);
        let mut written = 0u64;
        loop {
            let record = tokio::select! {
                _ = self.stop.fired() => break,
                r = self.queue.recv() => match r {
                    Some(r) => r,
                    None => break,
                },
            };
            if (self.keep)(&record) {
                match self.write(&mut out, &record).await {
                    Ok(()) => written += 1,
                    Err(e) => error!(self.logger, "could not write record"; "error" => e),
                }
            }
            self.pending.done();
        }
        out.flush().await.map_err(io_err)?;
        out.get_ref().sync_all().await.map_err(io_err)?;
        debug!(self.logger, "writer closed"; "written" => written);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reporting::records::{OutputRecord, Payload};
    use serde_json::json;
    use std::time::Duration;

    fn logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[tokio::test]
    async fn writes_one_line_per_record_and_drains_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let pending = Arc::new(PendingWork::new());
        pending.add();
        pending.add();
        let (tx, rx) = mpsc::channel(4);
        let writer = RecordWriter::new(path.clone(), rx, pending.clone(), Signal::new(), &logger())
            .filter(OutputRecord::has_diff);

        let payload = Arc::new(Payload::default());
        tx.send(OutputRecord::same(payload.clone())).await.unwrap();
        tx.send(OutputRecord::different(payload, json!({"a": 1}), json!({"a": 2}), "x".into()))
            .await
            .unwrap();
        drop(tx);
        writer.run().await.unwrap();

        assert_eq!(pending.get(), 1);
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["urlAResponse"], json!({"a": 1}));
        assert_eq!(v["diff"], "x");
    }

    #[tokio::test]
    async fn stop_ends_an_idle_writer() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = mpsc::channel::<OutputRecord>(1);
        let stop = Signal::new();
        let writer = tokio::spawn(
            RecordWriter::new(
                dir.path().join("out.txt"),
                rx,
                Arc::new(PendingWork::new()),
                stop.clone(),
                &logger(),
            )
            .run(),
        );
        stop.fire();
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = mpsc::channel::<OutputRecord>(1);
        let res = RecordWriter::new(
            dir.path().to_path_buf(),
            rx,
            Arc::new(PendingWork::new()),
            Signal::new(),
            &logger(),
        )
        .run()
        .await;
        assert!(matches!(res, Err(TaskError::Io { .. })));
    }
}
