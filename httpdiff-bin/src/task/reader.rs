use super::pending::PendingWork;
use super::signal::Signal;
use super::TaskError;
use crate::reporting::records::Payload;
use httpdiff_metrics::Statistics;
use slog::{debug, info, warn, Logger};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;

/// Lines longer than this are treated as malformed.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Number of lines in `path`, the last one counted even without a trailing newline.
pub fn count_lines(path: &Path) -> io::Result<u64> {
    let file = std::fs::File::open(path)?;
    let mut count = 0;
    for line in io::BufReader::new(file).split(b'\n') {
        line?;
        count += 1;
    }
    Ok(count)
}

// room for the longest accepted line plus its CRLF ending
const READ_LIMIT: u64 = MAX_LINE_BYTES as u64 + 2;

/// Consume input up to and including the next newline.
async fn skip_rest_of_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<()> {
    loop {
        let (found, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

fn strip_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

fn parse_line(line: &[u8]) -> Result<Payload, String> {
    if line.is_empty() {
        return Err("empty line".into());
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(format!("line exceeds {} bytes", MAX_LINE_BYTES));
    }
    Payload::from_line(line).map_err(|e| e.to_string())
}

/// Feeds payload files, in order, into a task's input queue.
pub struct Reader {
    files: Vec<PathBuf>,
    statistics: Arc<Statistics>,
    pending: Arc<PendingWork>,
    input: mpsc::Sender<Arc<Payload>>,
    stop: Signal,
    logger: Logger,
}

impl Reader {
    pub fn new(
        files: Vec<PathBuf>,
        statistics: Arc<Statistics>,
        pending: Arc<PendingWork>,
        input: mpsc::Sender<Arc<Payload>>,
        stop: Signal,
        logger: &Logger,
    ) -> Reader {
        Reader {
            files,
            statistics,
            pending,
            input,
            stop,
            logger: logger.new(slog::o!("unit" => "reader")),
        }
    }

    /// Read every file, then release the reader's hold on the pending count.
    pub async fn run(self) -> Result<(), TaskError> {
        let res = self.read_all().await;
        self.pending.done();
        res
    }

    async fn read_all(&self) -> Result<(), TaskError> {
        for path in &self.files {
            info!(self.logger, "reading payload file"; "file" => %path.display());
            if !self.read_file(path).await? {
                debug!(self.logger, "stopped while reading"; "file" => %path.display());
                return Ok(());
            }
        }
        info!(self.logger, "finished reading payload files"; "files" => self.files.len());
        Ok(())
    }

    /// Returns false when the task stopped before the file was exhausted.
    async fn read_file(&self, path: &Path) -> Result<bool, TaskError> {
        let io_err = |source| TaskError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut lines = BufReader::new(File::open(path).await.map_err(io_err)?);
        let mut buf = Vec::new();
        let mut line_number = 0u64;
        loop {
            buf.clear();
            let read = (&mut lines)
                .take(READ_LIMIT)
                .read_until(b'\n', &mut buf)
                .await
                .map_err(io_err)?;
            if read == 0 {
                return Ok(true);
            }
            line_number += 1;
            if buf.len() as u64 == READ_LIMIT && buf.last() != Some(&b'\n') {
                skip_rest_of_line(&mut lines).await.map_err(io_err)?;
            }
            strip_line_ending(&mut buf);

            let payload = match parse_line(&buf) {
                Ok(p) => Arc::new(p),
                Err(reason) => {
                    self.statistics.add_failed();
                    warn!(self.logger, "skipping payload line";
                        "file" => %path.display(), "line" => line_number, "reason" => reason);
                    continue;
                }
            };

            self.pending.add();
            let sent = tokio::select! {
                _ = self.stop.fired() => false,
                sent = self.input.send(payload) => sent.is_ok(),
            };
            if !sent {
                return Ok(false);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn file_with(lines: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(lines.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn counts_every_line() {
        assert_eq!(count_lines(file_with("a\n\nb\n").path()).unwrap(), 3);
        assert_eq!(count_lines(file_with("a\nb").path()).unwrap(), 2);
        assert_eq!(count_lines(file_with("").path()).unwrap(), 0);
        assert!(count_lines(Path::new("/no/such/payload.txt")).is_err());
    }

    #[test]
    fn oversized_and_empty_lines_are_rejected() {
        assert!(parse_line(b"").is_err());
        let mut big = br#"{"params":""#.to_vec();
        big.extend(std::iter::repeat(b'a').take(MAX_LINE_BYTES));
        big.extend(br#""}"#);
        assert!(parse_line(&big).is_err());
        assert!(parse_line(br#"{"params":"a=1"}"#).is_ok());
    }

    #[tokio::test]
    async fn invalid_lines_are_counted_failed() {
        let f = file_with("{\"params\":\"a=1\"}\r\n\nnot json\n{\"body\":\"{}\"}");
        let stats = Arc::new(Statistics::new(4));
        let pending = Arc::new(PendingWork::new());
        let (tx, mut rx) = mpsc::channel(10);
        Reader::new(
            vec![f.path().to_path_buf()],
            stats.clone(),
            pending.clone(),
            tx,
            Signal::new(),
            &logger(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(stats.failed(), 2);
        assert_eq!(pending.get(), 2);
        assert_eq!(rx.recv().await.unwrap().params, "a=1");
        assert_eq!(rx.recv().await.unwrap().body, "{}");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_without_losing_its_neighbours() {
        let mut contents = String::from("{\"params\":\"a=1\"}\n{\"params\":\"");
        contents.extend(std::iter::repeat('x').take(3 * MAX_LINE_BYTES));
        contents.push_str("\"}\n{\"params\":\"b=2\"}\n");
        let f = file_with(&contents);
        let stats = Arc::new(Statistics::new(3));
        let (tx, mut rx) = mpsc::channel(10);
        Reader::new(
            vec![f.path().to_path_buf()],
            stats.clone(),
            Arc::new(PendingWork::new()),
            tx,
            Signal::new(),
            &logger(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(stats.failed(), 1);
        assert_eq!(rx.recv().await.unwrap().params, "a=1");
        assert_eq!(rx.recv().await.unwrap().params, "b=2");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn line_at_the_size_limit_is_accepted() {
        let mut line = String::from("{\"params\":\"");
        let padding = MAX_LINE_BYTES - line.len() - 2;
        line.extend(std::iter::repeat('x').take(padding));
        line.push_str("\"}");
        assert_eq!(line.len(), MAX_LINE_BYTES);
        let f = file_with(&format!("{}\r\n", line));
        let stats = Arc::new(Statistics::new(1));
        let (tx, mut rx) = mpsc::channel(1);
        Reader::new(
            vec![f.path().to_path_buf()],
            stats.clone(),
            Arc::new(PendingWork::new()),
            tx,
            Signal::new(),
            &logger(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(stats.failed(), 0);
        assert_eq!(rx.recv().await.unwrap().params.len(), padding);
    }

    #[tokio::test]
    async fn missing_file_is_an_error_and_releases_the_hold() {
        let pending = Arc::new(PendingWork::new());
        let (tx, _rx) = mpsc::channel(1);
        let res = Reader::new(
            vec![PathBuf::from("/no/such/payload.txt")],
            Arc::new(Statistics::new(0)),
            pending.clone(),
            tx,
            Signal::new(),
            &logger(),
        )
        .run()
        .await;
        assert!(matches!(res, Err(TaskError::Io { .. })));
        assert_eq!(pending.get(), 0);
    }

    #[tokio::test]
    async fn reader_blocks_on_a_full_queue() {
        const K: usize = 3;
        let lines: String = (0..10).map(|i| format!("{{\"params\":\"i={}\"}}\n", i)).collect();
        let f = file_with(&lines);
        let pending = Arc::new(PendingWork::new());
        let (tx, mut rx) = mpsc::channel(K);
        let stop = Signal::new();
        let reader = tokio::spawn(
            Reader::new(
                vec![f.path().to_path_buf()],
                Arc::new(Statistics::new(10)),
                pending.clone(),
                tx,
                stop.clone(),
                &logger(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        // K queued plus one blocked in send, on top of the reader's own hold
        assert_eq!(pending.get(), K + 2);
        assert!(!reader.is_finished());

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        reader.await.unwrap().unwrap();
        assert_eq!(received, 10);
        assert_eq!(pending.get(), 10);
    }

    #[tokio::test]
    async fn stop_interrupts_a_blocked_reader() {
        let f = file_with("{}\n{}\n{}\n");
        let (tx, _rx) = mpsc::channel(1);
        let stop = Signal::new();
        let reader = tokio::spawn(
            Reader::new(
                vec![f.path().to_path_buf()],
                Arc::new(Statistics::new(3)),
                Arc::new(PendingWork::new()),
                tx,
                stop.clone(),
                &logger(),
            )
            .run(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.fire();
        tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
