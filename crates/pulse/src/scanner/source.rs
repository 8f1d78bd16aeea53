//! Concrete scan sources.
//!
//! [`CommandSource`] runs an external QR decoder (zbar's `zbarcam` by default)
//! and reads one decoded value per output line. [`LineSource`] reads the same
//! line format from stdin, a file or any async reader.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{stdin_lines, DecodedScan, ScanSource};
use crate::error::{Error, Result};

/// Symbology prefix zbar prints unless run with `--raw`.
const ZBAR_QR_PREFIX: &str = "QR-Code:";

/// How long a decoder that closed its output gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Decoder stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 3;

/// Send one decoded line. Returns `false` once the channel is closed.
async fn forward_line(line: &str, tx: &mpsc::Sender<DecodedScan>) -> bool {
    let text = line.strip_prefix(ZBAR_QR_PREFIX).unwrap_or(line);
    if text.trim().is_empty() {
        return true;
    }
    if tx.send(DecodedScan::now(text)).await.is_err() {
        debug!("Scan channel closed");
        return false;
    }
    true
}

/// Forward decoded lines into `tx` until the input ends or the channel closes.
async fn forward_lines<R>(reader: R, tx: &mpsc::Sender<DecodedScan>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !forward_line(&line, tx).await {
                    break;
                }
            }
            Ok(None) => {
                debug!("Scan input ended");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read decoded line");
                break;
            }
        }
    }
}

/// Collect the last few non-empty lines the decoder wrote to stderr.
async fn stderr_tail(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.remove(0);
        }
        tail.push(line.to_string());
    }
    tail.join("; ")
}

fn reader_is_live(reader: Option<&JoinHandle<()>>) -> bool {
    reader.is_some_and(|task| !task.is_finished())
}

/// Scan source backed by an external decoder process.
///
/// A decoder that exits with a failure status on its own, typically because
/// it could not open the camera, is reported by [`ScanSource::stop`] as
/// [`Error::ScanSourceUnavailable`] carrying the end of its stderr.
#[derive(Debug)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
    // Set before the scan channel closes, so whoever sees the channel close
    // also sees the decoder's output as ended.
    output_ended: Arc<AtomicBool>,
}

impl CommandSource {
    /// Create a source from a program and its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanSourceUnavailable`] if `command` is empty.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::source_unavailable("decoder", "no decoder command configured"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            child: None,
            reader: None,
            stderr: None,
            output_ended: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The full command line, for display.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Reap a decoder whose output has ended, reporting a failed exit.
    async fn reap(&self, mut child: Child, stderr: Option<JoinHandle<String>>) -> Result<()> {
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                info!("Decoder finished");
                Ok(())
            }
            Ok(Ok(status)) => {
                let tail = match stderr {
                    Some(task) => tokio::time::timeout(EXIT_GRACE, task)
                        .await
                        .ok()
                        .and_then(std::result::Result::ok)
                        .unwrap_or_default(),
                    None => String::new(),
                };
                warn!(%status, stderr = %tail, "Decoder failed");
                let mut message = format!("{} exited with {status}", self.program);
                if !tail.is_empty() {
                    message = format!("{message}: {tail}");
                }
                Err(Error::source_unavailable("decoder", message))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                debug!("Decoder still running after closing its output");
                self.kill(child, stderr).await;
                Ok(())
            }
        }
    }

    async fn kill(&self, mut child: Child, stderr: Option<JoinHandle<String>>) {
        if let Some(task) = stderr {
            task.abort();
        }
        if let Err(e) = child.kill().await {
            debug!(error = %e, "Decoder already exited");
        }
        info!("Decoder stopped");
    }
}

#[async_trait::async_trait]
impl ScanSource for CommandSource {
    fn name(&self) -> &'static str {
        "decoder"
    }

    fn is_running(&self) -> bool {
        self.child.is_some() && reader_is_live(self.reader.as_ref())
    }

    async fn start(&mut self, tx: mpsc::Sender<DecodedScan>) -> Result<()> {
        if self.is_running() {
            return Err(Error::ScanSourceBusy { name: self.name() });
        }
        // Reap anything left from a run that ended on its own.
        self.stop().await?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::source_unavailable("decoder", format!("{}: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::source_unavailable("decoder", "decoder stdout was not captured"))?;

        info!(command = %self.command_line(), "Decoder started");
        self.stderr = child.stderr.take().map(|stderr| tokio::spawn(stderr_tail(stderr)));
        let output_ended = Arc::new(AtomicBool::new(false));
        self.output_ended = Arc::clone(&output_ended);
        self.reader = Some(tokio::spawn(async move {
            forward_lines(BufReader::new(stdout), &tx).await;
            output_ended.store(true, Ordering::Release);
            drop(tx);
        }));
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let output_ended = self.output_ended.load(Ordering::Acquire);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        let stderr = self.stderr.take();
        let Some(child) = self.child.take() else {
            return Ok(());
        };

        if output_ended {
            self.reap(child, stderr).await
        } else {
            self.kill(child, stderr).await;
            Ok(())
        }
    }
}

/// Where a [`LineSource`] reads from.
enum LineInput {
    Stdin,
    File(PathBuf),
    Reader(Box<dyn AsyncRead + Unpin + Send>),
}

/// Scan source reading one decoded value per line.
pub struct LineSource {
    input: Option<LineInput>,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let input = match &self.input {
            Some(LineInput::Stdin) => "stdin".to_string(),
            Some(LineInput::File(path)) => path.display().to_string(),
            Some(LineInput::Reader(_)) => "reader".to_string(),
            None => "consumed".to_string(),
        };
        f.debug_struct("LineSource")
            .field("input", &input)
            .field("running", &reader_is_live(self.reader.as_ref()))
            .finish()
    }
}

impl LineSource {
    fn with_input(input: LineInput) -> Self {
        Self {
            input: Some(input),
            reader: None,
        }
    }

    /// Read decoded values from standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::with_input(LineInput::Stdin)
    }

    /// Read decoded values from a file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_input(LineInput::File(path.into()))
    }

    /// Read decoded values from any async reader.
    #[must_use]
    pub fn from_reader(reader: Box<dyn AsyncRead + Unpin + Send>) -> Self {
        Self::with_input(LineInput::Reader(reader))
    }
}

#[async_trait::async_trait]
impl ScanSource for LineSource {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn is_running(&self) -> bool {
        reader_is_live(self.reader.as_ref())
    }

    async fn start(&mut self, tx: mpsc::Sender<DecodedScan>) -> Result<()> {
        if self.is_running() {
            return Err(Error::ScanSourceBusy { name: self.name() });
        }

        let reader: Box<dyn AsyncRead + Unpin + Send> = match self.input.take() {
            Some(LineInput::Stdin) => {
                let mut lines = stdin_lines();
                self.reader = Some(tokio::spawn(async move {
                    while let Some(line) = lines.recv().await {
                        if !forward_line(&line, &tx).await {
                            break;
                        }
                    }
                    debug!("Scan input ended");
                }));
                return Ok(());
            }
            Some(LineInput::File(path)) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    Error::source_unavailable("lines", format!("{}: {e}", path.display()))
                })?;
                info!(path = %path.display(), "Reading scans from file");
                Box::new(file)
            }
            Some(LineInput::Reader(reader)) => reader,
            None => {
                return Err(Error::source_unavailable(
                    "lines",
                    "input was already consumed",
                ))
            }
        };

        self.reader = Some(tokio::spawn(async move {
            forward_lines(BufReader::new(reader), &tx).await;
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            debug!("Line reader stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn collect(mut rx: mpsc::Receiver<DecodedScan>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(scan) = rx.recv().await {
            out.push(scan.text);
        }
        out
    }

    fn reader(text: &str) -> Box<dyn AsyncRead + Unpin + Send> {
        Box::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn test_line_source_forwards_lines() {
        let mut source = LineSource::from_reader(reader("first\n\n  \nQR-Code:second\r\nthird"));
        let (tx, rx) = mpsc::channel(8);

        source.start(tx).await.unwrap();
        assert_eq!(collect(rx).await, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_line_source_keeps_surrounding_spaces() {
        let mut source = LineSource::from_reader(reader(" padded \n"));
        let (tx, rx) = mpsc::channel(8);

        source.start(tx).await.unwrap();
        assert_eq!(collect(rx).await, vec![" padded "]);
    }

    #[tokio::test]
    async fn test_line_source_consumed_once() {
        let mut source = LineSource::from_reader(reader("a\n"));
        let (tx, rx) = mpsc::channel(8);
        source.start(tx).await.unwrap();
        collect(rx).await;

        let (tx, _rx) = mpsc::channel(8);
        let err = source.start(tx).await.unwrap_err();
        assert!(matches!(err, Error::ScanSourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_line_source_missing_file() {
        let mut source = LineSource::file("/nonexistent/pulse/scans.txt");
        let (tx, _rx) = mpsc::channel(8);

        let err = source.start(tx).await.unwrap_err();
        assert!(matches!(err, Error::ScanSourceUnavailable { name: "lines", .. }));
        assert!(!source.is_running());
    }

    #[tokio::test]
    async fn test_line_source_reads_file() {
        let path = std::env::temp_dir().join(format!("pulse_scans_{}.txt", std::process::id()));
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let mut source = LineSource::file(&path);
        let (tx, rx) = mpsc::channel(8);
        source.start(tx).await.unwrap();
        assert_eq!(collect(rx).await, vec!["one", "two"]);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_line_source_stop_is_idempotent() {
        let mut source = LineSource::stdin();
        source.stop().await.unwrap();
        source.stop().await.unwrap();
        assert!(!source.is_running());
    }

    #[test]
    fn test_command_source_requires_program() {
        let err = CommandSource::new(&[]).unwrap_err();
        assert!(matches!(err, Error::ScanSourceUnavailable { .. }));
    }

    #[test]
    fn test_command_line() {
        let source = CommandSource::new(&[
            "zbarcam".to_string(),
            "--raw".to_string(),
            "--nodisplay".to_string(),
        ])
        .unwrap();
        assert_eq!(source.command_line(), "zbarcam --raw --nodisplay");
    }

    #[tokio::test]
    async fn test_command_source_spawn_failure() {
        let mut source = CommandSource::new(&["pulse-no-such-decoder".to_string()]).unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let err = source.start(tx).await.unwrap_err();
        assert!(matches!(err, Error::ScanSourceUnavailable { name: "decoder", .. }));
        assert!(!source.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_source_reads_decoder_output() {
        let mut source = CommandSource::new(&[
            "sh".to_string(),
            "-c".to_string(),
            "printf 'QR-Code:one\\ntwo\\n'".to_string(),
        ])
        .unwrap();
        let (tx, rx) = mpsc::channel(8);

        source.start(tx).await.unwrap();
        assert_eq!(collect(rx).await, vec!["one", "two"]);
        source.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_source_reports_failed_decoder() {
        let mut source = CommandSource::new(&[
            "sh".to_string(),
            "-c".to_string(),
            "echo no video device >&2; exit 1".to_string(),
        ])
        .unwrap();
        let (tx, rx) = mpsc::channel(8);

        source.start(tx).await.unwrap();
        assert!(collect(rx).await.is_empty());

        let err = source.stop().await.unwrap_err();
        assert!(matches!(err, Error::ScanSourceUnavailable { name: "decoder", .. }));
        assert!(err.to_string().contains("no video device"));

        // The failure is reported once.
        source.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_source_clean_exit_is_not_an_error() {
        let mut source = CommandSource::new(&[
            "sh".to_string(),
            "-c".to_string(),
            "echo chatter >&2; exit 0".to_string(),
        ])
        .unwrap();
        let (tx, rx) = mpsc::channel(8);

        source.start(tx).await.unwrap();
        collect(rx).await;
        source.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_source_busy_then_stop() {
        let mut source = CommandSource::new(&[
            "sh".to_string(),
            "-c".to_string(),
            "sleep 5".to_string(),
        ])
        .unwrap();
        let (tx, _rx) = mpsc::channel(8);
        source.start(tx.clone()).await.unwrap();
        assert!(source.is_running());

        let err = source.start(tx).await.unwrap_err();
        assert!(matches!(err, Error::ScanSourceBusy { name: "decoder" }));

        source.stop().await.unwrap();
        assert!(!source.is_running());
        source.stop().await.unwrap();
    }
}
