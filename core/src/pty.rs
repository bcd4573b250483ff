//! PtyBridge: one WebSocket ↔ PTY bridge for the lifetime of a connection.
//! Spawns a PTY attached to an existing mux session via `tmux attach-session`,
//! rather than a bare shell or direct-spawned CLI. UTF-8 continuation
//! buffering and the scrollback-after-resize sequencing are grounded on
//! `services/pty_manager.py`; teardown/reaping sequencing is grounded on
//! `api/terminal.py`. Output is batched on a 16ms/4KiB schedule rather than
//! forwarded chunk-by-chunk, to keep WebSocket frame volume bounded under
//! bursty output.

use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::mux::{self, MuxDriver};

const READ_CHUNK: usize = 8 * 1024;
const FLUSH_INTERVAL: Duration = Duration::from_millis(16);
const FLUSH_SIZE: usize = 4 * 1024;
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);
const REAP_POLL_ATTEMPTS: u32 = 20;
const EXIT_MARKER: &str = "[exited]";

/// Decoded, batched text ready to forward to the client, or an exit signal.
#[derive(Debug)]
pub enum BridgeEvent {
    Output(String),
    Exited,
}

/// Cheap, cloneable handle to write into / resize an attached bridge.
#[derive(Clone)]
pub struct PtyWriter {
    write_tx: mpsc::Sender<Vec<u8>>,
}

impl PtyWriter {
    pub async fn write(&self, bytes: &[u8]) {
        let _ = self.write_tx.send(bytes.to_vec()).await;
    }
}

/// A single attached PTY bridging a client to an existing mux session.
pub struct PtyBridge {
    writer: PtyWriter,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    output_rx: Option<mpsc::Receiver<BridgeEvent>>,
    _reader_task: tokio::task::JoinHandle<()>,
    _writer_thread: std::thread::JoinHandle<()>,
}

/// Build the shell command that attaches to `base`, optionally switching to
/// `target` immediately after. Both names are `validate_name`-gated by the
/// caller before this is invoked, and are still shell-quoted here.
fn attach_command(base: &str, target: Option<&str>) -> CommandBuilder {
    let quoted_base = shell_quote(base);
    let line = match target {
        Some(target) if mux::validate_name(target) => {
            format!(
                "tmux attach-session -t {} \\; switch-client -t {}",
                quoted_base,
                shell_quote(target)
            )
        }
        _ => format!("tmux attach-session -t {quoted_base}"),
    };

    let mut cmd = CommandBuilder::new("bash");
    cmd.arg("-c");
    cmd.arg(line);
    cmd.env("TERM", "xterm-256color");
    cmd.env("COLORTERM", "truecolor");
    cmd
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

impl PtyBridge {
    /// Fork-exec a PTY attached to the mux session `base` (and, if set and
    /// live, switch straight to `target`). Both names must already be
    /// `validate_name`-gated by the caller.
    pub fn attach(base: &str, target: Option<&str>) -> Result<Self, BridgeError> {
        if !mux::validate_name(base) {
            return Err(BridgeError::Pty(format!("invalid session name: {base}")));
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 30,
                cols: 120,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        let cmd = attach_command(base, target);
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        let master_fd = pair
            .master
            .as_raw_fd()
            .ok_or_else(|| BridgeError::Pty("pty master has no raw fd".to_string()))?;
        set_nonblocking(master_fd).map_err(|e| BridgeError::Pty(e.to_string()))?;

        let pty_writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Pty(e.to_string()))?;
        let master: Mutex<Box<dyn MasterPty + Send>> = Mutex::new(pair.master);

        let (output_tx, output_rx) = mpsc::channel::<BridgeEvent>(64);
        let reader_task = tokio::spawn(read_and_batch(master_fd, output_tx));

        let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(64);
        let mut pty_writer = pty_writer;
        let writer_thread = std::thread::spawn(move || {
            while let Some(bytes) = write_rx.blocking_recv() {
                if pty_writer.write_all(&bytes).is_err() {
                    break;
                }
                let _ = pty_writer.flush();
            }
        });

        Ok(Self {
            writer: PtyWriter { write_tx },
            master,
            child: Arc::new(Mutex::new(child)),
            output_rx: Some(output_rx),
            _reader_task: reader_task,
            _writer_thread: writer_thread,
        })
    }

    pub fn writer(&self) -> PtyWriter {
        self.writer.clone()
    }

    /// Take the batched-output stream. Callable once per bridge.
    pub fn take_output(&mut self) -> mpsc::Receiver<BridgeEvent> {
        self.output_rx.take().expect("output stream already taken")
    }

    /// Apply a new size to the master PTY (TIOCSWINSZ). The mux window
    /// itself is resized separately by the caller via `MuxDriver`, since
    /// that call is async.
    pub fn resize_pty(&self, cols: u16, rows: u16) -> Result<(), BridgeError> {
        let guard = match self.master.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        guard
            .resize(PtySize {
                cols,
                rows,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Pty(e.to_string()))
    }

    /// Resize both the PTY and the mux window it is attached to.
    pub async fn resize(&self, mux: &MuxDriver, mux_name: &str, cols: u16, rows: u16) -> Result<(), BridgeError> {
        self.resize_pty(cols, rows)?;
        mux.resize_window(mux_name, cols, rows).await;
        Ok(())
    }

    /// Teardown: SIGKILL the child, reap with a bounded series of
    /// non-blocking waits then a final blocking wait, ignoring
    /// "no such process" errors. Never touches the mux session itself.
    pub fn teardown(self) {
        let child = self.child.clone();
        std::thread::spawn(move || {
            let mut guard = match child.lock() {
                Ok(g) => g,
                Err(e) => e.into_inner(),
            };
            if let Err(e) = guard.kill() {
                debug!(error = %e, "pty_child_kill_failed");
            }

            for _ in 0..REAP_POLL_ATTEMPTS {
                match guard.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => std::thread::sleep(REAP_POLL_INTERVAL),
                    Err(_) => return,
                }
            }
            let _ = guard.wait();
        });
    }
}

/// Set `O_NONBLOCK` on a raw fd. The master and every fd `try_clone`d from it
/// share the same open file description, so this affects all of them.
fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let res = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Reader task: event-driven on the (now non-blocking) master fd's
/// readiness, decoding with a bounded UTF-8 continuation buffer and
/// accumulating into a batch. Flushed on whichever comes first: the batch
/// crossing 4KiB, or a 16ms deadline elapsing — the deadline is a fixed
/// `interval`, independent of fd readiness, so a sub-4KiB tail left behind
/// after a burst is still delivered while the PTY sits idle.
async fn read_and_batch(master_fd: RawFd, tx: mpsc::Sender<BridgeEvent>) {
    let async_fd = match AsyncFd::new(master_fd) {
        Ok(fd) => fd,
        Err(e) => {
            warn!(error = %e, "pty_async_fd_failed");
            let _ = tx.send(BridgeEvent::Exited).await;
            return;
        }
    };

    let mut raw = [0u8; READ_CHUNK];
    let mut pending: Vec<u8> = Vec::new();
    let mut batch = String::new();
    let mut deadline = interval(FLUSH_INTERVAL);
    deadline.set_missed_tick_behavior(MissedTickBehavior::Delay);
    deadline.tick().await;

    loop {
        tokio::select! {
            biased;

            ready = async_fd.readable() => {
                let mut guard = match ready {
                    Ok(guard) => guard,
                    Err(_) => {
                        flush(&mut batch, &tx).await;
                        let _ = tx.send(BridgeEvent::Exited).await;
                        return;
                    }
                };

                let read_result = guard.try_io(|inner| {
                    let fd = *inner.get_ref();
                    let n = unsafe { libc::read(fd, raw.as_mut_ptr() as *mut libc::c_void, raw.len()) };
                    if n >= 0 {
                        Ok(n as usize)
                    } else {
                        let err = io::Error::last_os_error();
                        if err.raw_os_error() == Some(libc::EIO) {
                            // Slave side closed; treat like EOF.
                            Ok(0)
                        } else {
                            Err(err)
                        }
                    }
                });

                match read_result {
                    Err(_would_block) => continue,
                    Ok(Err(e)) => {
                        warn!(error = %e, "pty_read_error");
                        flush(&mut batch, &tx).await;
                        let _ = tx.send(BridgeEvent::Exited).await;
                        return;
                    }
                    Ok(Ok(0)) => {
                        flush(&mut batch, &tx).await;
                        let _ = tx.send(BridgeEvent::Exited).await;
                        return;
                    }
                    Ok(Ok(n)) => {
                        pending.extend_from_slice(&raw[..n]);
                        let (decoded, rest) = decode_utf8_prefix(&pending);
                        batch.push_str(&decoded);
                        pending = rest;

                        if batch.len() >= FLUSH_SIZE {
                            if !flush(&mut batch, &tx).await {
                                let _ = tx.send(BridgeEvent::Exited).await;
                                return;
                            }
                            deadline.reset();
                        }
                    }
                }
            }

            _ = deadline.tick() => {
                if !flush(&mut batch, &tx).await {
                    let _ = tx.send(BridgeEvent::Exited).await;
                    return;
                }
            }
        }
    }
}

/// Send the accumulated batch, if any, and report whether the reader should
/// keep going (`false` means the `[exited]` marker was seen, or the channel
/// closed).
async fn flush(batch: &mut String, tx: &mpsc::Sender<BridgeEvent>) -> bool {
    if batch.is_empty() {
        return true;
    }
    let exited = batch.contains(EXIT_MARKER);
    let chunk = std::mem::take(batch);
    if tx.send(BridgeEvent::Output(chunk)).await.is_err() {
        return false;
    }
    !exited
}

/// Decode as much of `buf` as is valid UTF-8, returning the decoded text and
/// any trailing incomplete sequence (at most 3 bytes) to prepend to the next
/// read.
fn decode_utf8_prefix(buf: &[u8]) -> (String, Vec<u8>) {
    match std::str::from_utf8(buf) {
        Ok(s) => (s.to_string(), Vec::new()),
        Err(e) => {
            let valid_len = e.valid_up_to();
            let decoded = String::from_utf8_lossy(&buf[..valid_len]).into_owned();
            let rest = buf[valid_len..].to_vec();
            if rest.len() > 3 {
                // Not a continuation, just invalid bytes; drop them via lossy decode.
                let lossy = String::from_utf8_lossy(&buf[valid_len..]).into_owned();
                return (decoded + &lossy, Vec::new());
            }
            (decoded, rest)
        }
    }
}

impl Drop for PtyBridge {
    fn drop(&mut self) {
        info!("pty_bridge_dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_utf8_prefix_passes_through_ascii() {
        let (decoded, rest) = decode_utf8_prefix(b"hello world");
        assert_eq!(decoded, "hello world");
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_utf8_prefix_buffers_a_split_multibyte_char() {
        // "é" is 0xC3 0xA9; split after the first byte.
        let full = "caf\u{e9}".as_bytes().to_vec();
        let (decoded, rest) = decode_utf8_prefix(&full[..full.len() - 1]);
        assert_eq!(decoded, "caf");
        assert_eq!(rest, vec![0xC3]);
    }

    #[test]
    fn decode_utf8_prefix_completes_once_the_rest_arrives() {
        let full = "caf\u{e9}".as_bytes().to_vec();
        let (_, pending) = decode_utf8_prefix(&full[..full.len() - 1]);
        let mut next = pending;
        next.push(full[full.len() - 1]);
        let (decoded, rest) = decode_utf8_prefix(&next);
        assert_eq!(decoded, "\u{e9}");
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_utf8_prefix_falls_back_to_lossy_for_long_invalid_runs() {
        let buf = [0xFFu8, 0xFE, 0xFD, 0xFC, 0xFB];
        let (decoded, rest) = decode_utf8_prefix(&buf);
        assert!(rest.is_empty());
        assert!(decoded.contains('\u{FFFD}'));
    }

    #[test]
    fn attach_command_rejects_unvalidated_target_and_falls_back_to_bare_attach() {
        let cmd = attach_command("summitflow-abc", Some("bad name; rm -rf /"));
        let argv = format!("{cmd:?}");
        assert!(argv.contains("tmux attach-session -t 'summitflow-abc'"));
        assert!(!argv.contains("switch-client"));
    }

    #[test]
    fn attach_command_switches_when_target_is_valid() {
        let cmd = attach_command("summitflow-abc", Some("summitflow-def"));
        let argv = format!("{cmd:?}");
        assert!(argv.contains("switch-client -t 'summitflow-def'"));
    }

    #[test]
    fn shell_quote_escapes_embedded_single_quotes() {
        assert_eq!(shell_quote("a'b"), "'a'\"'\"'b'");
    }

    /// Regression test for the idle-tail flush: a sub-4KiB batch must reach
    /// the client on the 16ms deadline alone, with no further bytes ever
    /// arriving from the pty. Against the old blocking-thread reader this
    /// hangs until the outer wait gives up, since the flush check only ran
    /// after a `read()` that never returns.
    #[tokio::test]
    async fn idle_tail_flushes_on_the_deadline_without_further_input() {
        let name = format!("summitflow-pty-flush-test-{}", std::process::id());
        let _ = std::process::Command::new("tmux")
            .args(["kill-session", "-t", &name])
            .status();
        let status = std::process::Command::new("tmux")
            .args(["new-session", "-d", "-s", &name, "-x", "120", "-y", "30"])
            .status()
            .expect("failed to launch tmux for test");
        assert!(status.success(), "tmux new-session failed");

        let mut bridge = PtyBridge::attach(&name, None).expect("attach");
        let mut output_rx = bridge.take_output();
        let writer = bridge.writer();

        // Drain shell-startup noise before sending the probe.
        tokio::time::sleep(Duration::from_millis(300)).await;
        while tokio::time::timeout(Duration::from_millis(20), output_rx.recv())
            .await
            .is_ok()
        {}

        writer.write(b"echo PROBE-TAIL-MARKER\n").await;

        let mut collected = String::new();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while tokio::time::Instant::now() < deadline && !collected.contains("PROBE-TAIL-MARKER") {
            match tokio::time::timeout(Duration::from_millis(100), output_rx.recv()).await {
                Ok(Some(BridgeEvent::Output(text))) => collected.push_str(&text),
                Ok(Some(BridgeEvent::Exited)) | Ok(None) => break,
                Err(_) => continue,
            }
        }

        bridge.teardown();
        let _ = std::process::Command::new("tmux")
            .args(["kill-session", "-t", &name])
            .status();

        assert!(
            collected.contains("PROBE-TAIL-MARKER"),
            "expected the idle tail to flush within the bounded wait, got: {collected:?}"
        );
    }
}
