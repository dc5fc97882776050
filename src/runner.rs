//! Live process execution under a pseudo-terminal.
//!
//! `LiveRunner` spawns a command with its stdio wired to a fresh PTY so the
//! child behaves as it would in a real terminal (line buffering off, colored
//! output on). A background thread drains the PTY master and forwards raw
//! chunks over a channel; the async side consumes them at its own pace.

use std::io::Read;
use std::path::Path;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

const READ_BUF_SIZE: usize = 4096;
const CHUNK_CHANNEL_CAPACITY: usize = 256;

/// Messages from the PTY reader thread.
#[derive(Debug)]
pub enum RunnerMessage {
    /// A raw chunk of child output, escape sequences and all.
    Chunk(Vec<u8>),
    /// A read error that was not a normal hangup.
    Error(Error),
    /// The child closed its side of the PTY; no more chunks follow.
    Eof,
}

/// A child process running under a PTY with a live output channel.
pub struct LiveRunner {
    child: Box<dyn Child + Send + Sync>,
    // Held so the PTY fds stay open for the lifetime of the run.
    _master: Box<dyn MasterPty + Send>,
    rx: mpsc::Receiver<RunnerMessage>,
    exit_code: Option<i32>,
}

impl LiveRunner {
    /// Spawns `cmd` under a new PTY with `cwd` as its working directory.
    pub fn spawn(cmd: &[String], cwd: &Path) -> Result<Self> {
        let display = cmd.join(" ");
        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| Error::Spawn {
                command: display.clone(),
                message: "empty command".to_string(),
            })?;

        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| Error::Spawn {
                command: display.clone(),
                message: err.to_string(),
            })?;

        let mut builder = CommandBuilder::new(program);
        builder.args(args);
        builder.cwd(cwd);
        builder.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|err| Error::Spawn {
                command: display.clone(),
                message: err.to_string(),
            })?;
        // The child holds its own slave handle; ours must go so EOF reaches
        // the reader when the child exits.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| Error::Spawn {
                command: display,
                message: err.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        std::thread::spawn(move || read_loop(reader, tx));

        Ok(Self {
            child,
            _master: pair.master,
            rx,
            exit_code: None,
        })
    }

    /// Receives the next output message; `None` once the channel is closed
    /// after `Eof`.
    pub async fn recv(&mut self) -> Option<RunnerMessage> {
        self.rx.recv().await
    }

    /// Non-blocking exit poll.
    pub fn try_wait(&mut self) -> Option<i32> {
        if self.exit_code.is_some() {
            return self.exit_code;
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit_code = Some(exit_code_of(&status));
        }
        self.exit_code
    }

    /// Blocks until the child exits and returns its exit code.
    pub fn wait(&mut self) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        let code = match self.child.wait() {
            Ok(status) => exit_code_of(&status),
            Err(_) => -1,
        };
        self.exit_code = Some(code);
        code
    }
}

impl Drop for LiveRunner {
    fn drop(&mut self) {
        // Never leave a child running past the UI: kill if unreaped, then
        // reap to avoid a zombie. The reader thread exits on its own once
        // the master side hangs up.
        if self.exit_code.is_none() {
            if let Ok(None) = self.child.try_wait() {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}

fn exit_code_of(status: &portable_pty::ExitStatus) -> i32 {
    if status.success() {
        0
    } else {
        status.exit_code() as i32
    }
}

fn read_loop(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<RunnerMessage>) {
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(RunnerMessage::Chunk(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(err) => {
                // Linux reports EIO on the master once the slave side is
                // fully closed; that is a normal hangup, not a failure.
                if !is_hangup(&err) {
                    let _ = tx.blocking_send(RunnerMessage::Error(Error::Read(err.to_string())));
                }
                break;
            }
        }
    }
    let _ = tx.blocking_send(RunnerMessage::Eof);
}

#[cfg(unix)]
fn is_hangup(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EIO)
}

#[cfg(not(unix))]
fn is_hangup(_err: &std::io::Error) -> bool {
    false
}
