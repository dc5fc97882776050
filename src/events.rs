//! Event definitions for the application event loop.
//!
//! This module defines the `Event` enum which encapsulates all possible events
//! that drive the application's state transitions, including user input,
//! live run output, and system signals.

use crossterm::event::KeyEvent;

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// A raw chunk of output was received from the active run.
    RunChunk(Vec<u8>),
    /// The active run's reader hit an unexpected error.
    RunFailed { error: String },
    /// The active run's process exited.
    RunExited { code: i32 },
    /// The application was asked to shut down (Ctrl-C/SIGTERM).
    Shutdown,
}
