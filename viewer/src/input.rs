use std::io::{IsTerminal, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode as TermKey, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::{debug, warn};

/// A logical key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Escape,
}

impl KeyCode {
    /// Map a terminal event to a key. Only presses count. Ctrl+C maps to ESC,
    /// since raw mode keeps it from raising SIGINT.
    pub fn from_event(event: &Event) -> Option<KeyCode> {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event
        else {
            return None;
        };
        if *kind != KeyEventKind::Press {
            return None;
        }
        match code {
            TermKey::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                Some(KeyCode::Escape)
            }
            TermKey::Char(c) => Some(KeyCode::Char(*c)),
            TermKey::Esc => Some(KeyCode::Escape),
            _ => None,
        }
    }
}

/// Source of discrete key presses.
pub trait InputEvents {
    /// Wait at most `timeout` for a key.
    fn poll(&mut self, timeout: Duration) -> Option<KeyCode>;
}

/// Single key presses from the controlling terminal, read in raw mode.
pub struct TerminalKeys {
    raw_mode: bool,
    enabled: bool,
}

impl TerminalKeys {
    /// Put the terminal into raw mode. Without a terminal on stdin, polls
    /// only wait out their timeout.
    pub fn open() -> std::io::Result<Self> {
        if !std::io::stdin().is_terminal() {
            warn!("stdin is not a terminal, keyboard input disabled");
            return Ok(Self {
                raw_mode: false,
                enabled: false,
            });
        }
        terminal::enable_raw_mode()?;
        debug!("terminal raw mode enabled");
        Ok(Self {
            raw_mode: true,
            enabled: true,
        })
    }

    fn next_key(timeout: Duration) -> std::io::Result<Option<KeyCode>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !event::poll(remaining)? {
                return Ok(None);
            }
            // Resize, focus and release events do not end the wait.
            if let Some(key) = KeyCode::from_event(&event::read()?) {
                return Ok(Some(key));
            }
            if remaining.is_zero() {
                return Ok(None);
            }
        }
    }
}

impl InputEvents for TerminalKeys {
    fn poll(&mut self, timeout: Duration) -> Option<KeyCode> {
        if !self.enabled {
            thread::sleep(timeout);
            return None;
        }
        match Self::next_key(timeout) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "terminal read failed, keyboard input disabled");
                self.enabled = false;
                None
            }
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if !self.raw_mode {
            return;
        }
        match terminal::disable_raw_mode() {
            Ok(()) => debug!("terminal raw mode disabled"),
            Err(e) => warn!(error = %e, "failed to restore terminal mode"),
        }
    }
}

/// Log writer for a raw-mode terminal, where a bare `\n` no longer returns
/// the cursor to column 0.
pub struct CrlfWriter<W>(pub W);

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for line in buf.split_inclusive(|&b| b == b'\n') {
            match line.strip_suffix(b"\n") {
                Some(body) => {
                    self.0.write_all(body)?;
                    self.0.write_all(b"\r\n")?;
                }
                None => self.0.write_all(line)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}
