use std::io::{stdin, stdout, IsTerminal, Read, Write};
use std::os::fd::AsFd;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEvent},
    terminal,
};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// Byte-level terminal capability consumed by the runtime.
///
/// [`Console::poll`] backs the keyboard status register; [`Console::read`]
/// backs the `GETC` and `IN` traps. Both consume the byte they report.
pub trait Console {
    /// Take the next input byte if one is already pending, without blocking.
    fn poll(&mut self) -> Option<u8>;
    /// Block until one input byte arrives. At end of input, reports NUL.
    fn read(&mut self) -> u8;
    /// Write one byte to the output stream.
    fn write(&mut self, byte: u8);
    fn flush(&mut self);
}

/// The real terminal.
///
/// Interactive sessions read key events through crossterm and expect the
/// caller to hold the terminal in raw mode for the whole run. Piped input is
/// polled with a zero-timeout readiness check and read one byte at a time,
/// with EOF reported as NUL.
pub struct Terminal;

impl Console for Terminal {
    fn poll(&mut self) -> Option<u8> {
        if !stdin().is_terminal() {
            // An open but empty pipe must report "nothing pending", not block
            if !stdin_ready() {
                return None;
            }
            return read_stdin_byte();
        }
        // Non-key events (resize, focus) must not mask a pending keystroke
        while event::poll(Duration::ZERO).expect("failed to poll terminal") {
            let event = event::read().expect("failed to read terminal event");
            if let Some(byte) = key_byte(event) {
                return Some(byte);
            }
        }
        None
    }

    fn read(&mut self) -> u8 {
        if !stdin().is_terminal() {
            return read_stdin_byte().unwrap_or(b'\0');
        }
        loop {
            let event = event::read().expect("failed to read terminal event");
            if let Some(byte) = key_byte(event) {
                return byte;
            }
        }
    }

    fn write(&mut self, byte: u8) {
        // Raw mode disables output post-processing, so reinsert the carriage
        // return ourselves
        let mut out = stdout();
        if byte == b'\n' {
            out.write_all(b"\r\n")
        } else {
            out.write_all(&[byte])
        }
        .expect("failed to write to stdout");
    }

    fn flush(&mut self) {
        stdout().flush().expect("failed to flush stdout");
    }
}

/// Must only be called if terminal is NOT in raw mode.
pub fn enable_raw_mode() {
    debug_assert!(
        !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should not be in raw mode to enable raw mode",
    );
    terminal::enable_raw_mode().expect("failed to enable raw terminal");
}

/// Must only be called if terminal is in raw mode.
pub fn disable_raw_mode() {
    debug_assert!(
        terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should already be in raw mode to disable raw mode",
    );
    terminal::disable_raw_mode().expect("failed to disable raw terminal");
}

/// Zero-timeout readiness check on stdin. EOF counts as ready; the
/// follow-up read then reports it.
fn stdin_ready() -> bool {
    let stdin = stdin();
    let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
    matches!(poll(&mut fds, PollTimeout::ZERO), Ok(n) if n > 0)
}

fn read_stdin_byte() -> Option<u8> {
    let mut buf = [0; 1];
    match stdin().read_exact(&mut buf) {
        Ok(()) => Some(buf[0]),
        Err(_) => None, // EOF
    }
}

/// Convert a terminal event to an input byte.
///
/// Only ASCII-representable keys produce a byte; everything else is dropped.
///
/// `Ctrl+C` will always return the terminal to normal state and exit.
fn key_byte(event: Event) -> Option<u8> {
    let Event::Key(event) = event else {
        return None;
    };
    ascii_byte(event)
}

fn ascii_byte(event: KeyEvent) -> Option<u8> {
    use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

    if matches!(event.kind, KeyEventKind::Release) {
        return None;
    }

    let byte = match (event.modifiers, event.code) {
        // Ctrl+C
        (Mod::CONTROL, KeyCode::Char('c')) => {
            disable_raw_mode(); // Generic cleanup
            println!();
            std::process::exit(130);
        }

        (_, KeyCode::Enter) | (_, KeyCode::Char('\n')) => b'\n',
        (_, KeyCode::Backspace) => 0x08,
        (_, KeyCode::Tab) => b'\t',
        (_, KeyCode::Esc) => 0x1b,

        // Normal character
        (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) if ch.is_ascii() => ch as u8,

        _ => return None,
    };

    Some(byte)
}

/// Scripted console for unit tests: input comes from a fixed byte queue and
/// output is captured in memory.
#[cfg(test)]
pub struct Script {
    input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
}

#[cfg(test)]
impl Script {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Console for Script {
    fn poll(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn read(&mut self) -> u8 {
        self.input.pop_front().expect("script ran out of input")
    }

    fn write(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn flush(&mut self) {}
}
