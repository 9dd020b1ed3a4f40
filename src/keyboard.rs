//! Keyboard control
//!
//! Reads keys in raw mode on a dedicated thread and feeds them into
//! [`EngineHandle::apply`], the same path the HTTP API uses.

use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Write};
use std::time::Duration;

use crate::constants::KEY_POLL_TIMEOUT_MS;
use crate::engine::{ControlEvent, EngineHandle};
use crate::playback::digit_index;

const HELP: &str = "\
Keys:
  n        next effect
  p        previous effect
  r        resume playlist
  1-9, 0   select supported effect 1-10
  h        this help
  q        quit";

#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Control(ControlEvent),
    Help,
}

/// Map a key press to an action; unbound keys map to `None`
pub fn map_key(key: KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let event = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => ControlEvent::Shutdown,
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'n' => ControlEvent::Next,
            'p' => ControlEvent::Previous,
            'r' => ControlEvent::Resume,
            'q' => ControlEvent::Shutdown,
            'h' => return Some(KeyAction::Help),
            d => ControlEvent::SelectIndex(digit_index(d)?),
        },
        KeyCode::Esc => ControlEvent::Shutdown,
        _ => return None,
    };
    Some(KeyAction::Control(event))
}

fn print_help() {
    let mut err = io::stderr();
    let _ = write!(err, "{}\r\n", HELP.replace('\n', "\r\n"));
    let _ = err.flush();
}

/// Restores cooked mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::warn!("Failed to restore terminal: {}", e);
        }
    }
}

/// Blocking key loop; returns when the engine stops
pub fn run(engine: EngineHandle) -> io::Result<()> {
    let _guard = RawModeGuard::enable()?;
    let timeout = Duration::from_millis(KEY_POLL_TIMEOUT_MS);
    tracing::info!("Keyboard control active (h for help)");

    while engine.is_running() {
        if !poll(timeout)? {
            continue;
        }
        let Event::Key(key) = read()? else {
            continue;
        };
        match map_key(key) {
            Some(KeyAction::Help) => print_help(),
            Some(KeyAction::Control(event)) => {
                if let Err(e) = engine.apply(event) {
                    tracing::warn!("Key '{:?}' rejected: {}", key.code, e);
                }
            }
            None => {}
        }
    }
    Ok(())
}

/// Spawn [`run`] on its own thread
pub fn spawn(engine: EngineHandle) -> io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            if let Err(e) = run(engine) {
                tracing::error!("Keyboard input failed: {}", e);
            }
        })
}
