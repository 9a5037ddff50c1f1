//! evdev-based hotkey monitor
//!
//! Reads key events straight from the kernel input layer, which works on every
//! Wayland compositor since no display-server protocol is involved. Requires
//! read access to /dev/input/event* (typically membership in the 'input' group).

use super::{HotkeyEvent, HotkeyMonitor};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(5);

/// Hotkey monitor backed by the Linux evdev interface
pub struct EvdevMonitor {
    tracker: KeyTracker,
    device_paths: Vec<PathBuf>,
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevMonitor {
    /// Resolve the configured key names and enumerate keyboard devices
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let target = parse_key_name(&config.key)?;
        let modifiers = config
            .modifiers
            .iter()
            .map(|name| parse_key_name(name))
            .collect::<Result<HashSet<_>, _>>()?;

        let device_paths = find_keyboard_devices()?;
        if device_paths.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }
        tracing::debug!(
            "Monitoring {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            tracker: KeyTracker::new(target, modifiers),
            device_paths,
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl HotkeyMonitor for EvdevMonitor {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let tracker = self.tracker.clone();
        let device_paths = self.device_paths.clone();

        // Reads are blocking syscalls, so the poll loop lives on a blocking thread
        tokio::task::spawn_blocking(move || {
            poll_loop(device_paths, tracker, tx, stop_rx);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

/// Turns raw key events into hotkey press/release transitions.
///
/// Collapses kernel auto-repeat into a single press, requires all configured
/// modifiers to be down when the target key goes down, and always reports the
/// release of a tracked press even if a modifier was let go first. Dropping a
/// release would leave a push-to-talk session recording with no way out.
#[derive(Debug, Clone)]
struct KeyTracker {
    target: Key,
    modifiers: HashSet<Key>,
    held_modifiers: HashSet<Key>,
    target_down: bool,
}

impl KeyTracker {
    fn new(target: Key, modifiers: HashSet<Key>) -> Self {
        Self {
            target,
            modifiers,
            held_modifiers: HashSet::new(),
            target_down: false,
        }
    }

    /// Feed one key event (value: 0 = up, 1 = down, 2 = auto-repeat)
    fn handle(&mut self, key: Key, value: i32) -> Option<HotkeyEvent> {
        if self.modifiers.contains(&key) {
            match value {
                1 => {
                    self.held_modifiers.insert(key);
                }
                0 => {
                    self.held_modifiers.remove(&key);
                }
                _ => {}
            }
        }

        if key != self.target {
            return None;
        }

        match value {
            1 if !self.target_down && self.modifiers_satisfied() => {
                self.target_down = true;
                Some(HotkeyEvent::Pressed)
            }
            0 if self.target_down => {
                self.target_down = false;
                Some(HotkeyEvent::Released)
            }
            _ => None,
        }
    }

    fn modifiers_satisfied(&self) -> bool {
        self.modifiers.is_subset(&self.held_modifiers)
    }
}

/// Blocking poll loop over all keyboard devices
fn poll_loop(
    device_paths: Vec<PathBuf>,
    mut tracker: KeyTracker,
    tx: mpsc::Sender<HotkeyEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut devices: Vec<Device> = device_paths
        .iter()
        .filter_map(|path| open_nonblocking(path))
        .collect();

    if devices.is_empty() {
        tracing::error!("Could not open any keyboard device");
        return;
    }

    tracing::info!(
        "Hotkey armed: {:?} + {:?}",
        tracker.modifiers,
        tracker.target
    );

    loop {
        match stop_rx.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => {}
            _ => {
                tracing::debug!("Hotkey monitor stopped");
                return;
            }
        }

        for device in &mut devices {
            let Ok(events) = device.fetch_events() else {
                continue;
            };
            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                if let Some(hotkey_event) = tracker.handle(key, event.value()) {
                    tracing::debug!("Hotkey {:?}", hotkey_event);
                    if tx.blocking_send(hotkey_event).is_err() {
                        return;
                    }
                }
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Open a device and switch its fd to non-blocking so fetch_events never stalls
fn open_nonblocking(path: &Path) -> Option<Device> {
    match Device::open(path) {
        Ok(device) => {
            let fd = device.as_raw_fd();
            unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFL);
                if flags != -1 {
                    libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                }
            }
            Some(device)
        }
        Err(e) => {
            tracing::warn!("Could not open {:?}: {}", path, e);
            None
        }
    }
}

/// Enumerate /dev/input/event* devices that look like real keyboards
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let entries = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::DeviceAccess(format!("/dev/input: {}", e)))?;

    let mut keyboards = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| HotkeyError::DeviceAccess(e.to_string()))?
            .path();
        if !is_event_node(&path) {
            continue;
        }

        match Device::open(&path) {
            Ok(device) if is_keyboard(&device) => {
                tracing::debug!(
                    "Keyboard: {:?} ({})",
                    path,
                    device.name().unwrap_or("unnamed")
                );
                keyboards.push(path);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(HotkeyError::DeviceAccess(path.display().to_string()));
            }
            Err(e) => {
                // Busy or transient devices are skipped, not fatal
                tracing::trace!("Ignoring {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("event"))
        .unwrap_or(false)
}

/// Mice and power buttons also expose key capabilities, so require letter
/// keys plus Enter before treating a device as a keyboard
fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .map(|keys| {
            keys.contains(Key::KEY_A) && keys.contains(Key::KEY_Z) && keys.contains(Key::KEY_ENTER)
        })
        .unwrap_or(false)
}

/// Key names accepted in config, without the KEY_ prefix.
/// Short forms (RALT, LCTRL, ...) are included for convenience.
const KEY_ALIASES: &[(&str, Key)] = &[
    ("LEFTALT", Key::KEY_LEFTALT),
    ("LALT", Key::KEY_LEFTALT),
    ("RIGHTALT", Key::KEY_RIGHTALT),
    ("RALT", Key::KEY_RIGHTALT),
    ("LEFTCTRL", Key::KEY_LEFTCTRL),
    ("LCTRL", Key::KEY_LEFTCTRL),
    ("RIGHTCTRL", Key::KEY_RIGHTCTRL),
    ("RCTRL", Key::KEY_RIGHTCTRL),
    ("LEFTSHIFT", Key::KEY_LEFTSHIFT),
    ("LSHIFT", Key::KEY_LEFTSHIFT),
    ("RIGHTSHIFT", Key::KEY_RIGHTSHIFT),
    ("RSHIFT", Key::KEY_RIGHTSHIFT),
    ("LEFTMETA", Key::KEY_LEFTMETA),
    ("LMETA", Key::KEY_LEFTMETA),
    ("SUPER", Key::KEY_LEFTMETA),
    ("RIGHTMETA", Key::KEY_RIGHTMETA),
    ("RMETA", Key::KEY_RIGHTMETA),
    ("SCROLLLOCK", Key::KEY_SCROLLLOCK),
    ("PAUSE", Key::KEY_PAUSE),
    ("CAPSLOCK", Key::KEY_CAPSLOCK),
    ("NUMLOCK", Key::KEY_NUMLOCK),
    ("INSERT", Key::KEY_INSERT),
    ("HOME", Key::KEY_HOME),
    ("END", Key::KEY_END),
    ("PAGEUP", Key::KEY_PAGEUP),
    ("PAGEDOWN", Key::KEY_PAGEDOWN),
    ("DELETE", Key::KEY_DELETE),
    ("SPACE", Key::KEY_SPACE),
    ("ENTER", Key::KEY_ENTER),
    ("TAB", Key::KEY_TAB),
    ("BACKSPACE", Key::KEY_BACKSPACE),
    ("ESC", Key::KEY_ESC),
    ("ESCAPE", Key::KEY_ESC),
    ("GRAVE", Key::KEY_GRAVE),
    ("BACKTICK", Key::KEY_GRAVE),
    ("MUTE", Key::KEY_MUTE),
    ("VOLUMEDOWN", Key::KEY_VOLUMEDOWN),
    ("VOLUMEUP", Key::KEY_VOLUMEUP),
    ("PLAYPAUSE", Key::KEY_PLAYPAUSE),
];

/// F13-F24 sit on otherwise-unused scancodes and make the best hotkeys
const FUNCTION_KEYS: [Key; 24] = [
    Key::KEY_F1,
    Key::KEY_F2,
    Key::KEY_F3,
    Key::KEY_F4,
    Key::KEY_F5,
    Key::KEY_F6,
    Key::KEY_F7,
    Key::KEY_F8,
    Key::KEY_F9,
    Key::KEY_F10,
    Key::KEY_F11,
    Key::KEY_F12,
    Key::KEY_F13,
    Key::KEY_F14,
    Key::KEY_F15,
    Key::KEY_F16,
    Key::KEY_F17,
    Key::KEY_F18,
    Key::KEY_F19,
    Key::KEY_F20,
    Key::KEY_F21,
    Key::KEY_F22,
    Key::KEY_F23,
    Key::KEY_F24,
];

/// Parse a configured key name into an evdev Key.
///
/// Case-insensitive; dashes and spaces are treated as underscores and an
/// optional KEY_ prefix is accepted, so "RightAlt", "right-alt" and
/// "KEY_RIGHTALT" all name the same key.
fn parse_key_name(name: &str) -> Result<Key, HotkeyError> {
    let normalized: String = name
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    let bare = normalized.strip_prefix("KEY_").unwrap_or(&normalized);

    if let Some(n) = bare.strip_prefix('F').and_then(|s| s.parse::<usize>().ok()) {
        if (1..=FUNCTION_KEYS.len()).contains(&n) {
            return Ok(FUNCTION_KEYS[n - 1]);
        }
    }

    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == bare)
        .map(|(_, key)| *key)
        .ok_or_else(|| {
            HotkeyError::UnknownKey(format!(
                "{}. Try: RIGHTALT, SCROLLLOCK, F13-F24, or run 'evtest' to find key names",
                name
            ))
        })
}
