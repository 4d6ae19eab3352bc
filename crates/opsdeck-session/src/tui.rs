//! Crossterm input for a [`TerminalBridge`].

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::terminal::TerminalBridge;

/// Convert a key press to the bytes a remote shell expects.
///
/// Returns `None` for releases and for keys with no terminal encoding.
#[must_use]
pub fn key_to_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    if key.kind == KeyEventKind::Release {
        return None;
    }

    let mut bytes = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => ctrl_byte(c)?,
        KeyCode::Char(c) => {
            let mut buf = [0; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::F(n) => function_key(n)?.to_vec(),
        _ => return None,
    };

    // Meta sends ESC before the key.
    if key.modifiers.contains(KeyModifiers::ALT) {
        bytes.insert(0, 0x1b);
    }
    Some(bytes)
}

fn ctrl_byte(c: char) -> Option<Vec<u8>> {
    match c {
        'a'..='z' | 'A'..='Z' | '@' | '[' | '\\' | ']' | '^' | '_' => Some(vec![c as u8 & 0x1f]),
        ' ' => Some(vec![0]),
        '?' => Some(vec![0x7f]),
        _ => None,
    }
}

const fn function_key(n: u8) -> Option<&'static [u8]> {
    let seq: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(seq)
}

impl TerminalBridge {
    /// Forward a crossterm event to the remote terminal.
    ///
    /// Returns true if the event was sent.
    pub fn handle_event(&self, event: &Event) -> bool {
        match event {
            Event::Key(key) => key_to_bytes(key).is_some_and(|bytes| self.send_input(&bytes)),
            Event::Paste(text) => self.send_text(text),
            Event::Resize(cols, rows) => self.send_resize(*cols, *rows),
            _ => false,
        }
    }
}
