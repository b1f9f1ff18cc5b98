//! Input capture: local keystrokes become typing and message events.
//!
//! A dedicated OS thread polls the terminal with a short timeout so the
//! network sync loop is never blocked by key handling. The pure editing
//! logic lives in [`LineEditor`]; the thread wires it to the terminal, the
//! shared pending-line value, and the outbound event channel. Events flow
//! through one FIFO channel into a single socket writer, which preserves
//! the ordering contract: `startedTyping` always precedes the message body
//! it narrates.

use std::io::Write;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use idobata_shared::protocol::ClientEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// NOTE: "|" is not a valid character, it's reserved for protocol framing
const ALLOWED_CHARACTERS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 !?.,:;-_()\"'";

fn is_allowed_char(c: char) -> bool {
    ALLOWED_CHARACTERS.contains(c)
}

/// What the caller should draw in response to a key.
#[derive(Debug, PartialEq, Eq)]
pub enum Echo {
    None,
    /// Append the character at the cursor
    Char(char),
    /// Erase one column
    Erase,
}

/// Pure line-editing state machine.
///
/// Tracks the buffer against its previous length so the typing edge events
/// fire at most once per crossing: repeated keystrokes while the buffer is
/// already non-empty (or empty) do not re-emit.
pub struct LineEditor {
    name: String,
    buffer: String,
    prev_len: usize,
}

impl LineEditor {
    pub fn new(name: String) -> Self {
        Self {
            name,
            buffer: String::new(),
            prev_len: 0,
        }
    }

    /// The pending typed line.
    pub fn current_line(&self) -> &str {
        &self.buffer
    }

    /// Apply one key and return the events to emit, in emission order,
    /// plus the echo action for the local display.
    pub fn key(&mut self, code: KeyCode) -> (Vec<ClientEvent>, Echo) {
        let mut events = Vec::new();
        let echo = match code {
            KeyCode::Char(c) if is_allowed_char(c) => {
                self.buffer.push(c);
                Echo::Char(c)
            }
            KeyCode::Backspace => {
                if self.buffer.pop().is_some() {
                    Echo::Erase
                } else {
                    Echo::None
                }
            }
            KeyCode::Enter => {
                if !self.buffer.is_empty() {
                    events.push(ClientEvent::StoppedTyping {
                        name: self.name.clone(),
                    });
                    let body = std::mem::take(&mut self.buffer);
                    if !body.trim().is_empty() {
                        events.push(ClientEvent::Message {
                            name: self.name.clone(),
                            body,
                        });
                    }
                }
                // the submit already narrated the stop; suppress the edge
                self.prev_len = 0;
                return (events, Echo::None);
            }
            _ => return (events, Echo::None),
        };

        if self.prev_len == 0 && !self.buffer.is_empty() {
            events.push(ClientEvent::StartedTyping {
                name: self.name.clone(),
            });
        } else if self.prev_len > 0 && self.buffer.is_empty() {
            events.push(ClientEvent::StoppedTyping {
                name: self.name.clone(),
            });
        }
        self.prev_len = self.buffer.len();

        (events, echo)
    }
}

/// Spawn the input capture thread.
///
/// The thread polls for key availability with a timeout, checking the
/// shutdown flag every iteration so it winds down cooperatively when the
/// transport closes. Ctrl+C sets the flag itself: raw mode swallows the
/// usual SIGINT.
pub fn spawn_input_thread(
    name: String,
    current_line: Arc<Mutex<String>>,
    shutdown: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ClientEvent>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut editor = LineEditor::new(name);
        let mut stdout = std::io::stdout();

        while !shutdown.load(Ordering::Relaxed) {
            match event::poll(POLL_INTERVAL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!("Failed to poll terminal events: {}", e);
                    break;
                }
            }

            let key = match event::read() {
                Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => key,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("Failed to read terminal event: {}", e);
                    break;
                }
            };

            if key.modifiers.contains(KeyModifiers::CONTROL) {
                if let KeyCode::Char('c') = key.code {
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                continue;
            }

            let (emitted, echo) = editor.key(key.code);

            {
                let mut line = match current_line.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                line.clear();
                line.push_str(editor.current_line());
            }

            match echo {
                Echo::Char(c) => {
                    let _ = write!(stdout, "{c}");
                    let _ = stdout.flush();
                }
                Echo::Erase => {
                    let _ = write!(stdout, "\u{8} \u{8}");
                    let _ = stdout.flush();
                }
                Echo::None => {}
            }

            for event in emitted {
                if events.send(event).is_err() {
                    // transport side is gone; nothing left to capture for
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> LineEditor {
        LineEditor::new("alice".to_string())
    }

    #[test]
    fn test_first_char_emits_started_typing_once() {
        // テスト項目: バッファが空から非空になった時だけ startedTyping が出る
        // given (前提条件):
        let mut editor = editor();

        // when (操作):
        let (first, echo) = editor.key(KeyCode::Char('h'));
        let (second, _) = editor.key(KeyCode::Char('i'));

        // then (期待する結果):
        assert_eq!(
            first,
            vec![ClientEvent::StartedTyping {
                name: "alice".to_string()
            }]
        );
        assert_eq!(echo, Echo::Char('h'));
        assert!(second.is_empty());
        assert_eq!(editor.current_line(), "hi");
    }

    #[test]
    fn test_backspace_to_empty_emits_stopped_typing_once() {
        // テスト項目: バックスペースで空に戻った時だけ stoppedTyping が出る
        // given (前提条件):
        let mut editor = editor();
        editor.key(KeyCode::Char('h'));

        // when (操作):
        let (events, echo) = editor.key(KeyCode::Backspace);
        let (repeat, repeat_echo) = editor.key(KeyCode::Backspace);

        // then (期待する結果):
        assert_eq!(
            events,
            vec![ClientEvent::StoppedTyping {
                name: "alice".to_string()
            }]
        );
        assert_eq!(echo, Echo::Erase);
        assert!(repeat.is_empty());
        assert_eq!(repeat_echo, Echo::None);
    }

    #[test]
    fn test_enter_emits_stopped_typing_before_message() {
        // テスト項目: Enter で stoppedTyping がメッセージ本文より先に出る
        // given (前提条件):
        let mut editor = editor();
        editor.key(KeyCode::Char('h'));
        editor.key(KeyCode::Char('i'));

        // when (操作):
        let (events, _) = editor.key(KeyCode::Enter);

        // then (期待する結果):
        assert_eq!(
            events,
            vec![
                ClientEvent::StoppedTyping {
                    name: "alice".to_string()
                },
                ClientEvent::Message {
                    name: "alice".to_string(),
                    body: "hi".to_string()
                },
            ]
        );
        assert_eq!(editor.current_line(), "");
    }

    #[test]
    fn test_enter_with_blank_buffer_skips_message() {
        // テスト項目: 空白のみのバッファでは stoppedTyping は出るがメッセージは出ない
        // given (前提条件):
        let mut editor = editor();
        editor.key(KeyCode::Char(' '));

        // when (操作):
        let (events, _) = editor.key(KeyCode::Enter);

        // then (期待する結果):
        assert_eq!(
            events,
            vec![ClientEvent::StoppedTyping {
                name: "alice".to_string()
            }]
        );
    }

    #[test]
    fn test_enter_on_empty_buffer_emits_nothing() {
        // テスト項目: 空のバッファで Enter を押しても何も出ない
        // given (前提条件):
        let mut editor = editor();

        // when (操作):
        let (events, echo) = editor.key(KeyCode::Enter);

        // then (期待する結果):
        assert!(events.is_empty());
        assert_eq!(echo, Echo::None);
    }

    #[test]
    fn test_enter_does_not_double_emit_stopped_typing() {
        // テスト項目: Enter 直後の入力で startedTyping が再び出る（エッジ状態がリセットされる）
        // given (前提条件):
        let mut editor = editor();
        editor.key(KeyCode::Char('h'));
        editor.key(KeyCode::Enter);

        // when (操作):
        let (events, _) = editor.key(KeyCode::Char('x'));

        // then (期待する結果):
        assert_eq!(
            events,
            vec![ClientEvent::StartedTyping {
                name: "alice".to_string()
            }]
        );
    }

    #[test]
    fn test_delimiter_character_is_rejected() {
        // テスト項目: プロトコル区切り文字はバッファに入らない
        // given (前提条件):
        let mut editor = editor();

        // when (操作):
        let (events, echo) = editor.key(KeyCode::Char('|'));

        // then (期待する結果):
        assert!(events.is_empty());
        assert_eq!(echo, Echo::None);
        assert_eq!(editor.current_line(), "");
    }

    #[test]
    fn test_allowed_character_set() {
        // テスト項目: 許可文字集合が英数字と記号の一部のみを通す
        // given (前提条件):

        // when (操作):

        // then (期待する結果):
        assert!(is_allowed_char('a'));
        assert!(is_allowed_char('Z'));
        assert!(is_allowed_char('0'));
        assert!(is_allowed_char(' '));
        assert!(is_allowed_char('!'));
        assert!(!is_allowed_char('|'));
        assert!(!is_allowed_char('\t'));
        assert!(!is_allowed_char('あ'));
    }
}
