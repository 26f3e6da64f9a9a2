use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, PainelError, UiConfig};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &UiConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, PainelError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        Some(Message::RawKey(key))
                    } else {
                        self.handle_key(key)
                    }
                }
                Event::Resize(width, height) => {
                    Some(Message::Resize(width as usize, height as usize))
                }
                _ => None,
            });
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Tab, _) => Some(Message::NextTab),
            (KeyCode::BackTab, _) => Some(Message::PrevTab),
            (KeyCode::Char(c @ '1'..='6'), _) => {
                c.to_digit(10).map(|d| Message::SelectTab(d as usize - 1))
            }
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Home, _) | (KeyCode::Char('g'), _) => Some(Message::MoveBeginning),
            (KeyCode::End, _) | (KeyCode::Char('G'), _) => Some(Message::MoveEnd),
            (KeyCode::Char(']'), _) | (KeyCode::Right, _) => Some(Message::NextAnalyst),
            (KeyCode::Char('['), _) | (KeyCode::Left, _) => Some(Message::PrevAnalyst),
            (KeyCode::Char('o'), _) => Some(Message::OpenFile),
            (KeyCode::Char('r'), _) => Some(Message::Refresh),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode, modifiers: KeyModifiers) -> Option<Message> {
        let controller = Controller::new(&UiConfig::default());
        controller.handle_key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn digits_select_tabs() {
        assert_eq!(map(KeyCode::Char('1'), KeyModifiers::NONE), Some(Message::SelectTab(0)));
        assert_eq!(map(KeyCode::Char('6'), KeyModifiers::NONE), Some(Message::SelectTab(5)));
        assert_eq!(map(KeyCode::Char('7'), KeyModifiers::NONE), None);
    }

    #[test]
    fn navigation_keys() {
        assert_eq!(map(KeyCode::Char('q'), KeyModifiers::NONE), Some(Message::Quit));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(Message::Quit));
        assert_eq!(map(KeyCode::BackTab, KeyModifiers::SHIFT), Some(Message::PrevTab));
        assert_eq!(map(KeyCode::Char(']'), KeyModifiers::NONE), Some(Message::NextAnalyst));
        assert_eq!(map(KeyCode::Char('o'), KeyModifiers::NONE), Some(Message::OpenFile));
        assert_eq!(map(KeyCode::Esc, KeyModifiers::NONE), Some(Message::Exit));
    }
}
