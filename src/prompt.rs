use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::trace;

/// Single-line text input. The cursor is counted in characters.
#[derive(Default)]
pub struct Prompt {
    text: String,
    cursor: usize,
    submitted: bool,
    canceled: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PromptState {
    pub text: String,
    pub cursor: usize,
    pub submitted: bool,
    pub canceled: bool,
}

impl PromptState {
    pub fn finished(&self) -> bool {
        self.submitted || self.canceled
    }
}

impl Prompt {
    pub fn read(&mut self, key: KeyEvent) -> PromptState {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.submitted = true,
            (KeyCode::Esc, _) => {
                self.reset();
                self.canceled = true;
            }
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.cursor = self.cursor.saturating_sub(1),
            (KeyCode::Right, _) => self.cursor = (self.cursor + 1).min(self.len()),
            (KeyCode::Home, _) => self.cursor = 0,
            (KeyCode::End, _) => self.cursor = self.len(),
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.text.clear();
                self.cursor = 0;
            }
            (KeyCode::Char(chr), m) if !m.contains(KeyModifiers::CONTROL) => self.insert(chr),
            _ => {}
        }
        trace!("Prompt {:?} at {}", self.text, self.cursor);
        self.state()
    }

    pub fn state(&self) -> PromptState {
        PromptState {
            text: self.text.clone(),
            cursor: self.cursor,
            submitted: self.submitted,
            canceled: self.canceled,
        }
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.submitted = false;
        self.canceled = false;
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_pos(&self, char_idx: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_idx)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.text.len())
    }

    fn insert(&mut self, chr: char) {
        let pos = self.byte_pos(self.cursor);
        self.text.insert(pos, chr);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let pos = self.byte_pos(self.cursor);
            self.text.remove(pos);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.len() {
            let pos = self.byte_pos(self.cursor);
            self.text.remove(pos);
        }
    }
}
