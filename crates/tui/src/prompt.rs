use srtgo_core::models::Carrier;

const MAX_INPUT_LEN: usize = 256;

/// Single line text input with a byte cursor. Only printable ASCII is accepted.
#[derive(Debug, Clone)]
pub struct TextInput {
    pub label: &'static str,
    pub input: String,
    pub cursor: usize,
    pub masked: bool,
}

impl TextInput {
    pub fn new(label: &'static str, initial: &str, masked: bool) -> Self {
        Self {
            label,
            input: initial.to_string(),
            cursor: initial.len(),
            masked,
        }
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.input.len() as isize;
        self.cursor = (self.cursor as isize + delta).clamp(0, len) as usize;
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.input.len();
    }

    pub fn insert(&mut self, ch: char) {
        if self.input.len() >= MAX_INPUT_LEN {
            return;
        }
        if ch.is_ascii() && !ch.is_ascii_control() {
            self.input.insert(self.cursor, ch);
            self.cursor += 1;
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 && self.cursor <= self.input.len() {
            self.cursor -= 1;
            self.input.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.len() {
            self.input.remove(self.cursor);
        }
    }

    /// Text as drawn; passwords are replaced by bullets.
    pub fn display(&self) -> String {
        if self.masked {
            "•".repeat(self.input.len())
        } else {
            self.input.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Login(Carrier),
    NotificationToken,
}

/// Modal form of one or more text inputs.
#[derive(Debug, Clone)]
pub struct PromptModal {
    pub kind: PromptKind,
    pub inputs: Vec<TextInput>,
    pub focus: usize,
}

impl PromptModal {
    pub fn login(carrier: Carrier, id: &str) -> Self {
        let focus = if id.is_empty() { 0 } else { 1 };
        Self {
            kind: PromptKind::Login(carrier),
            inputs: vec![
                TextInput::new("Login id", id, false),
                TextInput::new("Password", "", true),
            ],
            focus,
        }
    }

    pub fn notification_token(current: &str) -> Self {
        Self {
            kind: PromptKind::NotificationToken,
            inputs: vec![TextInput::new("Access token", current, false)],
            focus: 0,
        }
    }

    pub fn title(&self) -> String {
        match self.kind {
            PromptKind::Login(carrier) => format!("{carrier} login"),
            PromptKind::NotificationToken => "KakaoTalk notifications".to_string(),
        }
    }

    pub fn focused(&mut self) -> &mut TextInput {
        let index = self.focus.min(self.inputs.len().saturating_sub(1));
        &mut self.inputs[index]
    }

    pub fn cycle_focus(&mut self, delta: isize) {
        let len = self.inputs.len() as isize;
        if len == 0 {
            return;
        }
        self.focus = (self.focus as isize + delta).rem_euclid(len) as usize;
    }

    pub fn value(&self, index: usize) -> &str {
        self.inputs
            .get(index)
            .map(|input| input.input.as_str())
            .unwrap_or_default()
    }
}
