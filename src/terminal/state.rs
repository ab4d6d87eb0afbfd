use ratatui::widgets::ListState;
use ratatui_image::{picker::Picker, protocol::StatefulProtocol};

use crate::auth::AuthPending;
use crate::domain::email::{BodyFormat, EmailId, MessageSummary};
use crate::inbox::Inbox;
use crate::mail::decoders::html_to_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    ListOnly,
    Split,
}

/// Rendered body text of the opened message, keyed by the wrap width.
struct RenderedBody {
    id: EmailId,
    width: u16,
    text: String,
}

pub struct AppState {
    pub list_state: ListState,

    /// Id of the message shown in the right panel (only when Split)
    pub opened_id: Option<EmailId>,
    pub body_scroll: u16,

    pub focus: Focus,
    pub mode: ViewMode,

    /// Set while the user still has to grant consent.
    pub sign_in: Option<AuthPending>,
    /// Transient message for the status line.
    pub status: Option<String>,

    // Images
    pub show_images: bool,
    pub img_picker: Option<Picker>,
    pub img_state: Option<StatefulProtocol>,
    pub img_index: usize,

    rendered: Option<RenderedBody>,
}

impl AppState {
    pub fn new(img_picker: Option<Picker>) -> Self {
        let mut s = Self {
            list_state: ListState::default(),
            opened_id: None,
            body_scroll: 0,
            focus: Focus::List,
            mode: ViewMode::ListOnly,
            sign_in: None,
            status: None,
            show_images: img_picker.is_some(),
            img_picker,
            img_state: None,
            img_index: 0,
            rendered: None,
        };
        s.list_state.select(Some(0));
        s
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some(msg.into());
    }

    /// Resets selection and the opened message after the page changed.
    pub fn page_changed(&mut self, inbox: &Inbox) {
        self.close_message();
        if inbox.visible().is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(Some(0));
        }
    }

    pub fn selected<'a>(&self, inbox: &'a Inbox) -> Option<&'a MessageSummary> {
        let idx = self.list_state.selected()?;
        inbox.visible().get(idx).copied()
    }

    pub fn opened<'a>(&self, inbox: &'a Inbox) -> Option<&'a MessageSummary> {
        let id = self.opened_id.as_deref()?;
        inbox.page().messages.iter().find(|m| m.id == id)
    }

    pub fn move_selection(&mut self, inbox: &Inbox, delta: i32) {
        let len = inbox.visible().len() as i32;
        if len == 0 {
            self.list_state.select(None);
            return;
        }
        let cur = self.list_state.selected().unwrap_or(0) as i32;
        let next = (cur + delta).clamp(0, len - 1) as usize;
        self.list_state.select(Some(next));
    }

    pub fn open_selected(&mut self, inbox: &Inbox) {
        let Some(id) = self.selected(inbox).map(|m| m.id.clone()) else {
            return;
        };
        self.mode = ViewMode::Split;
        self.focus = Focus::Body;
        self.body_scroll = 0;
        self.opened_id = Some(id);
        self.rendered = None;
        self.img_index = 0;
        self.load_image(inbox);
    }

    pub fn close_message(&mut self) {
        self.mode = ViewMode::ListOnly;
        self.focus = Focus::List;
        self.opened_id = None;
        self.body_scroll = 0;
        self.rendered = None;
        self.img_state = None;
        self.img_index = 0;
    }

    pub fn toggle_focus(&mut self) {
        if self.mode != ViewMode::Split {
            return;
        }
        self.focus = match self.focus {
            Focus::List => Focus::Body,
            Focus::Body => Focus::List,
        };
    }

    pub fn scroll_body(&mut self, delta: i32) {
        if self.mode != ViewMode::Split {
            return;
        }
        if delta < 0 {
            self.body_scroll = self.body_scroll.saturating_sub(delta.unsigned_abs() as u16);
        } else {
            self.body_scroll = self.body_scroll.saturating_add(delta as u16);
        }
    }

    /// Body of the opened message as terminal text, re-rendered only when
    /// the message or the width changes.
    pub fn body_text(&mut self, message: &MessageSummary, width: u16) -> &str {
        let stale = self
            .rendered
            .as_ref()
            .is_none_or(|r| r.id != message.id || r.width != width);
        if stale {
            let text = match message.body_format {
                BodyFormat::Html => html_to_text(&message.body, usize::from(width)),
                BodyFormat::Plain => message.body.clone(),
            };
            self.rendered = Some(RenderedBody {
                id: message.id.clone(),
                width,
                text,
            });
        }
        self.rendered.as_ref().map(|r| r.text.as_str()).unwrap_or_default()
    }

    // ----- Images -----

    pub fn toggle_images(&mut self, inbox: &Inbox) {
        self.show_images = !self.show_images;
        self.img_state = None;
        if self.show_images {
            self.load_image(inbox);
        }
    }

    /// Shows the next inline image of the opened message.
    pub fn cycle_image(&mut self, inbox: &Inbox) {
        let count = self.opened(inbox).map_or(0, |m| m.inline_images.len());
        if count == 0 {
            return;
        }
        self.img_index = (self.img_index + 1) % count;
        self.load_image(inbox);
    }

    fn load_image(&mut self, inbox: &Inbox) {
        self.img_state = None;
        if !self.show_images {
            return;
        }
        let Some(image) = self
            .opened(inbox)
            .and_then(|m| m.inline_images.get(self.img_index))
        else {
            return;
        };
        let Some(picker) = self.img_picker.as_mut() else {
            return;
        };

        match crate::terminal::images::decode_inline(image) {
            Some(img) => self.img_state = Some(picker.new_resize_protocol(img)),
            None => self.status = Some(format!("Cannot display {} ({})", image.content_id, image.mime_type)),
        }
    }
}
