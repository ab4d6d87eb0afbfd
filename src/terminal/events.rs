use log::warn;
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use crate::auth::TokenService;
use crate::error::FetchError;
use crate::inbox::PageLoad;
use crate::mail::provider::MailProvider;
use crate::store::{now_epoch, record_deliveries};
use crate::terminal::Backend;
use crate::terminal::state::{AppState, Focus, ViewMode};

/// What the main loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
    /// Open the browser and block on the redirect; the loop redraws first.
    SignIn,
}

pub fn handle_key<T: TokenService, P: MailProvider>(
    key: KeyEvent,
    state: &mut AppState,
    backend: &mut Backend<T, P>,
) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::Continue;
    }

    if state.sign_in.is_some() {
        return match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Enter => Action::SignIn,
            _ => Action::Continue,
        };
    }

    match key.code {
        KeyCode::Char('q') => return Action::Quit,

        KeyCode::Esc => {
            if state.mode == ViewMode::Split {
                state.close_message();
                return Action::Continue;
            }
            return Action::Quit;
        }

        KeyCode::Enter => {
            state.open_selected(&backend.inbox);
            return Action::Continue;
        }

        KeyCode::Tab => {
            state.toggle_focus();
            return Action::Continue;
        }

        KeyCode::Char('n') | KeyCode::Right => {
            let result = backend.inbox.next_page(&mut backend.session, &backend.provider);
            apply_load(result, state, backend);
            return Action::Continue;
        }

        KeyCode::Char('p') | KeyCode::Left => {
            let result = backend.inbox.previous_page(&mut backend.session, &backend.provider);
            apply_load(result, state, backend);
            return Action::Continue;
        }

        KeyCode::Char('r') => {
            let result = backend.inbox.reload(&mut backend.session, &backend.provider);
            apply_load(result, state, backend);
            return Action::Continue;
        }

        KeyCode::Char('d') => {
            let on = backend.inbox.toggle_delivery_only();
            state.page_changed(&backend.inbox);
            state.set_status(if on {
                "Showing delivery e-mails only"
            } else {
                "Showing all e-mails"
            });
            return Action::Continue;
        }

        KeyCode::Char('i') => {
            state.toggle_images(&backend.inbox);
            return Action::Continue;
        }

        KeyCode::Char('c') => {
            state.cycle_image(&backend.inbox);
            return Action::Continue;
        }

        KeyCode::Char('L') => {
            backend.session.logout();
            backend.inbox.reset();
            let result = backend.inbox.load_first(&mut backend.session, &backend.provider);
            apply_load(result, state, backend);
            state.set_status("Signed out");
            return Action::Continue;
        }

        _ => {}
    }

    match state.focus {
        Focus::List => handle_list_keys(key, state, backend),
        Focus::Body => handle_body_keys(key, state),
    }
    Action::Continue
}

fn handle_list_keys<T, P>(key: KeyEvent, state: &mut AppState, backend: &Backend<T, P>) {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => state.move_selection(&backend.inbox, 1),
        KeyCode::Up | KeyCode::Char('k') => state.move_selection(&backend.inbox, -1),
        KeyCode::Home => state.move_selection(&backend.inbox, i32::MIN / 2),
        KeyCode::End => state.move_selection(&backend.inbox, i32::MAX / 2),
        _ => {}
    }
}

fn handle_body_keys(key: KeyEvent, state: &mut AppState) {
    if state.mode != ViewMode::Split {
        return;
    }
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => state.scroll_body(1),
        KeyCode::Up | KeyCode::Char('k') => state.scroll_body(-1),
        KeyCode::PageDown => state.scroll_body(10),
        KeyCode::PageUp => state.scroll_body(-10),
        KeyCode::Home => state.body_scroll = 0,
        _ => {}
    }
}

/// Folds the outcome of a navigation into the UI state.
pub fn apply_load<T: TokenService, P: MailProvider>(
    result: Result<PageLoad, FetchError>,
    state: &mut AppState,
    backend: &mut Backend<T, P>,
) {
    match result {
        Ok(PageLoad::Loaded) => {
            state.sign_in = None;
            state.status = None;
            state.page_changed(&backend.inbox);
            backend.inbox.account(&mut backend.session, &backend.provider);
            remember_deliveries(backend);
        }
        Ok(PageLoad::SignInRequired(pending)) => {
            backend.inbox.reset();
            state.page_changed(&backend.inbox);
            state.sign_in = Some(pending);
            match backend.session.take_last_failure() {
                Some(e) => state.set_status(format!("Please sign in again ({e})")),
                None => state.status = None,
            }
        }
        Err(e) if e.is_auth() => {
            warn!("{e}");
            let message = e.user_message();
            backend.inbox.reset();
            let retry = backend.inbox.load_first(&mut backend.session, &backend.provider);
            if let Ok(PageLoad::SignInRequired(pending)) = retry {
                state.page_changed(&backend.inbox);
                state.sign_in = Some(pending);
            }
            backend.session.take_last_failure();
            state.set_status(message);
        }
        Err(e) => state.set_status(e.user_message()),
    }
}

fn remember_deliveries<T, P>(backend: &Backend<T, P>) {
    let (Some(history), Some(account)) = (backend.history.as_deref(), backend.inbox.cached_account())
    else {
        return;
    };
    if let Err(e) = record_deliveries(history, account, &backend.inbox.page().messages, now_epoch()) {
        warn!("Could not update the delivery history: {e}");
    }
}
