pub mod events;
pub mod images;
pub mod state;
pub mod ui;

use anyhow::Result;
use log::{info, warn};
use ratatui::DefaultTerminal;
use ratatui::crossterm::event::{self, Event};
use ratatui_image::picker::Picker;

use crate::auth::callback::{CallbackListener, DEFAULT_CALLBACK_TIMEOUT, open_in_browser};
use crate::auth::{Session, TokenService};
use crate::inbox::Inbox;
use crate::mail::provider::MailProvider;
use crate::store::DeliveryRepository;
use crate::terminal::events::{Action, apply_load, handle_key};
use crate::terminal::state::AppState;

/// Everything a key handler may touch besides the view state.
pub struct Backend<T, P> {
    pub session: Session<T>,
    pub inbox: Inbox,
    pub provider: P,
    pub redirect_uri: String,
    /// Where flagged delivery e-mails are remembered; `None` runs without one.
    pub history: Option<Box<dyn DeliveryRepository>>,
}

pub fn run_tui<T: TokenService, P: MailProvider>(mut backend: Backend<T, P>) -> Result<()> {
    let mut terminal = ratatui::init();

    // Must run after the alternate screen is up and before any key is read.
    let picker = match Picker::from_query_stdio() {
        Ok(p) => Some(p),
        Err(e) => {
            info!("Terminal graphics unavailable, listing images instead: {e:?}");
            None
        }
    };
    let mut state = AppState::new(picker);

    let result = run(&mut terminal, &mut state, &mut backend);

    ratatui::restore();
    result
}

fn run<T: TokenService, P: MailProvider>(
    terminal: &mut DefaultTerminal,
    state: &mut AppState,
    backend: &mut Backend<T, P>,
) -> Result<()> {
    state.set_status("Loading...");
    terminal.draw(|f| ui::render(f, state, backend))?;
    let first = backend.inbox.load_first(&mut backend.session, &backend.provider);
    apply_load(first, state, backend);

    loop {
        terminal.draw(|f| ui::render(f, state, backend))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        match handle_key(key, state, backend) {
            Action::Quit => break,
            Action::Continue => {}
            Action::SignIn => {
                state.set_status("Waiting for the browser to finish signing in...");
                terminal.draw(|f| ui::render(f, state, backend))?;
                sign_in(state, backend);
            }
        }
    }
    Ok(())
}

/// Opens the consent page and blocks until the redirect arrives or times out.
fn sign_in<T: TokenService, P: MailProvider>(state: &mut AppState, backend: &mut Backend<T, P>) {
    let Some(pending) = state.sign_in.clone() else {
        return;
    };

    let listener = match CallbackListener::bind(&backend.redirect_uri) {
        Ok(l) => l,
        Err(e) => {
            state.set_status(format!("Cannot listen for the redirect: {e}"));
            return;
        }
    };

    // The sign-in screen already shows the URL when no browser comes up.
    open_in_browser(pending.authorize_url.as_str());

    let outcome = listener
        .wait_for_code(&pending.state, DEFAULT_CALLBACK_TIMEOUT)
        .and_then(|code| backend.session.complete_authorization(&code).map(|_| ()));

    match outcome {
        Ok(()) => {
            let result = backend.inbox.load_first(&mut backend.session, &backend.provider);
            apply_load(result, state, backend);
        }
        Err(e) => {
            warn!("Sign-in failed: {e}");
            let result = backend.inbox.load_first(&mut backend.session, &backend.provider);
            apply_load(result, state, backend);
            state.set_status(format!("Please sign in again ({e})"));
        }
    }
}
