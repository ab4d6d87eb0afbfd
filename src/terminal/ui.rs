use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use ratatui_image::StatefulImage;

use crate::auth::AuthPending;
use crate::terminal::Backend;
use crate::terminal::images::{describe, describe_attachments};
use crate::terminal::state::{AppState, Focus, ViewMode};

const IMAGE_HEIGHT: u16 = 12;

pub fn render<T, P>(f: &mut Frame, state: &mut AppState, backend: &Backend<T, P>) {
    let [header, main, status, footer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(f.area());

    render_header(f, header, backend);

    match &state.sign_in {
        Some(pending) => render_sign_in(f, main, pending),
        None => render_mailbox(f, main, state, backend),
    }

    if let Some(msg) = &state.status {
        f.render_widget(
            Paragraph::new(Span::styled(msg.as_str(), Style::default().fg(Color::Yellow))),
            status,
        );
    }

    render_footer(f, footer, state.sign_in.is_some());
}

fn render_header<T, P>(f: &mut Frame, area: Rect, backend: &Backend<T, P>) {
    let account = match backend.inbox.cached_account() {
        Some(address) => Span::styled(address.to_string(), Style::default().fg(Color::Green)),
        None => Span::styled("not signed in", Style::default().fg(Color::DarkGray)),
    };
    let mut spans = vec![
        Span::styled("rs_delivery_mail", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        account,
    ];
    if backend.inbox.delivery_only() {
        spans.push(Span::styled("  [deliveries only]", Style::default().fg(Color::Cyan)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_sign_in(f: &mut Frame, area: Rect, pending: &AuthPending) {
    let text = Text::from(vec![
        Line::from(Span::styled(
            "Sign in to read your mail",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::raw(""),
        Line::raw("Press Enter to open the consent page in your browser."),
        Line::raw("If no browser opens, visit this URL:"),
        Line::raw(""),
        Line::from(Span::styled(
            pending.authorize_url.as_str(),
            Style::default().fg(Color::Cyan),
        )),
    ]);
    let block = Block::default()
        .title(" Sign in ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    f.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: false }), area);
}

fn render_mailbox<T, P>(f: &mut Frame, area: Rect, state: &mut AppState, backend: &Backend<T, P>) {
    let (left, right) = if state.mode == ViewMode::Split {
        let [l, r] = Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)]).areas(area);
        (l, Some(r))
    } else {
        (area, None)
    };

    let border = |focus: Focus| {
        if state.focus == focus {
            Color::Yellow
        } else {
            Color::DarkGray
        }
    };

    // LEFT: list
    let inbox = &backend.inbox;
    let visible = inbox.visible();
    let list_block = Block::default()
        .title(format!(
            " Inbox (page {}{}) ",
            inbox.page_number(),
            if inbox.has_next() { ", more" } else { "" }
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border(Focus::List)));

    let items: Vec<ListItem> = visible
        .iter()
        .map(|m| {
            let subject = if m.subject.is_empty() { "(no subject)" } else { m.subject.as_str() };
            let subj = Span::styled(subject.to_string(), Style::default().add_modifier(Modifier::BOLD));
            let from = Span::styled(m.sender.clone(), Style::default().fg(Color::Gray));
            ListItem::new(Text::from(vec![Line::from(subj), Line::from(from)]))
        })
        .collect();

    let empty = items.is_empty();
    let list = List::new(items)
        .block(list_block)
        .highlight_symbol("➜ ")
        .highlight_style(Style::default().fg(Color::Green));
    f.render_stateful_widget(list, left, &mut state.list_state);

    if empty {
        let hint = if inbox.delivery_only() && !inbox.page().messages.is_empty() {
            "No delivery e-mails on this page."
        } else {
            "No messages."
        };
        let inner = Block::default().borders(Borders::ALL).inner(left);
        f.render_widget(Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)), inner);
    }

    // RIGHT: opened message
    let Some(right) = right else {
        return;
    };
    let body_block = Block::default()
        .title(" Email ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border(Focus::Body)));

    let Some(message) = state.opened(inbox) else {
        f.render_widget(Paragraph::new("Message is no longer on this page.").block(body_block), right);
        return;
    };

    let inner = body_block.inner(right);
    f.render_widget(body_block, right);

    let show_image = state.show_images && state.img_state.is_some();
    let [text_area, image_area] = if show_image {
        Layout::vertical([Constraint::Fill(1), Constraint::Length(IMAGE_HEIGHT)]).areas(inner)
    } else {
        Layout::vertical([Constraint::Fill(1), Constraint::Length(0)]).areas(inner)
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("From: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(message.sender.clone()),
        ]),
        Line::from(vec![
            Span::styled("Subject: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(message.subject.clone()),
        ]),
    ];
    if !message.date.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("Date: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(message.date.clone()),
        ]));
    }
    lines.push(Line::raw(""));
    let body = state.body_text(message, text_area.width.saturating_sub(1));
    if body.trim().is_empty() {
        lines.push(Line::styled("(no text body)", Style::default().fg(Color::DarkGray)));
    } else {
        lines.extend(body.lines().map(|l| Line::raw(l.to_string())));
    }
    if !show_image && !message.inline_images.is_empty() {
        lines.push(Line::raw(""));
        lines.extend(
            describe(&message.inline_images)
                .into_iter()
                .map(|l| Line::styled(l, Style::default().fg(Color::Magenta))),
        );
    }

    if !message.attachments.is_empty() {
        lines.push(Line::raw(""));
        lines.extend(
            describe_attachments(&message.attachments)
                .into_iter()
                .map(|l| Line::styled(l, Style::default().fg(Color::Blue))),
        );
    }

    let p = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((state.body_scroll, 0));
    f.render_widget(p, text_area);

    if show_image && let Some(protocol) = state.img_state.as_mut() {
        f.render_stateful_widget(StatefulImage::default(), image_area, protocol);
    }
}

fn render_footer(f: &mut Frame, area: Rect, signing_in: bool) {
    let key = |k: &'static str| Span::styled(k, Style::default().add_modifier(Modifier::BOLD));
    let spans = if signing_in {
        vec![key("Enter"), Span::raw(" sign in  "), key("q"), Span::raw(" quit")]
    } else {
        vec![
            key("j/k"),
            Span::raw(" move  "),
            key("Enter"),
            Span::raw(" open  "),
            key("n/p"),
            Span::raw(" page  "),
            key("r"),
            Span::raw(" reload  "),
            key("d"),
            Span::raw(" deliveries  "),
            key("i/c"),
            Span::raw(" images  "),
            key("L"),
            Span::raw(" logout  "),
            key("q"),
            Span::raw(" quit"),
        ]
    };
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

