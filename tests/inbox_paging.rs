mod common;

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use rs_delivery_mail::auth::{Session, SessionState};
use rs_delivery_mail::error::{AuthError, FetchError, ProviderCallError};
use rs_delivery_mail::inbox::{Inbox, PageLoad};

use common::{FakeMailbox, StaticTokens, fresh_credential};

fn signed_in() -> Session<StaticTokens> {
    Session::with_credential(StaticTokens::default(), fresh_credential())
}

fn ids(inbox: &Inbox) -> Vec<String> {
    inbox.page().ids().map(str::to_string).collect()
}

#[test]
fn logged_out_session_asks_for_sign_in() {
    let mut session = Session::new(StaticTokens::default());
    let mailbox = FakeMailbox::with_subjects(&["a", "b"]);
    let mut inbox = Inbox::new(10);

    let load = inbox.load_first(&mut session, &mailbox).unwrap();
    match load {
        PageLoad::SignInRequired(pending) => assert_eq!(pending.state, "st1"),
        other => panic!("expected sign-in, got {other:?}"),
    }
    assert_eq!(mailbox.list_calls.get(), 0);
    assert_eq!(session.state(), SessionState::AwaitingConsent);
}

#[test]
fn sign_in_then_load_decodes_messages() {
    let mut session = Session::new(StaticTokens::default());
    let mailbox = FakeMailbox::with_subjects(&["Your package has shipped", "Lunch plans?"]);
    let mut inbox = Inbox::new(10);

    assert!(matches!(
        inbox.load_first(&mut session, &mailbox).unwrap(),
        PageLoad::SignInRequired(_)
    ));
    session.complete_authorization("abc").unwrap();

    assert_eq!(inbox.load_first(&mut session, &mailbox).unwrap(), PageLoad::Loaded);
    let subjects: Vec<&str> = inbox.page().messages.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Your package has shipped", "Lunch plans?"]);
    assert_eq!(inbox.page().messages[0].sender, "sender0@example.com");
    assert_eq!(inbox.page().messages[0].body, "body 0");
    assert_eq!(inbox.account(&mut session, &mailbox), Some("me@example.com"));
}

#[test]
fn next_page_is_disjoint_and_previous_restores() {
    let mut session = signed_in();
    let mailbox = FakeMailbox::with_subjects(&["1", "2", "3", "4", "5"]);
    let mut inbox = Inbox::new(2);

    inbox.load_first(&mut session, &mailbox).unwrap();
    let first = ids(&inbox);
    assert_eq!(first, vec!["id0", "id1"]);
    assert!(!inbox.has_previous());

    inbox.next_page(&mut session, &mailbox).unwrap();
    let second = ids(&inbox);
    let first_set: HashSet<_> = first.iter().collect();
    assert!(second.iter().all(|id| !first_set.contains(id)));
    assert_eq!(inbox.page_number(), 2);

    inbox.next_page(&mut session, &mailbox).unwrap();
    assert_eq!(ids(&inbox), vec!["id4"]);
    assert!(!inbox.has_next());

    // Last page: next is a no-op.
    let calls = mailbox.list_calls.get();
    assert_eq!(inbox.next_page(&mut session, &mailbox).unwrap(), PageLoad::Loaded);
    assert_eq!(mailbox.list_calls.get(), calls);
    assert_eq!(ids(&inbox), vec!["id4"]);

    inbox.previous_page(&mut session, &mailbox).unwrap();
    assert_eq!(ids(&inbox), second);
    inbox.previous_page(&mut session, &mailbox).unwrap();
    assert_eq!(ids(&inbox), first);
    assert_eq!(inbox.page_number(), 1);
}

#[test]
fn reload_uses_the_current_cursor() {
    let mut session = signed_in();
    let mailbox = FakeMailbox::with_subjects(&["1", "2", "3"]);
    let mut inbox = Inbox::new(2);

    inbox.load_first(&mut session, &mailbox).unwrap();
    inbox.next_page(&mut session, &mailbox).unwrap();
    inbox.reload(&mut session, &mailbox).unwrap();
    assert_eq!(ids(&inbox), vec!["id2"]);
    assert_eq!(inbox.page_number(), 2);
}

#[test]
fn unauthorized_logs_the_session_out() {
    let mut session = signed_in();
    let mailbox = FakeMailbox::with_subjects(&["1", "2", "3"]);
    let mut inbox = Inbox::new(2);
    inbox.load_first(&mut session, &mailbox).unwrap();

    mailbox.fail_next_call(ProviderCallError::Unauthorized);
    let err = inbox.next_page(&mut session, &mailbox).unwrap_err();

    assert!(matches!(err, FetchError::Auth(AuthError::CredentialRejected)));
    assert!(session.is_logged_out());
    assert!(matches!(session.take_last_failure(), Some(AuthError::CredentialRejected)));
    // The failed navigation left the page alone.
    assert_eq!(ids(&inbox), vec!["id0", "id1"]);
    assert_eq!(inbox.page_number(), 1);

    assert!(matches!(
        inbox.next_page(&mut session, &mailbox).unwrap(),
        PageLoad::SignInRequired(_)
    ));
}

#[test]
fn other_provider_errors_keep_the_credential() {
    let mut session = signed_in();
    let mailbox = FakeMailbox::with_subjects(&["1", "2", "3"]);
    let mut inbox = Inbox::new(2);
    inbox.load_first(&mut session, &mailbox).unwrap();

    mailbox.fail_next_call(ProviderCallError::Status {
        status: 503,
        body: "backend unavailable".into(),
    });
    let err = inbox.next_page(&mut session, &mailbox).unwrap_err();

    assert!(!err.is_auth());
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(ids(&inbox), vec!["id0", "id1"]);

    inbox.next_page(&mut session, &mailbox).unwrap();
    assert_eq!(ids(&inbox), vec!["id2"]);
}

#[test]
fn duplicate_ids_are_fetched_once() {
    let mut session = signed_in();
    let mailbox = FakeMailbox {
        duplicate_ids: true,
        ..FakeMailbox::with_subjects(&["1", "2"])
    };
    let mut inbox = Inbox::new(5);

    inbox.load_first(&mut session, &mailbox).unwrap();
    assert_eq!(ids(&inbox), vec!["id0", "id1"]);
    assert_eq!(mailbox.get_calls.get(), 2);
}

#[test]
fn delivery_toggle_filters_visible_messages() {
    let mut session = signed_in();
    let mailbox = FakeMailbox::with_subjects(&[
        "Your package has shipped",
        "Lunch plans?",
        "Order confirmation #991",
    ]);
    let mut inbox = Inbox::new(10);
    inbox.load_first(&mut session, &mailbox).unwrap();

    assert_eq!(inbox.visible().len(), 3);
    assert!(inbox.toggle_delivery_only());
    let subjects: Vec<&str> = inbox.visible().iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Your package has shipped", "Order confirmation #991"]);
    assert_eq!(inbox.page().messages.len(), 3);
}

#[test]
fn account_lookup_failure_is_not_fatal() {
    let mut session = signed_in();
    let mailbox = FakeMailbox::with_subjects(&[]);
    let mut inbox = Inbox::new(10);

    mailbox.fail_next_call(ProviderCallError::Network("offline".into()));
    assert_eq!(inbox.account(&mut session, &mailbox), None);
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(inbox.account(&mut session, &mailbox), Some("me@example.com"));
}
