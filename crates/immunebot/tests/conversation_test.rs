//! Full conversations driven through the engine with a recording transport

mod common;

use common::{callback, Harness, ADMIN_TG_ID, MASTER_CODE};
use immunebot::telegram::handlers::generate::{CALLBACK_CONFIRM, CALLBACK_REJECT};
use immunebot::telegram::messages;
use immunebot::telegram::transport::{Markup, ParseMode};
use immunebot::telegram::ChatState;
use immunebot::testing::Sent;
use immunecore::models::Credentials;
use pretty_assertions::assert_eq;

const USER: u64 = 42;

async fn fill_credentials(h: &Harness, telegram_id: u64) {
    h.text(telegram_id, "Получить код").await;
    h.text(telegram_id, "Иванов Иван Иванович").await;
    h.text(telegram_id, "01.01.2000").await;
}

#[tokio::test]
async fn test_new_user_start_gets_invite_prompt_with_menu() {
    let h = Harness::new();

    h.text(USER, "/start").await;

    assert_eq!(h.state(USER).await, ChatState::Started);
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Sent::Message { chat_id, msg } => {
            assert_eq!(*chat_id, USER as i64);
            assert_eq!(msg.text, messages::NEED_INVITE_CODE);
            assert_eq!(
                msg.markup,
                Some(Markup::Keyboard(vec![vec!["Активировать инвайт".to_string()]]))
            );
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn test_active_user_start_shows_main_menu() {
    let h = Harness::new();
    h.activate(USER).await;
    h.text(USER, "Получить код").await;
    h.transport.take();

    h.text(USER, "/start").await;

    assert_eq!(h.state(USER).await, ChatState::Started);
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let Sent::Message { msg, .. } = &sent[0] else {
        panic!("expected a message");
    };
    assert_eq!(msg.text, messages::CHOOSE_ACTION);
    assert_eq!(
        msg.markup,
        Some(Markup::Keyboard(vec![
            vec!["Информация".to_string(), "Получить код".to_string()],
            vec!["Мои инвайты".to_string()],
        ]))
    );
}

#[tokio::test]
async fn test_inactive_user_is_nagged_once_then_ignored() {
    let h = Harness::new();

    h.text(USER, "Получить код").await;
    assert_eq!(h.transport.texts(), vec![messages::NEED_INVITE_CODE]);
    assert!(h.data(USER).await.invite_notification_sent);

    h.text(USER, "Получить код").await;
    h.text(USER, "hello?").await;
    assert_eq!(h.transport.texts(), vec![messages::NEED_INVITE_CODE]);
    assert_eq!(h.state(USER).await, ChatState::Started);
    assert_eq!(h.metrics.updates_dropped_total.get(), 3);
}

#[tokio::test]
async fn test_invite_activation_with_master_code() {
    let h = Harness::new();
    h.text(USER, "/start").await;

    h.text(USER, "Активировать инвайт").await;
    assert_eq!(h.state(USER).await, ChatState::InviteRequested);
    assert_eq!(h.transport.last_text().as_deref(), Some(messages::ENTER_INVITE_CODE));

    h.text(USER, MASTER_CODE).await;

    let user = h.user(USER).await;
    assert!(user.is_active);
    assert_eq!(user.invited_by, None);
    assert_eq!(user.invites.len(), 2);
    assert_eq!(h.state(USER).await, ChatState::Started);

    let last = h.transport.sent().pop().unwrap();
    let Sent::Message { msg, .. } = last else {
        panic!("expected activation message");
    };
    assert_eq!(msg.parse_mode, ParseMode::MarkdownV2);
    assert!(msg.text.starts_with("Успех"));
    for invite in &user.invites {
        assert!(msg.text.contains(&invite.code));
    }
}

#[tokio::test]
async fn test_wrong_invite_keeps_user_waiting_for_code() {
    let h = Harness::new();
    h.text(USER, "/start").await;
    h.text(USER, "Активировать инвайт").await;

    h.text(USER, "NOPE").await;

    assert_eq!(h.transport.last_text().as_deref(), Some(messages::NO_SUCH_INVITE));
    assert_eq!(h.state(USER).await, ChatState::InviteRequested);
    assert!(!h.user(USER).await.is_active);
    assert_eq!(
        h.metrics.handler_errors_total.with_label_values(&["domain"]).get(),
        1
    );
}

#[tokio::test]
async fn test_invite_redeemed_exactly_once() {
    let h = Harness::new();
    let owner = h.activate(USER).await;
    let code = owner.invites[0].code.clone();

    h.activate_with(43, &code).await;
    h.activate_with(44, &code).await;

    let first = h.user(43).await;
    assert!(first.is_active);
    assert_eq!(first.invited_by.as_deref(), Some(owner.id.as_str()));

    let second = h.user(44).await;
    assert!(!second.is_active);
    assert_eq!(h.state(44).await, ChatState::InviteRequested);

    let owner = h.user(USER).await;
    let used = owner.invites.iter().find(|i| i.code == code).unwrap();
    assert_eq!(used.used_by.as_deref(), Some(first.id.as_str()));
    assert!(used.used_at.is_some());
}

#[tokio::test]
async fn test_concurrent_redemption_activates_one_user() {
    let h = Harness::new();
    let owner = h.activate(USER).await;
    let code = owner.invites[0].code.clone();

    for id in [43, 44] {
        h.text(id, "/start").await;
        h.text(id, "Активировать инвайт").await;
    }
    tokio::join!(h.text(43, &code), h.text(44, &code));

    let active = [h.user(43).await, h.user(44).await]
        .iter()
        .filter(|u| u.is_active)
        .count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_bad_full_name_keeps_state_and_data() {
    let h = Harness::new();
    h.activate(USER).await;
    h.text(USER, "Получить код").await;
    assert_eq!(h.state(USER).await, ChatState::CredentialsRequested);
    assert_eq!(h.transport.last_text().as_deref(), Some(messages::ENTER_FULL_NAME));

    h.text(USER, "Ivanov Ivan").await;

    assert_eq!(h.transport.last_text().as_deref(), Some(messages::BAD_FULL_NAME));
    assert_eq!(h.state(USER).await, ChatState::CredentialsRequested);
    assert_eq!(h.data(USER).await.credentials, Credentials::default());
}

#[tokio::test]
async fn test_bad_date_birth_is_rejected() {
    let h = Harness::new();
    h.activate(USER).await;
    h.text(USER, "Получить код").await;
    h.text(USER, "Иванов Иван Иванович").await;
    assert_eq!(h.state(USER).await, ChatState::DateBirthRequested);

    h.text(USER, "2000-01-01").await;

    assert_eq!(h.transport.last_text().as_deref(), Some(messages::BAD_DATE_BIRTH));
    assert_eq!(h.state(USER).await, ChatState::DateBirthRequested);
    let data = h.data(USER).await;
    assert_eq!(data.credentials.last_name, "Иванов");
    assert_eq!(data.credentials.date_birth, "");
}

#[tokio::test]
async fn test_confirmation_issues_certificate() {
    let h = Harness::new();
    h.activate(USER).await;
    fill_credentials(&h, USER).await;
    assert_eq!(h.state(USER).await, ChatState::CredentialsConfirmation);

    let card = h.transport.take().pop().unwrap();
    let Sent::Message { msg, .. } = card else {
        panic!("expected confirmation card");
    };
    assert_eq!(msg.parse_mode, ParseMode::Html);
    assert!(msg.text.contains("Иванов Иван Иванович"));
    assert!(matches!(msg.markup, Some(Markup::Inline(_))));

    h.press(USER, CALLBACK_CONFIRM).await;

    let sent = h.transport.sent();
    assert_eq!(
        sent[0],
        Sent::ClearKeyboard {
            chat_id: USER as i64,
            message_id: 20
        }
    );
    assert!(matches!(&sent[1], Sent::CallbackAnswer { text: None, .. }));
    let Sent::Photo { png, caption, .. } = &sent[2] else {
        panic!("expected QR photo, got {:?}", sent[2]);
    };
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    assert_eq!(caption.text, messages::HERE_IS_QR);

    assert_eq!(h.certificates().await, 1);
    assert_eq!(h.state(USER).await, ChatState::Started);
    assert_eq!(h.data(USER).await.credentials, Credentials::default());
    assert_eq!(h.user(USER).await.qr_generations_left, 0);
    assert_eq!(h.metrics.certificates_created_total.get(), 1);
}

#[tokio::test]
async fn test_failed_photo_delivery_keeps_generation() {
    let h = Harness::new();
    h.activate(USER).await;
    fill_credentials(&h, USER).await;
    h.transport.take();

    h.transport.set_fail_sends(true);
    h.press(USER, CALLBACK_CONFIRM).await;

    assert_eq!(h.state(USER).await, ChatState::CredentialsConfirmation);
    assert_eq!(h.user(USER).await.qr_generations_left, 1);
    assert!(h.transport.photos().is_empty());

    h.transport.set_fail_sends(false);
    h.transport.take();
    h.press(USER, CALLBACK_CONFIRM).await;

    assert_eq!(h.transport.photos().len(), 1);
    assert_eq!(h.state(USER).await, ChatState::Started);
    assert_eq!(h.user(USER).await.qr_generations_left, 0);
    assert_eq!(h.data(USER).await.credentials, Credentials::default());
}

#[tokio::test]
async fn test_rejection_starts_over() {
    let h = Harness::new();
    h.activate(USER).await;
    fill_credentials(&h, USER).await;
    h.transport.take();

    h.press(USER, CALLBACK_REJECT).await;

    assert_eq!(h.state(USER).await, ChatState::CredentialsRequested);
    assert_eq!(
        h.transport.texts(),
        vec![messages::START_OVER, messages::ENTER_FULL_NAME]
    );
    assert_eq!(h.certificates().await, 0);
}

#[tokio::test]
async fn test_unclear_answer_asks_again() {
    let h = Harness::new();
    h.activate(USER).await;
    fill_credentials(&h, USER).await;

    h.text(USER, "может быть").await;

    assert_eq!(h.transport.last_text().as_deref(), Some(messages::YES_OR_NO));
    assert_eq!(h.state(USER).await, ChatState::CredentialsConfirmation);

    h.text(USER, "Да").await;
    assert_eq!(h.certificates().await, 1);
    assert_eq!(h.state(USER).await, ChatState::Started);
}

#[tokio::test]
async fn test_generation_limit_reached() {
    let h = Harness::new();
    h.activate(USER).await;
    fill_credentials(&h, USER).await;
    h.press(USER, CALLBACK_CONFIRM).await;
    h.transport.take();

    h.text(USER, "Получить код").await;

    assert_eq!(h.transport.texts(), vec![messages::GENERATIONS_EXHAUSTED]);
    assert_eq!(h.state(USER).await, ChatState::Started);
    assert_eq!(h.certificates().await, 1);
}

#[tokio::test]
async fn test_info_and_invites_buttons() {
    let h = Harness::new();
    let user = h.activate(USER).await;

    h.text(USER, "Информация").await;
    let info = h.transport.last_text().unwrap();
    assert!(info.contains("Количество генераций осталось: 1"));

    h.text(USER, "Мои инвайты").await;
    let invites = h.transport.last_text().unwrap();
    for invite in &user.invites {
        assert!(invites.contains(&invite.code));
    }
    assert_eq!(h.state(USER).await, ChatState::Started);
}

#[tokio::test]
async fn test_admin_adds_invites() {
    let h = Harness::new();
    let admin = h.activate(ADMIN_TG_ID).await;
    assert_eq!(admin.invites.len(), 5);
    assert_eq!(admin.qr_generations_left, 100);

    h.text(ADMIN_TG_ID, "Добавить инвайты").await;

    assert_eq!(h.user(ADMIN_TG_ID).await.unused_invites().len(), 10);
}

#[tokio::test]
async fn test_add_invites_ignored_for_regular_user() {
    let h = Harness::new();
    h.activate(USER).await;

    h.text(USER, "Добавить инвайты").await;

    assert_eq!(h.user(USER).await.invites.len(), 2);
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn test_activate_button_for_active_user() {
    let h = Harness::new();
    h.activate(USER).await;

    h.text(USER, "Активировать инвайт").await;

    assert_eq!(h.transport.texts(), vec![messages::ALREADY_ACTIVATED]);
    assert_eq!(h.state(USER).await, ChatState::Started);
}

#[tokio::test]
async fn test_failed_prompt_still_moves_conversation() {
    let h = Harness::new();
    h.activate(USER).await;
    h.transport.set_fail_sends(true);

    h.text(USER, "Получить код").await;

    assert_eq!(h.state(USER).await, ChatState::CredentialsRequested);
    assert_eq!(
        h.metrics.handler_errors_total.with_label_values(&["internal"]).get(),
        1
    );

    h.transport.set_fail_sends(false);
    h.text(USER, "Иванов Иван Иванович").await;
    assert_eq!(h.state(USER).await, ChatState::DateBirthRequested);
}

#[tokio::test]
async fn test_callback_without_flow_is_ignored() {
    let h = Harness::new();
    h.activate(USER).await;

    h.send(callback(USER, CALLBACK_CONFIRM)).await;

    assert!(h.transport.sent().is_empty());
    assert_eq!(h.certificates().await, 0);
}
