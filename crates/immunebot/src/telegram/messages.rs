//! Тексты сообщений бота

use immunecore::models::{Credentials, Invite};
use indoc::{formatdoc, indoc};
use itertools::Itertools;

pub const NEED_INVITE_CODE: &str = indoc! {"
    Привет! Для того чтобы начать, тебе нужно отправить инвайт-код. \
    Этот код тебе может дать твой друг/знакомый. К сожалению, без \
    такого кода я не работаю, так как не хочу чтобы мной пользовались без ограничений."};

pub const CHOOSE_ACTION: &str = "Выбери что нужно";
pub const INTERNAL_ERROR: &str = "Что-то со мной не так. Попробуй еще разок";

pub const ALREADY_ACTIVATED: &str = "Ты уже активировал инвайт, зачем тебе еще?";
pub const ENTER_INVITE_CODE: &str = "Введи инвайт-код, полученный непонятным образом";
pub const NO_SUCH_INVITE: &str = "Что-то не сходится, ты точно уверен, что ввел код правильно?";
pub const ACTIVATED: &str = "Успех\n";
pub const YOUR_INVITES: &str =
    "Вот коды, которые ты можешь дать своим друзьям, чтобы они тоже могли взаимодействовать со мной\n";
pub const NO_INVITES_LEFT: &str = "Свободных инвайтов не осталось";

pub const GENERATIONS_EXHAUSTED: &str = "Прости, но количество генераций кода ограничено";
pub const ENTER_FULL_NAME: &str = "Для начала нужны твои ФИО";
pub const BAD_FULL_NAME: &str = "Чет не то, введи ФИО через пробел в правильном формате";
pub const ENTER_DATE_BIRTH: &str = "Теперь мне нужна твоя дата рождения в формате DD.MM.YYYY (например 01.01.2000)";
pub const EMPTY_DATE_BIRTH: &str = "Ты не понял, нужна твоя дата рождения";
pub const BAD_DATE_BIRTH: &str =
    "Неправильный формат, я же выше прислал, в каком формате нужна дата рождения, не тупи...";
pub const START_OVER: &str = "Ок, давай по-новой";
pub const YES_OR_NO: &str = "Да или нет?";
pub const HERE_IS_QR: &str = "Вот твой QR код";

/// Invite codes per line in the invites list
const INVITES_PER_LINE: usize = 5;

/// Escapes text for Telegram MarkdownV2
pub fn escape_markdown(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
    ];
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escapes text for Telegram HTML
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Bold invite codes, five per line (MarkdownV2)
pub fn invites_list(invites: &[Invite]) -> String {
    invites
        .iter()
        .chunks(INVITES_PER_LINE)
        .into_iter()
        .map(|line| line.map(|i| format!("*{}*", escape_markdown(&i.code))).join("  "))
        .join("\n")
}

/// Message after a successful activation (MarkdownV2)
pub fn activated(invites: &[Invite]) -> String {
    let mut msg = escape_markdown(ACTIVATED);
    if !invites.is_empty() {
        msg.push_str(&escape_markdown(YOUR_INVITES));
        msg.push_str(&invites_list(invites));
    }
    msg
}

/// Unused invites of the user (MarkdownV2)
pub fn my_invites(invites: &[Invite]) -> String {
    if invites.is_empty() {
        return escape_markdown(NO_INVITES_LEFT);
    }
    format!("{}{}", escape_markdown(YOUR_INVITES), invites_list(invites))
}

/// Remaining generations (MarkdownV2)
pub fn info(qr_generations_left: u32) -> String {
    formatdoc! {"
        *Информация*

        Количество генераций осталось: {qr_generations_left}"}
}

/// Confirmation card (HTML)
pub fn confirmation(credentials: &Credentials) -> String {
    formatdoc! {"
        Отлично, давай проверим, что все данные введены верно

        <b>ФИО</b>: {}
        <b>Дата рождения</b>: {}",
        escape_html(&credentials.full_name()),
        escape_html(&credentials.date_birth),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn invites(n: usize) -> Vec<Invite> {
        (0..n).map(|i| Invite::new(format!("C{i:03}"))).collect()
    }

    #[test]
    fn test_invites_list_chunks_by_five() {
        let list = invites_list(&invites(7));
        let lines: Vec<_> = list.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].matches('*').count(), 10);
        assert_eq!(lines[1], "*C005*  *C006*");
    }

    #[test]
    fn test_activated_without_invites() {
        assert_eq!(activated(&[]), "Успех\n");
        assert!(activated(&invites(1)).contains("*C000*"));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a.b-c!"), "a\\.b\\-c\\!");
    }

    #[test]
    fn test_confirmation_card() {
        let card = confirmation(&Credentials {
            last_name: "Иванов".into(),
            first_name: "Иван".into(),
            second_name: "Иванович".into(),
            date_birth: "01.01.2000".into(),
        });
        assert!(card.contains("<b>ФИО</b>: Иванов Иван Иванович"));
        assert!(card.ends_with("<b>Дата рождения</b>: 01.01.2000"));
    }

    #[test]
    fn test_need_invite_is_one_paragraph() {
        assert!(!NEED_INVITE_CODE.contains('\n'));
        assert!(NEED_INVITE_CODE.starts_with("Привет!"));
    }
}
