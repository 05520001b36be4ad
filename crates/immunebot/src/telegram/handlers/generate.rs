//! Certificate generation flow

use async_trait::async_trait;
use chrono::NaiveDate;
use immunecore::models::{Credentials, NewCertificate};
use lazy_regex::regex_is_match;

use super::{HandlerDeps, StateHandler};
use crate::telegram::context::Context;
use crate::telegram::errors::BotError;
use crate::telegram::messages;
use crate::telegram::state::ChatState;
use crate::telegram::transport::{InlineButton, Markup, Outgoing};

pub const CALLBACK_CONFIRM: &str = "credentials_ok";
pub const CALLBACK_REJECT: &str = "credentials_not_ok";

/// Checks the generation limit before asking for anything
pub struct GenerateStart;

#[async_trait]
impl StateHandler for GenerateStart {
    fn title(&self) -> &'static str {
        "generate_start"
    }

    async fn handle(&self, ctx: &mut Context) -> Result<(), BotError> {
        if ctx.user.qr_generations_left == 0 {
            ctx.send(Outgoing::text(messages::GENERATIONS_EXHAUSTED).with_markup(ctx.menu_markup()))
                .await?;
            ctx.state = ChatState::Started;
            return Ok(());
        }

        ctx.state = ChatState::CredentialsRequested;
        Ok(())
    }
}

/// "Last First Second"
pub struct CredentialsInput;

#[async_trait]
impl StateHandler for CredentialsInput {
    fn title(&self) -> &'static str {
        "credentials_requested"
    }

    async fn on_enter(&self, ctx: &Context) -> Result<(), BotError> {
        ctx.send(Outgoing::text(messages::ENTER_FULL_NAME).with_markup(Markup::RemoveKeyboard))
            .await
    }

    async fn handle(&self, ctx: &mut Context) -> Result<(), BotError> {
        let parts: Vec<&str> = ctx.incoming.input().split_whitespace().collect();
        let [last_name, first_name, second_name] = parts.as_slice() else {
            return Err(BotError::input(messages::BAD_FULL_NAME));
        };

        ctx.data.credentials = Credentials {
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
            second_name: second_name.to_string(),
            date_birth: String::new(),
        };
        ctx.state = ChatState::DateBirthRequested;
        Ok(())
    }
}

/// `DD.MM.YYYY`
pub struct DateBirthInput;

fn is_valid_date_birth(input: &str) -> bool {
    regex_is_match!(r"^\d{2}\.\d{2}\.\d{4}$", input) && NaiveDate::parse_from_str(input, "%d.%m.%Y").is_ok()
}

#[async_trait]
impl StateHandler for DateBirthInput {
    fn title(&self) -> &'static str {
        "date_birth_requested"
    }

    async fn on_enter(&self, ctx: &Context) -> Result<(), BotError> {
        ctx.send_text(messages::ENTER_DATE_BIRTH).await
    }

    async fn handle(&self, ctx: &mut Context) -> Result<(), BotError> {
        let input = ctx.incoming.input().trim();
        if input.is_empty() {
            return Err(BotError::input(messages::EMPTY_DATE_BIRTH));
        }
        if !is_valid_date_birth(input) {
            return Err(BotError::input(messages::BAD_DATE_BIRTH));
        }

        ctx.data.credentials.date_birth = input.to_string();
        ctx.state = ChatState::CredentialsConfirmation;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
}

fn parse_answer(input: &str) -> Option<Answer> {
    match input.trim().to_lowercase().as_str() {
        CALLBACK_CONFIRM | "да" | "yes" => Some(Answer::Yes),
        CALLBACK_REJECT | "нет" | "no" => Some(Answer::No),
        _ => None,
    }
}

/// Shows the collected data and issues the certificate on approval
pub struct Confirmation {
    deps: HandlerDeps,
}

impl Confirmation {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }

    async fn issue(&self, ctx: &mut Context) -> Result<(), BotError> {
        if ctx.user.qr_generations_left == 0 {
            ctx.send(Outgoing::text(messages::GENERATIONS_EXHAUSTED).with_markup(ctx.menu_markup()))
                .await?;
            return Ok(());
        }

        let cert = self
            .deps
            .certs
            .create_vax_cert(NewCertificate {
                owner_id: Some(ctx.user.id.clone()),
                credentials: ctx.data.credentials.clone(),
            })
            .await?;
        self.deps.metrics.certificates_created_total.inc();
        tracing::info!(user_id = %ctx.user.id, code = %cert.code, "certificate issued");

        let png = self.deps.qr.generate_qr(&cert.code)?;
        ctx.send_photo(png, Outgoing::text(messages::HERE_IS_QR).with_markup(ctx.menu_markup()))
            .await?;

        // Spent only once the QR reached the user, a failed send can be retried
        ctx.user = self.deps.users.use_qr_generation(&ctx.user.id).await?;
        Ok(())
    }
}

#[async_trait]
impl StateHandler for Confirmation {
    fn title(&self) -> &'static str {
        "credentials_confirmation"
    }

    async fn on_enter(&self, ctx: &Context) -> Result<(), BotError> {
        let buttons = Markup::Inline(vec![vec![
            InlineButton::new("✅", CALLBACK_CONFIRM),
            InlineButton::new("❌", CALLBACK_REJECT),
        ]]);
        ctx.send(Outgoing::html(messages::confirmation(&ctx.data.credentials)).with_markup(buttons))
            .await
    }

    async fn handle(&self, ctx: &mut Context) -> Result<(), BotError> {
        ctx.clear_inline_keyboard().await?;
        if ctx.incoming.is_callback() {
            if let Err(e) = ctx.respond(None).await {
                tracing::debug!(error = %e, "failed to answer callback");
            }
        }

        match parse_answer(ctx.incoming.input()) {
            Some(Answer::No) => {
                ctx.send_text(messages::START_OVER).await?;
                ctx.state = ChatState::CredentialsRequested;
            }
            Some(Answer::Yes) => {
                self.issue(ctx).await?;
                ctx.data.credentials = Credentials::default();
                ctx.state = ChatState::Started;
            }
            None => return Err(BotError::input(messages::YES_OR_NO)),
        }
        Ok(())
    }
}
