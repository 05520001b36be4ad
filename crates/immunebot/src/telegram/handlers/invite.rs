//! Invite activation flow

use async_trait::async_trait;
use immunecore::AppError;

use super::{HandlerDeps, StateHandler};
use crate::telegram::context::Context;
use crate::telegram::errors::BotError;
use crate::telegram::messages;
use crate::telegram::state::ChatState;
use crate::telegram::transport::{Markup, Outgoing};

/// Entry point, bounces users who are already active
pub struct InviteInit;

#[async_trait]
impl StateHandler for InviteInit {
    fn title(&self) -> &'static str {
        "invite_init"
    }

    async fn handle(&self, ctx: &mut Context) -> Result<(), BotError> {
        if ctx.user.is_active {
            ctx.send(Outgoing::text(messages::ALREADY_ACTIVATED).with_markup(ctx.menu_markup()))
                .await?;
            ctx.state = ChatState::Started;
            return Ok(());
        }

        ctx.state = ChatState::InviteRequested;
        Ok(())
    }
}

/// Reads the code and activates the user
pub struct InviteInput {
    deps: HandlerDeps,
}

impl InviteInput {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StateHandler for InviteInput {
    fn title(&self) -> &'static str {
        "invite_requested"
    }

    async fn on_enter(&self, ctx: &Context) -> Result<(), BotError> {
        ctx.send(Outgoing::text(messages::ENTER_INVITE_CODE).with_markup(Markup::RemoveKeyboard))
            .await
    }

    async fn handle(&self, ctx: &mut Context) -> Result<(), BotError> {
        let code = ctx.incoming.input().trim().to_string();
        if code.is_empty() {
            return Err(BotError::input(messages::ENTER_INVITE_CODE));
        }

        let user = match self.deps.users.activate_invite(ctx.user_id(), &code).await {
            Ok(user) => user,
            Err(AppError::NoInvite | AppError::SelfInvite) => return Err(BotError::domain(messages::NO_SUCH_INVITE)),
            Err(AppError::AlreadyActive) => return Err(BotError::domain(messages::ALREADY_ACTIVATED)),
            Err(e) => return Err(e.into()),
        };
        self.deps.metrics.invites_activated_total.inc();
        tracing::info!(user_id = %user.id, invited_by = ?user.invited_by, "invite activated");

        ctx.user = user;
        let text = messages::activated(&ctx.user.invites);
        // Activation is already stored, a lost message must not keep the user in this state
        if let Err(e) = ctx.send(Outgoing::markdown(text).with_markup(ctx.menu_markup())).await {
            tracing::warn!(user_id = %ctx.user.id, error = %e, "failed to deliver activation message");
        }

        ctx.state = ChatState::Started;
        Ok(())
    }
}
