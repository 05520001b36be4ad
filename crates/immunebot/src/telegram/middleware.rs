//! Auth gate run before any update is routed
//!
//! Only users with a redeemed invite get past it, except for the few inputs
//! needed to redeem one.

use super::context::Context;
use super::errors::BotError;
use super::menu::MenuAction;
use super::messages;
use super::state::ChatState;
use super::store::{DataStore, StateStore};
use super::transport::Outgoing;

pub const START_COMMAND: &str = "/start";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Route the update
    Pass,
    /// Stop here, whatever had to be said was said
    Drop,
}

/// `/start`, `/start payload` and `/start@bot_name`
fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|command| command.split('@').next())
        .is_some_and(|command| command == START_COMMAND)
}

/// Decides whether the update reaches the router
///
/// May send a message and persist state or data on its own.
pub async fn authorize(
    ctx: &mut Context,
    states: &dyn StateStore,
    data: &dyn DataStore,
) -> Result<Gate, BotError> {
    let text = ctx.incoming.text().trim().to_string();

    if !ctx.user.is_active {
        if ctx.state == ChatState::InviteRequested {
            return Ok(Gate::Pass);
        }

        if !ctx.incoming.is_callback() && ctx.menu().action(&text) == Some(MenuAction::ActivateInvite) {
            states.set_state(ctx.user_id(), ChatState::InviteInit).await?;
            ctx.state = ChatState::InviteInit;
            return Ok(Gate::Pass);
        }

        if ctx.data.invite_notification_sent {
            tracing::debug!(user_id = %ctx.user.id, "inactive user already notified, dropping update");
            return Ok(Gate::Drop);
        }

        ctx.send(Outgoing::text(messages::NEED_INVITE_CODE).with_markup(ctx.menu_markup()))
            .await?;
        ctx.data.invite_notification_sent = true;
        data.set_data(ctx.user_id(), &ctx.data).await?;
        return Ok(Gate::Drop);
    }

    if !ctx.incoming.is_callback() && is_start_command(&text) {
        states.set_state(ctx.user_id(), ChatState::Started).await?;
        ctx.state = ChatState::Started;
        ctx.send(Outgoing::text(messages::CHOOSE_ACTION).with_markup(ctx.menu_markup()))
            .await?;
        return Ok(Gate::Drop);
    }

    Ok(Gate::Pass)
}
