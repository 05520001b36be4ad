//! Conversation step handlers and the graph they form

use std::sync::Arc;

use async_trait::async_trait;
use immunecore::certs::CertificateService;
use immunecore::metrics::Metrics;
use immunecore::qr::QrGenerator;
use immunecore::users::UsersService;

use super::context::Context;
use super::errors::{BotError, MachineError};
use super::machine::Machine;
use super::state::ChatState;
use super::store::StateStore;

pub mod generate;
pub mod invite;

/// Enter/handle/exit triple bound to one [`ChatState`]
///
/// `handle` reports the next state by setting `ctx.state` and may change
/// `ctx.data`; nothing is persisted when it returns an error.
#[async_trait]
pub trait StateHandler: Send + Sync {
    fn title(&self) -> &'static str;

    /// Runs after the conversation moved into this state
    async fn on_enter(&self, _ctx: &Context) -> Result<(), BotError> {
        Ok(())
    }

    async fn handle(&self, ctx: &mut Context) -> Result<(), BotError>;

    /// Runs after a successful `handle`, failures are only logged
    async fn on_exit(&self, _ctx: &Context) -> Result<(), BotError> {
        Ok(())
    }
}

/// Services the handlers call into
#[derive(Clone)]
pub struct HandlerDeps {
    pub users: Arc<dyn UsersService>,
    pub certs: Arc<dyn CertificateService>,
    pub qr: Arc<dyn QrGenerator>,
    pub metrics: Arc<Metrics>,
}

/// Builds the transition table and binds a handler to every non-idle state
///
/// Invite flow: `invite_init -> invite_requested -> started`.
/// Certificate flow: `generate_start -> credentials_requested -> date_birth_requested
/// -> credentials_confirmation -> {credentials_requested | started}`.
pub fn build_machine(store: Arc<dyn StateStore>, deps: &HandlerDeps) -> Result<Machine, MachineError> {
    use ChatState::*;

    let mut machine = Machine::new(store);
    machine
        .add_transitions(InviteInit, [Started, InviteRequested])
        .add_transitions(InviteRequested, [Started])
        .add_transitions(GenerateStart, [Started, CredentialsRequested])
        .add_transitions(CredentialsRequested, [DateBirthRequested])
        .add_transitions(DateBirthRequested, [CredentialsConfirmation])
        .add_transitions(CredentialsConfirmation, [CredentialsRequested, Started]);

    machine.add_state_handler(InviteInit, Arc::new(invite::InviteInit))?;
    machine.add_state_handler(InviteRequested, Arc::new(invite::InviteInput::new(deps.clone())))?;
    machine.add_state_handler(GenerateStart, Arc::new(generate::GenerateStart))?;
    machine.add_state_handler(CredentialsRequested, Arc::new(generate::CredentialsInput))?;
    machine.add_state_handler(DateBirthRequested, Arc::new(generate::DateBirthInput))?;
    machine.add_state_handler(
        CredentialsConfirmation,
        Arc::new(generate::Confirmation::new(deps.clone())),
    )?;

    Ok(machine)
}
