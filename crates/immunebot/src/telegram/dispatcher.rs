//! Update dispatcher
//!
//! Turns one [`Incoming`] update into at most one conversation step:
//! load the user and their stored state, run the auth gate, route menu
//! buttons, then drive the state machine. Updates of the same user are
//! processed one at a time.

use std::sync::Arc;

use dashmap::DashMap;
use immunecore::metrics::Metrics;
use immunecore::models::{FindUserFilter, NewUser};
use immunecore::users::UsersService;
use tokio::sync::Mutex;

use super::context::Context;
use super::errors::{BotError, MachineError, StoreError};
use super::handlers::HandlerDeps;
use super::incoming::Incoming;
use super::machine::Machine;
use super::menu::{Menu, MenuAction};
use super::messages;
use super::middleware::{self, Gate};
use super::state::{ChatState, UserData};
use super::store::DataStore;
use super::transport::{ChatTransport, Outgoing};

pub struct BotEngine {
    machine: Arc<Machine>,
    data: Arc<dyn DataStore>,
    users: Arc<dyn UsersService>,
    transport: Arc<dyn ChatTransport>,
    menu: Arc<Menu>,
    metrics: Arc<Metrics>,
    /// Keyed by Telegram user id, known before the domain user is loaded
    locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl BotEngine {
    pub fn new(
        machine: Arc<Machine>,
        data: Arc<dyn DataStore>,
        deps: &HandlerDeps,
        transport: Arc<dyn ChatTransport>,
        menu: Arc<Menu>,
    ) -> Self {
        Self {
            machine,
            data,
            users: Arc::clone(&deps.users),
            transport,
            menu,
            metrics: Arc::clone(&deps.metrics),
            locks: DashMap::new(),
        }
    }

    /// Handles one update end to end, errors are reported to the user and logged
    pub async fn handle_update(&self, incoming: Incoming) {
        self.metrics.updates_total.with_label_values(&[incoming.kind()]).inc();

        let Some(sender_id) = incoming.sender().map(|s| s.id) else {
            tracing::debug!(kind = incoming.kind(), "update without sender, skipping");
            return;
        };

        let lock = self.locks.entry(sender_id).or_default().clone();
        let recipient = incoming.recipient();
        {
            let _guard = lock.lock().await;
            if let Err(err) = self.process(incoming).await {
                self.report_error(recipient, &err).await;
            }
        }
        drop(lock);
        self.locks.remove_if(&sender_id, |_, l| Arc::strong_count(l) == 1);
    }

    /// Same as [`BotEngine::handle_update`] but hands the error back instead of reporting it
    pub async fn process(&self, incoming: Incoming) -> Result<(), BotError> {
        let mut ctx = self.load_context(incoming).await?;

        let gate = middleware::authorize(&mut ctx, self.machine.state_store().as_ref(), self.data.as_ref()).await?;
        if gate == Gate::Drop {
            self.metrics.updates_dropped_total.inc();
            return Ok(());
        }

        self.route(ctx).await
    }

    async fn load_context(&self, incoming: Incoming) -> Result<Context, BotError> {
        let sender = incoming.sender().cloned().ok_or(BotError::NoSender)?;
        let seed = NewUser {
            telegram_id: sender.id,
            username: sender.username,
            first_name: sender.first_name,
            last_name: sender.last_name,
        };
        let user = self
            .users
            .find_or_create_user(&FindUserFilter::by_telegram_id(sender.id), &seed)
            .await?;

        let states = self.machine.state_store();
        let state = match states.get_state(&user.id).await {
            Ok(state) => state,
            Err(StoreError::Missing) => {
                states.set_state(&user.id, ChatState::Started).await?;
                ChatState::Started
            }
            Err(e) => return Err(e.into()),
        };

        let data = match self.data.get_data(&user.id).await {
            Ok(data) => data,
            Err(StoreError::Missing) => {
                let data = UserData::default();
                self.data.set_data(&user.id, &data).await?;
                data
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Context::new(
            incoming,
            user,
            state,
            data,
            Arc::clone(&self.menu),
            Arc::clone(&self.transport),
        ))
    }

    async fn route(&self, mut ctx: Context) -> Result<(), BotError> {
        let action = if ctx.incoming.is_callback() {
            None
        } else {
            self.menu.action(ctx.incoming.text())
        };

        match action {
            Some(MenuAction::ActivateInvite) => {
                ctx.state = ChatState::InviteInit;
                self.step(&mut ctx).await
            }
            // Everything below needs an activated user
            Some(_) if !ctx.user.is_active => self.step(&mut ctx).await,
            Some(MenuAction::Info) => {
                ctx.send(Outgoing::markdown(messages::info(ctx.user.qr_generations_left)).with_markup(ctx.menu_markup()))
                    .await
            }
            Some(MenuAction::ReceiveCode) => {
                ctx.state = ChatState::GenerateStart;
                self.step(&mut ctx).await
            }
            Some(MenuAction::MyInvites) => {
                let invites = self.users.get_user_invites(ctx.user_id()).await?;
                ctx.send(Outgoing::markdown(messages::my_invites(&invites)).with_markup(ctx.menu_markup()))
                    .await
            }
            Some(MenuAction::AddInvites) if self.menu.is_admin(&ctx.user) => {
                ctx.user = self.users.add_invites_to_user(&ctx.user).await?;
                tracing::info!(user_id = %ctx.user.id, "admin generated more invites");
                let invites = ctx.user.unused_invites();
                ctx.send(Outgoing::markdown(messages::my_invites(&invites)).with_markup(ctx.menu_markup()))
                    .await
            }
            Some(MenuAction::AddInvites) | None => self.step(&mut ctx).await,
        }
    }

    /// Runs the handler of the current state and moves to the state it picked
    ///
    /// Nothing is persisted when `handle` fails. Once it succeeded the data is
    /// written, then the transition. A failing `on_enter` of the new state
    /// still leaves both persisted.
    pub async fn step(&self, ctx: &mut Context) -> Result<(), BotError> {
        let prev = ctx.state;
        if prev == ChatState::Started {
            return Ok(());
        }
        let Some(handler) = self.machine.handler_for_state(prev) else {
            return Ok(());
        };
        let _timer = self.metrics.dispatch_duration_seconds.start_timer();

        handler.handle(ctx).await?;

        let next = ctx.state;
        if !self.machine.is_allowed_to_transit(prev, next) {
            return Err(MachineError::TransitionNotAllowed { from: prev, to: next }.into());
        }

        self.data.set_data(ctx.user_id(), &ctx.data).await?;

        if let Err(e) = handler.on_exit(ctx).await {
            tracing::warn!(user_id = %ctx.user.id, state = %prev, error = %e, "on_exit failed");
        }

        let next_handler = self.machine.transit_from(ctx.user_id(), prev, next).await?;
        self.metrics
            .transitions_total
            .with_label_values(&[prev.as_str(), next.as_str()])
            .inc();

        if let Some(next_handler) = next_handler {
            if let Err(e) = next_handler.on_enter(ctx).await {
                self.force_persist(ctx).await;
                return Err(e);
            }
        }

        Ok(())
    }

    async fn force_persist(&self, ctx: &Context) {
        if let Err(e) = self.machine.state_store().set_state(ctx.user_id(), ctx.state).await {
            tracing::error!(user_id = %ctx.user.id, error = %e, "failed to force-persist state");
        }
        if let Err(e) = self.data.set_data(ctx.user_id(), &ctx.data).await {
            tracing::error!(user_id = %ctx.user.id, error = %e, "failed to force-persist data");
        }
    }

    /// Internal errors are logged and answered with an apology, the rest are shown as is
    async fn report_error(&self, recipient: Option<i64>, err: &BotError) {
        self.metrics.handler_errors_total.with_label_values(&[err.kind()]).inc();

        let text = if err.is_internal() {
            tracing::error!(error = ?err, "failed to handle update");
            messages::INTERNAL_ERROR.to_string()
        } else {
            err.to_string()
        };

        let Some(chat_id) = recipient else {
            return;
        };
        if let Err(e) = self.transport.send_message(chat_id, Outgoing::text(text)).await {
            log::warn!("Failed to deliver error message to chat {}: {}", chat_id, e);
        }
    }
}
