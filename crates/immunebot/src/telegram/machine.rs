//! Transition table and state handler registry
//!
//! Built once at startup and shared read-only afterwards. The machine itself
//! does no locking, callers serialize work per user.

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::MachineError;
use super::handlers::StateHandler;
use super::state::ChatState;
use super::store::StateStore;

pub struct Machine {
    transitions: HashMap<ChatState, Vec<ChatState>>,
    handlers: HashMap<ChatState, Arc<dyn StateHandler>>,
    store: Arc<dyn StateStore>,
}

impl Machine {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            transitions: HashMap::new(),
            handlers: HashMap::new(),
            store,
        }
    }

    /// Adds `to` targets to the edges leaving `from`, duplicates are ignored
    pub fn add_transitions(&mut self, from: ChatState, to: impl IntoIterator<Item = ChatState>) -> &mut Self {
        let targets = self.transitions.entry(from).or_default();
        for state in to {
            if !targets.contains(&state) {
                targets.push(state);
            }
        }
        self
    }

    /// Binds `handler` to `state`
    ///
    /// # Errors
    /// `StateUnknown` when `state` has no transitions declared yet, the registry is left as is
    pub fn add_state_handler(&mut self, state: ChatState, handler: Arc<dyn StateHandler>) -> Result<(), MachineError> {
        if !self.transitions.contains_key(&state) {
            return Err(MachineError::StateUnknown(state));
        }
        self.handlers.insert(state, handler);
        Ok(())
    }

    /// `None` is valid, the state simply has nothing to run
    pub fn handler_for_state(&self, state: ChatState) -> Option<Arc<dyn StateHandler>> {
        self.handlers.get(&state).cloned()
    }

    pub fn is_allowed_to_transit(&self, from: ChatState, to: ChatState) -> bool {
        self.transitions.get(&from).is_some_and(|targets| targets.contains(&to))
    }

    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Validates and persists `from -> to` for the user
    ///
    /// # Returns
    /// The handler bound to `to`, if any
    pub async fn transit_from(
        &self,
        user_id: &str,
        from: ChatState,
        to: ChatState,
    ) -> Result<Option<Arc<dyn StateHandler>>, MachineError> {
        if !self.is_allowed_to_transit(from, to) {
            return Err(MachineError::TransitionNotAllowed { from, to });
        }

        self.store
            .set_state(user_id, to)
            .await
            .map_err(MachineError::StorePersistFailed)?;

        tracing::debug!(user_id, %from, %to, "state transition");
        Ok(self.handler_for_state(to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::context::Context;
    use crate::telegram::errors::{BotError, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl StateHandler for Noop {
        fn title(&self) -> &'static str {
            "noop"
        }

        async fn handle(&self, _ctx: &mut Context) -> Result<(), BotError> {
            Ok(())
        }
    }

    /// Counts writes, optionally failing them
    #[derive(Default)]
    struct CountingStore {
        writes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl StateStore for CountingStore {
        async fn get_state(&self, _user_id: &str) -> Result<ChatState, StoreError> {
            Err(StoreError::Missing)
        }

        async fn set_state(&self, _user_id: &str, _state: ChatState) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Backend(immunecore::AppError::Validation("down".into())));
            }
            Ok(())
        }
    }

    fn machine(store: Arc<CountingStore>) -> Machine {
        let mut machine = Machine::new(store);
        machine
            .add_transitions(ChatState::GenerateStart, [ChatState::Started, ChatState::CredentialsRequested])
            .add_transitions(ChatState::CredentialsRequested, [ChatState::DateBirthRequested]);
        machine
    }

    #[test]
    fn test_allowed_pairs_only() {
        let machine = machine(Arc::default());
        assert!(machine.is_allowed_to_transit(ChatState::GenerateStart, ChatState::Started));
        assert!(machine.is_allowed_to_transit(ChatState::CredentialsRequested, ChatState::DateBirthRequested));
        assert!(!machine.is_allowed_to_transit(ChatState::CredentialsRequested, ChatState::Started));
        assert!(!machine.is_allowed_to_transit(ChatState::Started, ChatState::GenerateStart));
    }

    #[test]
    fn test_add_transitions_is_a_union() {
        let mut machine = machine(Arc::default());
        machine.add_transitions(ChatState::GenerateStart, [ChatState::Started, ChatState::InviteInit]);
        assert_eq!(machine.transitions[&ChatState::GenerateStart].len(), 3);
    }

    #[tokio::test]
    async fn test_disallowed_transition_does_not_write() {
        let store = Arc::new(CountingStore::default());
        let machine = machine(store.clone());

        let err = machine
            .transit_from("u1", ChatState::CredentialsRequested, ChatState::Started)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MachineError::TransitionNotAllowed { .. }));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allowed_transition_returns_target_handler() {
        let store = Arc::new(CountingStore::default());
        let mut machine = machine(store.clone());
        let handler: Arc<dyn StateHandler> = Arc::new(Noop);
        machine
            .add_state_handler(ChatState::CredentialsRequested, handler.clone())
            .unwrap();

        let next = machine
            .transit_from("u1", ChatState::GenerateStart, ChatState::CredentialsRequested)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&next.unwrap(), &handler));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        let none = machine
            .transit_from("u1", ChatState::GenerateStart, ChatState::Started)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_wrapped() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..Default::default()
        });
        let machine = machine(store);
        let err = machine
            .transit_from("u1", ChatState::GenerateStart, ChatState::Started)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MachineError::StorePersistFailed(_)));
    }

    #[test]
    fn test_handler_registry() {
        let mut machine = machine(Arc::default());
        let handler: Arc<dyn StateHandler> = Arc::new(Noop);

        let err = machine.add_state_handler(ChatState::InviteInit, handler.clone()).unwrap_err();
        assert!(matches!(err, MachineError::StateUnknown(ChatState::InviteInit)));
        assert!(machine.handler_for_state(ChatState::InviteInit).is_none());

        machine.add_state_handler(ChatState::GenerateStart, handler.clone()).unwrap();
        let a = machine.handler_for_state(ChatState::GenerateStart).unwrap();
        let b = machine.handler_for_state(ChatState::GenerateStart).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &handler));
    }
}
