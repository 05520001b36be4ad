//! Engine wired over in-memory storage and a recording transport

use std::sync::Arc;

use immunebot::telegram::incoming::{CallbackOrigin, Sender};
use immunebot::telegram::{
    build_machine, BotEngine, ChatState, DataStore, HandlerDeps, Incoming, MemoryStore, Menu, StateStore, UserData,
};
use immunebot::testing::RecordingTransport;
use immunecore::cache::Cache;
use immunecore::certs::Certificates;
use immunecore::metrics::Metrics;
use immunecore::models::{FindUserFilter, User};
use immunecore::qr::PngQrGenerator;
use immunecore::storage::{CertificatesStorage, MemoryCertificatesStorage, MemoryUsersStorage, UsersStorage};
use immunecore::users::{Users, UsersOptions};

pub const MASTER_CODE: &str = "MASTER";
pub const ADMIN_TG_ID: u64 = 1;

pub fn sender(telegram_id: u64) -> Sender {
    Sender {
        id: telegram_id,
        username: Some(format!("user{telegram_id}")),
        first_name: "Иван".to_string(),
        last_name: Some("Иванов".to_string()),
    }
}

/// Private chat message, chat id equals the sender id
pub fn message(telegram_id: u64, text: &str) -> Incoming {
    Incoming::Message {
        chat_id: telegram_id as i64,
        message_id: 10,
        sender: Some(sender(telegram_id)),
        text: Some(text.to_string()),
    }
}

/// Inline button press on message 20 of the sender's chat
pub fn callback(telegram_id: u64, data: &str) -> Incoming {
    Incoming::Callback {
        id: format!("cb-{telegram_id}"),
        sender: sender(telegram_id),
        origin: Some(CallbackOrigin {
            chat_id: telegram_id as i64,
            message_id: 20,
            text: None,
        }),
        data: Some(data.to_string()),
    }
}

pub struct Harness {
    pub engine: BotEngine,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<MemoryStore>,
    pub users_storage: Arc<MemoryUsersStorage>,
    pub certs_storage: Arc<MemoryCertificatesStorage>,
    pub metrics: Arc<Metrics>,
}

impl Harness {
    pub fn new() -> Self {
        let users_storage = Arc::new(MemoryUsersStorage::new());
        let certs_storage = Arc::new(MemoryCertificatesStorage::new());
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let metrics = Arc::new(Metrics::new().unwrap());

        let options = UsersOptions::builder()
            .unique_code(MASTER_CODE.to_string())
            .admin_telegram_id(ADMIN_TG_ID)
            .code_len(6)
            .per_user(2)
            .per_admin(5)
            .admin_qr_generations(100)
            .user_qr_generations(1)
            .build();

        let deps = HandlerDeps {
            users: Arc::new(Users::new(users_storage.clone(), options)),
            certs: Arc::new(Certificates::new(certs_storage.clone(), Cache::in_memory("test"))),
            qr: Arc::new(PngQrGenerator::new("https://immune.test/certs/{code}")),
            metrics: metrics.clone(),
        };

        let machine = build_machine(store.clone(), &deps).unwrap();
        let engine = BotEngine::new(
            Arc::new(machine),
            store.clone(),
            &deps,
            transport.clone(),
            Arc::new(Menu::new(Some(ADMIN_TG_ID))),
        );

        Self {
            engine,
            transport,
            store,
            users_storage,
            certs_storage,
            metrics,
        }
    }

    pub async fn send(&self, incoming: Incoming) {
        self.engine.handle_update(incoming).await;
    }

    pub async fn text(&self, telegram_id: u64, text: &str) {
        self.send(message(telegram_id, text)).await;
    }

    pub async fn press(&self, telegram_id: u64, data: &str) {
        self.send(callback(telegram_id, data)).await;
    }

    pub async fn user(&self, telegram_id: u64) -> User {
        self.users_storage
            .find_user(&FindUserFilter::by_telegram_id(telegram_id))
            .await
            .unwrap()
            .expect("user exists")
    }

    pub async fn state(&self, telegram_id: u64) -> ChatState {
        let user = self.user(telegram_id).await;
        self.store.get_state(&user.id).await.unwrap()
    }

    pub async fn data(&self, telegram_id: u64) -> UserData {
        let user = self.user(telegram_id).await;
        self.store.get_data(&user.id).await.unwrap()
    }

    pub async fn certificates(&self) -> usize {
        self.certs_storage.list().await.unwrap().len()
    }

    /// Walks the invite flow with `code`, recorded messages are cleared afterwards
    pub async fn activate_with(&self, telegram_id: u64, code: &str) {
        self.text(telegram_id, "/start").await;
        self.text(telegram_id, "Активировать инвайт").await;
        self.text(telegram_id, code).await;
        self.transport.take();
    }

    /// Activates with the master code
    pub async fn activate(&self, telegram_id: u64) -> User {
        self.activate_with(telegram_id, MASTER_CODE).await;
        let user = self.user(telegram_id).await;
        assert!(user.is_active, "user {telegram_id} should be active");
        user
    }
}
