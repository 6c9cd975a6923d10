#![allow(dead_code)]

use sqlx::SqlitePool;
use std::sync::Arc;

use mailora_sends::config::SendsConfig;
use mailora_sends::db;
use mailora_sends::encryption::{AppKeyEncrypter, Encrypter};
use mailora_sends::models::{MailAddress, SentMessage};
use mailora_sends::services::{ModelRegistry, OutgoingMailRecorder, TableResolver};

pub const USER_MODEL: &str = r"App\User";
pub const POST_MODEL: &str = r"App\Post";

pub struct TestApp {
    pub pool: SqlitePool,
    pub config: SendsConfig,
    pub encrypter: AppKeyEncrypter,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(SendsConfig::default()).await
    }

    pub async fn with_config(config: SendsConfig) -> Self {
        let pool = db::connect_in_memory().await.unwrap();
        db::run_migrations(&pool, &config.tables).await.unwrap();

        sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO posts (id, title) VALUES (1, 'Hello')")
            .execute(&pool)
            .await
            .unwrap();

        let encrypter = AppKeyEncrypter::from_app_key(&AppKeyEncrypter::generate_key()).unwrap();
        TestApp {
            pool,
            config,
            encrypter,
        }
    }

    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::new()
            .with(
                USER_MODEL,
                TableResolver::new(USER_MODEL, "users").unwrap().with_sends(),
            )
            .with(POST_MODEL, TableResolver::new(POST_MODEL, "posts").unwrap())
    }

    pub fn recorder(&self) -> OutgoingMailRecorder {
        OutgoingMailRecorder::new(
            self.pool.clone(),
            self.config.clone(),
            Arc::new(self.encrypter.clone()),
            self.registry(),
        )
    }

    pub fn encrypt(&self, value: &str) -> String {
        self.encrypter.encrypt_string(value).unwrap()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub fn message() -> SentMessage {
    SentMessage {
        subject: "Your order shipped".into(),
        html_body: Some("<p>It is on its way.</p>".into()),
        from: vec![MailAddress::new("shop@example.com", "Shop")],
        to: vec![MailAddress::new("alice@example.com", "Alice")],
        message_id: Some("0f2b1c@mail.example.com".into()),
        ..SentMessage::default()
    }
}
