mod common;

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

use common::{message, TestApp, POST_MODEL, USER_MODEL};
use mailora_sends::config::{ModelTable, SendsConfig};
use mailora_sends::db::queries;
use mailora_sends::encryption::AppKeyEncrypter;
use mailora_sends::error::{EncryptionError, RecordError};
use mailora_sends::models::{
    HasSends, MailAddress, Model, ModelKey, SendAttributes, Sendable, SentMessage,
};
use mailora_sends::services::{ModelRegistry, ModelResolver, OutgoingMailRecorder, TableResolver};

#[tokio::test]
async fn plain_message_creates_one_send_without_metadata() {
    let app = TestApp::new().await;
    let recorded = app.recorder().handle(&message()).await.unwrap();

    assert_eq!(app.count("sends").await, 1);
    assert_eq!(app.count("sendables").await, 0);
    assert!(recorded.attached.is_empty());

    let send = queries::find_send(&app.pool, &app.config.tables, recorded.send.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(send, recorded.send);
    assert_eq!(send.uuid, None);
    assert_eq!(send.mail_class, None);
    assert_eq!(send.subject, "Your order shipped");
    assert_eq!(send.content, None);
    assert_eq!(send.cc, None);
    assert_eq!(send.bcc, None);
    assert_eq!(send.reply_to, None);
}

#[tokio::test]
async fn addresses_are_stored_as_ordered_maps() {
    let app = TestApp::new().await;
    let mut msg = message();
    msg.from = vec![
        MailAddress::new("a@x.com", "Alice"),
        MailAddress::new("b@x.com", ""),
    ];
    msg.to = vec![];

    let recorded = app.recorder().handle(&msg).await.unwrap();
    let send = queries::find_send(&app.pool, &app.config.tables, recorded.send.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        serde_json::to_value(&send.from).unwrap(),
        serde_json::json!({"a@x.com": "Alice", "b@x.com": null})
    );
    assert_eq!(send.to, None);

    let raw_to: Option<String> = sqlx::query_scalar(r#"SELECT "to" FROM sends WHERE id = ?"#)
        .bind(send.id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(raw_to, None);
}

#[tokio::test]
async fn content_is_only_stored_when_enabled() {
    let app = TestApp::new().await;
    let send = app.recorder().handle(&message()).await.unwrap().send;
    assert_eq!(send.content, None);

    let app = TestApp::with_config(SendsConfig {
        store_content: true,
        ..SendsConfig::default()
    })
    .await;
    let send = app.recorder().handle(&message()).await.unwrap().send;
    assert_eq!(send.content.as_deref(), Some("<p>It is on its way.</p>"));
}

#[tokio::test]
async fn uuid_is_read_from_configured_header() {
    let app = TestApp::new().await;
    let header = app.config.headers.send_uuid.clone();

    let msg = message().with_header(&header, "9b2f4c1e-0000-4000-8000-000000000001");
    let send = app.recorder().handle(&msg).await.unwrap().send;
    assert_eq!(send.uuid.as_deref(), Some("9b2f4c1e-0000-4000-8000-000000000001"));

    let found = queries::find_send_by_uuid(
        &app.pool,
        &app.config.tables,
        "9b2f4c1e-0000-4000-8000-000000000001",
    )
    .await
    .unwrap();
    assert_eq!(found.map(|s| s.id), Some(send.id));

    let empty = message().with_header(&header, "   ");
    assert_eq!(app.recorder().handle(&empty).await.unwrap().send.uuid, None);
}

#[tokio::test]
async fn message_id_setting_uses_transport_id() {
    let mut config = SendsConfig::default();
    config.headers.send_uuid = "Message-ID".into();
    let app = TestApp::with_config(config).await;

    let msg = message().with_header("Message-ID", "<from-header@example.com>");
    let send = app.recorder().handle(&msg).await.unwrap().send;
    assert_eq!(send.uuid.as_deref(), Some("0f2b1c@mail.example.com"));

    let mut without_id = message();
    without_id.message_id = None;
    assert_eq!(app.recorder().handle(&without_id).await.unwrap().send.uuid, None);
}

#[tokio::test]
async fn mail_class_is_decrypted() {
    let app = TestApp::new().await;
    let msg = message().with_header(
        &app.config.headers.mail_class,
        app.encrypt(r"App\Mail\OrderShipped"),
    );

    let send = app.recorder().handle(&msg).await.unwrap().send;
    assert_eq!(send.mail_class.as_deref(), Some(r"App\Mail\OrderShipped"));
}

#[tokio::test]
async fn undecryptable_mail_class_is_fatal_and_stores_nothing() {
    let app = TestApp::new().await;
    let other_key = AppKeyEncrypter::from_app_key(&AppKeyEncrypter::generate_key()).unwrap();
    let msg = message().with_header(
        &app.config.headers.mail_class,
        mailora_sends::Encrypter::encrypt_string(&other_key, "Welcome").unwrap(),
    );

    let err = app.recorder().handle(&msg).await.unwrap_err();
    match err {
        RecordError::Decrypt { header, source } => {
            assert_eq!(header, app.config.headers.mail_class);
            assert!(matches!(source, EncryptionError::Authentication));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(app.count("sends").await, 0);
}

#[tokio::test]
async fn has_sends_model_is_attached() {
    let app = TestApp::new().await;
    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\User","id":1}]"#),
    );

    let recorded = app.recorder().handle(&msg).await.unwrap();
    let user = Sendable {
        sendable_type: USER_MODEL.into(),
        sendable_id: "1".into(),
    };
    assert_eq!(recorded.attached, vec![user.clone()]);
    assert_eq!(app.count("sendables").await, 1);

    let links = queries::sendables_for_send(&app.pool, &app.config.tables, recorded.send.id)
        .await
        .unwrap();
    assert_eq!(links, vec![user.clone()]);

    let sends = queries::sends_for_sendable(&app.pool, &app.config.tables, &user)
        .await
        .unwrap();
    assert_eq!(sends, vec![recorded.send]);
}

#[tokio::test]
async fn model_without_has_sends_is_skipped() {
    let app = TestApp::new().await;
    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\Post","id":1},{"model":"App\\User","id":2}]"#),
    );

    let recorded = app.recorder().handle(&msg).await.unwrap();
    assert_eq!(recorded.attached.len(), 1);
    assert_eq!(recorded.attached[0].sendable_type, USER_MODEL);
    assert_eq!(recorded.attached[0].sendable_id, "2");

    let only_post = message().with_header(
        &app.config.headers.models,
        app.encrypt(&format!(r#"[{{"model":{},"id":1}}]"#, serde_json::json!(POST_MODEL))),
    );
    let recorded = app.recorder().handle(&only_post).await.unwrap();
    assert!(recorded.attached.is_empty());
    assert_eq!(app.count("sends").await, 2);
    assert_eq!(app.count("sendables").await, 1);
}

#[tokio::test]
async fn malformed_models_json_fails_after_send_is_stored() {
    let app = TestApp::new().await;
    let msg = message().with_header(&app.config.headers.models, app.encrypt("[{\"model\":"));

    let err = app.recorder().handle(&msg).await.unwrap_err();
    assert!(matches!(err, RecordError::ModelsHeader(_)), "{err}");
    assert_eq!(app.count("sends").await, 1);
    assert_eq!(app.count("sendables").await, 0);
}

#[tokio::test]
async fn undecryptable_models_header_fails_after_send_is_stored() {
    let app = TestApp::new().await;
    let other_key = AppKeyEncrypter::from_app_key(&AppKeyEncrypter::generate_key()).unwrap();
    let msg = message().with_header(
        &app.config.headers.models,
        mailora_sends::Encrypter::encrypt_string(&other_key, r#"[{"model":"App\\User","id":1}]"#)
            .unwrap(),
    );

    let err = app.recorder().handle(&msg).await.unwrap_err();
    match err {
        RecordError::Decrypt { header, source } => {
            assert_eq!(header, app.config.headers.models);
            assert!(matches!(source, EncryptionError::Authentication));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(app.count("sends").await, 1);
    assert_eq!(app.count("sendables").await, 0);
}

#[tokio::test]
async fn null_models_header_attaches_nothing() {
    let app = TestApp::new().await;
    let msg = message().with_header(&app.config.headers.models, app.encrypt("null"));

    let recorded = app.recorder().handle(&msg).await.unwrap();
    assert!(recorded.attached.is_empty());
    assert_eq!(app.count("sends").await, 1);
    assert_eq!(app.count("sendables").await, 0);

    let object = message().with_header(&app.config.headers.models, app.encrypt(r#"{"model":1}"#));
    let err = app.recorder().handle(&object).await.unwrap_err();
    assert!(matches!(err, RecordError::ModelsHeader(_)), "{err}");
}

#[tokio::test]
async fn registry_from_configured_tables_attaches_models() {
    let app = TestApp::new().await;
    let tables = ModelTable::parse_list(r"App\User=users:sends, App\Post=posts").unwrap();
    let registry = ModelRegistry::from_tables(&tables).unwrap();
    assert!(registry.is_registered(USER_MODEL));
    assert!(registry.is_registered(POST_MODEL));
    assert!(!registry.is_registered(r"App\Invoice"));

    let recorder = OutgoingMailRecorder::new(
        app.pool.clone(),
        app.config.clone(),
        Arc::new(app.encrypter.clone()),
        registry,
    );
    assert_eq!(recorder.config(), &app.config);

    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\User","id":2},{"model":"App\\Post","id":1}]"#),
    );
    let recorded = recorder.handle(&msg).await.unwrap();
    assert_eq!(
        recorded.attached,
        vec![Sendable {
            sendable_type: USER_MODEL.into(),
            sendable_id: "2".into(),
        }]
    );
    assert_eq!(
        queries::count_sends(&app.pool, &app.config.tables)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn table_resolver_looks_up_by_custom_key_column() {
    let app = TestApp::new().await;
    sqlx::query("CREATE TABLE teams (id INTEGER PRIMARY KEY, slug TEXT NOT NULL UNIQUE)")
        .execute(&app.pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO teams (id, slug) VALUES (7, 'acme')")
        .execute(&app.pool)
        .await
        .unwrap();

    assert!(TableResolver::new("App\\Team", "teams")
        .unwrap()
        .key_column("slug; DROP TABLE teams")
        .is_err());

    let teams = TableResolver::new(r"App\Team", "teams")
        .unwrap()
        .key_column("slug")
        .unwrap()
        .with_sends();
    let recorder = OutgoingMailRecorder::new(
        app.pool.clone(),
        app.config.clone(),
        Arc::new(app.encrypter.clone()),
        app.registry().with(r"App\Team", teams),
    );

    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\Team","id":"acme"}]"#),
    );
    let recorded = recorder.handle(&msg).await.unwrap();
    assert_eq!(recorded.attached[0].sendable_id, "acme");

    let by_id = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\Team","id":7}]"#),
    );
    let err = recorder.handle(&by_id).await.unwrap_err();
    assert!(matches!(err, RecordError::ModelNotFound { .. }), "{err}");
}

#[tokio::test]
async fn missing_model_is_a_lookup_failure_not_a_skip() {
    let app = TestApp::new().await;
    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\User","id":99}]"#),
    );

    let err = app.recorder().handle(&msg).await.unwrap_err();
    match err {
        RecordError::ModelNotFound { model, id } => {
            assert_eq!(model, USER_MODEL);
            assert_eq!(id, "99");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(app.count("sends").await, 1);
}

#[tokio::test]
async fn unregistered_model_type_is_rejected() {
    let app = TestApp::new().await;
    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\Invoice","id":1}]"#),
    );

    let err = app.recorder().handle(&msg).await.unwrap_err();
    assert!(matches!(err, RecordError::UnknownModel(ref m) if m == r"App\Invoice"));
}

#[tokio::test]
async fn repeated_reference_is_attached_once() {
    let app = TestApp::new().await;
    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"App\\User","id":1},{"model":"App\\User","id":1}]"#),
    );

    app.recorder().handle(&msg).await.unwrap();
    assert_eq!(app.count("sendables").await, 1);
}

#[tokio::test]
async fn attribute_hook_adjusts_stored_values() {
    let app = TestApp::new().await;
    let recorder = app.recorder().with_attribute_hook(
        |message: &SentMessage, mut attrs: SendAttributes| -> anyhow::Result<SendAttributes> {
            attrs.subject = format!("[{}] {}", message.to.len(), attrs.subject);
            attrs.uuid = Some("from-hook".into());
            Ok(attrs)
        },
    );

    let send = recorder.handle(&message()).await.unwrap().send;
    assert_eq!(send.subject, "[1] Your order shipped");
    assert_eq!(send.uuid.as_deref(), Some("from-hook"));
}

#[tokio::test]
async fn failing_hook_stores_nothing() {
    let app = TestApp::new().await;
    let recorder = app.recorder().with_attribute_hook(
        |_: &SentMessage, _: SendAttributes| -> anyhow::Result<SendAttributes> {
            anyhow::bail!("rejected")
        },
    );

    let err = recorder.handle(&message()).await.unwrap_err();
    assert!(matches!(err, RecordError::Hook(_)));
    assert_eq!(app.count("sends").await, 0);
}

#[derive(Debug)]
struct Customer {
    key: ModelKey,
}

impl Model for Customer {
    fn model_type(&self) -> &str {
        "crm.customer"
    }

    fn key(&self) -> &ModelKey {
        &self.key
    }

    fn as_has_sends(&self) -> Option<&dyn HasSends> {
        Some(self)
    }
}

#[async_trait]
impl HasSends for Customer {
    fn sendable(&self) -> Sendable {
        Sendable {
            sendable_type: "crm.customer".into(),
            sendable_id: self.key.to_string(),
        }
    }
}

struct CustomerDirectory;

#[async_trait]
impl ModelResolver for CustomerDirectory {
    async fn find(
        &self,
        _pool: &SqlitePool,
        key: &ModelKey,
    ) -> anyhow::Result<Option<Box<dyn Model>>> {
        match key {
            ModelKey::Str(id) if id.starts_with("cus_") => {
                Ok(Some(Box::new(Customer { key: key.clone() })))
            }
            _ => Ok(None),
        }
    }
}

#[tokio::test]
async fn custom_models_declare_the_capability_themselves() {
    let app = TestApp::new().await;
    let recorder = OutgoingMailRecorder::new(
        app.pool.clone(),
        app.config.clone(),
        Arc::new(app.encrypter.clone()),
        app.registry().with("crm.customer", CustomerDirectory),
    );
    let msg = message().with_header(
        &app.config.headers.models,
        app.encrypt(r#"[{"model":"crm.customer","id":"cus_42"},{"model":"App\\User","id":1}]"#),
    );

    let recorded = recorder.handle(&msg).await.unwrap();
    assert_eq!(recorded.attached.len(), 2);

    let customer = Customer {
        key: ModelKey::Str("cus_42".into()),
    };
    let sends = customer.sends(&app.pool, &app.config.tables).await.unwrap();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].id, recorded.send.id);
}
