use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::config::Tables;
use crate::models::send::{self, SendAttributes};
use crate::models::Sendable;

const SEND_COLUMNS: &str =
    r#"id, uuid, mail_class, subject, content, "from", reply_to, "to", cc, bcc, sent_at"#;

/// Inserts one Send row and returns it with its new id.
pub async fn insert_send(
    pool: &SqlitePool,
    tables: &Tables,
    attrs: SendAttributes,
) -> Result<send::Send, sqlx::Error> {
    let sql = format!(
        r#"INSERT INTO {} (uuid, mail_class, subject, content, "from", reply_to, "to", cc, bcc, sent_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        tables.sends
    );
    let result = sqlx::query(&sql)
        .bind(&attrs.uuid)
        .bind(&attrs.mail_class)
        .bind(&attrs.subject)
        .bind(&attrs.content)
        .bind(attrs.from.as_ref().map(Json))
        .bind(attrs.reply_to.as_ref().map(Json))
        .bind(attrs.to.as_ref().map(Json))
        .bind(attrs.cc.as_ref().map(Json))
        .bind(attrs.bcc.as_ref().map(Json))
        .bind(attrs.sent_at)
        .execute(pool)
        .await?;

    Ok(send::Send::from_attributes(result.last_insert_rowid(), attrs))
}

/// Links a Send to a model. Returns false when the link already existed.
pub async fn attach_sendable(
    pool: &SqlitePool,
    tables: &Tables,
    send_id: i64,
    sendable: &Sendable,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} (send_id, sendable_type, sendable_id) VALUES (?, ?, ?)",
        tables.sendables
    );
    let result = sqlx::query(&sql)
        .bind(send_id)
        .bind(&sendable.sendable_type)
        .bind(&sendable.sendable_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_send(
    pool: &SqlitePool,
    tables: &Tables,
    id: i64,
) -> Result<Option<send::Send>, sqlx::Error> {
    let sql = format!("SELECT {SEND_COLUMNS} FROM {} WHERE id = ?", tables.sends);
    sqlx::query_as::<_, send::Send>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_send_by_uuid(
    pool: &SqlitePool,
    tables: &Tables,
    uuid: &str,
) -> Result<Option<send::Send>, sqlx::Error> {
    let sql = format!(
        "SELECT {SEND_COLUMNS} FROM {} WHERE uuid = ? ORDER BY id DESC LIMIT 1",
        tables.sends
    );
    sqlx::query_as::<_, send::Send>(&sql)
        .bind(uuid)
        .fetch_optional(pool)
        .await
}

pub async fn sends_for_sendable(
    pool: &SqlitePool,
    tables: &Tables,
    sendable: &Sendable,
) -> Result<Vec<send::Send>, sqlx::Error> {
    let columns = SEND_COLUMNS
        .split(", ")
        .map(|c| format!("s.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM {sends} s
         JOIN {sendables} p ON p.send_id = s.id
         WHERE p.sendable_type = ? AND p.sendable_id = ?
         ORDER BY s.sent_at DESC, s.id DESC",
        sends = tables.sends,
        sendables = tables.sendables,
    );
    sqlx::query_as::<_, send::Send>(&sql)
        .bind(&sendable.sendable_type)
        .bind(&sendable.sendable_id)
        .fetch_all(pool)
        .await
}

pub async fn sendables_for_send(
    pool: &SqlitePool,
    tables: &Tables,
    send_id: i64,
) -> Result<Vec<Sendable>, sqlx::Error> {
    let sql = format!(
        "SELECT sendable_type, sendable_id FROM {} WHERE send_id = ? ORDER BY rowid",
        tables.sendables
    );
    sqlx::query_as::<_, Sendable>(&sql)
        .bind(send_id)
        .fetch_all(pool)
        .await
}

pub async fn count_sends(pool: &SqlitePool, tables: &Tables) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM {}", tables.sends);
    sqlx::query_scalar(&sql).fetch_one(pool).await
}
