use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use std::fmt;

use super::sent_message::MailAddress;

/// Address → display name, kept in the order the addresses were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMap(Vec<(String, Option<String>)>);

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repeated address keeps its position and takes the newer name.
    pub fn insert(&mut self, address: impl Into<String>, name: Option<String>) {
        let address = address.into();
        match self.0.iter_mut().find(|(a, _)| *a == address) {
            Some(entry) => entry.1 = name,
            None => self.0.push((address, name)),
        }
    }

    pub fn get(&self, address: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, n)| n.as_deref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(a, n)| (a.as_str(), n.as_deref()))
    }

    /// `None` for an empty list so that no empty object is ever stored.
    pub fn from_addresses(addresses: &[MailAddress]) -> Option<Self> {
        let mut map = AddressMap::new();
        for addr in addresses {
            let name = Some(addr.name.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            map.insert(addr.address.clone(), name);
        }
        (!map.is_empty()).then_some(map)
    }
}

impl<A: Into<String>> FromIterator<(A, Option<String>)> for AddressMap {
    fn from_iter<I: IntoIterator<Item = (A, Option<String>)>>(iter: I) -> Self {
        let mut map = AddressMap::new();
        for (address, name) in iter {
            map.insert(address, name);
        }
        map
    }
}

impl Serialize for AddressMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (address, name) in &self.0 {
            map.serialize_entry(address, name)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AddressMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddressMapVisitor;

        impl<'de> Visitor<'de> for AddressMapVisitor {
            type Value = AddressMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of address to display name")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<AddressMap, M::Error> {
                let mut map = AddressMap::new();
                while let Some((address, name)) = access.next_entry::<String, Option<String>>()? {
                    map.insert(address, name);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(AddressMapVisitor)
    }
}

/// Column values for a new Send, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendAttributes {
    pub uuid: Option<String>,
    pub mail_class: Option<String>,
    pub subject: String,
    pub content: Option<String>,
    pub from: Option<AddressMap>,
    pub reply_to: Option<AddressMap>,
    pub to: Option<AddressMap>,
    pub cc: Option<AddressMap>,
    pub bcc: Option<AddressMap>,
    pub sent_at: DateTime<Utc>,
}

/// A persisted outgoing mail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Send {
    pub id: i64,
    pub uuid: Option<String>,
    pub mail_class: Option<String>,
    pub subject: String,
    pub content: Option<String>,
    pub from: Option<AddressMap>,
    pub reply_to: Option<AddressMap>,
    pub to: Option<AddressMap>,
    pub cc: Option<AddressMap>,
    pub bcc: Option<AddressMap>,
    pub sent_at: DateTime<Utc>,
}

impl Send {
    pub fn from_attributes(id: i64, attrs: SendAttributes) -> Self {
        Send {
            id,
            uuid: attrs.uuid,
            mail_class: attrs.mail_class,
            subject: attrs.subject,
            content: attrs.content,
            from: attrs.from,
            reply_to: attrs.reply_to,
            to: attrs.to,
            cc: attrs.cc,
            bcc: attrs.bcc,
            sent_at: attrs.sent_at,
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for Send {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let addresses = |column: &str| -> Result<Option<AddressMap>, sqlx::Error> {
            Ok(row
                .try_get::<Option<Json<AddressMap>>, _>(column)?
                .map(|Json(map)| map))
        };

        Ok(Send {
            id: row.try_get("id")?,
            uuid: row.try_get("uuid")?,
            mail_class: row.try_get("mail_class")?,
            subject: row.try_get("subject")?,
            content: row.try_get("content")?,
            from: addresses("from")?,
            reply_to: addresses("reply_to")?,
            to: addresses("to")?,
            cc: addresses("cc")?,
            bcc: addresses("bcc")?,
            sent_at: row.try_get("sent_at")?,
        })
    }
}
