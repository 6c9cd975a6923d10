use mail_parser::{Address, MessageParser, PartType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAddress {
    pub address: String,
    pub name: String,
}

impl MailAddress {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    pub fn bare(address: impl Into<String>) -> Self {
        Self::new(address, "")
    }
}

/// A message that has already left through the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentMessage {
    pub headers: Vec<(String, String)>,
    pub subject: String,
    pub html_body: Option<String>,
    pub from: Vec<MailAddress>,
    pub reply_to: Vec<MailAddress>,
    pub to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub bcc: Vec<MailAddress>,
    /// Id assigned by the transport, without angle brackets.
    pub message_id: Option<String>,
}

impl SentMessage {
    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Parse an RFC 5322 message. Without a transport id the `Message-ID`
    /// header stands in for it.
    pub fn from_raw(raw: &[u8], transport_id: Option<String>) -> anyhow::Result<Self> {
        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| anyhow::anyhow!("unparseable message"))?;

        let headers = message
            .headers()
            .iter()
            .filter_map(|h| {
                h.value()
                    .as_text()
                    .map(|v| (h.name().to_string(), v.trim().to_string()))
            })
            .collect();

        // Body parts only; an attached .html file is not the message body.
        let html_body = message
            .html_body
            .iter()
            .filter_map(|&id| message.part(id))
            .find_map(|part| match &part.body {
                PartType::Html(html) => Some(html.to_string()),
                _ => None,
            });

        let message_id = transport_id
            .or_else(|| message.message_id().map(str::to_string))
            .map(|id| id.trim_matches(['<', '>']).to_string());

        Ok(SentMessage {
            headers,
            subject: message.subject().unwrap_or_default().to_string(),
            html_body,
            from: addresses(message.from()),
            reply_to: addresses(message.reply_to()),
            to: addresses(message.to()),
            cc: addresses(message.cc()),
            bcc: addresses(message.bcc()),
            message_id,
        })
    }

    pub fn from_lettre(
        message: &lettre::Message,
        transport_id: Option<String>,
    ) -> anyhow::Result<Self> {
        Self::from_raw(&message.formatted(), transport_id)
    }
}

fn addresses(list: Option<&Address<'_>>) -> Vec<MailAddress> {
    let addrs: Vec<_> = match list {
        Some(Address::List(list)) => list.iter().collect(),
        Some(Address::Group(groups)) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
        None => Vec::new(),
    };
    addrs
        .into_iter()
        .filter_map(|a| {
            a.address()
                .map(|address| MailAddress::new(address, a.name().unwrap_or_default()))
        })
        .collect()
}
