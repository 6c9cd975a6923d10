/// Outgoing side: stamp tracking headers, send, record.
use anyhow::{anyhow, Result};
use lettre::message::header::{ContentType, HeaderName, HeaderValue, MessageId};
use lettre::message::{Mailbox, MessageBuilder};
use lettre::{AsyncTransport, Message};
use uuid::Uuid;

use crate::config::HeaderNames;
use crate::encryption::Encrypter;
use crate::models::{ModelReference, SentMessage};
use crate::services::recorder_service::{OutgoingMailRecorder, RecordedSend};

/// Metadata carried by an outgoing message so its Send can be recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendHeaders {
    pub uuid: Option<String>,
    pub mail_class: Option<String>,
    pub models: Vec<ModelReference>,
}

impl SendHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn fresh_uuid(self) -> Self {
        self.uuid(Uuid::new_v4().to_string())
    }

    pub fn mail_class(mut self, mail_class: impl Into<String>) -> Self {
        self.mail_class = Some(mail_class.into());
        self
    }

    pub fn associate(mut self, reference: ModelReference) -> Self {
        self.models.push(reference);
        self
    }

    pub fn associate_many(mut self, references: impl IntoIterator<Item = ModelReference>) -> Self {
        self.models.extend(references);
        self
    }

    /// Header name/value pairs; mail class and models are encrypted. The
    /// uuid header is left out when the Message-ID doubles as uuid.
    pub fn header_values(
        &self,
        names: &HeaderNames,
        encrypter: &dyn Encrypter,
    ) -> Result<Vec<(String, String)>> {
        let mut headers = Vec::new();
        if let Some(uuid) = &self.uuid {
            if !names
                .send_uuid
                .eq_ignore_ascii_case(crate::config::MESSAGE_ID_HEADER)
            {
                headers.push((names.send_uuid.clone(), uuid.clone()));
            }
        }
        if let Some(mail_class) = &self.mail_class {
            headers.push((names.mail_class.clone(), encrypter.encrypt_string(mail_class)?));
        }
        if !self.models.is_empty() {
            let json = serde_json::to_string(&self.models)?;
            headers.push((names.models.clone(), encrypter.encrypt_string(&json)?));
        }
        Ok(headers)
    }

    pub fn apply(
        &self,
        mut builder: MessageBuilder,
        names: &HeaderNames,
        encrypter: &dyn Encrypter,
    ) -> Result<MessageBuilder> {
        for (name, value) in self.header_values(names, encrypter)? {
            let header = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| anyhow!("invalid header name {name}: {e:?}"))?;
            builder = builder.raw_header(HeaderValue::new(header, value));
        }
        Ok(builder)
    }
}

/// Build an HTML message with an explicit Message-Id and the send headers.
/// Returns (message, message_id).
pub fn build_email(
    from: &str,
    to: &str,
    subject: &str,
    html_body: &str,
    send_headers: &SendHeaders,
    names: &HeaderNames,
    encrypter: &dyn Encrypter,
) -> Result<(Message, String)> {
    let from_mb: Mailbox = from.parse()?;
    let to_mb: Mailbox = to.parse()?;
    let domain = from_mb.email.domain().to_string();
    let msg_id_value = format!("{}@{}", Uuid::new_v4(), domain);

    let builder = Message::builder()
        .from(from_mb)
        .to(to_mb)
        .subject(subject)
        .header(MessageId::from(format!("<{msg_id_value}>")))
        .header(ContentType::TEXT_HTML);
    let builder = send_headers.apply(builder, names, encrypter)?;

    let message = builder.body(html_body.to_string())?;
    Ok((message, msg_id_value))
}

/// Send through any lettre transport, then record the Send. The Message-ID
/// is used as the transport message id.
pub async fn send_and_record<T>(
    transport: &T,
    message: &Message,
    recorder: &OutgoingMailRecorder,
) -> Result<RecordedSend>
where
    T: AsyncTransport + Sync,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    transport.send(message.clone()).await?;

    let message_id = message
        .headers()
        .get_raw("Message-ID")
        .map(|id| id.trim().trim_matches(['<', '>']).to_string());
    let sent = SentMessage::from_lettre(message, message_id)?;

    match recorder.handle(&sent).await {
        Ok(recorded) => Ok(recorded),
        Err(e) => {
            tracing::error!(error = %e, "mail sent but recording failed");
            Err(e.into())
        }
    }
}
