//! Reply drafting and sending.

use std::sync::Arc;

use serde_json::Value;

use crate::ai::prompts::{DRAFT_SYSTEM, DraftBrief, draft_user};
use crate::ai::{ChatMessage, GenerationRequest, Summary, TextGenerator, extract_json};
use crate::constants::DRAFT_BODY_MAX_CHARS;
use crate::error::{Error, Result};
use crate::mail::smtp::{MailTransport, OutgoingMessage};

use super::summary::SummaryService;
use super::threads::{ThreadLoad, ThreadService};

const DEFAULT_TEMPERATURE: f32 = 0.6;

/// More assertive tones sample colder.
pub fn tone_temperature(tone: Option<&str>) -> f32 {
    match tone.map(|t| t.trim().to_lowercase()).as_deref() {
        Some("assertive" | "direct" | "firm") => 0.3,
        Some("neutral" | "professional" | "formal") => 0.5,
        Some("friendly" | "warm") => 0.7,
        Some("casual" | "playful") => 0.9,
        _ => DEFAULT_TEMPERATURE,
    }
}

/// The `draft` field of a JSON reply, or the whole reply when it is not JSON.
pub fn coerce_draft(raw: &str) -> String {
    match extract_json(raw) {
        Some(Value::Object(map)) => match map.get("draft") {
            Some(Value::String(draft)) => draft.trim().to_string(),
            _ => raw.trim().to_string(),
        },
        _ => raw.trim().to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DraftRequest {
    pub thread_id: String,
    pub goal: String,
    pub persona_name: Option<String>,
    pub persona_style: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub draft: String,
    pub summary: Summary,
}

#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    /// Reply threading headers are taken from this thread's newest message
    pub thread_id: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub from: Option<String>,
}

pub struct ReplyGateway {
    threads: Arc<ThreadService>,
    summaries: Arc<SummaryService>,
    generator: Arc<dyn TextGenerator>,
    transport: Arc<dyn MailTransport>,
    max_tokens: u32,
}

impl ReplyGateway {
    pub fn new(
        threads: Arc<ThreadService>,
        summaries: Arc<SummaryService>,
        generator: Arc<dyn TextGenerator>,
        transport: Arc<dyn MailTransport>,
        max_tokens: u32,
    ) -> Self {
        Self {
            threads,
            summaries,
            generator,
            transport,
            max_tokens,
        }
    }

    /// Draft a reply to the newest message of a thread. A failed generation
    /// yields an empty draft rather than an error.
    pub async fn generate_draft(&self, request: &DraftRequest) -> Result<Draft> {
        let summary = self.summaries.get_or_create(&request.thread_id).await?;

        let page = match self.threads.load_thread(&request.thread_id, 1).await? {
            ThreadLoad::Ready(page) => page,
            ThreadLoad::Empty => {
                return Err(Error::NotFound(format!("thread {}", request.thread_id)));
            }
        };
        let latest = page
            .messages
            .last()
            .ok_or_else(|| Error::NotFound(format!("thread {} has no messages", request.thread_id)))?;

        let brief = DraftBrief {
            goal: &request.goal,
            persona_name: request.persona_name.as_deref(),
            persona_style: request.persona_style.as_deref(),
            tone: request.tone.as_deref(),
        };
        let generation = GenerationRequest {
            messages: vec![
                ChatMessage::system(DRAFT_SYSTEM),
                ChatMessage::user(draft_user(
                    &brief,
                    &summary.one_liner,
                    latest,
                    DRAFT_BODY_MAX_CHARS,
                )),
            ],
            temperature: Some(tone_temperature(request.tone.as_deref())),
            max_tokens: self.max_tokens,
        };

        let draft = match self.generator.generate(&generation).await {
            Ok(raw) => coerce_draft(&raw),
            Err(e) => {
                tracing::warn!(thread_id = %request.thread_id, "Draft generation failed: {}", e);
                String::new()
            }
        };

        Ok(Draft { draft, summary })
    }

    /// Hand a message to the transport and return its Message-ID.
    ///
    /// Nothing is written to the cache; the sent message shows up on the next listing.
    pub async fn send(&self, request: &SendRequest) -> Result<String> {
        if request.to.trim().is_empty() {
            return Err(Error::InvalidRequest("missing recipient".to_string()));
        }

        let mut outgoing = OutgoingMessage {
            to: request.to.clone(),
            subject: request.subject.clone(),
            body: request.body.clone(),
            from: request.from.clone(),
            in_reply_to: None,
            references: Vec::new(),
        };

        if let Some(ref thread_id) = request.thread_id
            && let Some(page) = self.threads.cache().get_thread(thread_id, 1).await?
            && let Some(newest) = page.messages.last()
            && !is_synthetic_id(&newest.id)
        {
            outgoing.in_reply_to = Some(newest.id.clone());
            outgoing.references = newest.references.clone();
            outgoing.references.push(newest.id.clone());
        }

        let message_id = self.transport.send(&outgoing).await?;
        tracing::info!(to = %request.to, %message_id, "Message sent");
        Ok(message_id)
    }
}

/// Ids made up from the uid are not real Message-IDs and must not be referenced.
fn is_synthetic_id(id: &str) -> bool {
    id.starts_with("uid-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fake::ScriptedGenerator;
    use crate::mail::imap::fake::FakeMailbox;
    use crate::mail::smtp::fake::RecordingTransport;
    use crate::service::threads::testing::{add, service};

    const SUMMARY: &str = r#"{"bullets":["Meeting proposed"],"oneLiner":"Planning a meeting"}"#;

    async fn gateway(
        mailbox: &FakeMailbox,
        generator: Arc<ScriptedGenerator>,
        transport: Arc<RecordingTransport>,
    ) -> ReplyGateway {
        let (threads, _) = service(mailbox).await;
        let threads = Arc::new(threads);
        let summaries = Arc::new(SummaryService::new(threads.clone(), generator.clone(), 400));
        ReplyGateway::new(threads, summaries, generator, transport, 800)
    }

    fn mailbox() -> FakeMailbox {
        let mut mailbox = FakeMailbox::with_status(2, Some(3));
        add(&mut mailbox, 1, "m1@x", "Meeting", 1);
        add(&mut mailbox, 2, "m2@x", "Re: Meeting", 2);
        mailbox
    }

    fn request(tone: &str) -> DraftRequest {
        DraftRequest {
            thread_id: "meeting".to_string(),
            goal: "accept".to_string(),
            persona_name: Some("Sam".to_string()),
            persona_style: None,
            tone: Some(tone.to_string()),
        }
    }

    #[test]
    fn test_tone_table() {
        assert_eq!(tone_temperature(Some("Assertive")), 0.3);
        assert_eq!(tone_temperature(Some("friendly")), 0.7);
        assert_eq!(tone_temperature(Some("whimsical")), DEFAULT_TEMPERATURE);
        assert_eq!(tone_temperature(None), DEFAULT_TEMPERATURE);
    }

    #[test]
    fn test_coerce_draft() {
        assert_eq!(coerce_draft(r#"{"draft": " Sounds good! "}"#), "Sounds good!");
        assert_eq!(coerce_draft("Plain reply\n"), "Plain reply");
        assert_eq!(coerce_draft(r#"{"text": "x"}"#), r#"{"text": "x"}"#);
    }

    #[tokio::test]
    async fn test_draft_replies_to_newest_message() {
        let generator = Arc::new(ScriptedGenerator::replying(&[
            SUMMARY,
            r#"{"draft":"Tuesday works."}"#,
        ]));
        let gateway = gateway(&mailbox(), generator.clone(), Arc::default()).await;

        let draft = gateway.generate_draft(&request("assertive")).await.unwrap();

        assert_eq!(draft.draft, "Tuesday works.");
        assert_eq!(draft.summary.one_liner, "Planning a meeting");
        let sent = generator.last_request().unwrap();
        assert_eq!(sent.temperature, Some(0.3));
        assert!(sent.messages[1].content.contains("Body of m2@x"));
        assert!(sent.messages[1].content.contains("Write as: Sam"));
    }

    #[tokio::test]
    async fn test_draft_generation_failure_is_empty_draft() {
        let gateway = gateway(
            &mailbox(),
            Arc::new(ScriptedGenerator::failing()),
            Arc::default(),
        )
        .await;

        let draft = gateway.generate_draft(&request("neutral")).await.unwrap();
        assert!(draft.draft.is_empty());
        assert_eq!(draft.summary.sentiment, "unknown");
    }

    #[tokio::test]
    async fn test_send_sets_threading_headers() {
        let mailbox = mailbox();
        let transport = Arc::new(RecordingTransport::default());
        let gateway = gateway(
            &mailbox,
            Arc::new(ScriptedGenerator::replying(&[SUMMARY])),
            transport.clone(),
        )
        .await;
        gateway.threads.load_thread("meeting", 10).await.unwrap();

        let id = gateway
            .send(&SendRequest {
                thread_id: Some("meeting".to_string()),
                to: "alice@example.com".to_string(),
                subject: "Re: Meeting".to_string(),
                body: "See you then".to_string(),
                from: None,
            })
            .await
            .unwrap();

        assert_eq!(id, "sent-1@test");
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].in_reply_to.as_deref(), Some("m2@x"));
        assert_eq!(sent[0].references, vec!["m2@x"]);
    }

    #[tokio::test]
    async fn test_send_failure_propagates() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let gateway = gateway(
            &mailbox(),
            Arc::new(ScriptedGenerator::replying(&[SUMMARY])),
            transport,
        )
        .await;

        let err = gateway
            .send(&SendRequest {
                to: "alice@example.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_send_requires_recipient() {
        let gateway = gateway(
            &mailbox(),
            Arc::new(ScriptedGenerator::replying(&[SUMMARY])),
            Arc::default(),
        )
        .await;

        let err = gateway.send(&SendRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
