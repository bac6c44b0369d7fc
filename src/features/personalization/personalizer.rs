//! # Feature: Personalizer
//!
//! Two-tier message personalization: placeholder substitution always, AI
//! enrichment on request. Enrichment never fails a send; any problem degrades
//! to the substituted text and is reported through [`Enriched`].
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::enricher::{EnrichedText, Enricher, EnrichmentRequest};
use super::placeholders::{contact_placeholders, replace_placeholders};
use crate::core::models::{Contact, Template};

/// Default bound on a single enrichment call
pub const DEFAULT_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// A value that may have come from the fallback path
#[derive(Debug, Clone, PartialEq)]
pub struct Enriched<T> {
    pub value: T,
    pub degraded: bool,
    pub reason: Option<String>,
}

impl<T> Enriched<T> {
    pub fn applied(value: T) -> Self {
        Self {
            value,
            degraded: false,
            reason: None,
        }
    }

    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            degraded: true,
            reason: Some(reason.into()),
        }
    }
}

/// Final text plus the pre-AI text it was derived from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalizedMessage {
    pub subject: String,
    pub body: String,
    pub basic_subject: String,
    pub basic_body: String,
    pub ai_applied: bool,
    /// Set when AI was requested but the basic text was used
    pub fallback_reason: Option<String>,
}

impl PersonalizedMessage {
    fn basic(subject: String, body: String) -> Self {
        Self {
            subject: subject.clone(),
            body: body.clone(),
            basic_subject: subject,
            basic_body: body,
            ai_applied: false,
            fallback_reason: None,
        }
    }

    /// Prefix both the final and basic subject
    pub fn with_subject_prefix(mut self, prefix: &str) -> Self {
        self.subject = format!("{prefix}{}", self.subject);
        self.basic_subject = format!("{prefix}{}", self.basic_subject);
        self
    }
}

#[derive(Clone)]
pub struct Personalizer {
    enricher: Option<Arc<dyn Enricher>>,
    enrichment_timeout: Duration,
}

impl Personalizer {
    pub fn new(enricher: Option<Arc<dyn Enricher>>, enrichment_timeout: Duration) -> Self {
        Self {
            enricher,
            enrichment_timeout,
        }
    }

    /// Substitution only; AI requests always fall back
    pub fn basic_only() -> Self {
        Self::new(None, DEFAULT_ENRICHMENT_TIMEOUT)
    }

    /// Step 1: resolve placeholders in subject and body
    pub fn substitute(template: &Template, contact: &Contact) -> (String, String) {
        let values = contact_placeholders(contact);
        (
            replace_placeholders(&template.subject, &values),
            replace_placeholders(&template.body, &values),
        )
    }

    /// Personalize `template` for `contact`. AI runs when `use_ai` or the
    /// template's own flag asks for it.
    pub async fn personalize(
        &self,
        template: &Template,
        contact: &Contact,
        use_ai: bool,
        extra_context: Option<&str>,
    ) -> PersonalizedMessage {
        let (subject, body) = Self::substitute(template, contact);
        let mut message = PersonalizedMessage::basic(subject, body);

        if !(use_ai || template.use_ai_personalization) {
            return message;
        }

        let request = EnrichmentRequest {
            basic_subject: message.basic_subject.clone(),
            basic_body: message.basic_body.clone(),
            contact: contact.into(),
            extra_context: extra_context.map(String::from),
        };

        let enriched = self.enrich_with_fallback(&request).await;
        if enriched.degraded {
            message.fallback_reason = enriched.reason;
        } else {
            message.subject = enriched.value.subject;
            message.body = enriched.value.body;
            message.ai_applied = true;
        }
        message
    }

    /// Step 2: call the enricher under a timeout, degrading to the request's basic text
    pub async fn enrich_with_fallback(&self, request: &EnrichmentRequest) -> Enriched<EnrichedText> {
        let basic = EnrichedText {
            subject: request.basic_subject.clone(),
            body: request.basic_body.clone(),
        };

        let Some(enricher) = &self.enricher else {
            debug!("AI personalization requested but no enricher is configured");
            return Enriched::fallback(basic, "no enrichment backend configured");
        };

        let reason = match timeout(self.enrichment_timeout, enricher.enrich(request)).await {
            Ok(Ok(text)) => {
                let subject = text.subject.trim();
                let body = text.body.trim();
                if subject.is_empty() {
                    "enrichment returned an empty subject".to_string()
                } else if body.is_empty() {
                    "enrichment returned an empty body".to_string()
                } else {
                    return Enriched::applied(EnrichedText {
                        subject: subject.to_string(),
                        body: body.to_string(),
                    });
                }
            }
            Ok(Err(e)) => format!("enrichment failed: {e}"),
            Err(_) => format!(
                "enrichment timed out after {}s",
                self.enrichment_timeout.as_secs_f32()
            ),
        };

        warn!(
            "AI personalization for {} fell back to basic text: {}",
            request.contact.name, reason
        );
        Enriched::fallback(basic, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_contact, sample_template, ScriptedEnricher};

    fn personalizer(enricher: ScriptedEnricher) -> Personalizer {
        Personalizer::new(Some(Arc::new(enricher)), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_plain_substitution() {
        let template = sample_template("Dear [ProfName], re: [University]", "Hello [Name]");
        let contact = sample_contact("Smith", "smith@mit.edu", "MIT");

        let message = Personalizer::basic_only()
            .personalize(&template, &contact, false, None)
            .await;

        assert_eq!(message.subject, "Dear Smith, re: MIT");
        assert_eq!(message.body, "Hello Smith");
        assert_eq!(message.basic_subject, message.subject);
        assert!(!message.ai_applied);
        assert!(message.fallback_reason.is_none());
    }

    #[tokio::test]
    async fn test_enrichment_applied() {
        let template = sample_template("Hi [ProfName]", "Body for [University]");
        let contact = sample_contact("Smith", "smith@mit.edu", "MIT");
        let enricher = ScriptedEnricher::succeed("Your soft robotics work", "Tailored body");
        let calls = enricher.calls();

        let message = personalizer(enricher)
            .personalize(&template, &contact, true, Some("met at ICRA"))
            .await;

        assert!(message.ai_applied);
        assert_eq!(message.subject, "Your soft robotics work");
        assert_eq!(message.body, "Tailored body");
        assert_eq!(message.basic_subject, "Hi Smith");
        assert_eq!(message.basic_body, "Body for MIT");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enrichment_failure_is_transparent() {
        let template = sample_template("Dear [ProfName], re: [University]", "[Department]!");
        let contact = sample_contact("Smith", "smith@mit.edu", "MIT");
        let plain = Personalizer::basic_only()
            .personalize(&template, &contact, false, None)
            .await;

        for enricher in [
            ScriptedEnricher::fail("model overloaded"),
            ScriptedEnricher::hang(),
            ScriptedEnricher::succeed("   ", "body"),
            ScriptedEnricher::succeed("subject", ""),
        ] {
            let message = personalizer(enricher)
                .personalize(&template, &contact, true, None)
                .await;

            assert_eq!(message.subject, plain.subject);
            assert_eq!(message.body, plain.body);
            assert!(!message.ai_applied);
            assert!(message.fallback_reason.is_some());
        }
    }

    #[tokio::test]
    async fn test_timeout_reason_reported() {
        let request = EnrichmentRequest {
            basic_subject: "s".to_string(),
            basic_body: "b".to_string(),
            contact: (&sample_contact("Smith", "smith@mit.edu", "MIT")).into(),
            extra_context: None,
        };
        let enriched = personalizer(ScriptedEnricher::hang())
            .enrich_with_fallback(&request)
            .await;

        assert!(enriched.degraded);
        assert!(enriched.reason.unwrap().contains("timed out"));
        assert_eq!(enriched.value.subject, "s");
    }

    #[tokio::test]
    async fn test_template_flag_requests_ai() {
        let mut template = sample_template("Hi", "Body");
        template.use_ai_personalization = true;
        let contact = sample_contact("Smith", "smith@mit.edu", "MIT");

        let message = personalizer(ScriptedEnricher::succeed("AI subject", "AI body"))
            .personalize(&template, &contact, false, None)
            .await;
        assert!(message.ai_applied);

        let message = Personalizer::basic_only()
            .personalize(&template, &contact, false, None)
            .await;
        assert!(!message.ai_applied);
        assert_eq!(
            message.fallback_reason.as_deref(),
            Some("no enrichment backend configured")
        );
    }

    #[test]
    fn test_subject_prefix() {
        let message = PersonalizedMessage::basic("Hello".to_string(), "Body".to_string())
            .with_subject_prefix("Follow-up: ");
        assert_eq!(message.subject, "Follow-up: Hello");
        assert_eq!(message.basic_subject, "Follow-up: Hello");
        assert_eq!(message.body, "Body");
    }
}
