//! # AI Enrichment
//!
//! Rewrites an already-substituted message to read as tailored to the contact.
//! The personalizer treats every enricher as fallible and bounds it with a timeout.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use openai::chat::{ChatCompletion, ChatCompletionMessage, ChatCompletionMessageRole};

use crate::core::models::Contact;
use crate::core::text::normalize_subject;

/// Contact metadata handed to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ContactContext {
    pub name: String,
    pub university: String,
    pub department: Option<String>,
    pub research_interest: Option<String>,
}

impl From<&Contact> for ContactContext {
    fn from(contact: &Contact) -> Self {
        Self {
            name: contact.name.clone(),
            university: contact.university.clone(),
            department: contact.department.clone(),
            research_interest: contact.research_interest.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub basic_subject: String,
    pub basic_body: String,
    pub contact: ContactContext,
    pub extra_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedText {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichedText>;
}

const SYSTEM_PROMPT: &str = "You are a professional email writing assistant.";

/// Enricher backed by the OpenAI chat completion API.
///
/// The `openai` crate reads its key from the environment, so the caller must
/// export `OPENAI_KEY` before the first request.
pub struct OpenAiEnricher {
    model: String,
}

impl OpenAiEnricher {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn contact_block(request: &EnrichmentRequest) -> String {
        let contact = &request.contact;
        let mut block = format!(
            "Contact Information:\n\
             - Name: {}\n\
             - University: {}\n\
             - Department: {}\n\
             - Research Interest: {}",
            contact.name,
            contact.university,
            contact.department.as_deref().unwrap_or("Not specified"),
            contact.research_interest.as_deref().unwrap_or("Not specified"),
        );

        if let Some(extra) = request.extra_context.as_deref().filter(|e| !e.trim().is_empty()) {
            block.push_str("\n\nAdditional Context:\n");
            block.push_str(extra.trim());
        }
        block
    }

    pub(crate) fn subject_prompt(request: &EnrichmentRequest) -> String {
        format!(
            "You are helping a graduate student personalize an email subject line to a professor.\n\n\
             {}\n\n\
             Original Subject: {}\n\n\
             Task: Improve and personalize this subject line to be more engaging and specific to the \
             professor's research interests. Keep it professional, concise (under 100 characters), \
             and attention-grabbing.\n\n\
             Return ONLY the improved subject line, nothing else.",
            Self::contact_block(request),
            request.basic_subject
        )
    }

    pub(crate) fn body_prompt(request: &EnrichmentRequest) -> String {
        format!(
            "You are helping a graduate student personalize an email to a professor.\n\n\
             {}\n\n\
             Original Email Body:\n{}\n\n\
             Task: Improve and personalize this email to be more engaging, specific to the \
             professor's research, and professional. Make it feel genuine and tailored, not generic. \
             Keep the same general structure and length.\n\n\
             Return ONLY the improved email body, nothing else.",
            Self::contact_block(request),
            request.basic_body
        )
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let messages = vec![
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::System,
                content: Some(SYSTEM_PROMPT.to_string()),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::User,
                content: Some(prompt),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
        ];

        let completion = ChatCompletion::builder(&self.model, messages)
            .create()
            .await
            .map_err(|e| anyhow::anyhow!("OpenAI API error: {}", e))?;

        Ok(completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichedText> {
        let subject = normalize_subject(&self.complete(Self::subject_prompt(request)).await?);
        let body = self.complete(Self::body_prompt(request)).await?;

        debug!(
            "Enriched message for {} ({} subject chars, {} body chars)",
            request.contact.name,
            subject.len(),
            body.len()
        );

        Ok(EnrichedText { subject, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(extra: Option<&str>) -> EnrichmentRequest {
        EnrichmentRequest {
            basic_subject: "PhD inquiry".to_string(),
            basic_body: "Dear Smith, I admire your work.".to_string(),
            contact: ContactContext {
                name: "Smith".to_string(),
                university: "MIT".to_string(),
                department: None,
                research_interest: Some("soft robotics".to_string()),
            },
            extra_context: extra.map(String::from),
        }
    }

    #[test]
    fn test_subject_prompt_contents() {
        let prompt = OpenAiEnricher::subject_prompt(&request(None));
        assert!(prompt.contains("Original Subject: PhD inquiry"));
        assert!(prompt.contains("- Department: Not specified"));
        assert!(prompt.contains("- Research Interest: soft robotics"));
        assert!(!prompt.contains("Additional Context"));
    }

    #[test]
    fn test_body_prompt_includes_extra_context() {
        let prompt = OpenAiEnricher::body_prompt(&request(Some("  Met at ICRA 2025  ")));
        assert!(prompt.contains("Dear Smith, I admire your work."));
        assert!(prompt.contains("Additional Context:\nMet at ICRA 2025"));
    }

    #[test]
    fn test_blank_extra_context_ignored() {
        let prompt = OpenAiEnricher::body_prompt(&request(Some("   ")));
        assert!(!prompt.contains("Additional Context"));
    }
}
