//! # Personalization Feature
//!
//! Template placeholder substitution with optional AI enrichment and fallback.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod enricher;
pub mod personalizer;
pub mod placeholders;

pub use enricher::{ContactContext, EnrichedText, Enricher, EnrichmentRequest, OpenAiEnricher};
pub use personalizer::{Enriched, PersonalizedMessage, Personalizer, DEFAULT_ENRICHMENT_TIMEOUT};
pub use placeholders::{contact_placeholders, extract_placeholders, replace_placeholders};
