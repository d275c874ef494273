//! The instruction sent to the classification oracle.
//!
//! The reply contract lives here next to the prompt so the two cannot drift:
//! the oracle must answer with a JSON object holding exactly the
//! [`CATEGORY_FIELD`] and [`TITLE_FIELD`] strings. The parser in
//! [`crate::pipeline::classify`] reads those names from these constants.

/// JSON field carrying the single-token category.
pub const CATEGORY_FIELD: &str = "classification";

/// JSON field carrying the short title.
pub const TITLE_FIELD: &str = "title";

/// Prompt sent alongside the paper's first page.
pub const CLASSIFY_PROMPT: &str = r#"Analyze this research paper and provide:
1. A short classification category (one or two words, e.g. "MachineLearning", "Quantum", "Biology", "Mathematics")
2. A short, succinct title (4-6 words) that captures the essence of the paper

Respond in JSON format:
{
    "classification": "CategoryName",
    "title": "Short Succinct Title"
}

Rules:
- The classification is a single token without spaces (use CamelCase for multiple words)
- The title is brief and descriptive
- Respond with the JSON object only, no other text"#;
