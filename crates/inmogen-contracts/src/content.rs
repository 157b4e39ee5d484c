use serde::{Deserialize, Serialize};

/// Structured listing copy as rendered to the user.
///
/// Always fully populated: parsed verbatim when the generation service
/// returns structured JSON, synthesized from the raw text otherwise.
/// Missing fields default to empty rather than null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingCopy {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub full_description: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub instagram_copy: String,
}

/// Wire record returned by both the generation and the listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: i64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub features: String,
    #[serde(default)]
    pub vibe: String,
    #[serde(default)]
    pub generated_content: String,
}

/// One generated listing as held in session history. Immutable once
/// built; superseded only by a newer record with a different id.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedListing {
    pub id: i64,
    pub address: String,
    pub features: String,
    pub vibe: String,
    pub raw_content: String,
    pub copy: ListingCopy,
}

impl From<PropertyRecord> for GeneratedListing {
    fn from(record: PropertyRecord) -> Self {
        let copy = parse_listing_copy(&record.generated_content);
        Self {
            id: record.id,
            address: record.address,
            features: record.features,
            vibe: record.vibe,
            raw_content: record.generated_content,
            copy,
        }
    }
}

/// Text fields of a pending submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingForm {
    pub address: String,
    pub features: String,
    pub vibe: String,
}

impl ListingForm {
    pub fn clear(&mut self) {
        self.address.clear();
        self.features.clear();
        self.vibe.clear();
    }
}

// The generation model wraps its JSON in markdown fences often enough
// that every marker is removed, not just an outermost pair.
fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Normalizes the raw `generated_content` text into [`ListingCopy`].
///
/// Never fails: a payload that does not parse as structured listing copy
/// comes back as a fixed fallback carrying the raw text in
/// `full_description`, so the caller always has something renderable.
pub fn parse_listing_copy(raw: &str) -> ListingCopy {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str::<ListingCopy>(&cleaned).unwrap_or_else(|_| ListingCopy {
        title: "Generated Property".to_string(),
        short_description: "Automatically generated summary.".to_string(),
        full_description: raw.to_string(),
        highlights: vec!["See details".to_string(), "Opportunity".to_string()],
        instagram_copy: String::new(),
    })
}
