use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SubmissionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the chat message a submission was parsed from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceMessageId(pub String);

impl fmt::Display for SourceMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<SourceMessageId>,
    pub conversion: String,
    pub price: String,
    pub stock: String,
    pub image: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Unvalidated input for a new submission, from either the ingress listener
/// or the HTTP API.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionDraft {
    pub source_message_id: Option<SourceMessageId>,
    pub conversion: Option<String>,
    pub price: Option<String>,
    pub stock: Option<String>,
    pub image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ValidatedDraft {
    pub source_message_id: Option<SourceMessageId>,
    pub conversion: String,
    pub price: String,
    pub stock: String,
    pub image: String,
}

impl SubmissionDraft {
    pub(crate) fn validate(self) -> Result<ValidatedDraft, SubmissionError> {
        let mut missing = Vec::new();
        let conversion = required("conversion", self.conversion, &mut missing);
        let price = required("price", self.price, &mut missing);
        let stock = required("stock", self.stock, &mut missing);
        let image = required("image", self.image, &mut missing);

        match (conversion, price, stock, image) {
            (Some(conversion), Some(price), Some(stock), Some(image)) => Ok(ValidatedDraft {
                source_message_id: self.source_message_id,
                conversion,
                price,
                stock,
                image,
            }),
            _ => Err(SubmissionError::MissingFields(missing)),
        }
    }
}

fn required(
    field: &'static str,
    value: Option<String>,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    let trimmed = value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());
    if trimmed.is_none() {
        missing.push(field);
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{SourceMessageId, Submission, SubmissionDraft, SubmissionId};
    use crate::errors::SubmissionError;

    fn draft() -> SubmissionDraft {
        SubmissionDraft {
            source_message_id: None,
            conversion: Some("BTC->ETH".to_owned()),
            price: Some("0.05".to_owned()),
            stock: Some("3".to_owned()),
            image: Some("https://cdn.example/a.png".to_owned()),
        }
    }

    #[test]
    fn validate_trims_and_accepts_complete_draft() {
        let validated = SubmissionDraft { price: Some("  0.05 ".to_owned()), ..draft() }
            .validate()
            .expect("complete draft");
        assert_eq!(validated.price, "0.05");
    }

    #[test]
    fn validate_reports_every_blank_or_absent_field() {
        let error = SubmissionDraft { price: Some("   ".to_owned()), image: None, ..draft() }
            .validate()
            .expect_err("price and image are missing");

        assert_eq!(error, SubmissionError::MissingFields(vec!["price", "image"]));
    }

    #[test]
    fn serializes_camel_case_and_omits_absent_source_message() {
        let mut submission = Submission {
            id: SubmissionId(7),
            source_message_id: None,
            conversion: "BTC->ETH".to_owned(),
            price: "0.05".to_owned(),
            stock: "3".to_owned(),
            image: "https://cdn.example/a.png".to_owned(),
            verified: false,
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        };

        let json = serde_json::to_value(&submission).expect("serialize");
        assert_eq!(json["id"], 7);
        assert_eq!(json["createdAt"], "2026-01-02T03:04:05Z");
        assert!(json.get("sourceMessageId").is_none());

        submission.source_message_id = Some(SourceMessageId("1180".to_owned()));
        let json = serde_json::to_value(&submission).expect("serialize");
        assert_eq!(json["sourceMessageId"], "1180");
    }
}
