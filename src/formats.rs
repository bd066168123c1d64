use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One retrieved page, as captured by the batch fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCapture {
    pub source_url: String,
    pub raw_content: String,
    /// Markdown rendition of `raw_content`.
    pub text_content: String,
    pub success: bool,
}

impl PageCapture {
    pub fn failed(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            raw_content: String::new(),
            text_content: String::new(),
            success: false,
        }
    }
}

/// Structured details of a freelance service listing.
// Doc comments here become schema descriptions sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractedRecord {
    /// The name of the author of that project
    pub author_name: String,
    pub title: String,
    /// The whole description of the project
    pub description: String,
    pub hourly_rate: String,
    /// The list of prices in several tiers. There may be sometimes it has only one price
    pub prices_in_dollar: Vec<i64>,
    pub review_count: u32,
    /// Overall rating from 0 to 5 stars
    pub overall_rating: f64,
    pub comments: Vec<String>,
    /// Location of the author
    pub author_location: String,
    /// The percentage of job success from 0 to 100, from the author profile
    pub author_job_success_rate: f64,
    /// A description about author
    pub author_bio: String,
    /// A markdown table for the section what included
    pub whats_included: String,
}

impl ExtractedRecord {
    /// Column names in field declaration order.
    pub const COLUMNS: [&'static str; 12] = [
        "author_name",
        "title",
        "description",
        "hourly_rate",
        "prices_in_dollar",
        "review_count",
        "overall_rating",
        "comments",
        "author_location",
        "author_job_success_rate",
        "author_bio",
        "whats_included",
    ];

    pub fn validate(&self) -> Result<(), String> {
        if self.prices_in_dollar.is_empty() {
            return Err("prices_in_dollar must contain at least one price".to_owned());
        }
        if !(0.0..=5.0).contains(&self.overall_rating) {
            return Err(format!(
                "overall_rating must be within [0, 5], got {}",
                self.overall_rating
            ));
        }
        if !(0.0..=100.0).contains(&self.author_job_success_rate) {
            return Err(format!(
                "author_job_success_rate must be within [0, 100], got {}",
                self.author_job_success_rate
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> ExtractedRecord {
    ExtractedRecord {
        author_name: "Ana".to_owned(),
        title: "I will design a minimalist logo".to_owned(),
        description: "Clean vector logos.".to_owned(),
        hourly_rate: "$30-$45".to_owned(),
        prices_in_dollar: vec![50, 120, 300],
        review_count: 42,
        overall_rating: 4.9,
        comments: vec!["Great work".to_owned()],
        author_location: "Lisbon, Portugal".to_owned(),
        author_job_success_rate: 98.0,
        author_bio: "Brand designer.".to_owned(),
        whats_included: "| Tier | Concepts |\n|---|---|\n| Basic | 1 |".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_follow_serialized_field_order() -> anyhow::Result<()> {
        let json = serde_json::to_string(&sample_record())?;
        let positions = ExtractedRecord::COLUMNS
            .iter()
            .map(|column| json.find(&format!("\"{column}\":")))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| anyhow::anyhow!("column missing from serialized record"))?;
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        Ok(())
    }

    #[test]
    fn validate_accepts_boundary_values() {
        let mut record = sample_record();
        record.overall_rating = 5.0;
        record.author_job_success_rate = 0.0;
        assert_eq!(record.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_missing_prices() {
        let mut record = sample_record();
        record.prices_in_dollar.clear();
        assert!(record.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_rating() {
        let mut record = sample_record();
        record.overall_rating = 5.5;
        assert!(record.validate().is_err());

        let mut record = sample_record();
        record.author_job_success_rate = f64::NAN;
        assert!(record.validate().is_err());
    }

    #[test]
    fn negative_review_count_does_not_deserialize() -> anyhow::Result<()> {
        let mut value = serde_json::to_value(sample_record())?;
        value["review_count"] = serde_json::json!(-1);
        assert!(serde_json::from_value::<ExtractedRecord>(value).is_err());
        Ok(())
    }
}
