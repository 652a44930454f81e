use serde::{Deserialize, Serialize};

/// One video as fetched by the collector, tagged with the topic that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub channel_id: String,
    pub channel_title: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub tags: Vec<String>,
    pub category_id: String,
    pub topic: String,
}

/// A row of the cleaned table. Field order is the column order of the CSV output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub channel_id: String,
    pub channel_title: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub tags: Vec<String>,
    pub category_id: String,
    pub topic: String,
    pub publication_year: i32,
    pub years_since_publication: i32,
    pub avg_views_per_year: f64,
    pub engagement_rate: f64,
    pub main_topic: String,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_two_places() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(-12.344), -12.34);
        assert_eq!(round2(0.0), 0.0);
    }
}
