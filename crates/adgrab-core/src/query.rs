use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ad categories the archive can be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdType {
    All,
    PoliticalAndIssue,
}

impl AdType {
    #[must_use]
    pub fn as_param(self) -> &'static str {
        match self {
            AdType::All => "ALL",
            AdType::PoliticalAndIssue => "POLITICAL_AND_ISSUE_ADS",
        }
    }
}

/// Delivery status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdStatus {
    All,
    Active,
    Inactive,
}

impl AdStatus {
    #[must_use]
    pub fn as_param(self) -> &'static str {
        match self {
            AdStatus::All => "ALL",
            AdStatus::Active => "ACTIVE",
            AdStatus::Inactive => "INACTIVE",
        }
    }
}

/// Filters for one archive collection run.
///
/// Serialized into the resume state so a resumed run re-issues the exact same
/// query; changing any filter invalidates the persisted cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdQuery {
    /// ISO 3166-1 alpha-2 codes the ads must have reached.
    pub countries: Vec<String>,
    /// Free-text search over ad creative content.
    pub search_terms: Option<String>,
    /// Restrict results to these advertiser page IDs.
    pub page_ids: Vec<String>,
    pub ad_type: AdType,
    pub ad_status: AdStatus,
    /// Earliest delivery date, inclusive.
    pub date_min: Option<NaiveDate>,
    /// Latest delivery date, inclusive.
    pub date_max: Option<NaiveDate>,
    /// Records requested per page.
    pub page_limit: u32,
}

impl Default for AdQuery {
    fn default() -> Self {
        Self {
            countries: vec!["NL".to_owned()],
            search_terms: None,
            page_ids: Vec::new(),
            ad_type: AdType::All,
            ad_status: AdStatus::All,
            date_min: None,
            date_max: None,
            page_limit: 300,
        }
    }
}

impl AdQuery {
    /// Renders the query as archive request parameters, excluding the access
    /// token and cursor (the client appends those).
    #[must_use]
    pub fn request_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if !self.countries.is_empty() {
            params.push(("ad_reached_countries".to_owned(), self.countries.join(",")));
        }
        if let Some(terms) = &self.search_terms {
            params.push(("search_terms".to_owned(), terms.clone()));
        }
        if !self.page_ids.is_empty() {
            params.push(("search_page_ids".to_owned(), self.page_ids.join(",")));
        }
        params.push(("ad_type".to_owned(), self.ad_type.as_param().to_owned()));
        params.push((
            "ad_active_status".to_owned(),
            self.ad_status.as_param().to_owned(),
        ));
        if let Some(min) = self.date_min {
            params.push((
                "ad_delivery_date_min".to_owned(),
                min.format("%Y-%m-%d").to_string(),
            ));
        }
        if let Some(max) = self.date_max {
            params.push((
                "ad_delivery_date_max".to_owned(),
                max.format("%Y-%m-%d").to_string(),
            ));
        }
        params.push(("limit".to_owned(), self.page_limit.to_string()));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn default_query_renders_required_params() {
        let q = AdQuery::default();
        let params = q.request_params();
        assert_eq!(param(&params, "ad_reached_countries"), Some("NL"));
        assert_eq!(param(&params, "ad_type"), Some("ALL"));
        assert_eq!(param(&params, "ad_active_status"), Some("ALL"));
        assert_eq!(param(&params, "limit"), Some("300"));
        assert!(param(&params, "search_terms").is_none());
        assert!(param(&params, "search_page_ids").is_none());
    }

    #[test]
    fn countries_and_page_ids_are_comma_joined() {
        let q = AdQuery {
            countries: vec!["NL".to_owned(), "BE".to_owned()],
            page_ids: vec!["123".to_owned(), "456".to_owned()],
            ..AdQuery::default()
        };
        let params = q.request_params();
        assert_eq!(param(&params, "ad_reached_countries"), Some("NL,BE"));
        assert_eq!(param(&params, "search_page_ids"), Some("123,456"));
    }

    #[test]
    fn date_range_renders_iso_dates() {
        let q = AdQuery {
            date_min: NaiveDate::from_ymd_opt(2024, 1, 1),
            date_max: NaiveDate::from_ymd_opt(2024, 6, 30),
            ..AdQuery::default()
        };
        let params = q.request_params();
        assert_eq!(param(&params, "ad_delivery_date_min"), Some("2024-01-01"));
        assert_eq!(param(&params, "ad_delivery_date_max"), Some("2024-06-30"));
    }

    #[test]
    fn query_round_trips_through_json() {
        let q = AdQuery {
            countries: vec!["DE".to_owned()],
            search_terms: Some("climate".to_owned()),
            ad_type: AdType::PoliticalAndIssue,
            ad_status: AdStatus::Active,
            date_min: NaiveDate::from_ymd_opt(2023, 5, 1),
            ..AdQuery::default()
        };
        let json = serde_json::to_string(&q).unwrap();
        let back: AdQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
