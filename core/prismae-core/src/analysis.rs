//! Client for the food-text analysis proxy.
//!
//! The proxy fronts the model provider so no provider key ships in the app.
//! Requests authenticate with a static app token; when a user is signed in
//! their JWT rides along in `X-Supabase-Token` so the proxy can rate-limit
//! per user.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::error::{AnalysisError, CoreError, Result};

const USER_TOKEN_HEADER: &str = "X-Supabase-Token";
const DEFAULT_GEO_SUGGESTION: &str = "You can still log meals manually.";

/// One food item recognised in the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedFood {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub calories: f64,
    #[serde(default, alias = "protein_g")]
    pub protein: f64,
    #[serde(default, alias = "carbs_g")]
    pub carbs: f64,
    #[serde(default, alias = "fat_g")]
    pub fat: f64,
}

/// The proxy's answer for one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase", default)]
pub struct FoodAnalysis {
    pub foods: Vec<AnalyzedFood>,
    #[serde(alias = "total_calories")]
    pub total_calories: f64,
    #[serde(alias = "total_protein")]
    pub total_protein: f64,
    #[serde(alias = "total_carbs")]
    pub total_carbs: f64,
    #[serde(alias = "total_fat")]
    pub total_fat: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    text: &'a str,
    user_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    suggestion: Option<String>,
}

/// Maps a non-success proxy response to the closed error set.
pub fn map_analysis_error(status: u16, body: &str) -> AnalysisError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    match status {
        429 => AnalysisError::RateLimited,
        401 => AnalysisError::Unauthorized,
        451 => AnalysisError::GeoRestricted {
            suggestion: parsed
                .suggestion
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEO_SUGGESTION.to_string()),
        },
        _ => AnalysisError::Api {
            status,
            message: parsed
                .message
                .or(parsed.error)
                .unwrap_or_else(|| body.trim().to_string()),
        },
    }
}

pub struct AnalysisClient {
    endpoint: String,
    token: String,
    http: Client,
}

impl AnalysisClient {
    pub fn new(config: &CoreConfig) -> Result<Self> {
        if config.analysis_proxy_url.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                field: "analysis_proxy_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CoreError::http("build HTTP client", None, e.to_string()))?;

        Ok(Self {
            endpoint: config.analysis_proxy_url.trim().to_string(),
            token: config.analysis_proxy_token.trim().to_string(),
            http,
        })
    }

    /// Sends `text` for nutrition analysis. Empty text fails without a request.
    pub fn analyze_text(
        &self,
        text: &str,
        user_id: Option<&str>,
        user_jwt: Option<&str>,
    ) -> std::result::Result<FoodAnalysis, AnalysisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        let mut request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&AnalyzeRequest { text, user_id });
        if let Some(jwt) = user_jwt {
            request = request.header(USER_TOKEN_HEADER, jwt);
        }

        let response = request
            .send()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let err = map_analysis_error(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), error = %err, "Analysis request rejected");
            return Err(err);
        }

        response
            .json()
            .map_err(|e| AnalysisError::Decode(e.to_string()))
    }
}
