use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::analysis::{parse_reply, AnalysisError, FlyerAnalyzer, ReplyError};
use crate::models::AnalysisResult;
use crate::request::AnalysisRequest;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("Reply error: {0}")] Reply(#[from] ReplyError),
    #[error("Other: {0}")] Other(String),
}

// Shortens inline file payloads so request bodies stay readable in logs
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...[{} chars total]", &text[..cut], text.chars().count()),
        None => text.to_string(),
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, self.api_key)
    }

    /// Sends one generateContent request and returns the reply text of the first candidate.
    async fn perform_api_call(&self, body: &GenerateRequest) -> Result<String, GeminiError> {
        let url = self.endpoint();
        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(mut logged) = serde_json::to_value(body) {
                truncate_base64_in_json(&mut logged);
                debug!("📤 Request body: {}", serde_json::to_string_pretty(&logged).unwrap_or_default());
            }
        }

        let response = self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string().replace(&self.api_key, "***")))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await
            .map_err(|e| GeminiError::Http(e.to_string().replace(&self.api_key, "***")))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", preview(&response_text, 1000));
            return Err(GeminiError::Http(format!("status={} body={}", status, preview(&response_text, 300))));
        }
        debug!("📥 Raw Gemini API response: {}", preview(&response_text, 1000));

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Other(format!("envelope parse error: {}", e)))?;

        extract_reply_text(&parsed).ok_or(GeminiError::Reply(ReplyError::EmptyResponse))
    }

    pub async fn analyze_flyer(&self, request: &AnalysisRequest) -> Result<AnalysisResult, GeminiError> {
        let prompt = build_prompt(request.budget, &request.cuisine);
        info!(
            "🎯 Analyzing flyer '{}' ({}, {} bytes) budget={} cuisine='{}'",
            request.flyer.file_name, request.flyer.media_type, request.flyer.size(), request.budget, request.cuisine
        );

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: request.flyer.media_type.clone(),
                            data: base64::engine::general_purpose::STANDARD.encode(&request.flyer.bytes),
                        },
                    },
                    RequestPart::Text { text: prompt },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let text = self.perform_api_call(&body).await?;
        let result = parse_reply(&text, Utc::now().timestamp_millis())?;
        match &result {
            AnalysisResult::Flyer { detected_deals, recipes } => {
                info!("✅ Flyer detected: {} deals, {} recipes", detected_deals.len(), recipes.len());
            }
            AnalysisResult::NotFlyer { joke } => {
                info!("😄 Not a flyer: {}", preview(joke, 60));
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl FlyerAnalyzer for GeminiClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_flyer(request).await.map_err(|e| {
            error!("❌ Flyer analysis failed: {}", e);
            AnalysisError::new(e)
        })
    }
}

pub fn build_prompt(budget: u32, cuisine: &str) -> String {
    format!(
        "You are a budget-cooking expert and a stand-up comedian with a quick comeback.\n\
        Decide whether the attached file (an image or a PDF) is a supermarket sales flyer.\n\
        \n\
        Case 1: it is a sales flyer.\n\
        - Set isFlyer to true and joke to null.\n\
        - Put the main discounted items you can read on the flyer in detectedDeals.\n\
        - Suggest exactly 3 recipes in the \"{cuisine}\" style, each costing around {budget} yen.\n\
        - Build every recipe around the flyer's discounted items and mark those ingredients with isDiscounted = true.\n\
        - For each recipe give a title, a short description, cookingTimeMinutes, estimatedCost in yen, \
        a savingsNote naming the flyer items that make it a bargain, the ingredients in order, and the cooking steps in order.\n\
        \n\
        Case 2: it is not a sales flyer.\n\
        - Set isFlyer to false.\n\
        - Look at what the image actually shows and put one playful remark about it in joke. \
        For a cat photo: 「食べちゃいたいくらい可愛いですが、今日の晩御飯にはできません！」 \
        For a landscape: 「壮大な景色ですね！でもここには特売のキャベツは生えてなさそうです。」\n\
        - Leave detectedDeals and recipes as empty arrays.\n\
        \n\
        Write every text value in Japanese. Respond with JSON only."
    )
}

/// Structured output schema declared with every request.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "isFlyer": { "type": "BOOLEAN", "description": "true if the file is a supermarket sales flyer, otherwise false" },
            "joke": { "type": "STRING", "description": "Humorous remark when the file is not a flyer; null or empty for a flyer" },
            "detectedDeals": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Main discounted items and ingredients found on the flyer"
            },
            "recipes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING", "description": "Recipe name" },
                        "description": { "type": "STRING", "description": "Short description of the dish" },
                        "cookingTimeMinutes": { "type": "INTEGER", "description": "Cooking time in minutes" },
                        "estimatedCost": { "type": "INTEGER", "description": "Estimated cost in yen" },
                        "savingsNote": { "type": "STRING", "description": "Why this recipe saves money and which flyer items it uses" },
                        "ingredients": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "name": { "type": "STRING" },
                                    "quantity": { "type": "STRING" },
                                    "isDiscounted": { "type": "BOOLEAN", "description": "true if this is a discounted flyer item" }
                                },
                                "required": ["name", "quantity", "isDiscounted"]
                            }
                        },
                        "instructions": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "Cooking steps in order"
                        }
                    },
                    "required": ["title", "description", "cookingTimeMinutes", "estimatedCost", "ingredients", "instructions", "savingsNote"]
                }
            }
        },
        "required": ["isFlyer", "joke", "detectedDeals", "recipes"]
    })
}

// --- Request Body ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content { parts: Vec<RequestPart> }

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text { text: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: ResponseContent }

#[derive(Debug, Deserialize, Default)]
struct ResponseContent { #[serde(default)] parts: Vec<ResponsePart> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponsePart {
    Text { text: String },
    Other(Value),
}

/// Concatenated text parts of the first candidate, or `None` when there is no text at all.
fn extract_reply_text(resp: &GeminiResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    let text: String = candidate.content.parts.iter()
        .filter_map(|p| match p {
            ResponsePart::Text { text } => Some(text.as_str()),
            ResponsePart::Other(_) => None,
        })
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}
