//! Contract between the session flow and whatever service reads the flyer.
//!
//! The model replies with one flat JSON object for both outcomes. [`parse_reply`]
//! turns that into an [`AnalysisResult`] right away so nothing downstream ever
//! sees the ambiguous shape.

use async_trait::async_trait;
use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};
use thiserror::Error;

use crate::models::{AnalysisResult, Ingredient, Recipe};
use crate::request::AnalysisRequest;

pub const ANALYSIS_FAILED_MESSAGE: &str = "an error occurred while analyzing the flyer; please try again";

#[async_trait]
pub trait FlyerAnalyzer: Send + Sync {
    /// One round trip, no retry.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// User-facing failure. The cause is kept for logs only and never shown.
#[derive(Debug, Error)]
#[error("{}", ANALYSIS_FAILED_MESSAGE)]
pub struct AnalysisError {
    #[source]
    cause: Box<dyn std::error::Error + Send + Sync>,
}

impl AnalysisError {
    pub fn new(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self { cause: cause.into() }
    }

    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("empty response text")]
    EmptyResponse,
    #[error("reply is not valid JSON for the declared schema: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("non-flyer reply without a joke")]
    MissingJoke,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    is_flyer: bool,
    #[serde(default)]
    joke: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    detected_deals: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    recipes: Vec<RawRecipe>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecipe {
    title: String,
    description: String,
    cooking_time_minutes: u32,
    estimated_cost: u32,
    savings_note: String,
    ingredients: Vec<Ingredient>,
    instructions: Vec<String>,
}

impl RawRecipe {
    fn into_recipe(self, id: String) -> Recipe {
        Recipe {
            id,
            title: self.title,
            description: self.description,
            cooking_time_minutes: self.cooking_time_minutes,
            estimated_cost: self.estimated_cost,
            savings_note: self.savings_note,
            ingredients: self.ingredients,
            instructions: self.instructions,
        }
    }
}

/// Id for the recipe at `index`; distinct within one result because the index is.
pub fn recipe_id(index: usize, stamp_millis: i64) -> String {
    format!("recipe-{index}-{stamp_millis}")
}

/// Parses the model's reply text and applies the post-processing rules:
/// absent or null arrays become empty, every recipe gets a local id, and
/// fields belonging to the other branch are dropped.
pub fn parse_reply(text: &str, stamp_millis: i64) -> Result<AnalysisResult, ReplyError> {
    if text.trim().is_empty() {
        return Err(ReplyError::EmptyResponse);
    }
    let raw: RawReply = serde_json::from_str(text.trim())?;

    if !raw.is_flyer {
        let joke = raw.joke.filter(|j| !j.trim().is_empty()).ok_or(ReplyError::MissingJoke)?;
        return Ok(AnalysisResult::NotFlyer { joke });
    }

    let recipes = raw
        .recipes
        .into_iter()
        .enumerate()
        .map(|(index, r)| r.into_recipe(recipe_id(index, stamp_millis)))
        .collect();
    Ok(AnalysisResult::Flyer { detected_deals: raw.detected_deals, recipes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    const STAMP: i64 = 1_767_225_600_000;

    fn recipe_json(title: &str) -> serde_json::Value {
        serde_json::json!({
            "title": title,
            "description": "特売の豚肉で作る定番料理",
            "cookingTimeMinutes": 25,
            "estimatedCost": 780,
            "savingsNote": "豚こま切れ肉が30%引き",
            "ingredients": [
                {"name": "豚こま切れ肉", "quantity": "200g", "isDiscounted": true},
                {"name": "醤油", "quantity": "大さじ2", "isDiscounted": false}
            ],
            "instructions": ["切る", "炒める", "煮る"]
        })
    }

    #[test]
    fn flyer_reply_gets_distinct_ids() {
        let text = serde_json::json!({
            "isFlyer": true,
            "joke": null,
            "detectedDeals": ["豚こま切れ肉", "キャベツ"],
            "recipes": [recipe_json("生姜焼き"), recipe_json("回鍋肉"), recipe_json("肉じゃが")]
        })
        .to_string();

        let result = parse_reply(&text, STAMP).unwrap();
        assert!(result.is_flyer());
        assert_eq!(result.detected_deals(), ["豚こま切れ肉", "キャベツ"]);
        let ids: Vec<&str> = result.recipes().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![
            "recipe-0-1767225600000",
            "recipe-1-1767225600000",
            "recipe-2-1767225600000"
        ]);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 3);
    }

    #[test]
    fn recipe_fields_and_order_survive() {
        let text = serde_json::json!({"isFlyer": true, "joke": "", "detectedDeals": [], "recipes": [recipe_json("生姜焼き")]})
            .to_string();
        let result = parse_reply(&text, STAMP).unwrap();
        let recipe = &result.recipes()[0];
        assert_eq!(recipe.title, "生姜焼き");
        assert_eq!(recipe.cooking_time_minutes, 25);
        assert_eq!(recipe.estimated_cost, 780);
        assert_eq!(recipe.instructions, vec!["切る", "炒める", "煮る"]);
        assert_eq!(recipe.ingredients[0].name, "豚こま切れ肉");
        assert!(recipe.ingredients[0].is_discounted);
        assert!(!recipe.ingredients[1].is_discounted);
    }

    #[test]
    fn missing_arrays_default_to_empty() {
        let result = parse_reply(r#"{"isFlyer": true}"#, STAMP).unwrap();
        assert_eq!(result, AnalysisResult::Flyer { detected_deals: vec![], recipes: vec![] });
    }

    #[test]
    fn null_arrays_default_to_empty() {
        let result = parse_reply(r#"{"isFlyer": true, "joke": null, "detectedDeals": null, "recipes": null}"#, STAMP).unwrap();
        assert_eq!(result, AnalysisResult::Flyer { detected_deals: vec![], recipes: vec![] });
    }

    #[test]
    fn flyer_branch_drops_joke() {
        let result = parse_reply(r#"{"isFlyer": true, "joke": "stray", "detectedDeals": ["卵"], "recipes": []}"#, STAMP).unwrap();
        assert_eq!(result.joke(), None);
    }

    #[test]
    fn non_flyer_branch_drops_deals_and_recipes() {
        let text = serde_json::json!({
            "isFlyer": false,
            "joke": "食べちゃいたいくらい可愛いですが、今日の晩御飯にはできません！",
            "detectedDeals": ["猫"],
            "recipes": [recipe_json("猫まんま")]
        })
        .to_string();
        let result = parse_reply(&text, STAMP).unwrap();
        assert_eq!(
            result,
            AnalysisResult::NotFlyer { joke: "食べちゃいたいくらい可愛いですが、今日の晩御飯にはできません！".into() }
        );
    }

    #[test]
    fn non_flyer_without_joke_is_rejected() {
        assert!(matches!(parse_reply(r#"{"isFlyer": false, "joke": "  "}"#, STAMP), Err(ReplyError::MissingJoke)));
        assert!(matches!(parse_reply(r#"{"isFlyer": false}"#, STAMP), Err(ReplyError::MissingJoke)));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(parse_reply("", STAMP), Err(ReplyError::EmptyResponse)));
        assert!(matches!(parse_reply(" \n", STAMP), Err(ReplyError::EmptyResponse)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(parse_reply("Sure! Here are three recipes:", STAMP), Err(ReplyError::Parse(_))));
        assert!(matches!(parse_reply(r#"{"joke": "no flag"}"#, STAMP), Err(ReplyError::Parse(_))));
    }

    #[test]
    fn analysis_error_hides_cause() {
        let err = AnalysisError::new(ReplyError::EmptyResponse);
        assert_eq!(err.to_string(), ANALYSIS_FAILED_MESSAGE);
        assert_eq!(err.cause().to_string(), "empty response text");
    }
}
