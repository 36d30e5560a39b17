use serde::Serialize;
use uuid::Uuid;

use crate::models::{AnalysisResult, Cuisine, Preferences, Recipe, BUDGET_PRESETS};
use crate::session::{Session, Step};

/// Number of discounted ingredients shown on a collapsed recipe card.
pub const DISCOUNTED_PREVIEW_LEN: usize = 3;

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub step: Step,
    pub error: Option<String>,
    pub preferences: Preferences,
    pub effective_cuisine: String,
    pub flyer: Option<FlyerView>,
    pub result: Option<ResultView>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlyerView {
    pub file_name: String,
    pub media_type: String,
    pub size: usize,
    pub is_pdf: bool,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecipeView {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub discounted_preview: Vec<String>,
    pub more_discounted: bool,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub budget: i64,
    pub cuisine: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum ResultView {
    #[serde(rename_all = "camelCase")]
    Flyer {
        is_flyer: bool,
        detected_deals: Vec<String>,
        recipes: Vec<RecipeView>,
        summary: ResultSummary,
    },
    #[serde(rename_all = "camelCase")]
    NotFlyer { is_flyer: bool, joke: String },
}

impl RecipeView {
    pub fn new(recipe: &Recipe) -> Self {
        let (discounted_preview, more_discounted) = recipe.discounted_preview(DISCOUNTED_PREVIEW_LEN);
        Self { recipe: recipe.clone(), discounted_preview, more_discounted }
    }
}

impl ResultView {
    pub fn new(result: &AnalysisResult, preferences: &Preferences) -> Self {
        match result {
            AnalysisResult::Flyer { detected_deals, recipes } => ResultView::Flyer {
                is_flyer: true,
                detected_deals: detected_deals.clone(),
                recipes: recipes.iter().map(RecipeView::new).collect(),
                summary: ResultSummary { budget: preferences.budget, cuisine: preferences.effective_cuisine() },
            },
            AnalysisResult::NotFlyer { joke } => ResultView::NotFlyer { is_flyer: false, joke: joke.clone() },
        }
    }
}

impl SessionView {
    pub fn new(id: Uuid, session: &Session) -> Self {
        let preferences = session.preferences().clone();
        Self {
            id,
            step: session.step(),
            error: session.error().map(str::to_string),
            effective_cuisine: preferences.effective_cuisine(),
            flyer: session.flyer().map(|f| FlyerView {
                file_name: f.file_name.clone(),
                media_type: f.media_type.clone(),
                size: f.size(),
                is_pdf: f.is_pdf(),
            }),
            result: session.result().map(|r| ResultView::new(r, &preferences)),
            preferences,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct CuisineOption {
    pub code: Cuisine,
    pub label: &'static str,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FormOptions {
    pub cuisines: Vec<CuisineOption>,
    pub budget_presets: Vec<i64>,
    pub default_preferences: Preferences,
}

impl FormOptions {
    pub fn current() -> Self {
        Self {
            cuisines: Cuisine::ALL.iter().map(|&code| CuisineOption { code, label: code.label() }).collect(),
            budget_presets: BUDGET_PRESETS.to_vec(),
            default_preferences: Preferences::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlyerSubmission, Ingredient};
    use crate::session::Action;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn recipe() -> Recipe {
        let ing = |name: &str, is_discounted| Ingredient { name: name.into(), quantity: "1個".into(), is_discounted };
        Recipe {
            id: "recipe-0-42".into(),
            title: "豚キャベツ炒め".into(),
            description: "特売品で簡単".into(),
            cooking_time_minutes: 10,
            estimated_cost: 450,
            savings_note: "キャベツが半額".into(),
            ingredients: vec![ing("キャベツ", true), ing("豚肉", true), ing("塩", false), ing("卵", true), ing("もやし", true)],
            instructions: vec!["炒める".into()],
        }
    }

    #[test]
    fn flyer_result_view_shape() {
        let result = AnalysisResult::Flyer { detected_deals: vec!["キャベツ".into()], recipes: vec![recipe()] };
        let value = serde_json::to_value(ResultView::new(&result, &Preferences::default())).unwrap();

        assert_eq!(value["isFlyer"], true);
        assert_eq!(value["detectedDeals"], json!(["キャベツ"]));
        assert_eq!(value["summary"], json!({ "budget": 1000, "cuisine": "和食" }));
        let card = &value["recipes"][0];
        assert_eq!(card["id"], "recipe-0-42");
        assert_eq!(card["estimatedCost"], 450);
        assert_eq!(card["discountedPreview"], json!(["キャベツ", "豚肉", "卵"]));
        assert_eq!(card["moreDiscounted"], true);
        assert_eq!(card["ingredients"][2]["isDiscounted"], false);
    }

    #[test]
    fn joke_result_view_shape() {
        let result = AnalysisResult::NotFlyer { joke: "壮大な景色ですね！".into() };
        let value = serde_json::to_value(ResultView::new(&result, &Preferences::default())).unwrap();
        assert_eq!(value, json!({ "isFlyer": false, "joke": "壮大な景色ですね！" }));
    }

    #[test]
    fn session_view_reports_flyer() {
        let mut session = Session::new();
        session
            .dispatch(Action::SelectFlyer(FlyerSubmission::new("sale.pdf", "application/pdf", vec![0u8; 10])))
            .unwrap();
        let value = serde_json::to_value(SessionView::new(Uuid::nil(), &session)).unwrap();
        assert_eq!(value["step"], "collecting");
        assert_eq!(value["flyer"], json!({ "fileName": "sale.pdf", "mediaType": "application/pdf", "size": 10, "isPdf": true }));
        assert_eq!(value["effectiveCuisine"], "和食");
        assert_eq!(value["result"], serde_json::Value::Null);
    }

    #[test]
    fn options_list_every_cuisine() {
        let value = serde_json::to_value(FormOptions::current()).unwrap();
        assert_eq!(value["cuisines"].as_array().unwrap().len(), 6);
        assert_eq!(value["cuisines"][5], json!({ "code": "OTHER", "label": "その他" }));
        assert_eq!(value["budgetPresets"], json!([500, 1000, 1500, 2000]));
    }
}
