use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Quick-pick budgets (yen) offered next to the free-form budget field.
pub const BUDGET_PRESETS: [i64; 4] = [500, 1000, 1500, 2000];

pub const DEFAULT_BUDGET: i64 = 1000;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cuisine {
    #[default]
    Japanese,
    Western,
    Chinese,
    Omotenashi,
    Elaborate,
    Other,
}

impl Cuisine {
    pub const ALL: [Cuisine; 6] = [
        Cuisine::Japanese,
        Cuisine::Western,
        Cuisine::Chinese,
        Cuisine::Omotenashi,
        Cuisine::Elaborate,
        Cuisine::Other,
    ];

    /// Canonical label sent to the model and shown in the result summary.
    pub fn label(self) -> &'static str {
        match self {
            Cuisine::Japanese => "和食",
            Cuisine::Western => "洋食",
            Cuisine::Chinese => "中華",
            Cuisine::Omotenashi => "おもてなし",
            Cuisine::Elaborate => "凝った料理",
            Cuisine::Other => "その他",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Kept signed so that a cleared or negative form value reaches validation.
    pub budget: i64,
    pub cuisine: Cuisine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_cuisine: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { budget: DEFAULT_BUDGET, cuisine: Cuisine::Japanese, custom_cuisine: None }
    }
}

impl Preferences {
    /// `OTHER` substitutes the free-text field verbatim; every other cuisine uses its label.
    pub fn effective_cuisine(&self) -> String {
        match self.cuisine {
            Cuisine::Other => self.custom_cuisine.clone().unwrap_or_default(),
            c => c.label().to_string(),
        }
    }
}

/// The uploaded flyer. Dropping it releases the buffered upload.
#[derive(Debug, Clone)]
pub struct FlyerSubmission {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl FlyerSubmission {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { file_name: file_name.into(), media_type: media_type.into(), bytes: bytes.into() }
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type == "application/pdf"
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Mirrors the upload picker filter `image/*,application/pdf`.
    pub fn accepts_media_type(media_type: &str) -> bool {
        let essence = media_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        essence == "application/pdf" || essence.strip_prefix("image/").is_some_and(|sub| !sub.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
    pub is_discounted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cooking_time_minutes: u32,
    pub estimated_cost: u32,
    pub savings_note: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
}

impl Recipe {
    /// First `limit` discounted ingredient names in source order, and whether any were left out.
    pub fn discounted_preview(&self, limit: usize) -> (Vec<String>, bool) {
        let mut discounted = self.ingredients.iter().filter(|i| i.is_discounted);
        let preview: Vec<String> = discounted.by_ref().take(limit).map(|i| i.name.clone()).collect();
        (preview, discounted.next().is_some())
    }
}

/// Outcome of one analysis. The wire reply is flat; this is the tagged form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    Flyer { detected_deals: Vec<String>, recipes: Vec<Recipe> },
    NotFlyer { joke: String },
}

impl AnalysisResult {
    pub fn is_flyer(&self) -> bool {
        matches!(self, AnalysisResult::Flyer { .. })
    }

    pub fn joke(&self) -> Option<&str> {
        match self {
            AnalysisResult::NotFlyer { joke } => Some(joke),
            AnalysisResult::Flyer { .. } => None,
        }
    }

    pub fn detected_deals(&self) -> &[String] {
        match self {
            AnalysisResult::Flyer { detected_deals, .. } => detected_deals,
            AnalysisResult::NotFlyer { .. } => &[],
        }
    }

    pub fn recipes(&self) -> &[Recipe] {
        match self {
            AnalysisResult::Flyer { recipes, .. } => recipes,
            AnalysisResult::NotFlyer { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ingredient(name: &str, is_discounted: bool) -> Ingredient {
        Ingredient { name: name.into(), quantity: "1".into(), is_discounted }
    }

    fn recipe_with(ingredients: Vec<Ingredient>) -> Recipe {
        Recipe {
            id: "recipe-0-1".into(),
            title: "肉じゃが".into(),
            description: String::new(),
            cooking_time_minutes: 30,
            estimated_cost: 800,
            savings_note: String::new(),
            ingredients,
            instructions: vec![],
        }
    }

    #[test]
    fn other_cuisine_uses_custom_text_verbatim() {
        let prefs = Preferences {
            budget: 800,
            cuisine: Cuisine::Other,
            custom_cuisine: Some("  タイ料理 ".into()),
        };
        assert_eq!(prefs.effective_cuisine(), "  タイ料理 ");
    }

    #[test]
    fn listed_cuisines_use_label_and_ignore_custom_text() {
        for cuisine in Cuisine::ALL.into_iter().filter(|c| *c != Cuisine::Other) {
            let prefs = Preferences { budget: 1, cuisine, custom_cuisine: Some("ignored".into()) };
            assert_eq!(prefs.effective_cuisine(), cuisine.label());
        }
    }

    #[test]
    fn other_without_custom_text_resolves_to_empty() {
        let prefs = Preferences { cuisine: Cuisine::Other, ..Preferences::default() };
        assert_eq!(prefs.effective_cuisine(), "");
    }

    #[test]
    fn default_preferences() {
        let prefs = Preferences::default();
        assert_eq!(prefs.budget, 1000);
        assert_eq!(prefs.cuisine, Cuisine::Japanese);
        assert!(prefs.custom_cuisine.is_none());
    }

    #[test]
    fn preferences_wire_shape() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"budget":1500,"cuisine":"OTHER","customCuisine":"韓国料理"}"#).unwrap();
        assert_eq!(prefs.cuisine, Cuisine::Other);
        assert_eq!(prefs.custom_cuisine.as_deref(), Some("韓国料理"));
        assert_eq!(serde_json::to_value(Cuisine::Omotenashi).unwrap(), "OMOTENASHI");
    }

    #[test]
    fn media_type_filter() {
        assert!(FlyerSubmission::accepts_media_type("image/jpeg"));
        assert!(FlyerSubmission::accepts_media_type("image/png"));
        assert!(FlyerSubmission::accepts_media_type("application/pdf"));
        assert!(FlyerSubmission::accepts_media_type("Application/PDF; name=x"));
        assert!(!FlyerSubmission::accepts_media_type("image/"));
        assert!(!FlyerSubmission::accepts_media_type("text/plain"));
        assert!(!FlyerSubmission::accepts_media_type("application/octet-stream"));
    }

    #[test]
    fn pdf_detection() {
        assert!(FlyerSubmission::new("a.pdf", "application/pdf", vec![1u8]).is_pdf());
        assert!(!FlyerSubmission::new("a.jpg", "image/jpeg", vec![1u8]).is_pdf());
    }

    #[test]
    fn discounted_preview_keeps_source_order() {
        let recipe = recipe_with(vec![
            ingredient("醤油", false),
            ingredient("豚肉", true),
            ingredient("玉ねぎ", true),
            ingredient("砂糖", false),
            ingredient("じゃがいも", true),
            ingredient("人参", true),
        ]);
        let (names, more) = recipe.discounted_preview(3);
        assert_eq!(names, vec!["豚肉", "玉ねぎ", "じゃがいも"]);
        assert!(more);
    }

    #[test]
    fn discounted_preview_without_overflow() {
        let recipe = recipe_with(vec![ingredient("豚肉", true), ingredient("塩", false)]);
        let (names, more) = recipe.discounted_preview(3);
        assert_eq!(names, vec!["豚肉"]);
        assert!(!more);
    }

    #[test]
    fn not_flyer_has_no_deals_or_recipes() {
        let result = AnalysisResult::NotFlyer { joke: "猫は特売品ではありません".into() };
        assert!(!result.is_flyer());
        assert!(result.detected_deals().is_empty());
        assert!(result.recipes().is_empty());
        assert_eq!(result.joke(), Some("猫は特売品ではありません"));
    }
}
