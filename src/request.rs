use thiserror::Error;
use tracing::warn;

use crate::models::{Cuisine, FlyerSubmission, Preferences};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("flyer file must be uploaded")]
    MissingFlyer,
    #[error("enter a valid budget")]
    InvalidBudget,
}

/// A validated, ready-to-send analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub flyer: FlyerSubmission,
    pub budget: u32,
    /// Resolved cuisine label, see [`Preferences::effective_cuisine`].
    pub cuisine: String,
}

/// Checks the preconditions for an analysis call. Nothing is sent when this fails.
pub fn build_request(
    submission: Option<&FlyerSubmission>,
    preferences: &Preferences,
) -> Result<AnalysisRequest, ValidationError> {
    let flyer = submission.ok_or(ValidationError::MissingFlyer)?;
    let budget = u32::try_from(preferences.budget)
        .ok()
        .filter(|b| *b > 0)
        .ok_or(ValidationError::InvalidBudget)?;

    let cuisine = preferences.effective_cuisine();
    if preferences.cuisine == Cuisine::Other && cuisine.trim().is_empty() {
        // Sent as-is; the form does not require the custom field.
        warn!("⚠️ Custom cuisine selected with empty text; sending empty cuisine label");
    }

    Ok(AnalysisRequest { flyer: flyer.clone(), budget, cuisine })
}
