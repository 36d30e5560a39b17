//! Wizard state for one user: collecting input, waiting on the analysis call,
//! then showing the result until reset.
//!
//! Every change goes through [`Session::dispatch`]. A rejected action leaves
//! the session untouched, except `Submit`, which records the validation message.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisError;
use crate::models::{AnalysisResult, FlyerSubmission, Preferences};
use crate::request::{build_request, AnalysisRequest, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Collecting,
    Submitting,
    ShowingResult,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::Collecting => "collecting",
            Step::Submitting => "submitting",
            Step::ShowingResult => "showing a result",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Collecting { error: Option<String> },
    Submitting,
    ShowingResult(AnalysisResult),
}

#[derive(Debug)]
pub enum Action {
    SelectFlyer(FlyerSubmission),
    ClearFlyer,
    SetPreferences(Preferences),
    Submit,
    Resolve { ticket: u64, outcome: Result<AnalysisResult, AnalysisError> },
    Reset,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::SelectFlyer(_) => "select a flyer",
            Action::ClearFlyer => "clear the flyer",
            Action::SetPreferences(_) => "change preferences",
            Action::Submit => "submit",
            Action::Resolve { .. } => "resolve an analysis",
            Action::Reset => "reset",
        }
    }
}

/// What the caller must do after a transition.
#[derive(Debug)]
pub enum Effect {
    None,
    /// Run the analysis and feed the outcome back as `Action::Resolve` with this ticket.
    Analyze { ticket: u64, request: AnalysisRequest },
    /// The outcome belonged to an attempt that was reset; nothing changed.
    Discarded,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while {step}")]
    InvalidTransition { step: Step, action: &'static str },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug)]
pub struct Session {
    state: ViewState,
    preferences: Preferences,
    flyer: Option<FlyerSubmission>,
    /// Bumped on submit and reset so a late outcome cannot land on a newer attempt.
    ticket: u64,
    last_active: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: ViewState::Collecting { error: None },
            preferences: Preferences::default(),
            flyer: None,
            ticket: 0,
            last_active: Utc::now(),
        }
    }

    pub fn step(&self) -> Step {
        match self.state {
            ViewState::Collecting { .. } => Step::Collecting,
            ViewState::Submitting => Step::Submitting,
            ViewState::ShowingResult(_) => Step::ShowingResult,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn flyer(&self) -> Option<&FlyerSubmission> {
        self.flyer.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ViewState::Collecting { error } => error.as_deref(),
            _ => None,
        }
    }

    /// Time of the last dispatched action, accepted or not.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            ViewState::ShowingResult(result) => Some(result),
            _ => None,
        }
    }

    pub fn dispatch(&mut self, action: Action) -> Result<Effect, SessionError> {
        let step = self.step();
        self.last_active = Utc::now();
        match (step, action) {
            (Step::Collecting, Action::SelectFlyer(flyer)) => {
                debug!(file = %flyer.file_name, bytes = flyer.size(), "flyer selected");
                self.release_flyer();
                self.flyer = Some(flyer);
                self.state = ViewState::Collecting { error: None };
                Ok(Effect::None)
            }
            (Step::Collecting, Action::ClearFlyer) => {
                self.release_flyer();
                self.state = ViewState::Collecting { error: None };
                Ok(Effect::None)
            }
            (Step::Collecting, Action::SetPreferences(preferences)) => {
                self.preferences = preferences;
                Ok(Effect::None)
            }
            (Step::Collecting, Action::Submit) => match build_request(self.flyer.as_ref(), &self.preferences) {
                Ok(request) => {
                    self.ticket += 1;
                    self.state = ViewState::Submitting;
                    Ok(Effect::Analyze { ticket: self.ticket, request })
                }
                Err(e) => {
                    self.state = ViewState::Collecting { error: Some(e.to_string()) };
                    Err(e.into())
                }
            },
            (Step::Submitting, Action::Resolve { ticket, outcome }) if ticket == self.ticket => {
                match outcome {
                    Ok(result) => {
                        self.release_flyer();
                        self.state = ViewState::ShowingResult(result);
                    }
                    Err(e) => {
                        self.state = ViewState::Collecting { error: Some(e.to_string()) };
                    }
                }
                Ok(Effect::None)
            }
            (_, Action::Resolve { ticket, .. }) => {
                warn!(ticket, current = self.ticket, %step, "discarding stale analysis outcome");
                Ok(Effect::Discarded)
            }
            (_, Action::Reset) => {
                info!(%step, "session reset");
                self.ticket += 1;
                self.release_flyer();
                self.preferences = Preferences::default();
                self.state = ViewState::Collecting { error: None };
                Ok(Effect::None)
            }
            (step, action) => Err(SessionError::InvalidTransition { step, action: action.name() }),
        }
    }

    fn release_flyer(&mut self) {
        if let Some(old) = self.flyer.take() {
            debug!(file = %old.file_name, "flyer released");
        }
    }
}
