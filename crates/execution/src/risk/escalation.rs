//! Debounced risk escalation windows.

use chrono::{DateTime, Duration, Utc};
use cruise_domain::prelude::*;

/// How long a risk range must hold before it escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationWindows {
    /// Continuous time at or below the emergency threshold.
    pub high: Duration,
    /// Continuous time in the medium range.
    pub medium: Duration,
}

impl Default for EscalationWindows {
    fn default() -> Self {
        Self {
            high: Duration::minutes(5),
            medium: Duration::minutes(10),
        }
    }
}

/// Tracks how long an agent has continuously sat in each risk range.
///
/// Elapsed time is measured between assessment timestamps, never against
/// the wall clock. Each window fires once per continuous episode and
/// re-arms as soon as a sample leaves its range. A full window stays armed
/// while its event would not move the agent out of the current state.
#[derive(Debug, Clone, Default)]
pub struct RiskEscalation {
    high_risk_start: Option<DateTime<Utc>>,
    high_fired: bool,
    medium_risk_start: Option<DateTime<Utc>>,
    medium_fired: bool,
}

impl RiskEscalation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one assessment, returning the event to send to the state
    /// machine, if any.
    pub fn observe(
        &mut self,
        assessment: &RiskAssessment,
        thresholds: RiskThresholds,
        windows: EscalationWindows,
        state: AgentState,
    ) -> Option<AgentEvent> {
        let score = assessment.health_score;
        let at = assessment.timestamp;

        if score <= thresholds.emergency {
            self.reset_medium();
            let start = *self.high_risk_start.get_or_insert(at);
            if !self.high_fired
                && at - start >= windows.high
                && state.on_event(AgentEvent::RiskHigh).is_some()
            {
                self.high_fired = true;
                return Some(AgentEvent::RiskHigh);
            }
            return None;
        }
        self.reset_high();

        if score <= thresholds.medium {
            let start = *self.medium_risk_start.get_or_insert(at);
            if !self.medium_fired
                && at - start >= windows.medium
                && state.on_event(AgentEvent::RiskMedium).is_some()
            {
                self.medium_fired = true;
                return Some(AgentEvent::RiskMedium);
            }
            return None;
        }
        self.reset_medium();

        // Recovery is not debounced.
        (state == AgentState::PartialReducing).then_some(AgentEvent::RiskResolved)
    }

    /// Start of the current high-risk episode.
    pub fn high_risk_start(&self) -> Option<DateTime<Utc>> {
        self.high_risk_start
    }

    /// Start of the current medium-risk episode.
    pub fn medium_risk_start(&self) -> Option<DateTime<Utc>> {
        self.medium_risk_start
    }

    fn reset_high(&mut self) {
        self.high_risk_start = None;
        self.high_fired = false;
    }

    fn reset_medium(&mut self) {
        self.medium_risk_start = None;
        self.medium_fired = false;
    }
}
