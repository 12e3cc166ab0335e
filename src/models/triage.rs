use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{Lifecycle, PatientID, TriageID, TriageLevel, UserID};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageStatus {
    Waiting,
    InTreatment,
    Completed,
    LeftWithoutBeingSeen,
    Transferred,
}

impl TriageStatus {
    /// Waiting or being treated
    pub fn is_active(self) -> bool {
        matches!(self, TriageStatus::Waiting | TriageStatus::InTreatment)
    }
}

impl Lifecycle for TriageStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use TriageStatus::*;
        matches!(
            (self, next),
            (Waiting, InTreatment)
                | (Waiting, LeftWithoutBeingSeen)
                | (Waiting, Transferred)
                | (InTreatment, Completed)
                | (InTreatment, Transferred)
        )
    }

    fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// Observations taken at intake. Every reading is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub heart_rate: Option<u16>,
    pub systolic_bp: Option<u16>,
    pub diastolic_bp: Option<u16>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<u16>,
    pub oxygen_saturation: Option<u8>,
    pub pain_score: Option<u8>,
}

impl Vitals {
    /// Returns the name of the first reading outside a plausible range
    pub fn implausible_reading(&self) -> Option<&'static str> {
        fn outside<T: PartialOrd>(value: Option<T>, low: T, high: T) -> bool {
            value.is_some_and(|v| v < low || v > high)
        }

        if outside(self.heart_rate, 20, 300) {
            Some("heart_rate")
        } else if outside(self.systolic_bp, 40, 300) {
            Some("systolic_bp")
        } else if outside(self.diastolic_bp, 20, 200) {
            Some("diastolic_bp")
        } else if outside(self.temperature, 25.0, 45.0) || self.temperature.is_some_and(f64::is_nan) {
            Some("temperature")
        } else if outside(self.respiratory_rate, 4, 80) {
            Some("respiratory_rate")
        } else if outside(self.oxygen_saturation, 40, 100) {
            Some("oxygen_saturation")
        } else if self.pain_score.is_some_and(|p| p > 10) {
            Some("pain_score")
        } else {
            None
        }
    }

    /// Level suggested by the observations when the assessor gives none
    pub fn suggested_level(&self) -> TriageLevel {
        let spo2 = self.oxygen_saturation;
        let hr = self.heart_rate;
        let rr = self.respiratory_rate;
        let temp = self.temperature;
        let pain = self.pain_score;

        let critical = spo2.is_some_and(|s| s < 90)
            || rr.is_some_and(|r| !(10..=30).contains(&r))
            || hr.is_some_and(|h| !(40..=130).contains(&h))
            || self.systolic_bp.is_some_and(|bp| bp < 90);
        if critical {
            return TriageLevel::Immediate;
        }

        let serious = spo2.is_some_and(|s| s < 94)
            || hr.is_some_and(|h| h > 110)
            || temp.is_some_and(|t| t >= 39.5)
            || pain.is_some_and(|p| p >= 8);
        if serious {
            return TriageLevel::Urgent;
        }

        if pain.is_some_and(|p| p >= 4) || temp.is_some_and(|t| t >= 38.0) {
            return TriageLevel::LessUrgent;
        }

        TriageLevel::NonUrgent
    }
}

/// One visit through the emergency department queue
#[derive(Debug, Clone, Serialize)]
pub struct TriageEntry {
    pub id: TriageID,
    pub patient_id: PatientID,
    pub level: TriageLevel,
    pub status: TriageStatus,
    pub chief_complaint: String,
    pub vitals: Vitals,
    pub notes: Option<String>,
    pub assessed_by: UserID,
    pub arrived_at: DateTime<Utc>,
    pub treatment_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use TriageStatus::*;
        assert!(Waiting.can_transition_to(InTreatment));
        assert!(Waiting.can_transition_to(LeftWithoutBeingSeen));
        assert!(InTreatment.can_transition_to(Completed));
        assert!(!Waiting.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Waiting));
        assert!(!InTreatment.can_transition_to(Waiting));
        assert!(Completed.is_terminal() && Transferred.is_terminal());
        assert!(!Waiting.is_terminal());
    }

    #[test]
    fn test_suggested_level_from_vitals() {
        let hypoxic = Vitals {
            oxygen_saturation: Some(86),
            ..Default::default()
        };
        assert_eq!(hypoxic.suggested_level(), TriageLevel::Immediate);

        let tachypnoeic = Vitals {
            respiratory_rate: Some(34),
            ..Default::default()
        };
        assert_eq!(tachypnoeic.suggested_level(), TriageLevel::Immediate);

        let febrile = Vitals {
            temperature: Some(39.8),
            heart_rate: Some(104),
            ..Default::default()
        };
        assert_eq!(febrile.suggested_level(), TriageLevel::Urgent);

        let sprain = Vitals {
            pain_score: Some(5),
            heart_rate: Some(80),
            ..Default::default()
        };
        assert_eq!(sprain.suggested_level(), TriageLevel::LessUrgent);

        assert_eq!(Vitals::default().suggested_level(), TriageLevel::NonUrgent);
    }

    #[test]
    fn test_implausible_readings() {
        assert_eq!(Vitals::default().implausible_reading(), None);

        let bad_spo2 = Vitals {
            oxygen_saturation: Some(120),
            ..Default::default()
        };
        assert_eq!(bad_spo2.implausible_reading(), Some("oxygen_saturation"));

        let bad_pain = Vitals {
            pain_score: Some(11),
            ..Default::default()
        };
        assert_eq!(bad_pain.implausible_reading(), Some("pain_score"));

        let bad_temp = Vitals {
            temperature: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(bad_temp.implausible_reading(), Some("temperature"));
    }
}
