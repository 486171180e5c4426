//! Status condition helpers

use crate::crd::Condition;

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

pub const DATABASE_AVAILABLE: &str = "DatabaseAvailable";

/// Insert or update the condition of `type_`.
///
/// `lastTransitionTime` only moves when the status changes.
/// `observed_generation` is the DSPA generation the condition was computed from.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    let now = chrono::Utc::now().to_rfc3339();
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            existing.status = status.to_string();
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = observed_generation;
        }
        None => conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_missing_condition() {
        let mut conditions = vec![];
        set_condition(
            &mut conditions,
            DATABASE_AVAILABLE,
            CONDITION_STATUS_TRUE,
            "DatabaseAvailable",
            "ok",
            Some(3),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].observed_generation, Some(3));
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut conditions = vec![Condition {
            type_: DATABASE_AVAILABLE.to_string(),
            status: CONDITION_STATUS_TRUE.to_string(),
            last_transition_time: "2024-01-01T00:00:00+00:00".to_string(),
            reason: "DatabaseAvailable".to_string(),
            message: "ok".to_string(),
            observed_generation: Some(1),
        }];

        set_condition(
            &mut conditions,
            DATABASE_AVAILABLE,
            CONDITION_STATUS_TRUE,
            "DatabaseAvailable",
            "still ok",
            Some(2),
        );
        assert_eq!(conditions[0].last_transition_time, "2024-01-01T00:00:00+00:00");
        assert_eq!(conditions[0].message, "still ok");
        assert_eq!(conditions[0].observed_generation, Some(2));

        set_condition(
            &mut conditions,
            DATABASE_AVAILABLE,
            CONDITION_STATUS_FALSE,
            "DatabaseUnavailable",
            "down",
            Some(2),
        );
        assert_ne!(conditions[0].last_transition_time, "2024-01-01T00:00:00+00:00");
        assert_eq!(conditions.len(), 1);
    }
}
