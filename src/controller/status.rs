//! Condition history on `RedisSentinelStatus`.
//!
//! At most one condition per type is kept. Re-setting a condition with the
//! same status, reason and message only refreshes `lastUpdateTime`; anything
//! else replaces the record and stamps a new transition time. The list is
//! kept sorted newest first, so `conditions[0]` is the latest outcome.

use crate::crd::{Condition, ConditionStatus, ConditionType, RedisSentinelStatus};

pub const REASON_HEALTHY: &str = "Cluster available";
pub const REASON_CREATING: &str = "Creating";
pub const REASON_SCALING_UP: &str = "Scaling up";
pub const REASON_SCALING_DOWN: &str = "Scaling down";
pub const REASON_UPGRADING: &str = "Cluster upgrading";
pub const REASON_UPDATING: &str = "Cluster updating";
pub const REASON_FAILED: &str = "Cluster failed";

impl RedisSentinelStatus {
    /// Set a condition as of `now`.
    pub fn set_condition_at(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: jiff::Timestamp,
    ) {
        let mut condition = Condition::new(condition_type, status, reason, message, now);

        if let Some(pos) = self
            .conditions
            .iter()
            .position(|c| c.r#type == condition_type)
        {
            let existing = self.conditions.remove(pos);
            if existing.same_state(&condition) {
                condition.last_transition_time = existing.last_transition_time;
            }
        }

        self.conditions.insert(0, condition);
        self.sort_conditions();
    }

    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) {
        self.set_condition_at(
            condition_type,
            status,
            reason,
            message,
            jiff::Timestamp::now(),
        );
    }

    pub fn set_healthy(&mut self, message: &str) {
        self.set_condition(ConditionType::Healthy, ConditionStatus::True, REASON_HEALTHY, message);
    }

    pub fn set_creating(&mut self, message: &str) {
        self.set_condition(ConditionType::Creating, ConditionStatus::True, REASON_CREATING, message);
    }

    pub fn set_scaling_up(&mut self, message: &str) {
        self.set_condition(ConditionType::Scaling, ConditionStatus::True, REASON_SCALING_UP, message);
    }

    pub fn set_scaling_down(&mut self, message: &str) {
        self.set_condition(
            ConditionType::Scaling,
            ConditionStatus::True,
            REASON_SCALING_DOWN,
            message,
        );
    }

    pub fn set_upgrading(&mut self, message: &str) {
        self.set_condition(ConditionType::Upgrading, ConditionStatus::True, REASON_UPGRADING, message);
    }

    pub fn set_updating(&mut self, message: &str) {
        self.set_condition(ConditionType::Updating, ConditionStatus::True, REASON_UPDATING, message);
    }

    pub fn set_failed(&mut self, message: &str) {
        self.set_condition(ConditionType::Failed, ConditionStatus::True, REASON_FAILED, message);
    }

    /// Remove the condition of the given type, if any.
    pub fn clear_condition(&mut self, condition_type: ConditionType) {
        self.conditions.retain(|c| c.r#type != condition_type);
    }

    /// Most recently updated condition.
    pub fn latest(&self) -> Option<&Condition> {
        self.conditions.first()
    }

    /// Current condition of the given type.
    pub fn current(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Whether the latest condition is the given type.
    pub fn latest_is(&self, condition_type: ConditionType) -> bool {
        self.latest().is_some_and(|c| c.r#type == condition_type)
    }

    /// Sort newest first by update time. Stable, so among equal timestamps
    /// the most recently set condition stays in front.
    fn sort_conditions(&mut self) {
        self.conditions
            .sort_by_key(|c| std::cmp::Reverse(c.updated_at()));
    }
}
