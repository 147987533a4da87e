use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::request::FieldCondition;
use crate::request::ReadoutRequest;
use crate::transport::PeerAddress;

/// One armed trigger on a field.
///
/// A plain `changedBy` folds into equal up and down thresholds when the
/// subscription is accepted. The baseline moves to the current value each
/// time the trigger fires, so the next event is measured against the value
/// that was actually reported.
#[derive(Debug, Clone)]
pub(crate) struct Condition {
    field_name: String,
    baseline: Option<f64>,
    changed_up: Option<f64>,
    changed_down: Option<f64>,
}

impl Condition {
    pub(crate) fn from_request(condition: &FieldCondition) -> Self {
        let (changed_up, changed_down) = match condition.changed_by {
            Some(by) => (Some(by), Some(by)),
            None => (condition.changed_up, condition.changed_down),
        };
        Condition {
            field_name: condition.field_name.clone(),
            baseline: condition.current_value,
            changed_up,
            changed_down,
        }
    }

    pub(crate) fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Fills in the baseline when the subscriber did not provide one.
    pub(crate) fn seed(
        &mut self,
        value: f64,
    ) {
        if self.baseline.is_none() {
            self.baseline = Some(value);
        }
    }

    /// Feeds a new value; true when a threshold was crossed, or
    /// unconditionally when `force` is set (maximum interval reached). The
    /// first value seen without a baseline only arms the trigger. Firing
    /// moves the baseline to the fed value.
    pub(crate) fn trigger(
        &mut self,
        value: f64,
        force: bool,
    ) -> bool {
        let baseline = match self.baseline {
            Some(baseline) => baseline,
            None => {
                self.baseline = Some(value);
                return force;
            }
        };
        if force {
            self.baseline = Some(value);
            return true;
        }

        let delta = value - baseline;
        let fired = (delta > 0.0 && self.changed_up.map_or(false, |up| delta >= up))
            || (delta < 0.0 && self.changed_down.map_or(false, |down| -delta >= down));
        if fired {
            self.baseline = Some(value);
        }
        fired
    }
}

/// An active event subscription, keyed in the registry by the subscriber's
/// lower-cased bare address. A new subscription from the same address
/// replaces the old one.
pub(crate) struct Subscription {
    pub(crate) peer: PeerAddress,
    pub(crate) seqnr: u32,
    pub(crate) request: ReadoutRequest,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) min_interval: Option<Duration>,
    pub(crate) max_interval: Option<Duration>,
    pub(crate) max_age: Option<Duration>,
    pub(crate) last_push: DateTime<Utc>,
}

impl Subscription {
    /// Feeds one batch of updated momentary values; true when an event push
    /// is owed. Inside the minimum interval nothing is evaluated, so
    /// baselines stay put; past the maximum interval every watched update
    /// fires unconditionally.
    pub(crate) fn evaluate(
        &mut self,
        updates: &[(String, f64)],
        now: DateTime<Utc>,
    ) -> bool {
        let elapsed = now - self.last_push;
        if let Some(min_interval) = self.min_interval {
            if elapsed < min_interval {
                return false;
            }
        }
        let force = self
            .max_interval
            .map_or(false, |max_interval| elapsed >= max_interval);

        let mut triggered = false;
        for (name, value) in updates {
            if !self.request.report_field(name) {
                continue;
            }
            for condition in self
                .conditions
                .iter_mut()
                .filter(|c| c.field_name() == name.as_str())
            {
                triggered |= condition.trigger(*value, force);
            }
        }
        triggered
    }
}
