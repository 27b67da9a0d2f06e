//! Pricing engine: maps an action and its usage to an integer credit cost.
//!
//! Pure logic only: no IO, no shared state beyond the engine's own rate tables.
//! Fractional costs are rounded up before they reach the ledger, which only
//! deals in whole credits.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pricing failure.
///
/// These are configuration-level errors: an unknown action or nonsensical
/// usage means the caller and the rate tables disagree.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PricingError {
    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("usage must not be negative, got {0}")]
    NegativeUsage(f64),

    #[error("usage must be finite")]
    NonFiniteUsage,

    #[error("invalid rate for {action}: {reason}")]
    InvalidRate { action: String, reason: String },

    #[error("cost for {0} does not fit in a credit amount")]
    CostOverflow(String),
}

/// Relative slack absorbed before rounding up, so float noise such as
/// `1.1 * 10.0 == 11.000000000000002` bills 11 credits, not 12.
pub const ROUNDING_SLACK: f64 = 1e-9;

/// Custom metering function: usage in, fractional cost out.
pub type MeterFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Rate of a metered action. The result is always rounded up.
#[derive(Clone)]
pub enum MeteredRate {
    /// `ceil(usage * rate)`.
    PerUnit(f64),
    /// `ceil(f(usage))`.
    Custom(MeterFn),
}

impl MeteredRate {
    pub fn custom(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    fn raw_cost(&self, usage: f64) -> f64 {
        match self {
            MeteredRate::PerUnit(rate) => usage * rate,
            MeteredRate::Custom(f) => f(usage),
        }
    }
}

impl fmt::Debug for MeteredRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeteredRate::PerUnit(rate) => f.debug_tuple("PerUnit").field(rate).finish(),
            MeteredRate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Rate resolved for an action, as reported by [`PricingEngine::rate_for`].
#[derive(Debug, Clone)]
pub enum Rate {
    Flat(i64),
    Metered(MeteredRate),
}

/// Serializable rate configuration.
///
/// ```json
/// { "flat": { "image_generation": 4 }, "per_unit": { "video_generation": 10.0 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    #[serde(default)]
    pub flat: BTreeMap<String, i64>,
    #[serde(default)]
    pub per_unit: BTreeMap<String, f64>,
}

impl RateTable {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Maps `(action, usage)` to an integer cost.
///
/// Flat-rate actions come from a fixed table supplied at construction;
/// metered actions may be registered afterwards.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    flat: BTreeMap<String, i64>,
    metered: BTreeMap<String, MeteredRate>,
}

impl PricingEngine {
    /// Engine with a fixed flat-rate table and no metered actions.
    pub fn new<I, S>(flat: I) -> Result<Self, PricingError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut table = BTreeMap::new();
        for (action, cost) in flat {
            let action = action.into();
            if cost < 0 {
                return Err(PricingError::InvalidRate {
                    action,
                    reason: format!("flat cost must not be negative, got {cost}"),
                });
            }
            table.insert(action, cost);
        }
        Ok(Self {
            flat: table,
            metered: BTreeMap::new(),
        })
    }

    pub fn from_table(table: RateTable) -> Result<Self, PricingError> {
        let mut engine = Self::new(table.flat)?;
        for (action, rate) in table.per_unit {
            engine.register_per_unit(action, rate)?;
        }
        Ok(engine)
    }

    /// Register (or replace) a metered action.
    pub fn register_metered(
        &mut self,
        action: impl Into<String>,
        rate: MeteredRate,
    ) -> Result<(), PricingError> {
        let action = action.into();
        if action.is_empty() {
            return Err(PricingError::InvalidRate {
                action,
                reason: "action must not be empty".to_string(),
            });
        }
        if self.flat.contains_key(&action) {
            return Err(PricingError::InvalidRate {
                action,
                reason: "already priced by the flat-rate table".to_string(),
            });
        }
        if let MeteredRate::PerUnit(r) = &rate {
            let r = *r;
            if !r.is_finite() || r < 0.0 {
                return Err(PricingError::InvalidRate {
                    action,
                    reason: format!("per-unit rate must be finite and non-negative, got {r}"),
                });
            }
        }
        self.metered.insert(action, rate);
        Ok(())
    }

    pub fn register_per_unit(
        &mut self,
        action: impl Into<String>,
        rate: f64,
    ) -> Result<(), PricingError> {
        self.register_metered(action, MeteredRate::PerUnit(rate))
    }

    pub fn rate_for(&self, action: &str) -> Option<Rate> {
        if let Some(cost) = self.flat.get(action) {
            return Some(Rate::Flat(*cost));
        }
        self.metered.get(action).cloned().map(Rate::Metered)
    }

    /// All priced actions, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self
            .flat
            .keys()
            .chain(self.metered.keys())
            .map(String::as_str)
            .collect();
        actions.sort_unstable();
        actions
    }

    /// Cost of `usage` units of `action`, rounded up to a whole credit.
    ///
    /// Flat-rate actions ignore the usage value beyond validating it. A
    /// metered result within [`ROUNDING_SLACK`] (relative) above an integer
    /// rounds down to that integer.
    pub fn calculate_cost(&self, action: &str, usage: f64) -> Result<i64, PricingError> {
        if !usage.is_finite() {
            return Err(PricingError::NonFiniteUsage);
        }
        if usage < 0.0 {
            return Err(PricingError::NegativeUsage(usage));
        }

        if let Some(cost) = self.flat.get(action) {
            return Ok(*cost);
        }

        let rate = self
            .metered
            .get(action)
            .ok_or_else(|| PricingError::UnknownAction(action.to_string()))?;

        let raw = rate.raw_cost(usage);
        if raw.is_nan() || raw < 0.0 {
            return Err(PricingError::InvalidRate {
                action: action.to_string(),
                reason: format!("metering produced {raw}"),
            });
        }

        let cost = (raw - ROUNDING_SLACK * raw.max(1.0)).ceil().max(0.0);
        if !cost.is_finite() || cost >= i64::MAX as f64 {
            return Err(PricingError::CostOverflow(action.to_string()));
        }
        Ok(cost as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine() -> PricingEngine {
        let mut engine = PricingEngine::new([("image_generation", 4), ("chat_message", 1)]).unwrap();
        engine.register_per_unit("video_generation", 10.0).unwrap();
        engine
    }

    #[test]
    fn metered_cost_is_rounded_up() {
        let engine = engine();
        assert_eq!(engine.calculate_cost("video_generation", 5.5).unwrap(), 55);
        assert_eq!(engine.calculate_cost("video_generation", 5.51).unwrap(), 56);
        assert_eq!(engine.calculate_cost("video_generation", 0.0).unwrap(), 0);
    }

    #[test]
    fn float_noise_does_not_add_a_credit() {
        let engine = engine();
        assert_eq!(engine.calculate_cost("video_generation", 1.1).unwrap(), 11);
        assert_eq!(engine.calculate_cost("video_generation", 0.3).unwrap(), 3);
        assert_eq!(engine.calculate_cost("video_generation", 1.11).unwrap(), 12);
        assert_eq!(engine.calculate_cost("video_generation", 0.0001).unwrap(), 1);
    }

    #[test]
    fn flat_cost_ignores_usage() {
        let engine = engine();
        assert_eq!(engine.calculate_cost("image_generation", 1.0).unwrap(), 4);
        assert_eq!(engine.calculate_cost("image_generation", 300.0).unwrap(), 4);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = engine().calculate_cost("teleportation", 1.0).unwrap_err();
        assert_eq!(err, PricingError::UnknownAction("teleportation".into()));
    }

    #[test]
    fn bad_usage_is_rejected() {
        let engine = engine();
        assert_eq!(
            engine.calculate_cost("video_generation", -1.0).unwrap_err(),
            PricingError::NegativeUsage(-1.0)
        );
        assert_eq!(
            engine.calculate_cost("video_generation", f64::INFINITY).unwrap_err(),
            PricingError::NonFiniteUsage
        );
        assert_eq!(
            engine.calculate_cost("image_generation", f64::NAN).unwrap_err(),
            PricingError::NonFiniteUsage
        );
    }

    #[test]
    fn custom_meter_is_rounded_up() {
        let mut engine = engine();
        engine
            .register_metered("transcription", MeteredRate::custom(|minutes| 2.0 + minutes * 0.5))
            .unwrap();
        assert_eq!(engine.calculate_cost("transcription", 3.0).unwrap(), 4);
    }

    #[test]
    fn overflowing_cost_is_reported() {
        let mut engine = engine();
        engine.register_per_unit("galaxy_render", 1e300).unwrap();
        assert_eq!(
            engine.calculate_cost("galaxy_render", 1e10).unwrap_err(),
            PricingError::CostOverflow("galaxy_render".into())
        );
    }

    #[test]
    fn invalid_registrations_are_rejected() {
        let mut engine = engine();
        assert!(engine.register_per_unit("image_generation", 2.0).is_err());
        assert!(engine.register_per_unit("x", -1.0).is_err());
        assert!(engine.register_per_unit("x", f64::NAN).is_err());
        assert!(PricingEngine::new([("refund", -3)]).is_err());
    }

    #[test]
    fn table_loads_from_json() {
        let table = RateTable::from_json(
            r#"{ "flat": { "image_generation": 4 }, "per_unit": { "video_generation": 10.0 } }"#,
        )
        .unwrap();
        let engine = PricingEngine::from_table(table).unwrap();
        assert_eq!(engine.actions(), vec!["image_generation", "video_generation"]);
        assert_eq!(engine.calculate_cost("video_generation", 5.5).unwrap(), 55);
        assert!(matches!(engine.rate_for("image_generation"), Some(Rate::Flat(4))));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a metered cost never undercharges and never overshoots
        /// by a full credit.
        #[test]
        fn per_unit_cost_is_tight_ceiling(
            usage in 0.0f64..10_000.0,
            rate in 0.0f64..100.0,
        ) {
            let mut engine = PricingEngine::default();
            engine.register_per_unit("metered", rate).unwrap();
            let cost = engine.calculate_cost("metered", usage).unwrap() as f64;
            let raw = usage * rate;
            prop_assert!(cost >= raw - ROUNDING_SLACK * raw.max(1.0));
            prop_assert!(cost - raw < 1.0);
        }

        /// Property: more usage never costs less.
        #[test]
        fn per_unit_cost_is_monotonic(
            a in 0.0f64..10_000.0,
            b in 0.0f64..10_000.0,
        ) {
            let mut engine = PricingEngine::default();
            engine.register_per_unit("metered", 3.7).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                engine.calculate_cost("metered", lo).unwrap()
                    <= engine.calculate_cost("metered", hi).unwrap()
            );
        }
    }
}
