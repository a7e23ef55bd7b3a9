//! Top-level allocation across a fixed set of registered strategies:
//! weight optimization, volatility targeting, and capital allocation.
//!
//! One [`PortfolioManager`] owns the strategy roster for an agent or
//! backtest run. It never touches orders or broker state — it hands back
//! per-strategy dollar allocations that the live agent or backtest driver
//! then feeds to each strategy's own [`crate::adapter`].

use crate::optimizer::{EquityCurveMatrix, Optimizer};
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// A registered strategy slot: its dedup'd name and its magic number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyHandle {
    pub name: String,
    /// Order-tagging magic number, `10000 + registration_index`.
    pub magic: u32,
}

/// Errors from manual weight overrides and misconfiguration.
#[derive(Debug, Error, PartialEq)]
pub enum ManagerError {
    #[error("no strategies registered")]
    NoStrategies,
    #[error("weight vector has {got} entries, expected {expected}")]
    WrongLength { got: usize, expected: usize },
    #[error("weight for {name:?} is {weight}, must be in [0, 1]")]
    WeightOutOfRange { name: String, weight: f64 },
    #[error("weights sum to {sum}, expected ~1.0")]
    DoesNotSumToOne { sum: f64 },
    #[error("unknown strategy {0:?}")]
    UnknownStrategy(String),
}

/// Current manager state, exposed read-only to callers (e.g. for monitoring
/// or persistence snapshots).
#[derive(Clone, Debug)]
pub struct PortfolioStatus {
    pub weights: FxHashMap<String, f64>,
    pub current_leverage: f64,
    pub realized_volatility: Option<f64>,
    pub target_volatility: f64,
}

/// Allocates capital across a fixed roster of strategies.
///
/// Registration order is permanent: magic numbers and dedup'd names are
/// assigned once at construction and never change, even if weights do.
pub struct PortfolioManager {
    handles: Vec<StrategyHandle>,
    optimizer: Box<dyn Optimizer>,
    weights: FxHashMap<String, f64>,
    /// Target annualized portfolio volatility (`sigma*` in the leverage formula).
    target_volatility: f64,
    /// Floor on realized volatility to avoid a division blowup when a
    /// strategy roster has traded almost nothing yet.
    vol_floor: f64,
    max_leverage: f64,
    current_leverage: f64,
    realized_volatility: Option<f64>,
}

const DEFAULT_VOL_FLOOR: f64 = 0.001;
const TRADING_PERIODS_PER_YEAR: f64 = 252.0;

impl PortfolioManager {
    /// Register strategies by name with an optimizer and risk targets.
    ///
    /// Duplicate names are suffixed `_2`, `_3`, ... in registration order,
    /// matching how a caller might otherwise instantiate the same strategy
    /// twice with different parameters.
    ///
    /// `initial_weights`, if given, must have one entry per strategy (after
    /// dedup) with values in `[0, 1]` summing to ~1.0; anything else falls
    /// back to equal weight, matching [`PortfolioManager::rebalance_weights`]'s
    /// validation.
    pub fn new(
        names: Vec<String>,
        optimizer: Box<dyn Optimizer>,
        target_volatility: f64,
        max_leverage: f64,
        initial_weights: Option<FxHashMap<String, f64>>,
    ) -> Result<Self, ManagerError> {
        if names.is_empty() {
            return Err(ManagerError::NoStrategies);
        }

        let mut seen: FxHashMap<String, usize> = FxHashMap::default();
        let handles: Vec<StrategyHandle> = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let count = seen.entry(name.clone()).or_insert(0);
                *count += 1;
                let deduped = if *count == 1 {
                    name
                } else {
                    format!("{name}_{count}")
                };
                StrategyHandle {
                    name: deduped,
                    magic: 10_000 + idx as u32,
                }
            })
            .collect();

        let n = handles.len();
        let equal = 1.0 / n as f64;
        let weights = match initial_weights {
            Some(w) => Self::conform_initial_weights(w, &handles),
            None => handles.iter().map(|h| (h.name.clone(), equal)).collect(),
        };

        info!("portfolio manager constructed with weights {weights:?}");

        Ok(Self {
            handles,
            optimizer,
            weights,
            target_volatility,
            vol_floor: DEFAULT_VOL_FLOOR,
            max_leverage,
            current_leverage: 1.0,
            realized_volatility: None,
        })
    }

    /// Override the volatility floor used in the leverage calculation.
    /// Default is `0.001` (annualized).
    pub fn with_vol_floor(mut self, floor: f64) -> Self {
        self.vol_floor = floor;
        self
    }

    pub fn handles(&self) -> &[StrategyHandle] {
        &self.handles
    }

    pub fn weights(&self) -> &FxHashMap<String, f64> {
        &self.weights
    }

    pub fn current_leverage(&self) -> f64 {
        self.current_leverage
    }

    pub fn realized_volatility(&self) -> Option<f64> {
        self.realized_volatility
    }

    /// Change the volatility target. Takes effect on the next
    /// [`PortfolioManager::update_weights`] call.
    pub fn set_target_volatility(&mut self, target: f64) {
        self.target_volatility = target;
    }

    /// Re-optimize weights from a matrix of per-strategy equity curves and
    /// recompute realized volatility and leverage.
    ///
    /// Columns not matching a registered strategy name are ignored. If the
    /// optimizer can't produce a result (too few periods, degenerate data),
    /// the previous weights are kept unchanged rather than zeroed out.
    pub fn update_weights(&mut self, equity: &EquityCurveMatrix) {
        let registered: FxHashSet<&str> = self.handles.iter().map(|h| h.name.as_str()).collect();
        let equity_cols: FxHashSet<&str> = equity.columns.iter().map(|s| s.as_str()).collect();

        let missing: Vec<&str> = registered.iter().filter(|name| !equity_cols.contains(*name)).copied().collect();
        let extra: Vec<&str> = equity.columns.iter().map(|s| s.as_str()).filter(|name| !registered.contains(name)).collect();
        if !missing.is_empty() {
            warn!("update_weights: strategies missing equity data {missing:?}");
        }
        if !extra.is_empty() {
            warn!("update_weights: equity columns for unregistered strategies ignored {extra:?}");
        }

        let known: FxHashMap<&str, usize> = equity
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| self.handles.iter().any(|h| &h.name == *name))
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        if known.is_empty() {
            return;
        }

        let filtered_columns: Vec<String> = known.keys().map(|s| s.to_string()).collect();
        let filtered_rows: Vec<Vec<f64>> = equity
            .rows
            .iter()
            .map(|row| known.values().map(|&i| row[i]).collect())
            .collect();
        let filtered = EquityCurveMatrix::new(filtered_columns, filtered_rows);

        if let Some(new_weights) = self.optimizer.optimize(&filtered) {
            self.weights = new_weights;
            info!("update_weights: new weights {:?}", self.weights);
        }

        self.realized_volatility = Self::portfolio_volatility(&filtered, &self.weights);
        self.current_leverage = self.leverage_factor();
    }

    /// Manually override weights (e.g. operator intervention), bypassing
    /// the optimizer. Rejects malformed input rather than silently
    /// clamping, leaving the previous weights untouched on error.
    pub fn rebalance_weights(&mut self, weights: FxHashMap<String, f64>) -> Result<(), ManagerError> {
        Self::validate_weights(&weights, &self.handles)?;
        self.weights = Self::normalize(weights);
        Ok(())
    }

    /// Split `total_equity` (cents) across strategies by current weight and
    /// current leverage. The sum of allocations may exceed `total_equity`
    /// when leverage is above 1.0 — that's the point of leverage targeting.
    pub fn allocate_capital(&self, total_equity: i64) -> FxHashMap<String, i64> {
        self.handles
            .iter()
            .map(|h| {
                let w = self.weights.get(&h.name).copied().unwrap_or(0.0);
                let capital = (total_equity as f64 * w * self.current_leverage).round() as i64;
                (h.name.clone(), capital)
            })
            .collect()
    }

    pub fn status(&self) -> PortfolioStatus {
        PortfolioStatus {
            weights: self.weights.clone(),
            current_leverage: self.current_leverage,
            realized_volatility: self.realized_volatility,
            target_volatility: self.target_volatility,
        }
    }

    fn leverage_factor(&self) -> f64 {
        let sigma_hat = self.realized_volatility.unwrap_or(self.vol_floor).max(self.vol_floor);
        (self.target_volatility / sigma_hat).min(self.max_leverage).max(0.0)
    }

    /// Annualized std-dev of the weight-blended return series across columns.
    fn portfolio_volatility(equity: &EquityCurveMatrix, weights: &FxHashMap<String, f64>) -> Option<f64> {
        if equity.rows.len() < 2 {
            return None;
        }
        let cols = equity.columns.len();
        let w: Vec<f64> = equity
            .columns
            .iter()
            .map(|c| weights.get(c).copied().unwrap_or(0.0))
            .collect();

        let mut port_returns = Vec::with_capacity(equity.rows.len() - 1);
        for window in equity.rows.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);
            let mut blended = 0.0;
            for i in 0..cols {
                if prev[i].abs() < 1e-12 {
                    return None;
                }
                blended += w[i] * (cur[i] - prev[i]) / prev[i];
            }
            port_returns.push(blended);
        }

        let n = port_returns.len() as f64;
        if n < 2.0 {
            return None;
        }
        let mean = port_returns.iter().sum::<f64>() / n;
        let var = port_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(var.sqrt() * TRADING_PERIODS_PER_YEAR.sqrt())
    }

    fn validate_weights(weights: &FxHashMap<String, f64>, handles: &[StrategyHandle]) -> Result<(), ManagerError> {
        if weights.len() != handles.len() {
            return Err(ManagerError::WrongLength {
                got: weights.len(),
                expected: handles.len(),
            });
        }
        for h in handles {
            let Some(&w) = weights.get(&h.name) else {
                return Err(ManagerError::UnknownStrategy(h.name.clone()));
            };
            if !(0.0..=1.0).contains(&w) || !w.is_finite() {
                return Err(ManagerError::WeightOutOfRange {
                    name: h.name.clone(),
                    weight: w,
                });
            }
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ManagerError::DoesNotSumToOne { sum });
        }
        Ok(())
    }

    /// Conform a caller-supplied initial weight map to the registered
    /// roster: missing strategies get `0`, extras are dropped, and the
    /// result is renormalized to sum to `1`. Falls back to equal weight if
    /// nothing survives the intersection (e.g. no name matched at all).
    fn conform_initial_weights(weights: FxHashMap<String, f64>, handles: &[StrategyHandle]) -> FxHashMap<String, f64> {
        let missing: Vec<&str> = handles
            .iter()
            .map(|h| h.name.as_str())
            .filter(|name| !weights.contains_key(*name))
            .collect();
        let extra: Vec<&str> = weights
            .keys()
            .map(|name| name.as_str())
            .filter(|name| !handles.iter().any(|h| h.name == *name))
            .collect();
        if !missing.is_empty() {
            warn!("initial weights missing strategies {missing:?}, filling with 0");
        }
        if !extra.is_empty() {
            warn!("initial weights had unregistered strategies {extra:?}, dropping");
        }

        let mut conformed: FxHashMap<String, f64> = handles
            .iter()
            .map(|h| (h.name.clone(), weights.get(&h.name).copied().unwrap_or(0.0)))
            .collect();
        let sum: f64 = conformed.values().sum();
        if sum > 1e-12 {
            for v in conformed.values_mut() {
                *v /= sum;
            }
        } else {
            let equal = 1.0 / handles.len() as f64;
            for v in conformed.values_mut() {
                *v = equal;
            }
        }
        conformed
    }

    fn normalize(mut weights: FxHashMap<String, f64>) -> FxHashMap<String, f64> {
        let sum: f64 = weights.values().sum();
        if sum > 1e-12 {
            for v in weights.values_mut() {
                *v /= sum;
            }
        }
        weights
    }
}
