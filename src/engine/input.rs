use serde::{Deserialize, Serialize};

use crate::error::CalculationError;

/// One named premium in the build-up model (risk-free rate, equity risk
/// premium, size premium, company-specific premium...), in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildUpComponent {
    pub name: String,
    pub value: f64,
}

impl BuildUpComponent {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// How the pre-tax cost of debt is derived from the four debt components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostOfDebtMode {
    /// `[rate_1, balance_1, rate_2, balance_2]`: balance-weighted average rate.
    WeightedRates,
    /// `[interest_expense, short_term_debt, long_term_debt, other_debt]`:
    /// interest expense over total outstanding debt.
    InterestOverDebt,
    /// `[base_rate, credit_spread, country_premium, other_premium]`: summed.
    SpreadBuildUp,
}

impl CostOfDebtMode {
    pub const fn arity(self) -> usize {
        match self {
            Self::WeightedRates | Self::InterestOverDebt | Self::SpreadBuildUp => 4,
        }
    }

    /// Stable discriminant fed into the fingerprint.
    pub const fn tag(self) -> u8 {
        match self {
            Self::WeightedRates => 1,
            Self::InterestOverDebt => 2,
            Self::SpreadBuildUp => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::WeightedRates => "weighted_rates",
            Self::InterestOverDebt => "interest_over_debt",
            Self::SpreadBuildUp => "spread_build_up",
        }
    }
}

/// Capital structure, both sides in percent of total capital.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapitalWeights {
    pub debt: f64,
    pub equity: f64,
}

/// Everything the engine needs for one WACC calculation, as captured from the
/// wizard at submit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub build_up: Vec<BuildUpComponent>,
    pub cost_of_debt: Vec<f64>,
    pub weights: CapitalWeights,
    pub tax_rate: f64,
    pub mode: CostOfDebtMode,
}

impl InputSnapshot {
    pub fn new(
        build_up: Vec<BuildUpComponent>,
        cost_of_debt: Vec<f64>,
        weights: CapitalWeights,
        tax_rate: f64,
        mode: CostOfDebtMode,
    ) -> Self {
        Self {
            build_up,
            cost_of_debt,
            weights,
            tax_rate,
            mode,
        }
    }

    /// Fails fast on the first offending field, in declaration order.
    pub fn validate(&self, weight_tolerance: f64) -> Result<(), CalculationError> {
        if self.build_up.is_empty() {
            return Err(CalculationError::invalid(
                "build_up",
                "at least one build-up component is required",
            ));
        }
        for (i, component) in self.build_up.iter().enumerate() {
            if component.name.trim().is_empty() {
                return Err(CalculationError::invalid(
                    format!("build_up[{i}].name"),
                    "component name must not be empty",
                ));
            }
            check_non_negative(&format!("build_up[{i}].value"), component.value)?;
        }

        let arity = self.mode.arity();
        if self.cost_of_debt.len() != arity {
            return Err(CalculationError::invalid(
                "cost_of_debt",
                format!(
                    "mode `{}` expects {arity} components, got {}",
                    self.mode.label(),
                    self.cost_of_debt.len()
                ),
            ));
        }
        for (i, value) in self.cost_of_debt.iter().enumerate() {
            check_non_negative(&format!("cost_of_debt[{i}]"), *value)?;
        }

        check_non_negative("weights.debt", self.weights.debt)?;
        check_non_negative("weights.equity", self.weights.equity)?;
        let total = self.weights.debt + self.weights.equity;
        if (total - 100.0).abs() > weight_tolerance {
            return Err(CalculationError::invalid(
                "weights",
                format!("debt and equity weights sum to {total}, expected 100"),
            ));
        }

        if !self.tax_rate.is_finite() || !(0.0..=100.0).contains(&self.tax_rate) {
            return Err(CalculationError::invalid(
                "tax_rate",
                format!("tax rate {} is outside [0, 100]", self.tax_rate),
            ));
        }

        self.validate_mode()
    }

    fn validate_mode(&self) -> Result<(), CalculationError> {
        let c = &self.cost_of_debt;
        match self.mode {
            CostOfDebtMode::WeightedRates if c[1] + c[3] <= 0.0 => Err(CalculationError::invalid(
                "cost_of_debt",
                "weighted rates need a positive total balance",
            )),
            CostOfDebtMode::InterestOverDebt if c[1] + c[2] + c[3] <= 0.0 => {
                Err(CalculationError::invalid(
                    "cost_of_debt",
                    "interest over debt needs a positive total debt",
                ))
            }
            _ => Ok(()),
        }
    }
}

fn check_non_negative(path: &str, value: f64) -> Result<(), CalculationError> {
    if !value.is_finite() {
        return Err(CalculationError::invalid(path, "value must be finite"));
    }
    if value < 0.0 {
        return Err(CalculationError::invalid(
            path,
            format!("value {value} must not be negative"),
        ));
    }
    Ok(())
}
