//! Pure WACC arithmetic. No clocks, no randomness, no shared state: the same
//! validated snapshot always yields the same bits.

use super::fingerprint::Fingerprint;
use super::input::{CostOfDebtMode, InputSnapshot};
use super::result::WaccBreakdown;
use crate::error::CalculationError;

/// Neumaier (improved Kahan) summation in iteration order.
pub fn compensated_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for value in values {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

pub fn cost_of_equity(input: &InputSnapshot) -> f64 {
    compensated_sum(input.build_up.iter().map(|component| component.value))
}

pub fn pre_tax_cost_of_debt(mode: CostOfDebtMode, components: &[f64]) -> Result<f64, CalculationError> {
    if components.len() != mode.arity() {
        return Err(CalculationError::ComputationFailure(format!(
            "mode `{}` received {} debt components",
            mode.label(),
            components.len()
        )));
    }

    match mode {
        CostOfDebtMode::WeightedRates => {
            let (r1, b1, r2, b2) = (components[0], components[1], components[2], components[3]);
            let total = b1 + b2;
            if total <= 0.0 {
                return Err(CalculationError::ComputationFailure(
                    "weighted rates with zero total balance".into(),
                ));
            }
            Ok(compensated_sum([r1 * b1, r2 * b2]) / total)
        }
        CostOfDebtMode::InterestOverDebt => {
            let interest = components[0];
            let total_debt = compensated_sum(components[1..].iter().copied());
            if total_debt <= 0.0 {
                return Err(CalculationError::ComputationFailure(
                    "interest over debt with zero total debt".into(),
                ));
            }
            Ok(interest * 100.0 / total_debt)
        }
        CostOfDebtMode::SpreadBuildUp => Ok(compensated_sum(components.iter().copied())),
    }
}

pub fn after_tax(cost_of_debt: f64, tax_rate: f64) -> f64 {
    cost_of_debt * (1.0 - tax_rate / 100.0)
}

/// Runs the arithmetic for an already validated snapshot.
pub fn compute(input: &InputSnapshot, fingerprint: Fingerprint) -> Result<WaccBreakdown, CalculationError> {
    let cost_of_equity = cost_of_equity(input);
    let pre_tax = pre_tax_cost_of_debt(input.mode, &input.cost_of_debt)?;
    let after_tax_cost = after_tax(pre_tax, input.tax_rate);

    let equity_pct = input.weights.equity;
    let debt_pct = input.weights.debt;
    let equity_contribution = equity_pct * cost_of_equity / 100.0;
    let debt_contribution = debt_pct * after_tax_cost / 100.0;
    // One division keeps 60/40 style weights exact: (60*12.5 + 40*3)/100 == 8.7.
    let wacc = (equity_pct * cost_of_equity + debt_pct * after_tax_cost) / 100.0;

    let breakdown = WaccBreakdown {
        fingerprint,
        mode: input.mode,
        cost_of_equity,
        pre_tax_cost_of_debt: pre_tax,
        after_tax_cost_of_debt: after_tax_cost,
        equity_weight: equity_pct / 100.0,
        debt_weight: debt_pct / 100.0,
        equity_contribution,
        debt_contribution,
        wacc,
    };

    let all_finite = [
        breakdown.cost_of_equity,
        breakdown.pre_tax_cost_of_debt,
        breakdown.after_tax_cost_of_debt,
        breakdown.equity_contribution,
        breakdown.debt_contribution,
        breakdown.wacc,
    ]
    .iter()
    .all(|value| value.is_finite());
    if !all_finite {
        return Err(CalculationError::ComputationFailure(format!(
            "non-finite intermediate for {fingerprint:?}"
        )));
    }

    Ok(breakdown)
}
