//! Financial calculations
//!
//! Pure functions behind the dashboard's numbers: income/expense aggregates,
//! progressive bracket tax, amortized mortgage payments, compound growth and
//! the buy-vs-rent comparison. Every function is a deterministic total
//! function of its inputs; malformed input degrades to degenerate numbers
//! rather than errors.

use crate::models::{
    AssetHolding, BudgetAllocation, BudgetStatus, BudgetVariance, BuyScenario, BuyVsRentOutcome,
    ExpenseItem, IncomeSource, LiabilityHolding, MortgageAffordability, MortgageParameters,
    RentScenario, TaxBracket,
};
use std::collections::HashMap;

/// Variance (CHF) within which an over/under-spend is a warning rather
/// than a danger. Preserved verbatim for compatibility with the dashboard.
pub const BUDGET_VARIANCE_WARNING_CHF: f64 = 500.0;

//
// ================= Aggregates =================
//

pub fn total_income(sources: &[IncomeSource]) -> f64 {
    sources.iter().map(|s| s.amount).sum()
}

pub fn total_expenses(items: &[ExpenseItem]) -> f64 {
    items.iter().map(|e| e.amount).sum()
}

pub fn total_assets(assets: &[AssetHolding]) -> f64 {
    assets.iter().map(|a| a.value).sum()
}

pub fn total_liabilities(liabilities: &[LiabilityHolding]) -> f64 {
    liabilities.iter().map(|l| l.amount).sum()
}

pub fn net_worth(assets: &[AssetHolding], liabilities: &[LiabilityHolding]) -> f64 {
    total_assets(assets) - total_liabilities(liabilities)
}

pub fn monthly_cash_flow(sources: &[IncomeSource], items: &[ExpenseItem]) -> f64 {
    total_income(sources) - total_expenses(items)
}

//
// ================= Tax =================
//

/// Progressive bracket walk: each bracket taxes `min(income, max) - min` at
/// its marginal rate, stopping once the income falls inside a bracket.
///
/// Monotonically non-decreasing in income; zero for non-positive income.
/// Results are undefined for non-contiguous bracket tables.
pub fn estimated_tax(annual_income: f64, brackets: &[TaxBracket]) -> f64 {
    let mut tax = 0.0;

    for bracket in brackets {
        if annual_income > bracket.min {
            let taxable_in_bracket = annual_income.min(bracket.max) - bracket.min;
            tax += taxable_in_bracket * bracket.rate;
        }

        if annual_income <= bracket.max {
            break;
        }
    }

    tax
}

//
// ================= Mortgage =================
//

/// Fixed monthly payment for a fully amortizing loan.
///
/// A zero rate falls back to straight-line repayment instead of dividing
/// by zero.
pub fn mortgage_payment(principal: f64, annual_rate: f64, term_years: f64) -> f64 {
    let monthly_rate = annual_rate / 12.0;
    let num_payments = term_years * 12.0;

    if monthly_rate == 0.0 {
        return principal / num_payments;
    }

    let growth = (1.0 + monthly_rate).powf(num_payments);
    principal * monthly_rate * growth / (growth - 1.0)
}

/// Maximum principal serviceable at a given monthly payment (inverse annuity).
pub fn max_mortgage(monthly_payment: f64, annual_rate: f64, term_years: f64) -> f64 {
    let monthly_rate = annual_rate / 12.0;
    let num_payments = term_years * 12.0;

    if monthly_rate == 0.0 {
        return monthly_payment * num_payments;
    }

    let growth = (1.0 + monthly_rate).powf(num_payments);
    monthly_payment * (growth - 1.0) / (monthly_rate * growth)
}

/// Debt-to-income affordability check for a concrete property purchase.
pub fn mortgage_affordability(
    monthly_income: f64,
    property_value: f64,
    down_payment: f64,
    params: &MortgageParameters,
) -> MortgageAffordability {
    let max_monthly_payment = monthly_income * params.max_debt_to_income_ratio
        - params.other_monthly_debt_obligations;

    let monthly_property_tax = property_value * params.property_tax_rate / 12.0;
    let monthly_insurance = property_value * params.property_insurance_rate / 12.0;

    let max_mortgage_payment =
        max_monthly_payment - monthly_property_tax - monthly_insurance - params.hoa_fees;

    let max_loan_amount = max_mortgage(
        max_mortgage_payment,
        params.new_mortgage_interest_rate,
        params.mortgage_term_years,
    );
    let affordable_property_value = max_loan_amount + down_payment;

    let requested_loan_amount = property_value - down_payment;
    let monthly_payment = mortgage_payment(
        requested_loan_amount,
        params.new_mortgage_interest_rate,
        params.mortgage_term_years,
    );

    let total_monthly_housing_cost =
        monthly_payment + monthly_property_tax + monthly_insurance + params.hoa_fees;
    let debt_to_income_ratio =
        (total_monthly_housing_cost + params.other_monthly_debt_obligations) / monthly_income;

    MortgageAffordability {
        is_affordable: debt_to_income_ratio <= params.max_debt_to_income_ratio,
        max_loan_amount,
        affordable_property_value,
        monthly_payment,
        total_monthly_housing_cost,
        debt_to_income_ratio,
    }
}

//
// ================= Growth =================
//

/// Future value with monthly compounding plus an annuity-due stream of
/// monthly contributions. Zero years returns the principal unchanged.
pub fn future_value(
    principal: f64,
    annual_rate: f64,
    years: u32,
    monthly_contribution: f64,
) -> f64 {
    let monthly_rate = annual_rate / 12.0;
    let num_months = f64::from(years * 12);

    let mut value = principal * (1.0 + monthly_rate).powf(num_months);

    if monthly_contribution > 0.0 {
        if monthly_rate == 0.0 {
            value += monthly_contribution * num_months;
        } else {
            value += monthly_contribution
                * (((1.0 + monthly_rate).powf(num_months) - 1.0) / monthly_rate)
                * (1.0 + monthly_rate);
        }
    }

    value
}

//
// ================= Buy vs. Rent =================
//

/// Year-by-year comparison of cumulative rent cost against cumulative
/// ownership cost on an appreciating property, over `years` years.
pub fn buy_vs_rent(years: u32, rent: &RentScenario, buy: &BuyScenario) -> BuyVsRentOutcome {
    // Rent side: escalating rent plus annual rental insurance
    let mut rent_total_cost = 0.0;
    let mut current_rent = rent.current_monthly_rent;

    for year in 0..years {
        if year > 0 {
            current_rent *= 1.0 + rent.annual_rent_increase;
        }
        rent_total_cost += current_rent * 12.0 + rent.rental_insurance;
    }

    // Buy side
    let down_payment = buy.property_value * buy.down_payment_percentage;
    let loan_amount = buy.property_value - down_payment;
    let monthly_mortgage_payment =
        mortgage_payment(loan_amount, buy.mortgage_rate, buy.mortgage_term_years);

    let property_value_at_end =
        buy.property_value * (1.0 + buy.estimated_appreciation_rate).powi(years as i32);

    // Remaining balance after the period
    let monthly_rate = buy.mortgage_rate / 12.0;
    let total_payments = buy.mortgage_term_years * 12.0;
    let payments_made = (f64::from(years) * 12.0).min(total_payments);

    let mortgage_remaining = if payments_made < total_payments {
        loan_amount
            * ((1.0 + monthly_rate).powf(total_payments)
                - (1.0 + monthly_rate).powf(payments_made))
            / ((1.0 + monthly_rate).powf(total_payments) - 1.0)
    } else {
        0.0
    };

    // Ownership cost: down payment plus yearly mortgage, escalating
    // property tax/maintenance off the appreciating value, and insurance
    let mut buy_total_cost = down_payment;

    for year in 0..years {
        let appreciated = buy.property_value
            * (1.0 + buy.estimated_appreciation_rate).powi(year as i32);
        let yearly_property_tax = appreciated * buy.property_tax_rate;
        let yearly_maintenance = appreciated * buy.maintenance_costs;

        buy_total_cost += monthly_mortgage_payment * 12.0
            + yearly_property_tax
            + buy.home_insurance
            + yearly_maintenance;
    }

    let equity_built = property_value_at_end - mortgage_remaining;
    let buy_net_cost = buy_total_cost - (equity_built - down_payment);
    let buy_savings = rent_total_cost - buy_net_cost;

    BuyVsRentOutcome {
        rent_total_cost,
        buy_total_cost,
        buy_net_cost,
        buy_savings,
        property_value_at_end,
        equity_built,
        mortgage_remaining,
    }
}

//
// ================= Budget =================
//

/// Per-category variance against recommended allocations.
///
/// Savings has inverted polarity: spending above the recommendation is good.
/// Every other category treats under-spending as good.
pub fn budget_variance(
    categories: &HashMap<String, BudgetAllocation>,
    total_income: f64,
) -> HashMap<String, BudgetVariance> {
    let mut result = HashMap::with_capacity(categories.len());

    for (category, allocation) in categories {
        let recommended_amount = total_income * allocation.recommended;
        let current_amount = total_income * allocation.current;
        let difference = current_amount - recommended_amount;

        let status = if category == "savings" {
            if difference >= 0.0 {
                BudgetStatus::Good
            } else if difference > -BUDGET_VARIANCE_WARNING_CHF {
                BudgetStatus::Warning
            } else {
                BudgetStatus::Danger
            }
        } else if difference <= 0.0 {
            BudgetStatus::Good
        } else if difference < BUDGET_VARIANCE_WARNING_CHF {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Danger
        };

        result.insert(
            category.clone(),
            BudgetVariance {
                recommended: allocation.recommended,
                current: allocation.current,
                recommended_amount,
                current_amount,
                difference,
                status,
            },
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FinancialSnapshot;

    fn sample_income() -> Vec<IncomeSource> {
        FinancialSnapshot::sample().income_sources
    }

    #[test]
    fn test_total_income_sums_sources() {
        assert_eq!(total_income(&sample_income()), 11_500.0);
        assert_eq!(total_income(&[]), 0.0);
    }

    #[test]
    fn test_net_worth_is_assets_minus_liabilities() {
        let snapshot = FinancialSnapshot::sample();
        let worth = net_worth(&snapshot.assets, &snapshot.liabilities);
        assert_eq!(worth, 620_000.0 - 370_000.0);

        // Pure function: repeated calls on unchanged input agree
        assert_eq!(worth, net_worth(&snapshot.assets, &snapshot.liabilities));
    }

    #[test]
    fn test_swiss_bracket_tax_on_138000() {
        let brackets = TaxBracket::swiss_default_table();
        let annual_income = total_income(&sample_income()) * 12.0;
        assert_eq!(annual_income, 138_000.0);

        // 30000*.08 + 20000*.10 + 25000*.12 + 25000*.15 + 38000*.18
        let tax = estimated_tax(annual_income, &brackets);
        let expected = 2400.0 + 1999.9 + 2999.88 + 3749.85 + 6839.82;
        assert!((tax - expected).abs() < 1.0, "tax was {}", tax);
        assert!((tax - 18_040.0).abs() < 55.0);
    }

    #[test]
    fn test_tax_monotone_and_zero_below_floor() {
        let brackets = TaxBracket::swiss_default_table();
        assert_eq!(estimated_tax(0.0, &brackets), 0.0);
        assert_eq!(estimated_tax(-5000.0, &brackets), 0.0);

        let mut previous = 0.0;
        for income in (0..400_000).step_by(10_000) {
            let tax = estimated_tax(f64::from(income), &brackets);
            assert!(tax >= previous, "tax decreased at income {}", income);
            previous = tax;
        }
    }

    #[test]
    fn test_tax_above_top_bracket() {
        let brackets = TaxBracket::swiss_default_table();
        let tax = estimated_tax(250_000.0, &brackets);
        // Top bracket is open-ended; the walk must not stop early
        assert!(tax > estimated_tax(200_000.0, &brackets));
    }

    #[test]
    fn test_mortgage_payment_total_exceeds_principal() {
        let payment = mortgage_payment(640_000.0, 0.015, 25.0);
        assert!(payment * 25.0 * 12.0 >= 640_000.0);
        assert!(payment > 0.0);
    }

    #[test]
    fn test_mortgage_payment_zero_rate_is_straight_line() {
        let payment = mortgage_payment(120_000.0, 0.0, 10.0);
        assert_eq!(payment, 1000.0);
    }

    #[test]
    fn test_max_mortgage_inverts_payment() {
        let principal = 500_000.0;
        let payment = mortgage_payment(principal, 0.035, 30.0);
        let recovered = max_mortgage(payment, 0.035, 30.0);
        assert!((recovered - principal).abs() < 1e-6);
    }

    #[test]
    fn test_future_value_zero_years_is_principal() {
        assert_eq!(future_value(10_000.0, 0.05, 0, 500.0), 10_000.0);
        assert_eq!(future_value(10_000.0, 0.0, 0, 0.0), 10_000.0);
    }

    #[test]
    fn test_future_value_grows_with_contributions() {
        let without = future_value(10_000.0, 0.05, 10, 0.0);
        let with = future_value(10_000.0, 0.05, 10, 200.0);
        assert!(without > 10_000.0);
        assert!(with > without);
    }

    #[test]
    fn test_buy_vs_rent_sample_scenario() {
        let rent = RentScenario {
            current_monthly_rent: 2500.0,
            annual_rent_increase: 0.02,
            rental_insurance: 300.0,
        };
        let buy = BuyScenario {
            property_value: 800_000.0,
            down_payment_percentage: 0.2,
            mortgage_rate: 0.015,
            mortgage_term_years: 25.0,
            property_tax_rate: 0.01,
            home_insurance: 1200.0,
            maintenance_costs: 0.01,
            estimated_appreciation_rate: 0.03,
        };

        let outcome = buy_vs_rent(10, &rent, &buy);

        // Rent escalates: first year 2500*12 + 300
        assert!(outcome.rent_total_cost > 10.0 * (2500.0 * 12.0 + 300.0));
        // Property appreciates at 3% over 10 years
        let expected_value = 800_000.0 * 1.03_f64.powi(10);
        assert!((outcome.property_value_at_end - expected_value).abs() < 1e-6);
        // Mid-term: some balance remains, equity is value minus balance
        assert!(outcome.mortgage_remaining > 0.0);
        assert!(outcome.mortgage_remaining < 640_000.0);
        assert!(
            (outcome.equity_built
                - (outcome.property_value_at_end - outcome.mortgage_remaining))
                .abs()
                < 1e-9
        );
        // Signed advantage is consistent with the two net costs
        assert!(
            (outcome.buy_savings - (outcome.rent_total_cost - outcome.buy_net_cost)).abs() < 1e-9
        );
    }

    #[test]
    fn test_buy_vs_rent_past_full_term_has_no_balance() {
        let rent = RentScenario {
            current_monthly_rent: 2000.0,
            annual_rent_increase: 0.02,
            rental_insurance: 300.0,
        };
        let buy = BuyScenario {
            property_value: 500_000.0,
            down_payment_percentage: 0.2,
            mortgage_rate: 0.02,
            mortgage_term_years: 15.0,
            property_tax_rate: 0.01,
            home_insurance: 1000.0,
            maintenance_costs: 0.01,
            estimated_appreciation_rate: 0.02,
        };

        let outcome = buy_vs_rent(20, &rent, &buy);
        assert_eq!(outcome.mortgage_remaining, 0.0);
    }

    #[test]
    fn test_budget_variance_matching_allocation_is_good() {
        let mut categories = HashMap::new();
        categories.insert(
            "food".to_string(),
            BudgetAllocation { recommended: 0.15, current: 0.15 },
        );

        let result = budget_variance(&categories, 11_500.0);
        let food = &result["food"];
        assert_eq!(food.difference, 0.0);
        assert_eq!(food.status, BudgetStatus::Good);
    }

    #[test]
    fn test_budget_variance_savings_polarity_inverted() {
        let income = 10_000.0;
        let mut categories = HashMap::new();
        // Saving more than recommended: good
        categories.insert(
            "savings".to_string(),
            BudgetAllocation { recommended: 0.15, current: 0.20 },
        );
        // Spending more than recommended by the same margin: danger
        categories.insert(
            "entertainment".to_string(),
            BudgetAllocation { recommended: 0.05, current: 0.10 },
        );

        let result = budget_variance(&categories, income);
        assert_eq!(result["savings"].status, BudgetStatus::Good);
        assert_eq!(result["entertainment"].status, BudgetStatus::Danger);
    }

    #[test]
    fn test_budget_variance_warning_band() {
        let income = 10_000.0;
        let mut categories = HashMap::new();
        // 3% of 10000 = 300 CHF over, inside the 500 CHF warning band
        categories.insert(
            "food".to_string(),
            BudgetAllocation { recommended: 0.15, current: 0.18 },
        );
        // Savings shortfall of 300 CHF, also a warning
        categories.insert(
            "savings".to_string(),
            BudgetAllocation { recommended: 0.15, current: 0.12 },
        );

        let result = budget_variance(&categories, income);
        assert_eq!(result["food"].status, BudgetStatus::Warning);
        assert_eq!(result["savings"].status, BudgetStatus::Warning);
    }

    #[test]
    fn test_affordability_flags_overstretched_purchase() {
        let params = FinancialSnapshot::sample().mortgage_parameters.unwrap();

        let modest = mortgage_affordability(11_500.0, 600_000.0, 120_000.0, &params);
        let stretched = mortgage_affordability(11_500.0, 2_500_000.0, 200_000.0, &params);

        assert!(modest.is_affordable);
        assert!(!stretched.is_affordable);
        assert!(stretched.debt_to_income_ratio > modest.debt_to_income_ratio);
    }
}
