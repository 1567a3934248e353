//! Core data models for the financial planning assistant

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Income & Expenses =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSource {
    pub id: u32,
    pub source: String,
    /// Monthly amount
    pub amount: f64,
    pub frequency: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItem {
    pub id: u32,
    pub category: String,
    /// Monthly amount
    pub amount: f64,
    pub frequency: String,
    pub currency: String,
}

//
// ================= Assets & Liabilities =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHolding {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityHolding {
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub interest_rate: f64,
    pub currency: String,
}

//
// ================= Tax =================
//

/// One progressive tax tier.
///
/// Bracket tables must be contiguous and monotonically increasing, with the
/// last bracket's `max` infinite. `estimated_tax` does not validate this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBracket {
    pub min: f64,
    #[serde(with = "open_ended_max")]
    pub max: f64,
    /// Marginal rate as a decimal fraction (0.08 = 8%)
    pub rate: f64,
}

impl TaxBracket {
    /// The fixed Swiss bracket table used by the dashboard.
    pub fn swiss_default_table() -> Vec<TaxBracket> {
        vec![
            TaxBracket { min: 0.0, max: 30_000.0, rate: 0.08 },
            TaxBracket { min: 30_001.0, max: 50_000.0, rate: 0.10 },
            TaxBracket { min: 50_001.0, max: 75_000.0, rate: 0.12 },
            TaxBracket { min: 75_001.0, max: 100_000.0, rate: 0.15 },
            TaxBracket { min: 100_001.0, max: 150_000.0, rate: 0.18 },
            TaxBracket { min: 150_001.0, max: 200_000.0, rate: 0.22 },
            TaxBracket { min: 200_001.0, max: f64::INFINITY, rate: 0.25 },
        ]
    }
}

/// JSON has no Infinity; the open-ended top bracket travels as null.
mod open_ended_max {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value: Option<f64> = Option::deserialize(deserializer)?;
        Ok(value.unwrap_or(f64::INFINITY))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxDeduction {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxCredit {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxParameters {
    pub tax_brackets: Vec<TaxBracket>,
    pub available_deductions: Vec<TaxDeduction>,
    pub previous_tax_paid: f64,
    #[serde(default)]
    pub pillar3a_contribution: Option<f64>,
    pub potential_credits: Vec<TaxCredit>,
}

//
// ================= Mortgage & Property =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MortgageParameters {
    pub max_debt_to_income_ratio: f64,
    pub property_tax_rate: f64,
    pub property_insurance_rate: f64,
    /// Monthly, CHF
    pub hoa_fees: f64,
    pub new_mortgage_interest_rate: f64,
    pub mortgage_term_years: f64,
    /// Monthly, CHF
    pub other_monthly_debt_obligations: f64,
    pub down_payment_minimum_percentage: f64,
}

/// Rent side of the buy-vs-rent comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentScenario {
    pub current_monthly_rent: f64,
    pub annual_rent_increase: f64,
    /// Annual, CHF
    pub rental_insurance: f64,
}

/// Purchase side of the buy-vs-rent comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyScenario {
    pub property_value: f64,
    pub down_payment_percentage: f64,
    pub mortgage_rate: f64,
    pub mortgage_term_years: f64,
    pub property_tax_rate: f64,
    /// Annual, CHF
    pub home_insurance: f64,
    /// Fraction of current property value per year
    pub maintenance_costs: f64,
    pub estimated_appreciation_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyVsRentOutcome {
    pub rent_total_cost: f64,
    pub buy_total_cost: f64,
    pub buy_net_cost: f64,
    /// Positive favors buying, zero on tie
    pub buy_savings: f64,
    pub property_value_at_end: f64,
    pub equity_built: f64,
    pub mortgage_remaining: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MortgageAffordability {
    pub is_affordable: bool,
    pub max_loan_amount: f64,
    pub affordable_property_value: f64,
    pub monthly_payment: f64,
    pub total_monthly_housing_cost: f64,
    pub debt_to_income_ratio: f64,
}

//
// ================= Budget =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Good,
    Warning,
    Danger,
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BudgetStatus::Good => "good",
            BudgetStatus::Warning => "warning",
            BudgetStatus::Danger => "danger",
        };
        write!(f, "{}", s)
    }
}

/// Recommended vs. current spending as fractions of total income
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAllocation {
    pub recommended: f64,
    pub current: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetVariance {
    pub recommended: f64,
    pub current: f64,
    pub recommended_amount: f64,
    pub current_amount: f64,
    pub difference: f64,
    pub status: BudgetStatus,
}

//
// ================= Retirement =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementContributions {
    /// Monthly, CHF
    pub monthly: f64,
    pub current_balance: f64,
}

/// Retirement targets inferred from the conversation or supplied by the UI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_retirement_age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_annual_income: Option<f64>,
}

//
// ================= Financial Snapshot =================
//

/// The full financial picture sent along with every chat turn.
///
/// Field names follow the dashboard's JSON payload (camelCase on the wire);
/// the snapshot is dumped verbatim into the model's system instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSnapshot {
    pub income_sources: Vec<IncomeSource>,
    pub total_monthly_income: f64,
    pub monthly_savings_rate: f64,
    pub monthly_expenses: f64,
    pub net_worth: f64,
    pub assets: Vec<AssetHolding>,
    pub liabilities: Vec<LiabilityHolding>,
    /// Effective rate as a decimal fraction
    pub tax_rate: f64,
    pub retirement_contributions: RetirementContributions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mortgage_parameters: Option<MortgageParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_parameters: Option<TaxParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retirement_parameters: Option<RetirementParameters>,
}

impl FinancialSnapshot {
    /// The demo profile the dashboard ships with. Used by tests and the
    /// sample payloads; real deployments send their own snapshot per turn.
    pub fn sample() -> Self {
        let income_sources = vec![
            IncomeSource {
                id: 1,
                source: "Primary Salary".to_string(),
                amount: 9000.0,
                frequency: "monthly".to_string(),
                currency: "CHF".to_string(),
            },
            IncomeSource {
                id: 2,
                source: "Freelance Work".to_string(),
                amount: 2000.0,
                frequency: "monthly".to_string(),
                currency: "CHF".to_string(),
            },
            IncomeSource {
                id: 3,
                source: "Dividend Income".to_string(),
                amount: 500.0,
                frequency: "monthly".to_string(),
                currency: "CHF".to_string(),
            },
        ];
        let total_monthly_income = income_sources.iter().map(|s| s.amount).sum();

        Self {
            income_sources,
            total_monthly_income,
            monthly_savings_rate: 0.20,
            monthly_expenses: 8000.0,
            net_worth: 250_000.0,
            assets: vec![
                AssetHolding {
                    kind: "savings".to_string(),
                    value: 50_000.0,
                    currency: "CHF".to_string(),
                },
                AssetHolding {
                    kind: "investments".to_string(),
                    value: 120_000.0,
                    currency: "CHF".to_string(),
                },
                AssetHolding {
                    kind: "property".to_string(),
                    value: 450_000.0,
                    currency: "CHF".to_string(),
                },
            ],
            liabilities: vec![
                LiabilityHolding {
                    kind: "mortgage".to_string(),
                    amount: 350_000.0,
                    interest_rate: 0.035,
                    currency: "CHF".to_string(),
                },
                LiabilityHolding {
                    kind: "loans".to_string(),
                    amount: 20_000.0,
                    interest_rate: 0.06,
                    currency: "CHF".to_string(),
                },
            ],
            tax_rate: 0.25,
            retirement_contributions: RetirementContributions {
                monthly: 1000.0,
                current_balance: 180_000.0,
            },
            mortgage_parameters: Some(MortgageParameters {
                max_debt_to_income_ratio: 0.33,
                property_tax_rate: 0.01,
                property_insurance_rate: 0.005,
                hoa_fees: 200.0,
                new_mortgage_interest_rate: 0.03,
                mortgage_term_years: 25.0,
                other_monthly_debt_obligations: 500.0,
                down_payment_minimum_percentage: 0.2,
            }),
            tax_parameters: Some(TaxParameters {
                tax_brackets: TaxBracket::swiss_default_table(),
                available_deductions: vec![
                    TaxDeduction { name: "Pillar 3a".to_string(), amount: 6883.0 },
                    TaxDeduction { name: "Professional Expenses".to_string(), amount: 3000.0 },
                    TaxDeduction { name: "Health Insurance".to_string(), amount: 2500.0 },
                    TaxDeduction { name: "Charitable Donations".to_string(), amount: 2000.0 },
                    TaxDeduction { name: "Home Office".to_string(), amount: 1800.0 },
                ],
                previous_tax_paid: 31_500.0,
                pillar3a_contribution: Some(5000.0),
                potential_credits: vec![
                    TaxCredit {
                        name: "Energy-saving home improvements".to_string(),
                        amount: 3500.0,
                    },
                    TaxCredit { name: "Childcare expenses".to_string(), amount: 0.0 },
                    TaxCredit { name: "Education expenses".to_string(), amount: 1200.0 },
                ],
            }),
            retirement_parameters: None,
        }
    }
}
