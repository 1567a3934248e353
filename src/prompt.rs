//! System instruction assembly
//!
//! The model is steered entirely through a per-turn system instruction:
//! calculator rules, the verified financial data as JSON, and context
//! sections derived from the conversation state. Everything here is pure
//! string building over already-validated inputs.

use crate::context::state::RetirementContext;
use crate::context::{ConversationState, TopicList};
use crate::error::Result;
use crate::models::FinancialSnapshot;

const CALCULATOR_RULES: &str = "You are a precise financial calculator that:
1. ONLY uses the provided financialParameters - NEVER invent or assume numbers
2. For mortgage questions, ALWAYS use the mortgageParameters values provided
3. For tax questions, ALWAYS use the taxParameters values provided
4. Shows exact mathematical calculations step-by-step using the provided data
5. Clearly states \"I need more information about X\" if any required data is missing
6. Each response must reference specific numbers from financialParameters
7. Uses bullet points for calculations and multi-step answers
8. Only gives financial advice based on actual numbers in financialParameters
9. For mortgage calculations, always consider:
   - Monthly income and debt-to-income ratio
   - Property taxes and insurance
   - HOA fees
   - New mortgage interest rates
   - Minimum down payment requirements
10. For tax calculations, always consider:
   - Available deductions and credits
   - Tax brackets and progressive rates
   - Retirement contribution benefits
   - Potential tax optimization strategies
11. For retirement calculations, always consider:
   - Current age vs target retirement age
   - Years until retirement
   - Current retirement savings
   - Monthly contributions
   - Target retirement income
   - Withdrawal strategies and expected return rates
12. If asked in Turkish, respond in Turkish. Otherwise respond in English.";

const CONTINUITY_RULES: &str = "CRITICAL CONVERSATION INSTRUCTIONS:
1. Maintain perfect conversation continuity - if the user says \"yes\" or gives a short confirmation, ALWAYS continue with the calculation or analysis you were previously discussing
2. If you previously asked a question, and the user gives a short reply, assume they are answering your question
3. NEVER lose track of the ongoing calculation or analysis
4. If you ask a question like \"Would you like me to calculate X?\" and the user says \"yes\", immediately perform that calculation without asking for more information
5. For ALL follow-up questions from the user, maintain the context of previous questions and answers
6. NEVER ask \"What would you like to calculate?\" when the calculation topic is already established
7. When the user uses pronouns like \"it\", \"this\", \"that\", look at recent topics and previous messages to understand the reference
8. If you're unsure about what the user is asking, reference their recent questions
9. When the user gives a short message like \"1m chf\", interpret it as a currency value of 1 million Swiss francs in the context of your previous question
10. For ANY numeric value without explicit context, look at your previous questions to understand what the user is referring to
11. If the user gives you a value without context, apply it to the most recently discussed financial topic or question";

const REMINDERS: &str = "Remember:
- NEVER make assumptions about missing data
- ONLY use numbers from financialParameters except when the user explicitly provides new values
- ALWAYS show your calculations using provided data
- Keep responses focused on the actual numbers
- MAINTAIN FULL CONVERSATION CONTEXT across multiple messages
- ALWAYS interpret short inputs in the context of your previous questions";

/// Assemble the full system instruction for one turn.
pub fn build_system_instruction(
    snapshot: &FinancialSnapshot,
    state: &ConversationState,
    topics: &TopicList,
    short_response_context: Option<&str>,
    is_value_response: bool,
) -> Result<String> {
    let conversation_context = format!(
        "CONVERSATION CONTEXT:\n{}\n{}\n{}",
        state_context(state, is_value_response),
        topics_context(topics),
        short_response_context.unwrap_or(""),
    );

    Ok(format!(
        "{}\n\n{}\n\n{}\n\n{}\n{}",
        CALCULATOR_RULES,
        conversation_context,
        CONTINUITY_RULES,
        REMINDERS,
        financial_context(snapshot, &state.retirement)?,
    ))
}

/// The verified financial data block: JSON dump plus the mortgage, tax
/// and retirement summaries.
fn financial_context(
    snapshot: &FinancialSnapshot,
    retirement: &RetirementContext,
) -> Result<String> {
    let json = serde_json::to_string_pretty(snapshot)?;
    Ok(format!(
        "Use ONLY this verified financial data for your calculations:\n{}\n\n{}\n\n{}\n\n{}",
        json,
        mortgage_context(snapshot),
        tax_context(snapshot),
        retirement_context(snapshot, retirement),
    ))
}

fn mortgage_context(snapshot: &FinancialSnapshot) -> String {
    match &snapshot.mortgage_parameters {
        Some(params) => format!(
            "For mortgage calculations, use these exact parameters:\n\
             - Maximum debt-to-income ratio: {}\n\
             - Property tax rate: {}\n\
             - Property insurance rate: {}\n\
             - Monthly HOA fees: CHF {}\n\
             - New mortgage interest rate: {}\n\
             - Mortgage term: {} years\n\
             - Other monthly debt obligations: CHF {}\n\
             - Required minimum down payment: {}%\n\
             - Monthly income: CHF {}",
            params.max_debt_to_income_ratio,
            params.property_tax_rate,
            params.property_insurance_rate,
            params.hoa_fees,
            params.new_mortgage_interest_rate,
            params.mortgage_term_years,
            params.other_monthly_debt_obligations,
            params.down_payment_minimum_percentage * 100.0,
            snapshot.total_monthly_income,
        ),
        None => "No mortgage parameters available for calculations.".to_string(),
    }
}

fn tax_context(snapshot: &FinancialSnapshot) -> String {
    let params = match &snapshot.tax_parameters {
        Some(params) => params,
        None => return "No detailed tax parameters available for calculations.".to_string(),
    };

    let deductions = params
        .available_deductions
        .iter()
        .map(|d| format!("{}: CHF {}", d.name, d.amount))
        .collect::<Vec<_>>()
        .join(", ");

    let brackets = params
        .tax_brackets
        .iter()
        .map(|b| {
            let max = if b.max.is_finite() {
                format!("{}", b.max)
            } else {
                "Infinity".to_string()
            };
            format!("{}-{}: {}%", b.min, max, b.rate * 100.0)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let credits = params
        .potential_credits
        .iter()
        .map(|c| format!("{}: CHF {}", c.name, c.amount))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "For tax calculations, use these exact parameters:\n\
         - Current tax rate: {}%\n\
         - Annual income: CHF {}\n\
         - Available tax deductions: {}\n\
         - Tax brackets: {}\n\
         - Previous tax paid: {}\n\
         - Potential tax credits: {}\n\
         - Retirement contributions: Pillar 2: CHF {}, Pillar 3a: CHF {}",
        snapshot.tax_rate * 100.0,
        snapshot.total_monthly_income * 12.0,
        deductions,
        brackets,
        params.previous_tax_paid,
        credits,
        snapshot.retirement_contributions.monthly * 12.0,
        params.pillar3a_contribution.unwrap_or(0.0),
    )
}

fn retirement_context(snapshot: &FinancialSnapshot, retirement: &RetirementContext) -> String {
    if retirement.is_empty() {
        return String::new();
    }

    let mut out = String::from("RETIREMENT PLANNING CONTEXT:");

    if let Some(age) = retirement.current_age {
        out.push_str(&format!("\n- Current age: {} years", age));
    }
    if let Some(target) = retirement.target_retirement_age {
        out.push_str(&format!("\n- Target retirement age: {} years", target));
    }
    if let Some(timeframe) = retirement.years_until_retirement {
        out.push_str(&format!("\n- Years until retirement: {} years", timeframe));
    }
    if let Some(income) = retirement.target_annual_income {
        out.push_str(&format!("\n- Target retirement income: CHF {} per year", income));
    }

    out.push_str(&format!(
        "\n- Current retirement savings: CHF {}",
        snapshot.retirement_contributions.current_balance
    ));
    out.push_str(&format!(
        "\n- Monthly retirement contributions: CHF {}",
        snapshot.retirement_contributions.monthly
    ));
    out.push_str(&format!("\n- Monthly income: CHF {}", snapshot.total_monthly_income));
    out.push_str(&format!("\n- Monthly expenses: CHF {}", snapshot.monthly_expenses));
    out.push_str(&format!(
        "\n- Monthly savings rate: {}%",
        snapshot.monthly_savings_rate * 100.0
    ));

    out
}

fn state_context(state: &ConversationState, is_value_response: bool) -> String {
    let active = match &state.active_topic {
        Some(active) => active,
        None => return String::new(),
    };

    let mut out = format!("The user is currently interested in: {}.", active);

    if !state.calculation_context.is_empty() {
        // BTreeMap-like stable output for a HashMap
        let mut pairs: Vec<_> = state.calculation_context.iter().collect();
        pairs.sort();
        let values = pairs
            .iter()
            .map(|(k, v)| format!("\"{}\":\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!(" Relevant values for this calculation: {{{}}}.", values));
    }
    if let Some(property) = &state.last_property_discussed {
        out.push_str(&format!(" The user mentioned a property value of {}.", property));
    }
    if let Some(income) = state.last_income_discussed {
        out.push_str(&format!(" The user mentioned an income of CHF {}.", income));
    }
    if is_value_response {
        if let Some(value) = &state.last_value_mentioned {
            out.push_str(&format!(
                " The user just provided a value of {} in response to your question.",
                value
            ));
        }
    }

    out
}

fn topics_context(topics: &TopicList) -> String {
    if topics.is_empty() {
        return String::new();
    }
    format!(
        "Recent topics discussed: {}. If the user refers to \"it\" or uses other pronouns, assume they're referring to one of these topics.",
        topics.summary()
    )
}
