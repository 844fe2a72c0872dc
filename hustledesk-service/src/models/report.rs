//! Period summary arithmetic.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct SalesTotals {
    pub total_cents: i64,
    pub paid_cents: i64,
    pub order_count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct ExpenseTotals {
    pub total_cents: i64,
    pub expense_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalesSection {
    pub total_cents: i64,
    pub paid_cents: i64,
    pub outstanding_cents: i64,
    pub order_count: i64,
    pub change_percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpenseSection {
    pub total_cents: i64,
    pub count: i64,
    pub change_percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfitSection {
    pub amount_cents: i64,
    pub change_percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PreviousPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub sales_cents: i64,
    pub expenses_cents: i64,
    pub profit_cents: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportSummary {
    pub period: ReportPeriod,
    pub sales: SalesSection,
    pub expenses: ExpenseSection,
    pub profit: ProfitSection,
    pub previous_period: PreviousPeriod,
}

/// Percentage change from `previous` to `current`; zero when there is no
/// positive baseline.
pub fn change_percentage(current: i64, previous: i64) -> f64 {
    if previous > 0 {
        (current - previous) as f64 / previous as f64 * 100.0
    } else {
        0.0
    }
}

/// Profit is cash collected minus money spent.
fn profit(sales: &SalesTotals, expenses: &ExpenseTotals) -> i64 {
    sales.paid_cents - expenses.total_cents
}

impl ReportSummary {
    pub fn build(
        period: (DateTime<Utc>, DateTime<Utc>),
        previous: (DateTime<Utc>, DateTime<Utc>),
        sales: SalesTotals,
        expenses: ExpenseTotals,
        prev_sales: SalesTotals,
        prev_expenses: ExpenseTotals,
    ) -> Self {
        let current_profit = profit(&sales, &expenses);
        let previous_profit = profit(&prev_sales, &prev_expenses);

        Self {
            period: ReportPeriod {
                from: period.0,
                to: period.1,
            },
            sales: SalesSection {
                total_cents: sales.total_cents,
                paid_cents: sales.paid_cents,
                outstanding_cents: sales.total_cents - sales.paid_cents,
                order_count: sales.order_count,
                change_percentage: change_percentage(sales.total_cents, prev_sales.total_cents),
            },
            expenses: ExpenseSection {
                total_cents: expenses.total_cents,
                count: expenses.expense_count,
                change_percentage: change_percentage(
                    expenses.total_cents,
                    prev_expenses.total_cents,
                ),
            },
            profit: ProfitSection {
                amount_cents: current_profit,
                change_percentage: change_percentage(current_profit, previous_profit),
            },
            previous_period: PreviousPeriod {
                from: previous.0,
                to: previous.1,
                sales_cents: prev_sales.total_cents,
                expenses_cents: prev_expenses.total_cents,
                profit_cents: previous_profit,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_against_zero_or_negative_baseline_is_zero() {
        assert_eq!(change_percentage(5_000, 0), 0.0);
        assert_eq!(change_percentage(5_000, -100), 0.0);
        assert_eq!(change_percentage(15_000, 10_000), 50.0);
        assert_eq!(change_percentage(5_000, 10_000), -50.0);
    }

    #[test]
    fn summary_derives_outstanding_and_profit() {
        let now = Utc::now();
        let summary = ReportSummary::build(
            (now, now),
            (now, now),
            SalesTotals {
                total_cents: 50_000,
                paid_cents: 30_000,
                order_count: 4,
            },
            ExpenseTotals {
                total_cents: 10_000,
                expense_count: 2,
            },
            SalesTotals {
                total_cents: 25_000,
                paid_cents: 20_000,
                order_count: 2,
            },
            ExpenseTotals::default(),
        );

        assert_eq!(summary.sales.outstanding_cents, 20_000);
        assert_eq!(summary.sales.change_percentage, 100.0);
        assert_eq!(summary.profit.amount_cents, 20_000);
        assert_eq!(summary.previous_period.profit_cents, 20_000);
        assert_eq!(summary.profit.change_percentage, 0.0);
        assert_eq!(summary.expenses.change_percentage, 0.0);
    }
}
