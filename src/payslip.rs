// src/payslip.rs
//
// PayrollEngine: orchestrates normalization output, the aggregator, the
// compensation rule, the override store and the tax schedule into one
// itemized payslip. Pure over its inputs; recomputing with unchanged
// inputs yields an identical result.

use crate::attendance_summary::{aggregate, standard_working_days};
use crate::model::{
    AttendanceRecord, Diagnostic, MonthlySummary, OverrideField, PayrollError, PayslipResult,
    Period,
};
use crate::site_match::SiteRegistrar;
use crate::store::{CompensationRules, OverrideStore, SiteTable};
use crate::tax::{compute_tax, taxable_income};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use tracing::{info, warn};

const HOURS_PER_DAY: Decimal = dec!(8);
/// Ordinary overtime prorates over a 26-day baseline; Sunday and holiday
/// premiums over 27 days, since those days are carved out separately.
pub const ORDINARY_OT_DIVISOR: Decimal = dec!(26);
pub const PREMIUM_OT_DIVISOR: Decimal = dec!(27);
const OT_RATE_150: Decimal = dec!(1.5);
const OT_RATE_200: Decimal = dec!(2.0);
const OT_RATE_300: Decimal = dec!(3.0);

/// Tenant-level knobs. Both coefficients default to zero, which disables
/// the training and office allowances entirely.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineConfig {
    pub training_coefficient: Decimal,
    pub office_coefficient: Decimal,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            training_coefficient: decimal_env("TRAINING_COEFFICIENT"),
            office_coefficient: decimal_env("OFFICE_COEFFICIENT"),
        }
    }
}

fn decimal_env(name: &str) -> Decimal {
    match std::env::var(name) {
        Ok(raw) => Decimal::from_str(raw.trim()).unwrap_or_else(|_| {
            warn!("{} is not a decimal ('{}'), using 0", name, raw);
            Decimal::ZERO
        }),
        Err(_) => Decimal::ZERO,
    }
}

pub struct PayrollEngine {
    config: EngineConfig,
}

impl PayrollEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Computes the full payslip for one employee and period. Fatal only
    /// when the employee has no compensation rule; every data-quality
    /// issue is collected into the returned diagnostics instead.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        employee_id: &str,
        period: Period,
        records: &[AttendanceRecord],
        rules: &CompensationRules,
        sites: &mut SiteTable,
        overrides: &OverrideStore,
        holidays: &[NaiveDate],
        registrar: &mut dyn SiteRegistrar,
    ) -> Result<(PayslipResult, Vec<Diagnostic>), PayrollError> {
        let rule = rules
            .get(employee_id)
            .ok_or_else(|| PayrollError::UnknownEmployee {
                employee_id: employee_id.to_string(),
                period,
            })?;

        let mut diagnostics = Vec::new();
        let mut in_period = Vec::new();
        for record in records.iter().filter(|r| r.employee_id == employee_id) {
            if period.contains(record.date) {
                in_period.push(record.clone());
            } else {
                warn!(
                    "{}: record dated {} does not belong to {}, skipped",
                    employee_id, record.date, period
                );
                diagnostics.push(Diagnostic::OutOfPeriod {
                    employee_id: employee_id.to_string(),
                    date: record.date,
                    period,
                });
            }
        }

        let summary = aggregate(&in_period, holidays, sites, registrar, &mut diagnostics);
        let standard_days = standard_working_days(period.year(), period.month(), holidays);

        // Base salary is paid in full regardless of attendance shortfall;
        // only the title allowance prorates. Current business rule, kept
        // as-is.
        let base_pay = rule.base_salary;
        let (hourly_150, hourly_200_300) = hourly_rates(rule.base_salary);
        let overtime_pay = overtime_pay(&summary, hourly_150, hourly_200_300);

        let site_allowance = Decimal::from(summary.worksite_days) * rule.site_allowance_rate;
        let training_allowance = Decimal::from(summary.training_days)
            * rule.site_allowance_rate
            * self.config.training_coefficient;
        let office_allowance = Decimal::from(summary.office_days)
            * rule.site_allowance_rate
            * self.config.office_coefficient;
        let title_allowance =
            title_allowance(summary.worksite_days, standard_days, rule.title_allowance);

        let (gas_allowance, gas_allowance_overridden) = override_or_computed(
            overrides.get(employee_id, period, OverrideField::GasAllowance),
            summary.gas_allowance,
        );
        let (purchase_reimbursement, purchase_reimbursement_overridden) = override_or_computed(
            overrides.get(employee_id, period, OverrideField::PurchaseReimbursement),
            summary.shopping_total,
        );

        let kpi_bonus = summary.paut_meters * rule.paut_rate + summary.tofd_meters * rule.tofd_rate;

        let gross_pay = base_pay
            + overtime_pay
            + site_allowance
            + training_allowance
            + office_allowance
            + title_allowance
            + gas_allowance
            + summary.phone_total
            + summary.hotel_total
            + summary.other_total
            + kpi_bonus;

        let insurance = rule.insurance_base * rule.insurance_rate;
        let taxable = taxable_income(gross_pay, insurance, rule.dependents);
        let (tax, tax_bracket) = compute_tax(taxable);

        let advance = overrides
            .get(employee_id, period, OverrideField::Advance)
            .unwrap_or(Decimal::ZERO);
        let violation = overrides
            .get(employee_id, period, OverrideField::Violation)
            .unwrap_or(Decimal::ZERO);
        let total_deduction = insurance + tax + advance + violation;
        // The reimbursement is a pass-through, not taxable income, so it
        // comes back in after deductions.
        let net_pay = gross_pay - total_deduction + purchase_reimbursement;

        info!(
            "payslip {} {}: gross={} deductions={} net={} ({} warnings)",
            employee_id,
            period,
            gross_pay,
            total_deduction,
            net_pay,
            diagnostics.len()
        );

        Ok((
            PayslipResult {
                employee_id: employee_id.to_string(),
                period,
                standard_days,
                summary,
                base_pay,
                hourly_150,
                hourly_200_300,
                overtime_pay,
                site_allowance,
                training_allowance,
                office_allowance,
                title_allowance,
                gas_allowance,
                gas_allowance_overridden,
                purchase_reimbursement,
                purchase_reimbursement_overridden,
                kpi_bonus,
                gross_pay,
                insurance,
                taxable_income: taxable,
                tax,
                tax_bracket,
                advance,
                violation,
                total_deduction,
                net_pay,
            },
            diagnostics,
        ))
    }
}

/// The two hourly rates derived from the monthly base salary: 26-day
/// baseline for ordinary overtime, 27-day baseline for the Sunday and
/// holiday premiums.
pub fn hourly_rates(base_salary: Decimal) -> (Decimal, Decimal) {
    (
        base_salary / ORDINARY_OT_DIVISOR / HOURS_PER_DAY,
        base_salary / PREMIUM_OT_DIVISOR / HOURS_PER_DAY,
    )
}

pub fn overtime_pay(summary: &MonthlySummary, hourly_150: Decimal, hourly_200_300: Decimal) -> Decimal {
    summary.ot_150_hours * hourly_150 * OT_RATE_150
        + summary.sunday_200_hours * hourly_200_300 * OT_RATE_200
        + summary.holiday_300_hours * hourly_200_300 * OT_RATE_300
}

/// Title allowance prorates by worked site days over the standard-day
/// denominator.
pub fn title_allowance(worksite_days: u32, standard_days: u32, amount: Decimal) -> Decimal {
    if standard_days == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(worksite_days) / Decimal::from(standard_days) * amount
}

/// A positive override takes precedence over the computed value.
fn override_or_computed(overridden: Option<Decimal>, computed: Decimal) -> (Decimal, bool) {
    match overridden {
        Some(value) if value > Decimal::ZERO => (value, true),
        _ => (computed, false),
    }
}
