// src/attendance_summary.rs
//
// AttendanceAggregator: folds one employee's records for a period into a
// MonthlySummary, resolving work-site names against the rate table along
// the way.

use crate::model::{AttendanceRecord, DayType, Diagnostic, MonthlySummary};
use crate::site_match::{match_site, SiteRegistrar, SiteRegistration};
use crate::store::SiteTable;
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Sunday or holiday presence credits a full day in the premium bucket,
/// independent of the recorded overtime hours.
pub const PREMIUM_DAY_HOURS: Decimal = dec!(8);

/// Days in the month minus Sundays minus declared holidays. Denominator
/// for prorated allowances; independent of actual attendance.
pub fn standard_working_days(year: i32, month: u32, holidays: &[NaiveDate]) -> u32 {
    let days = days_in_month(year, month);
    let sundays = sundays_in_month(year, month);
    let holiday_count = holidays
        .iter()
        .filter(|d| d.year() == year && d.month() == month)
        .count() as u32;
    days.saturating_sub(sundays).saturating_sub(holiday_count)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return 0;
    };
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match next {
        Some(next) => next.signed_duration_since(first).num_days() as u32,
        None => 0,
    }
}

pub fn sundays_in_month(year: i32, month: u32) -> u32 {
    (1..=days_in_month(year, month))
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .filter(|date| date.weekday() == Weekday::Sun)
        .count() as u32
}

/// Folds the record set into a summary. Unknown work sites are surfaced
/// to the registrar at most once per distinct name per pass; a confirmed
/// registration is appended to the rate table immediately, so later
/// records with the same name resolve normally.
pub fn aggregate(
    records: &[AttendanceRecord],
    holidays: &[NaiveDate],
    sites: &mut SiteTable,
    registrar: &mut dyn SiteRegistrar,
    diagnostics: &mut Vec<Diagnostic>,
) -> MonthlySummary {
    let holiday_set: HashSet<NaiveDate> = holidays.iter().copied().collect();
    let mut summary = MonthlySummary::default();
    // Free-text names already surfaced (and declined) this pass.
    let mut declined: HashSet<String> = HashSet::new();

    for record in records {
        count_day(&mut summary, record);

        let is_sunday = record.date.weekday() == Weekday::Sun;
        let is_holiday = holiday_set.contains(&record.date);
        if record.day_type.is_worked_day() {
            // Holiday outranks Sunday so no hour lands in two buckets.
            if is_holiday {
                summary.holiday_300_hours += PREMIUM_DAY_HOURS;
            } else if is_sunday {
                summary.sunday_200_hours += PREMIUM_DAY_HOURS;
            } else {
                summary.ot_150_hours += record.overtime_hours;
            }
        }

        if record.day_type == DayType::WorkSite && !record.site_name.trim().is_empty() {
            resolve_gas_allowance(&mut summary, record, sites, registrar, &mut declined, diagnostics);
        }

        // Expenses and productivity meters sum verbatim for every day type.
        summary.hotel_total += record.hotel_expense;
        summary.shopping_total += record.shopping_expense;
        summary.phone_total += record.phone_expense;
        summary.other_total += record.other_expense;
        summary.paut_meters += record.paut_meters;
        summary.tofd_meters += record.tofd_meters;

        if !record.method.trim().is_empty() {
            summary.methods.insert(record.method.trim().to_string());
        }
    }

    debug!(
        "aggregated {} records: {}W {}O {}T {}P {}N, ot150={}h sun200={}h hol300={}h",
        records.len(),
        summary.worksite_days,
        summary.office_days,
        summary.training_days,
        summary.paid_leave_days,
        summary.unpaid_leave_days,
        summary.ot_150_hours,
        summary.sunday_200_hours,
        summary.holiday_300_hours,
    );
    summary
}

fn count_day(summary: &mut MonthlySummary, record: &AttendanceRecord) {
    match record.day_type {
        // A work-site day counts per worked shift: 2 with both day and
        // night shift, 1 with exactly one, 0 with neither flagged.
        DayType::WorkSite => {
            summary.worksite_days += record.day_shift as u32 + record.night_shift as u32;
        }
        DayType::Office => summary.office_days += 1,
        DayType::Training => summary.training_days += 1,
        DayType::PaidLeave => summary.paid_leave_days += 1,
        DayType::UnpaidLeave => summary.unpaid_leave_days += 1,
    }
}

fn resolve_gas_allowance(
    summary: &mut MonthlySummary,
    record: &AttendanceRecord,
    sites: &mut SiteTable,
    registrar: &mut dyn SiteRegistrar,
    declined: &mut HashSet<String>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let result = match_site(&record.site_name, sites.all());
    if let Some(site) = result.site {
        apply_site(summary, &site, diagnostics);
        return;
    }

    let key = record.site_name.trim().to_lowercase();
    if declined.contains(&key) {
        // Already surfaced and declined this pass; keep quiet.
        return;
    }

    let request = SiteRegistration::new(&record.site_name);
    match registrar.register(&request) {
        Some(new_site) => {
            debug!(
                "registered new work site '{}' with gas allowance {}",
                new_site.site_name, new_site.gas_allowance
            );
            apply_site(summary, &new_site, diagnostics);
            sites.add(new_site);
        }
        None => {
            warn!(
                "work site '{}' unmatched (best score {:.2}), gas allowance omitted",
                record.site_name, result.score
            );
            diagnostics.push(Diagnostic::UnmatchedSite {
                site_name: record.site_name.trim().to_string(),
                score: result.score,
            });
            declined.insert(key);
        }
    }
}

fn apply_site(summary: &mut MonthlySummary, site: &crate::model::SiteRate, diagnostics: &mut Vec<Diagnostic>) {
    summary.sites.insert(site.site_name.clone());
    if site.gas_allowance.is_zero() {
        warn!(
            "work site '{}' matched but carries no gas allowance rate",
            site.site_name
        );
        diagnostics.push(Diagnostic::MissingSiteRate {
            site_name: site.site_name.clone(),
        });
    } else {
        summary.gas_allowance += site.gas_allowance;
    }
}
