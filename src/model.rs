// src/model.rs
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type EmployeeId = String;

// --- Period ---

static PERIOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})/(\d{4})$").expect("period regex is valid"));

/// A payroll period, one calendar month. Wire format is `MM/YYYY`.
/// Only constructible through [`Period::new`] or [`Period::parse`], so a
/// held value always has a month in `1..=12`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let caps = PERIOD_RE.captures(raw.trim())?;
        let month: u32 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse().ok()?;
        Self::new(year, month)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Number of calendar days in this period's month.
    pub fn days_in_month(&self) -> u32 {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("period month is validated on construction");
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        }
        .expect("first of next month is always valid");
        next.signed_duration_since(first).num_days() as u32
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::parse(s).ok_or_else(|| format!("invalid period '{}', expected MM/YYYY", s))
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

// --- Day types ---

/// One-letter day classification used by the attendance sheets.
/// The `W O T P N` codes are a wire contract with the importing side
/// and must not be renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayType {
    WorkSite,
    Office,
    Training,
    PaidLeave,
    UnpaidLeave,
}

impl DayType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "W" => Some(Self::WorkSite),
            "O" => Some(Self::Office),
            "T" => Some(Self::Training),
            "P" => Some(Self::PaidLeave),
            "N" => Some(Self::UnpaidLeave),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::WorkSite => "W",
            Self::Office => "O",
            Self::Training => "T",
            Self::PaidLeave => "P",
            Self::UnpaidLeave => "N",
        }
    }

    /// Work-site, office and training days count as worked presence and
    /// qualify for the Sunday/holiday premium buckets.
    pub fn is_worked_day(&self) -> bool {
        matches!(self, Self::WorkSite | Self::Office | Self::Training)
    }
}

// --- Attendance ---

/// One day of attendance for one employee. Immutable once aggregated;
/// corrections go through the override store, never back into history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub day_type: DayType,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub day_shift: bool,
    #[serde(default)]
    pub night_shift: bool,
    #[serde(default)]
    pub overtime_hours: Decimal,
    #[serde(default)]
    pub hotel_expense: Decimal,
    #[serde(default)]
    pub shopping_expense: Decimal,
    #[serde(default)]
    pub phone_expense: Decimal,
    #[serde(default)]
    pub other_expense: Decimal,
    #[serde(default)]
    pub other_expense_desc: String,
    #[serde(default)]
    pub paut_meters: Decimal,
    #[serde(default)]
    pub tofd_meters: Decimal,
    #[serde(default)]
    pub note: String,
}

impl AttendanceRecord {
    pub fn new(employee_id: &str, date: NaiveDate, day_type: DayType) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            date,
            day_type,
            site_name: String::new(),
            method: String::new(),
            day_shift: false,
            night_shift: false,
            overtime_hours: Decimal::ZERO,
            hotel_expense: Decimal::ZERO,
            shopping_expense: Decimal::ZERO,
            phone_expense: Decimal::ZERO,
            other_expense: Decimal::ZERO,
            other_expense_desc: String::new(),
            paut_meters: Decimal::ZERO,
            tofd_meters: Decimal::ZERO,
            note: String::new(),
        }
    }
}

/// Aggregate of one employee's attendance for one period. Always derived
/// from the record set, never hand-edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub worksite_days: u32,
    pub office_days: u32,
    pub training_days: u32,
    pub paid_leave_days: u32,
    pub unpaid_leave_days: u32,
    pub ot_150_hours: Decimal,
    pub sunday_200_hours: Decimal,
    pub holiday_300_hours: Decimal,
    pub gas_allowance: Decimal,
    pub hotel_total: Decimal,
    pub shopping_total: Decimal,
    pub phone_total: Decimal,
    pub other_total: Decimal,
    pub paut_meters: Decimal,
    pub tofd_meters: Decimal,
    pub sites: BTreeSet<String>,
    pub methods: BTreeSet<String>,
}

// --- Reference data ---

fn default_insurance_rate() -> Decimal {
    dec!(0.105)
}

/// Per-employee compensation reference data, edited out-of-band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationRule {
    pub employee_id: EmployeeId,
    pub base_salary: Decimal,
    #[serde(default)]
    pub site_allowance_rate: Decimal,
    #[serde(default)]
    pub title_allowance: Decimal,
    #[serde(default)]
    pub paut_rate: Decimal,
    #[serde(default)]
    pub tofd_rate: Decimal,
    #[serde(default = "default_insurance_rate")]
    pub insurance_rate: Decimal,
    #[serde(default)]
    pub insurance_base: Decimal,
    #[serde(default)]
    pub dependents: u32,
}

/// One row of the work-site rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRate {
    pub site_name: String,
    #[serde(default)]
    pub gas_allowance: Decimal,
}

// --- Overrides ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    GasAllowance,
    PurchaseReimbursement,
    Advance,
    Violation,
}

impl OverrideField {
    /// Gas and purchase overrides have a computed fallback, so writing zero
    /// clears them. Advance and violation have no fallback and keep zero.
    pub fn clears_on_zero(&self) -> bool {
        matches!(self, Self::GasAllowance | Self::PurchaseReimbursement)
    }
}

impl FromStr for OverrideField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gas_allowance" => Ok(Self::GasAllowance),
            "purchase_reimbursement" => Ok(Self::PurchaseReimbursement),
            "advance" => Ok(Self::Advance),
            "violation" => Ok(Self::Violation),
            other => Err(format!(
                "unknown override field '{}', expected one of gas_allowance, \
                 purchase_reimbursement, advance, violation",
                other
            )),
        }
    }
}

// --- Results ---

/// The fully itemized payslip for one employee and period. Recomputed on
/// demand; always derivable from records + rule + site rates + overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayslipResult {
    pub employee_id: EmployeeId,
    pub period: Period,
    pub standard_days: u32,
    pub summary: MonthlySummary,
    pub base_pay: Decimal,
    pub hourly_150: Decimal,
    pub hourly_200_300: Decimal,
    pub overtime_pay: Decimal,
    pub site_allowance: Decimal,
    pub training_allowance: Decimal,
    pub office_allowance: Decimal,
    pub title_allowance: Decimal,
    pub gas_allowance: Decimal,
    pub gas_allowance_overridden: bool,
    pub purchase_reimbursement: Decimal,
    pub purchase_reimbursement_overridden: bool,
    pub kpi_bonus: Decimal,
    pub gross_pay: Decimal,
    pub insurance: Decimal,
    pub taxable_income: Decimal,
    pub tax: Decimal,
    pub tax_bracket: u32,
    pub advance: Decimal,
    pub violation: Decimal,
    pub total_deduction: Decimal,
    pub net_pay: Decimal,
}

// --- Errors ---

/// Fatal failures. Recoverable issues travel as [`Diagnostic`] values
/// instead, collected alongside results.
#[derive(Error, Debug)]
pub enum PayrollError {
    #[error("malformed attendance payload: {detail}")]
    MalformedPayload { detail: String },

    #[error("no compensation rule configured for employee {employee_id} in period {period}")]
    UnknownEmployee {
        employee_id: EmployeeId,
        period: Period,
    },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Recoverable data-quality issues. The caller can render "computed with
/// N warnings" from this list; nothing here aborts a computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("row {row}: missing employee id, row dropped")]
    RowMissingEmployeeId { row: usize },

    #[error("row {row}: not an array of cells, row dropped")]
    MalformedRow { row: usize },

    #[error("{employee_id}: unparseable date '{raw}', record skipped")]
    InvalidDate { employee_id: EmployeeId, raw: String },

    #[error("work site '{site_name}' not recognized (best score {score:.2}), gas allowance omitted")]
    UnmatchedSite { site_name: String, score: f64 },

    #[error("work site '{site_name}' has no gas allowance rate configured")]
    MissingSiteRate { site_name: String },

    #[error("{employee_id}: record dated {date} is outside period {period}, skipped")]
    OutOfPeriod {
        employee_id: EmployeeId,
        date: NaiveDate,
        period: Period,
    },
}
