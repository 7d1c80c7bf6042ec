// src/attendance_import.rs
//
// AttendanceNormalizer: turns any of the three supported raw attendance
// payload shapes into one canonical `AttendanceRecord` sequence. Parsers
// are tried in a fixed priority order; the first structural match wins.

use crate::model::{AttendanceRecord, DayType, Diagnostic, PayrollError, Period};
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{debug, warn};

/// A normalized import: exactly one period identity, the canonical record
/// sequence, and the recoverable issues hit along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAttendance {
    pub period: Period,
    pub records: Vec<AttendanceRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Column layout of the positional-row format. The order is a wire
/// contract with the sheet exporter.
mod col {
    pub const MSNV: usize = 0;
    pub const NAME: usize = 1;
    pub const DATE: usize = 2;
    pub const TYPE: usize = 3;
    pub const SITE: usize = 4;
    pub const METHOD: usize = 5;
    pub const DAY_SHIFT: usize = 6;
    pub const NIGHT_SHIFT: usize = 7;
    pub const OT_HOURS: usize = 10;
    pub const HOTEL: usize = 11;
    pub const SHOPPING: usize = 12;
    pub const PHONE: usize = 13;
    pub const OTHER: usize = 14;
    pub const OTHER_DESC: usize = 16;
    pub const NOTE: usize = 17;
}

pub fn normalize(raw: &Value) -> Result<NormalizedAttendance, PayrollError> {
    if let Some(obj) = raw.as_object() {
        if obj.contains_key("data") {
            return parse_positional(obj);
        }
        if obj.contains_key("employees") {
            return parse_nested(obj);
        }
        if looks_like_legacy(obj) {
            return parse_legacy(obj);
        }
    }
    Err(PayrollError::MalformedPayload {
        detail: "payload matches no supported attendance shape".to_string(),
    })
}

/// Accepts the three historical spellings of a day key: `day_01`, `01`
/// and `1`. All key-alias handling lives here.
pub fn parse_day_key(key: &str) -> Option<u32> {
    let trimmed = key.trim();
    let digits = trimmed.strip_prefix("day_").unwrap_or(trimmed);
    let day: u32 = digits.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

// --- Value readers shared by all three parsers ---

fn value_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn value_decimal(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap_or_else(|_| {
            debug!("non-decimal number cell {:?}, treated as zero", n);
            Decimal::ZERO
        }),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            if cleaned.is_empty() {
                Decimal::ZERO
            } else {
                Decimal::from_str(&cleaned).unwrap_or_else(|_| {
                    debug!("non-decimal string cell '{}', treated as zero", s);
                    Decimal::ZERO
                })
            }
        }
        _ => Decimal::ZERO,
    }
}

fn value_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

fn obj_str(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).map(value_str).unwrap_or_default()
}

fn obj_decimal(obj: &Map<String, Value>, key: &str) -> Decimal {
    obj.get(key).map(value_decimal).unwrap_or(Decimal::ZERO)
}

fn obj_flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).map(value_flag).unwrap_or(false)
}

fn require_period(obj: &Map<String, Value>) -> Result<Period, PayrollError> {
    let raw = obj
        .get("period")
        .map(value_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PayrollError::MalformedPayload {
            detail: "missing period field".to_string(),
        })?;
    Period::parse(&raw).ok_or_else(|| PayrollError::MalformedPayload {
        detail: format!("invalid period '{}', expected MM/YYYY", raw),
    })
}

// --- Format 1: positional rows ---

fn parse_positional(obj: &Map<String, Value>) -> Result<NormalizedAttendance, PayrollError> {
    let period = require_period(obj)?;
    let rows = obj
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| PayrollError::MalformedPayload {
            detail: "data field is not an array".to_string(),
        })?;

    let mut records = Vec::new();
    let mut diagnostics = Vec::new();

    for (idx, row_value) in rows.iter().enumerate() {
        let Some(row) = row_value.as_array() else {
            warn!("row {} is not an array of cells, dropped", idx);
            diagnostics.push(Diagnostic::MalformedRow { row: idx });
            continue;
        };
        let cell = |i: usize| row.get(i).cloned().unwrap_or(Value::Null);

        let msnv = value_str(&cell(col::MSNV));
        if msnv.is_empty() {
            warn!("row {} has no employee id, dropped", idx);
            diagnostics.push(Diagnostic::RowMissingEmployeeId { row: idx });
            continue;
        }

        let raw_date = value_str(&cell(col::DATE));
        let Ok(date) = NaiveDate::parse_from_str(&raw_date, "%d/%m/%Y") else {
            warn!("row {}: unparseable date '{}', record skipped", idx, raw_date);
            diagnostics.push(Diagnostic::InvalidDate {
                employee_id: msnv,
                raw: raw_date,
            });
            continue;
        };

        let type_code = value_str(&cell(col::TYPE));
        let Some(day_type) = DayType::from_code(&type_code) else {
            debug!(
                "row {}: no recognizable day type in '{}', skipped",
                idx, type_code
            );
            continue;
        };

        let mut record = AttendanceRecord::new(&msnv, date, day_type);
        record.site_name = value_str(&cell(col::SITE));
        record.method = value_str(&cell(col::METHOD));
        record.day_shift = value_flag(&cell(col::DAY_SHIFT));
        record.night_shift = value_flag(&cell(col::NIGHT_SHIFT));
        record.overtime_hours = value_decimal(&cell(col::OT_HOURS));
        record.hotel_expense = value_decimal(&cell(col::HOTEL));
        record.shopping_expense = value_decimal(&cell(col::SHOPPING));
        record.phone_expense = value_decimal(&cell(col::PHONE));
        record.other_expense = value_decimal(&cell(col::OTHER));
        record.other_expense_desc = value_str(&cell(col::OTHER_DESC));
        record.note = value_str(&cell(col::NOTE));
        let _ = value_str(&cell(col::NAME)); // display name, not part of the canonical model
        records.push(record);
    }

    debug!(
        "positional import for {}: {} records, {} diagnostics",
        period,
        records.len(),
        diagnostics.len()
    );
    Ok(NormalizedAttendance {
        period,
        records,
        diagnostics,
    })
}

// --- Format 2: nested by employee ---

fn parse_nested(obj: &Map<String, Value>) -> Result<NormalizedAttendance, PayrollError> {
    let period = require_period(obj)?;
    let employees = obj
        .get("employees")
        .and_then(Value::as_object)
        .ok_or_else(|| PayrollError::MalformedPayload {
            detail: "employees field is not an object".to_string(),
        })?;

    let mut records = Vec::new();
    let mut diagnostics = Vec::new();

    for (msnv, employee_value) in employees {
        let Some(days) = employee_value
            .pointer("/attendance/days")
            .and_then(Value::as_object)
        else {
            debug!("employee {} has no attendance days, skipped", msnv);
            continue;
        };

        for (day_key, day_value) in days {
            let Some(day) = parse_day_key(day_key) else {
                warn!(
                    "employee {}: unrecognized day key '{}', record skipped",
                    msnv, day_key
                );
                diagnostics.push(Diagnostic::InvalidDate {
                    employee_id: msnv.clone(),
                    raw: day_key.clone(),
                });
                continue;
            };
            // Calendar validation: e.g. day 31 of February is skipped, never fatal.
            let Some(date) = NaiveDate::from_ymd_opt(period.year(), period.month(), day) else {
                warn!(
                    "employee {}: day {} does not exist in {}, record skipped",
                    msnv, day, period
                );
                diagnostics.push(Diagnostic::InvalidDate {
                    employee_id: msnv.clone(),
                    raw: day_key.clone(),
                });
                continue;
            };
            let Some(day_obj) = day_value.as_object() else {
                debug!("employee {}: day {} is not an object, skipped", msnv, day_key);
                continue;
            };

            let type_code = obj_str(day_obj, "type");
            let Some(day_type) = DayType::from_code(&type_code) else {
                debug!(
                    "employee {}: day {} has no recognizable day type, skipped",
                    msnv, day_key
                );
                continue;
            };

            let mut record = AttendanceRecord::new(msnv, date, day_type);
            record.site_name = obj_str(day_obj, "site");
            record.method = obj_str(day_obj, "method");
            record.day_shift = obj_flag(day_obj, "day_shift");
            record.night_shift = obj_flag(day_obj, "night_shift");
            record.overtime_hours = obj_decimal(day_obj, "overtime_hours");
            record.hotel_expense = obj_decimal(day_obj, "hotel");
            record.shopping_expense = obj_decimal(day_obj, "shopping");
            record.phone_expense = obj_decimal(day_obj, "phone");
            record.other_expense = obj_decimal(day_obj, "other");
            record.other_expense_desc = obj_str(day_obj, "other_desc");
            record.paut_meters = obj_decimal(day_obj, "paut");
            record.tofd_meters = obj_decimal(day_obj, "tofd");
            record.note = obj_str(day_obj, "note");
            records.push(record);
        }
    }

    debug!(
        "nested import for {}: {} records, {} diagnostics",
        period,
        records.len(),
        diagnostics.len()
    );
    Ok(NormalizedAttendance {
        period,
        records,
        diagnostics,
    })
}

// --- Format 3: legacy flat (code-only days) ---

fn looks_like_legacy(obj: &Map<String, Value>) -> bool {
    !obj.is_empty()
        && obj.values().all(|v| {
            v.as_object()
                .map(|periods| periods.keys().all(|k| Period::parse(k).is_some()))
                .unwrap_or(false)
        })
}

fn parse_legacy(obj: &Map<String, Value>) -> Result<NormalizedAttendance, PayrollError> {
    let mut period: Option<Period> = None;
    let mut records = Vec::new();
    let mut diagnostics = Vec::new();

    for (name, periods_value) in obj {
        let periods = periods_value
            .as_object()
            .ok_or_else(|| PayrollError::MalformedPayload {
                detail: format!("legacy entry for '{}' is not an object", name),
            })?;

        for (period_key, month_value) in periods {
            let parsed =
                Period::parse(period_key).ok_or_else(|| PayrollError::MalformedPayload {
                    detail: format!("invalid period '{}', expected MM/YYYY", period_key),
                })?;
            match period {
                None => period = Some(parsed),
                // One import carries exactly one period identity.
                Some(existing) if existing != parsed => {
                    return Err(PayrollError::MalformedPayload {
                        detail: format!(
                            "payload mixes periods {} and {}",
                            existing, parsed
                        ),
                    });
                }
                Some(_) => {}
            }

            let month_obj =
                month_value
                    .as_object()
                    .ok_or_else(|| PayrollError::MalformedPayload {
                        detail: format!("legacy period {} for '{}' is not an object", parsed, name),
                    })?;
            let mut employee_records =
                parse_legacy_days(name, parsed, month_obj, &mut diagnostics);
            distribute_legacy_totals(month_obj, &mut employee_records);
            records.append(&mut employee_records);
        }
    }

    let period = period.ok_or_else(|| PayrollError::MalformedPayload {
        detail: "legacy payload contains no period".to_string(),
    })?;
    debug!(
        "legacy import for {}: {} records, {} diagnostics",
        period,
        records.len(),
        diagnostics.len()
    );
    Ok(NormalizedAttendance {
        period,
        records,
        diagnostics,
    })
}

fn parse_legacy_days(
    name: &str,
    period: Period,
    month_obj: &Map<String, Value>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<AttendanceRecord> {
    let mut records = Vec::new();
    let Some(days) = month_obj.get("days").and_then(Value::as_object) else {
        debug!("legacy entry '{}' ({}) has no days map", name, period);
        return records;
    };

    for (day_key, code_value) in days {
        let Some(day) = parse_day_key(day_key) else {
            diagnostics.push(Diagnostic::InvalidDate {
                employee_id: name.to_string(),
                raw: day_key.clone(),
            });
            continue;
        };
        let Some(date) = NaiveDate::from_ymd_opt(period.year(), period.month(), day) else {
            warn!(
                "legacy entry '{}': day {} does not exist in {}, record skipped",
                name, day, period
            );
            diagnostics.push(Diagnostic::InvalidDate {
                employee_id: name.to_string(),
                raw: day_key.clone(),
            });
            continue;
        };
        let code = value_str(code_value);
        if code.is_empty() {
            continue;
        }
        let Some(day_type) = DayType::from_code(&code) else {
            debug!(
                "legacy entry '{}': unknown day code '{}' on {}, skipped",
                name, code, date
            );
            continue;
        };
        // The legacy sheet records presence only; treat every day as a
        // single day shift.
        let mut record = AttendanceRecord::new(name, date, day_type);
        record.day_shift = true;
        records.push(record);
    }
    records
}

/// Legacy sheets only carry aggregate totals at the period level. When
/// present, split them evenly across the qualifying (W/O/T) days so the
/// aggregation step sees per-day values.
fn distribute_legacy_totals(month_obj: &Map<String, Value>, records: &mut [AttendanceRecord]) {
    let qualifying: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.day_type.is_worked_day())
        .map(|(i, _)| i)
        .collect();

    // `ot_150` is the ordinary-overtime total. Sunday presence earns the
    // flat premium instead of hourly overtime, so Sundays take no share of
    // it; expense totals spread over every qualifying day since they sum
    // verbatim regardless of day type.
    let ordinary: Vec<usize> = qualifying
        .iter()
        .copied()
        .filter(|&i| records[i].date.weekday() != Weekday::Sun)
        .collect();
    split_evenly(obj_decimal(month_obj, "ot_150"), &ordinary, records, |r| {
        &mut r.overtime_hours
    });

    let expenses: [(&str, fn(&mut AttendanceRecord) -> &mut Decimal); 4] = [
        ("hotel", |r| &mut r.hotel_expense),
        ("shopping", |r| &mut r.shopping_expense),
        ("phone", |r| &mut r.phone_expense),
        ("other", |r| &mut r.other_expense),
    ];
    for (key, field) in expenses {
        split_evenly(obj_decimal(month_obj, key), &qualifying, records, field);
    }
}

fn split_evenly(
    total: Decimal,
    targets: &[usize],
    records: &mut [AttendanceRecord],
    field: fn(&mut AttendanceRecord) -> &mut Decimal,
) {
    if total.is_zero() || targets.is_empty() {
        return;
    }
    let share = total / Decimal::from(targets.len() as u64);
    for &idx in targets {
        *field(&mut records[idx]) = share;
    }
}
