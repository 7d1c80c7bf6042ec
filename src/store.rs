// src/store.rs
//
// The persistence edges of the engine: the site rate table, the
// compensation rule table, the attendance repository and the override
// store. Files are plain JSON, rewritten whole on save.

use crate::attendance_import::NormalizedAttendance;
use crate::model::{
    AttendanceRecord, CompensationRule, EmployeeId, OverrideField, PayrollError, Period, SiteRate,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

// --- Site rate table ---

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteTable {
    sites: Vec<SiteRate>,
}

impl SiteTable {
    pub fn new(sites: Vec<SiteRate>) -> Self {
        Self { sites }
    }

    pub fn all(&self) -> &[SiteRate] {
        &self.sites
    }

    /// Appends a rate, or replaces the existing row with the same name
    /// (case-insensitive).
    pub fn add(&mut self, site: SiteRate) {
        let name = site.site_name.to_lowercase();
        match self
            .sites
            .iter_mut()
            .find(|s| s.site_name.to_lowercase() == name)
        {
            Some(existing) => {
                info!(
                    "updating site rate '{}': gas allowance {} -> {}",
                    existing.site_name, existing.gas_allowance, site.gas_allowance
                );
                *existing = site;
            }
            None => {
                info!(
                    "registering site rate '{}' with gas allowance {}",
                    site.site_name, site.gas_allowance
                );
                self.sites.push(site);
            }
        }
    }

    /// Missing file means an empty table, not an error; sites grow through
    /// registration.
    pub fn load(path: &Path) -> Result<Self, PayrollError> {
        if !path.exists() {
            info!("no site table at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PayrollError> {
        fs::write(path, serde_json::to_string_pretty(&self)?)?;
        debug!("saved {} site rates to {}", self.sites.len(), path.display());
        Ok(())
    }
}

// --- Compensation rules ---

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompensationRules {
    rules: Vec<CompensationRule>,
}

impl CompensationRules {
    pub fn new(rules: Vec<CompensationRule>) -> Self {
        Self { rules }
    }

    pub fn get(&self, employee_id: &str) -> Option<&CompensationRule> {
        self.rules.iter().find(|r| r.employee_id == employee_id)
    }

    /// Rules are required reference data; a missing file is an error.
    pub fn load(path: &Path) -> Result<Self, PayrollError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

// --- Attendance repository ---

/// Explicit store for imported attendance, keyed by employee and period.
/// Importing a period replaces that period's records wholesale, so
/// recomputation is a pure read; two periods never merge.
#[derive(Debug, Default)]
pub struct AttendanceRepository {
    periods: HashMap<(EmployeeId, Period), Vec<AttendanceRecord>>,
}

impl AttendanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_import(&mut self, import: &NormalizedAttendance) {
        let mut grouped: HashMap<EmployeeId, Vec<AttendanceRecord>> = HashMap::new();
        for record in &import.records {
            grouped
                .entry(record.employee_id.clone())
                .or_default()
                .push(record.clone());
        }
        for (employee_id, records) in grouped {
            debug!(
                "storing {} records for {} in {}",
                records.len(),
                employee_id,
                import.period
            );
            self.periods.insert((employee_id, import.period), records);
        }
    }

    pub fn records_for(&self, employee_id: &str, period: Period) -> &[AttendanceRecord] {
        self.periods
            .get(&(employee_id.to_string(), period))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn employees_in(&self, period: Period) -> Vec<EmployeeId> {
        let mut ids: Vec<EmployeeId> = self
            .periods
            .keys()
            .filter(|(_, p)| *p == period)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

// --- Override store ---

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct OverrideSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gas_allowance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    purchase_reimbursement: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    advance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    violation: Option<Decimal>,
}

impl OverrideSlot {
    fn get(&self, field: OverrideField) -> Option<Decimal> {
        match field {
            OverrideField::GasAllowance => self.gas_allowance,
            OverrideField::PurchaseReimbursement => self.purchase_reimbursement,
            OverrideField::Advance => self.advance,
            OverrideField::Violation => self.violation,
        }
    }

    fn set(&mut self, field: OverrideField, value: Option<Decimal>) {
        match field {
            OverrideField::GasAllowance => self.gas_allowance = value,
            OverrideField::PurchaseReimbursement => self.purchase_reimbursement = value,
            OverrideField::Advance => self.advance = value,
            OverrideField::Violation => self.violation = value,
        }
    }

    fn is_empty(&self) -> bool {
        self.gas_allowance.is_none()
            && self.purchase_reimbursement.is_none()
            && self.advance.is_none()
            && self.violation.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredOverride {
    employee_id: EmployeeId,
    period: Period,
    #[serde(flatten)]
    slot: OverrideSlot,
}

/// Persisted manual corrections, keyed by `(employee_id, period)` — never
/// by display name alone. Guarded by a table lock since registering an
/// override is a read-modify-write sequence.
#[derive(Debug, Default)]
pub struct OverrideStore {
    entries: Mutex<HashMap<(EmployeeId, Period), OverrideSlot>>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, employee_id: &str, period: Period, field: OverrideField) -> Option<Decimal> {
        self.entries
            .lock()
            .unwrap()
            .get(&(employee_id.to_string(), period))
            .and_then(|slot| slot.get(field))
    }

    /// Writing zero to a field with a computed fallback deletes the
    /// override, so the next recomputation reverts to the computed value.
    /// Advance and violation are stored verbatim, zero included.
    pub fn set(&self, employee_id: &str, period: Period, field: OverrideField, amount: Decimal) {
        let key = (employee_id.to_string(), period);
        let mut entries = self.entries.lock().unwrap();
        let value = if field.clears_on_zero() && amount.is_zero() {
            None
        } else {
            Some(amount)
        };
        info!(
            "override {:?} for {} {}: {:?}",
            field, employee_id, period, value
        );
        let slot = entries.entry(key.clone()).or_default();
        slot.set(field, value);
        if slot.is_empty() {
            entries.remove(&key);
        }
    }

    pub fn load(path: &Path) -> Result<Self, PayrollError> {
        if !path.exists() {
            info!("no override store at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let stored: Vec<StoredOverride> = serde_json::from_str(&raw)?;
        let mut entries = HashMap::new();
        for item in stored {
            entries.insert((item.employee_id, item.period), item.slot);
        }
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PayrollError> {
        let entries = self.entries.lock().unwrap();
        let mut stored: Vec<StoredOverride> = entries
            .iter()
            .map(|((employee_id, period), slot)| StoredOverride {
                employee_id: employee_id.clone(),
                period: *period,
                slot: slot.clone(),
            })
            .collect();
        // Stable file ordering keeps diffs reviewable.
        stored.sort_by(|a, b| (&a.employee_id, a.period).cmp(&(&b.employee_id, b.period)));
        fs::write(path, serde_json::to_string_pretty(&stored)?)?;
        debug!("saved {} override slots to {}", stored.len(), path.display());
        Ok(())
    }
}
