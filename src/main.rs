// src/main.rs
//
// CLI shell around the payroll computation engine: import attendance
// payloads, compute itemized payslips, manage overrides and site rates,
// export to CSV. All file I/O lives here; the engine itself only ever
// sees fully loaded inputs.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

mod model;
pub use model::*;
mod attendance_import;
pub use attendance_import::*;
mod site_match;
pub use site_match::*;
mod attendance_summary;
pub use attendance_summary::*;
mod tax;
pub use tax::*;
mod payslip;
pub use payslip::*;
mod store;
pub use store::*;

mod payslip_tests;

#[derive(Parser)]
#[command(
    name = "payroll-core",
    about = "Imports attendance sheets and computes itemized monthly payslips"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize an attendance payload and print a per-employee day summary.
    Import {
        #[arg(long)]
        attendance: PathBuf,
    },
    /// Compute one employee's payslip for the payload's period.
    Compute {
        #[arg(long)]
        attendance: PathBuf,
        #[arg(long)]
        rules: PathBuf,
        #[arg(long)]
        sites: PathBuf,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(long)]
        holidays: Option<PathBuf>,
        #[arg(long)]
        employee: String,
        /// Also write the payslip to a CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Compute payslips for every employee present in the payload.
    ComputeAll {
        #[arg(long)]
        attendance: PathBuf,
        #[arg(long)]
        rules: PathBuf,
        #[arg(long)]
        sites: PathBuf,
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(long)]
        holidays: Option<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Write or clear one manual override for an employee and period.
    SetOverride {
        #[arg(long)]
        overrides: PathBuf,
        #[arg(long)]
        employee: String,
        #[arg(long)]
        period: Period,
        /// gas_allowance, purchase_reimbursement, advance or violation.
        #[arg(long)]
        field: OverrideField,
        #[arg(long)]
        amount: Decimal,
    },
    /// Append or update one row of the site rate table.
    RegisterSite {
        #[arg(long)]
        sites: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        gas_allowance: Decimal,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Import { attendance } => run_import(&attendance),
        Command::Compute {
            attendance,
            rules,
            sites,
            overrides,
            holidays,
            employee,
            csv,
        } => run_compute(
            &attendance,
            &rules,
            &sites,
            overrides.as_deref(),
            holidays.as_deref(),
            Some(&employee),
            csv.as_deref(),
        ),
        Command::ComputeAll {
            attendance,
            rules,
            sites,
            overrides,
            holidays,
            csv,
        } => run_compute(
            &attendance,
            &rules,
            &sites,
            overrides.as_deref(),
            holidays.as_deref(),
            None,
            csv.as_deref(),
        ),
        Command::SetOverride {
            overrides,
            employee,
            period,
            field,
            amount,
        } => run_set_override(&overrides, &employee, period, field, amount),
        Command::RegisterSite {
            sites,
            name,
            gas_allowance,
        } => run_register_site(&sites, &name, gas_allowance),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn load_payload(path: &Path) -> Result<NormalizedAttendance> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading attendance payload {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing attendance payload {}", path.display()))?;
    let import = normalize(&value)?;
    for diagnostic in &import.diagnostics {
        warn!("import: {}", diagnostic);
    }
    Ok(import)
}

fn load_holidays(path: Option<&Path>) -> Result<Vec<NaiveDate>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading holiday list {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing holiday list {}", path.display()))
}

fn run_import(attendance: &Path) -> Result<()> {
    let import = load_payload(attendance)?;

    // employee -> day-type code -> count
    let mut per_employee: BTreeMap<String, BTreeMap<&'static str, u32>> = BTreeMap::new();
    for record in &import.records {
        *per_employee
            .entry(record.employee_id.clone())
            .or_default()
            .entry(record.day_type.as_code())
            .or_default() += 1;
    }

    println!("period: {}", import.period);
    for (employee, counts) in &per_employee {
        let breakdown: Vec<String> = counts
            .iter()
            .map(|(code, count)| format!("{}={}", code, count))
            .collect();
        println!("  {}: {}", employee, breakdown.join(" "));
    }
    println!(
        "{} records, {} warnings",
        import.records.len(),
        import.diagnostics.len()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_compute(
    attendance: &Path,
    rules_path: &Path,
    sites_path: &Path,
    overrides_path: Option<&Path>,
    holidays_path: Option<&Path>,
    employee: Option<&str>,
    csv_path: Option<&Path>,
) -> Result<()> {
    let import = load_payload(attendance)?;
    let period = import.period;
    let rules = CompensationRules::load(rules_path)
        .with_context(|| format!("loading compensation rules {}", rules_path.display()))?;
    let mut sites = SiteTable::load(sites_path)
        .with_context(|| format!("loading site rates {}", sites_path.display()))?;
    let overrides = match overrides_path {
        Some(path) => OverrideStore::load(path)
            .with_context(|| format!("loading override store {}", path.display()))?,
        None => OverrideStore::new(),
    };
    let holidays = load_holidays(holidays_path)?;

    let mut repository = AttendanceRepository::new();
    repository.store_import(&import);

    let engine = PayrollEngine::new(EngineConfig::from_env());
    let mut registrar = DecliningRegistrar;

    let targets: Vec<String> = match employee {
        Some(id) => vec![id.to_string()],
        None => repository.employees_in(period),
    };

    let mut payslips = Vec::new();
    for employee_id in &targets {
        let records = repository.records_for(employee_id, period);
        match engine.compute(
            employee_id,
            period,
            records,
            &rules,
            &mut sites,
            &overrides,
            &holidays,
            &mut registrar,
        ) {
            Ok((payslip, diagnostics)) => {
                for diagnostic in &diagnostics {
                    warn!("{} {}: {}", employee_id, period, diagnostic);
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payslip).context("serializing payslip")?
                );
                if !diagnostics.is_empty() {
                    println!("computed with {} warnings", diagnostics.len());
                }
                payslips.push(payslip);
            }
            // Fatal for this employee's payslip only.
            Err(e) => error!("{}", e),
        }
    }

    if let Some(path) = csv_path {
        write_payslip_csv(path, &payslips)
            .with_context(|| format!("writing payslip CSV {}", path.display()))?;
        println!("wrote {} payslips to {}", payslips.len(), path.display());
    }
    Ok(())
}

fn run_set_override(
    overrides_path: &Path,
    employee: &str,
    period: Period,
    field: OverrideField,
    amount: Decimal,
) -> Result<()> {
    let store = OverrideStore::load(overrides_path)
        .with_context(|| format!("loading override store {}", overrides_path.display()))?;
    store.set(employee, period, field, amount);
    store
        .save(overrides_path)
        .with_context(|| format!("saving override store {}", overrides_path.display()))?;
    Ok(())
}

fn run_register_site(sites_path: &Path, name: &str, gas_allowance: Decimal) -> Result<()> {
    let mut table = SiteTable::load(sites_path)
        .with_context(|| format!("loading site rates {}", sites_path.display()))?;
    table.add(SiteRate {
        site_name: name.trim().to_string(),
        gas_allowance,
    });
    table
        .save(sites_path)
        .with_context(|| format!("saving site rates {}", sites_path.display()))?;
    Ok(())
}

fn write_payslip_csv(path: &Path, payslips: &[PayslipResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "employee_id",
        "period",
        "standard_days",
        "worksite_days",
        "office_days",
        "training_days",
        "paid_leave_days",
        "unpaid_leave_days",
        "ot_150_hours",
        "sunday_200_hours",
        "holiday_300_hours",
        "base_pay",
        "overtime_pay",
        "site_allowance",
        "training_allowance",
        "office_allowance",
        "title_allowance",
        "gas_allowance",
        "kpi_bonus",
        "hotel_total",
        "phone_total",
        "other_total",
        "gross_pay",
        "insurance",
        "taxable_income",
        "tax",
        "tax_bracket",
        "advance",
        "violation",
        "total_deduction",
        "purchase_reimbursement",
        "net_pay",
    ])?;
    for p in payslips {
        writer.write_record([
            p.employee_id.clone(),
            p.period.to_string(),
            p.standard_days.to_string(),
            p.summary.worksite_days.to_string(),
            p.summary.office_days.to_string(),
            p.summary.training_days.to_string(),
            p.summary.paid_leave_days.to_string(),
            p.summary.unpaid_leave_days.to_string(),
            p.summary.ot_150_hours.to_string(),
            p.summary.sunday_200_hours.to_string(),
            p.summary.holiday_300_hours.to_string(),
            p.base_pay.to_string(),
            p.overtime_pay.to_string(),
            p.site_allowance.to_string(),
            p.training_allowance.to_string(),
            p.office_allowance.to_string(),
            p.title_allowance.to_string(),
            p.gas_allowance.to_string(),
            p.kpi_bonus.to_string(),
            p.summary.hotel_total.to_string(),
            p.summary.phone_total.to_string(),
            p.summary.other_total.to_string(),
            p.gross_pay.to_string(),
            p.insurance.to_string(),
            p.taxable_income.to_string(),
            p.tax.to_string(),
            p.tax_bracket.to_string(),
            p.advance.to_string(),
            p.violation.to_string(),
            p.total_deduction.to_string(),
            p.purchase_reimbursement.to_string(),
            p.net_pay.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
