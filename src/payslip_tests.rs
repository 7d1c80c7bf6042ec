// src/payslip_tests.rs

#[cfg(test)]
mod tests {
    use crate::model::{
        AttendanceRecord, CompensationRule, DayType, Diagnostic, OverrideField, PayrollError,
        PayslipResult, Period, SiteRate,
    };
    use crate::payslip::{hourly_rates, EngineConfig, PayrollEngine};
    use crate::site_match::DecliningRegistrar;
    use crate::store::{CompensationRules, OverrideStore, SiteTable};
    use crate::tax::{compute_tax, taxable_income};
    use chrono::{Datelike, NaiveDate, Weekday};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("invalid date string: {}", date_str))
    }

    fn period() -> Period {
        Period::new(2025, 7).unwrap()
    }

    fn rule() -> CompensationRule {
        CompensationRule {
            employee_id: "NV001".to_string(),
            base_salary: dec!(20_000_000),
            site_allowance_rate: Decimal::ZERO,
            title_allowance: Decimal::ZERO,
            paut_rate: Decimal::ZERO,
            tofd_rate: Decimal::ZERO,
            insurance_rate: dec!(0.105),
            insurance_base: dec!(20_000_000),
            dependents: 0,
        }
    }

    /// 22 single-shift work-site days in July 2025 (days 1..=25 minus the
    /// three Sundays in that range), with 10 overtime hours on the first.
    fn reference_records() -> Vec<AttendanceRecord> {
        let mut records = Vec::new();
        for day in 1..=25 {
            let date = NaiveDate::from_ymd_opt(2025, 7, day).unwrap();
            if date.weekday() == Weekday::Sun {
                continue;
            }
            let mut record = AttendanceRecord::new("NV001", date, DayType::WorkSite);
            record.day_shift = true;
            if day == 1 {
                record.overtime_hours = dec!(10);
            }
            records.push(record);
        }
        assert_eq!(records.len(), 22);
        records
    }

    fn compute(
        records: &[AttendanceRecord],
        rule: CompensationRule,
        overrides: &OverrideStore,
        sites: &mut SiteTable,
        config: EngineConfig,
    ) -> Result<(PayslipResult, Vec<Diagnostic>), PayrollError> {
        let employee_id = rule.employee_id.clone();
        let rules = CompensationRules::new(vec![rule]);
        let engine = PayrollEngine::new(config);
        let mut registrar = DecliningRegistrar;
        engine.compute(
            &employee_id,
            period(),
            records,
            &rules,
            sites,
            overrides,
            &[],
            &mut registrar,
        )
    }

    fn compute_simple(records: &[AttendanceRecord], rule: CompensationRule) -> PayslipResult {
        let overrides = OverrideStore::new();
        let mut sites = SiteTable::default();
        compute(records, rule, &overrides, &mut sites, EngineConfig::default())
            .unwrap()
            .0
    }

    // --- Reference scenario ---

    #[test]
    fn reference_month_matches_the_formula_end_to_end() {
        let payslip = compute_simple(&reference_records(), rule());

        assert_eq!(payslip.standard_days, 27);
        assert_eq!(payslip.summary.worksite_days, 22);
        assert_eq!(payslip.summary.ot_150_hours, dec!(10));
        assert_eq!(payslip.summary.sunday_200_hours, Decimal::ZERO);
        assert_eq!(payslip.summary.holiday_300_hours, Decimal::ZERO);

        let expected_h150 = dec!(20_000_000) / dec!(26) / dec!(8);
        let expected_overtime = dec!(10) * expected_h150 * dec!(1.5);
        assert_eq!(payslip.hourly_150, expected_h150);
        assert_eq!(payslip.overtime_pay, expected_overtime);

        assert_eq!(payslip.base_pay, dec!(20_000_000));
        let expected_gross = dec!(20_000_000) + expected_overtime;
        assert_eq!(payslip.gross_pay, expected_gross);

        assert_eq!(payslip.insurance, dec!(2_100_000));
        let expected_taxable = taxable_income(expected_gross, dec!(2_100_000), 0);
        assert_eq!(payslip.taxable_income, expected_taxable);
        let (expected_tax, expected_bracket) = compute_tax(expected_taxable);
        assert_eq!(payslip.tax, expected_tax);
        assert_eq!(payslip.tax_bracket, expected_bracket);
        assert_eq!(expected_bracket, 2);

        assert_eq!(payslip.total_deduction, dec!(2_100_000) + expected_tax);
        assert_eq!(
            payslip.net_pay,
            expected_gross - payslip.total_deduction
        );
    }

    #[test]
    fn recomputation_on_unchanged_inputs_is_identical() {
        let records = reference_records();
        let overrides = OverrideStore::new();
        let mut sites = SiteTable::default();
        let first = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap();
        let second = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    // --- Failure semantics ---

    #[test]
    fn missing_compensation_rule_is_fatal_for_that_employee() {
        let rules = CompensationRules::new(vec![]);
        let engine = PayrollEngine::new(EngineConfig::default());
        let mut sites = SiteTable::default();
        let overrides = OverrideStore::new();
        let mut registrar = DecliningRegistrar;
        let err = engine
            .compute(
                "NV404",
                period(),
                &[],
                &rules,
                &mut sites,
                &overrides,
                &[],
                &mut registrar,
            )
            .unwrap_err();
        match err {
            PayrollError::UnknownEmployee {
                employee_id,
                period: p,
            } => {
                assert_eq!(employee_id, "NV404");
                assert_eq!(p, period());
            }
            other => panic!("expected UnknownEmployee, got {:?}", other),
        }
    }

    #[test]
    fn records_from_another_period_are_skipped_with_a_warning() {
        let mut records = reference_records();
        let mut stray = AttendanceRecord::new("NV001", d("2025-08-01"), DayType::WorkSite);
        stray.day_shift = true;
        records.push(stray);

        let overrides = OverrideStore::new();
        let mut sites = SiteTable::default();
        let (payslip, diagnostics) = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(payslip.summary.worksite_days, 22);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::OutOfPeriod {
                employee_id: "NV001".to_string(),
                date: d("2025-08-01"),
                period: period(),
            }]
        );
    }

    #[test]
    fn other_employees_records_are_ignored_silently() {
        let mut records = reference_records();
        let mut other = AttendanceRecord::new("NV099", d("2025-07-02"), DayType::WorkSite);
        other.day_shift = true;
        records.push(other);

        let payslip = compute_simple(&records, rule());
        assert_eq!(payslip.summary.worksite_days, 22);
    }

    // --- Overrides ---

    fn sited_records() -> (Vec<AttendanceRecord>, SiteTable) {
        let mut records = Vec::new();
        for day in ["2025-07-01", "2025-07-02"] {
            let mut r = AttendanceRecord::new("NV001", d(day), DayType::WorkSite);
            r.day_shift = true;
            r.site_name = "Nhiet Dien Vung Ang".to_string();
            records.push(r);
        }
        let sites = SiteTable::new(vec![SiteRate {
            site_name: "Nhiet Dien Vung Ang".to_string(),
            gas_allowance: dec!(100_000),
        }]);
        (records, sites)
    }

    #[test]
    fn gas_override_round_trips_back_to_the_computed_value() {
        let (records, mut sites) = sited_records();
        let overrides = OverrideStore::new();

        let baseline = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap()
        .0;
        assert_eq!(baseline.gas_allowance, dec!(200_000));
        assert!(!baseline.gas_allowance_overridden);

        overrides.set(
            "NV001",
            period(),
            OverrideField::GasAllowance,
            dec!(500_000),
        );
        let overridden = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap()
        .0;
        assert_eq!(overridden.gas_allowance, dec!(500_000));
        assert!(overridden.gas_allowance_overridden);

        overrides.set(
            "NV001",
            period(),
            OverrideField::GasAllowance,
            Decimal::ZERO,
        );
        let reverted = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap()
        .0;
        assert_eq!(reverted, baseline);
    }

    #[test]
    fn purchase_reimbursement_is_a_pass_through_after_deductions() {
        let mut records = reference_records();
        records[0].shopping_expense = dec!(300_000);

        let payslip = compute_simple(&records, rule());
        assert_eq!(payslip.purchase_reimbursement, dec!(300_000));
        // Shopping never inflates gross income.
        let expected_h150 = dec!(20_000_000) / dec!(26) / dec!(8);
        let expected_gross = dec!(20_000_000) + dec!(10) * expected_h150 * dec!(1.5);
        assert_eq!(payslip.gross_pay, expected_gross);
        assert_eq!(
            payslip.net_pay,
            payslip.gross_pay - payslip.total_deduction + dec!(300_000)
        );
    }

    #[test]
    fn purchase_override_takes_precedence_over_the_shopping_total() {
        let mut records = reference_records();
        records[0].shopping_expense = dec!(300_000);
        let overrides = OverrideStore::new();
        overrides.set(
            "NV001",
            period(),
            OverrideField::PurchaseReimbursement,
            dec!(1_000_000),
        );
        let mut sites = SiteTable::default();
        let (payslip, _) = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(payslip.purchase_reimbursement, dec!(1_000_000));
        assert!(payslip.purchase_reimbursement_overridden);
    }

    #[test]
    fn advance_and_violation_deduct_from_net_pay() {
        let records = reference_records();
        let overrides = OverrideStore::new();
        overrides.set("NV001", period(), OverrideField::Advance, dec!(1_000_000));
        overrides.set("NV001", period(), OverrideField::Violation, dec!(200_000));
        let mut sites = SiteTable::default();
        let (payslip, _) = compute(
            &records,
            rule(),
            &overrides,
            &mut sites,
            EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(payslip.advance, dec!(1_000_000));
        assert_eq!(payslip.violation, dec!(200_000));
        assert_eq!(
            payslip.total_deduction,
            payslip.insurance + payslip.tax + dec!(1_200_000)
        );
        assert_eq!(
            payslip.net_pay,
            payslip.gross_pay - payslip.total_deduction + payslip.purchase_reimbursement
        );
    }

    // --- Allowances ---

    #[test]
    fn title_allowance_prorates_by_worksite_over_standard_days() {
        let mut r = rule();
        r.title_allowance = dec!(2_700_000);
        let payslip = compute_simple(&reference_records(), r);
        // 22 of 27 standard days.
        assert_eq!(
            payslip.title_allowance,
            dec!(22) / dec!(27) * dec!(2_700_000)
        );
    }

    #[test]
    fn site_allowance_pays_per_counted_worksite_day() {
        let mut r = rule();
        r.site_allowance_rate = dec!(150_000);
        let mut records = reference_records();
        // Double shift on the first day adds one more counted day.
        records[0].night_shift = true;
        let payslip = compute_simple(&records, r);
        assert_eq!(payslip.summary.worksite_days, 23);
        assert_eq!(payslip.site_allowance, dec!(150_000) * dec!(23));
    }

    #[test]
    fn training_and_office_allowances_follow_the_coefficients() {
        let mut r = rule();
        r.site_allowance_rate = dec!(200_000);
        let mut records = Vec::new();
        for (day, day_type) in [
            ("2025-07-01", DayType::Training),
            ("2025-07-02", DayType::Training),
            ("2025-07-03", DayType::Office),
        ] {
            let mut record = AttendanceRecord::new("NV001", d(day), day_type);
            record.day_shift = true;
            records.push(record);
        }
        let config = EngineConfig {
            training_coefficient: dec!(0.5),
            office_coefficient: dec!(0.25),
        };
        let overrides = OverrideStore::new();
        let mut sites = SiteTable::default();
        let (payslip, _) = compute(&records, r, &overrides, &mut sites, config).unwrap();

        assert_eq!(payslip.training_allowance, dec!(200_000));
        assert_eq!(payslip.office_allowance, dec!(50_000));
    }

    #[test]
    fn coefficients_default_to_zero_and_disable_the_allowances() {
        let mut r = rule();
        r.site_allowance_rate = dec!(200_000);
        let mut record = AttendanceRecord::new("NV001", d("2025-07-01"), DayType::Training);
        record.day_shift = true;
        let payslip = compute_simple(&[record], r);
        assert_eq!(payslip.training_allowance, Decimal::ZERO);
        assert_eq!(payslip.office_allowance, Decimal::ZERO);
    }

    #[test]
    fn kpi_bonus_pays_per_meter() {
        let mut r = rule();
        r.paut_rate = dec!(5_000);
        r.tofd_rate = dec!(8_000);
        let mut records = reference_records();
        records[0].paut_meters = dec!(40);
        records[1].tofd_meters = dec!(12.5);
        let payslip = compute_simple(&records, r);
        assert_eq!(payslip.kpi_bonus, dec!(40) * dec!(5_000) + dec!(12.5) * dec!(8_000));
    }

    // --- Rates ---

    #[test]
    fn the_two_hourly_rates_use_different_divisors() {
        let (h150, h200_300) = hourly_rates(dec!(20_000_000));
        assert_eq!(h150, dec!(20_000_000) / dec!(26) / dec!(8));
        assert_eq!(h200_300, dec!(20_000_000) / dec!(27) / dec!(8));
        assert!(h150 > h200_300);
    }
}
