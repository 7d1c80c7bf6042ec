// src/tax.rs
//
// Personal income tax over Vietnam's 7-bracket progressive schedule
// ("lũy tiến từng phần"): each bracket taxes only the marginal amount
// above the previous threshold.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const PERSONAL_DEDUCTION: Decimal = dec!(11_000_000);
pub const DEPENDENT_DEDUCTION: Decimal = dec!(4_400_000);
pub const MAX_DEPENDENTS: u32 = 9;

/// Upper bound (inclusive) and marginal rate per bracket.
const BRACKETS: [(Decimal, Decimal); 7] = [
    (dec!(5_000_000), dec!(0.05)),
    (dec!(10_000_000), dec!(0.10)),
    (dec!(18_000_000), dec!(0.15)),
    (dec!(32_000_000), dec!(0.20)),
    (dec!(52_000_000), dec!(0.25)),
    (dec!(80_000_000), dec!(0.30)),
    (Decimal::MAX, dec!(0.35)),
];

/// Returns the tax owed and the 1-based bracket the income tops out in.
/// Non-positive income owes nothing and reports bracket 0.
pub fn compute_tax(taxable_income: Decimal) -> (Decimal, u32) {
    if taxable_income <= Decimal::ZERO {
        return (Decimal::ZERO, 0);
    }
    let mut tax = Decimal::ZERO;
    let mut lower = Decimal::ZERO;
    for (idx, (upper, rate)) in BRACKETS.iter().enumerate() {
        if taxable_income <= *upper {
            tax += (taxable_income - lower) * rate;
            return (tax, (idx + 1) as u32);
        }
        tax += (*upper - lower) * rate;
        lower = *upper;
    }
    // The top bracket is unbounded, so the loop always returns.
    (tax, BRACKETS.len() as u32)
}

/// Gross income less insurance, the personal deduction and the capped
/// per-dependent deduction; floored at zero.
pub fn taxable_income(gross: Decimal, insurance: Decimal, dependents: u32) -> Decimal {
    let dependents = dependents.min(MAX_DEPENDENTS);
    let taxable =
        gross - insurance - PERSONAL_DEDUCTION - DEPENDENT_DEDUCTION * Decimal::from(dependents);
    taxable.max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_income_owe_nothing() {
        assert_eq!(compute_tax(Decimal::ZERO), (Decimal::ZERO, 0));
        assert_eq!(compute_tax(dec!(-1_000_000)), (Decimal::ZERO, 0));
    }

    #[test]
    fn first_bracket_boundary_is_flat_five_percent() {
        let (tax, bracket) = compute_tax(dec!(5_000_000));
        assert_eq!(tax, dec!(250_000));
        assert_eq!(bracket, 1);
    }

    #[test]
    fn second_bracket_taxes_marginal_amount_only() {
        // 5M at 5% + 5M at 10%, not 10M at 10%.
        let (tax, bracket) = compute_tax(dec!(10_000_000));
        assert_eq!(tax, dec!(750_000));
        assert_eq!(bracket, 2);
    }

    #[test]
    fn top_bracket_sums_all_marginal_pieces() {
        // 0.25 + 0.5 + 1.2 + 2.8 + 5 + 8.4 + 7 (millions)
        let (tax, bracket) = compute_tax(dec!(100_000_000));
        assert_eq!(tax, dec!(25_150_000));
        assert_eq!(bracket, 7);
    }

    #[test]
    fn tax_is_monotonic_in_income() {
        let mut previous = Decimal::ZERO;
        for millions in 0..120 {
            let income = Decimal::from(millions) * dec!(1_000_000);
            let (tax, _) = compute_tax(income);
            assert!(
                tax >= previous,
                "tax decreased at {} ({} < {})",
                income,
                tax,
                previous
            );
            previous = tax;
        }
    }

    #[test]
    fn taxable_income_floors_at_zero() {
        assert_eq!(
            taxable_income(dec!(10_000_000), dec!(1_050_000), 0),
            Decimal::ZERO
        );
    }

    #[test]
    fn dependents_deduction_caps_at_nine() {
        let nine = taxable_income(dec!(100_000_000), Decimal::ZERO, 9);
        let twelve = taxable_income(dec!(100_000_000), Decimal::ZERO, 12);
        assert_eq!(nine, twelve);
        assert_eq!(nine, dec!(100_000_000) - dec!(11_000_000) - dec!(39_600_000));
    }
}
