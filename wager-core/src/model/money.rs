/// All amounts are fixed-point minor units (cents). Never floating point.
pub type Cents = i64;

/// `commission = min(commission_flat, gross_pot)`, `tax = floor(taxable * pct / 100)`.
/// Kept as a free function (not a method on a config type) so the payout
/// resolver and any future fee calculator can share the exact same rounding.
pub fn apply_tax(taxable: Cents, payout_tax_percent: i64) -> Cents {
    (taxable * payout_tax_percent) / 100
}
