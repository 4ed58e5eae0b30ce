//! Fisher's exact test on 2x2 contingency tables.

use statrs::function::factorial::ln_binomial;

/// Relative tolerance when comparing table probabilities against the observed one.
const RELATIVE_TOLERANCE: f64 = 1e-7;

/// Two-sided Fisher's exact test p-value for the table `[[a, b], [c, d]]`.
///
/// Sums the hypergeometric probabilities of every table with the same margins that is no
/// more likely than the observed one. Result is clamped to `[0, 1]`.
///
/// # Examples
///
/// ```
/// use minorseq_lib::stats::fisher_exact_two_sided;
///
/// // identical rows are not significant
/// assert!((fisher_exact_two_sided(5, 5, 5, 5) - 1.0).abs() < 1e-9);
/// assert!(fisher_exact_two_sided(10, 0, 0, 10) < 1e-4);
/// ```
#[must_use]
pub fn fisher_exact_two_sided(a: u64, b: u64, c: u64, d: u64) -> f64 {
    let row1 = a + b;
    let col1 = a + c;
    let total = a + b + c + d;
    if total == 0 {
        return 1.0;
    }

    let ln_denominator = ln_binomial(total, row1);
    let ln_prob =
        |x: u64| ln_binomial(col1, x) + ln_binomial(total - col1, row1 - x) - ln_denominator;

    let observed = ln_prob(a);
    let threshold = observed + RELATIVE_TOLERANCE.ln_1p();
    let low = row1.saturating_sub(total - col1);
    let high = row1.min(col1);

    let p: f64 = (low..=high).map(ln_prob).filter(|&lp| lp <= threshold).map(f64::exp).sum();
    p.clamp(0.0, 1.0)
}

/// Round a non-negative count to the next whole number for use in a contingency table.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ceil_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 { value.ceil() as u64 } else { 0 }
}
