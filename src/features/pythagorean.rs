//! Pythagorean expectation from goals scored and conceded

/// Exponent fitted for league soccer
pub const DEFAULT_EXPONENT: f64 = 1.35;

/// Expected win share `GF^e / (GF^e + GA^e)`.
///
/// Degenerate totals are pinned: no goals either way is a coin flip, a clean
/// sheet record is 1.0 and a scoreless one is 0.0.
pub fn pythagorean(goals_for: f64, goals_against: f64, exponent: f64) -> f64 {
    match (goals_for > 0.0, goals_against > 0.0) {
        (false, false) => 0.5,
        (true, false) => 1.0,
        (false, true) => 0.0,
        (true, true) => {
            let gf = goals_for.powf(exponent);
            let ga = goals_against.powf(exponent);
            gf / (gf + ga)
        }
    }
}
