//! Parsing of Tinker program output

use regex_lite::Regex;

/// Number of a menu entry in an `xyzedit` listing, e.g. `(18) Translate and
/// Rotate to Inertial Frame` → 18
pub fn menu_option(output: &str, label: &str) -> Option<u32> {
    let pattern = format!(r"\((\d+)\) {}", regex_lite::escape(label));
    let re = Regex::new(&pattern).ok()?;
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

/// Total charge reported by `analyze`, truncated to whole electrons
pub fn total_charge(output: &str) -> Option<i64> {
    let re = Regex::new(r"Total Electric Charge :\s+([-+]?\d*\.\d+|\d+)\s+Electrons").ok()?;
    let value: f64 = re.captures(output)?.get(1)?.as_str().parse().ok()?;
    Some(value.trunc() as i64)
}
