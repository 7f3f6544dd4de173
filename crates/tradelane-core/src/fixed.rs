use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time. One tick is one sim minute.
pub type Ticks = u64;

/// Whole units of a good, or credits. Never negative inside a ledger.
pub type Units = i64;

pub const TICKS_PER_HOUR: Ticks = 60;
pub const TICKS_PER_DAY: Ticks = 1440;

/// Basis-point scale (100% = 10000).
pub const BPS_SCALE: i64 = 10_000;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    if v.is_nan() {
        return Fixed64::ZERO;
    }
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Checked division for Fixed64 that returns None on zero divisor.
#[inline]
pub fn checked_div_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_div(b)
}

/// Division rounded toward positive infinity at the last fractional bit.
/// Used for per-tick progress so that `n` steps of `1/n` always reach 1.
pub fn checked_div_ceil_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    if b == Fixed64::ZERO {
        return None;
    }
    let num = (a.to_bits() as i128) << 32;
    let den = b.to_bits() as i128;
    let mut q = num / den;
    if num % den != 0 && ((num > 0) == (den > 0)) {
        q += 1;
    }
    i64::try_from(q).ok().map(Fixed64::from_bits)
}

/// Ceiling of a non-negative fixed value as whole ticks, never below 1.
pub fn ceil_ticks(v: Fixed64) -> Ticks {
    if v <= Fixed64::ZERO {
        return 1;
    }
    let whole: i64 = v.ceil().to_num::<i64>();
    whole.max(1) as Ticks
}

/// Locale-independent rendering with a fixed number of decimals.
pub fn format_fixed(v: Fixed64, decimals: usize) -> String {
    format!("{:.*}", decimals, fixed64_to_f64(v))
}
