// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Level conversion between decibels and raw device units.
//!
//! The device exposes levels as integers in `0..=65535` where 32768 is unity
//! gain. Users see decibels in `-65..=+6` with 0.5 dB resolution. Both
//! directions saturate on out-of-range input.
//!
//! The fader curve pair works in normalized `[0, 1]` space and is never
//! applied by the dB/raw functions; callers compose the two themselves.

/// Lowest decibel value; also represents silence.
pub const MIN_DB: f64 = -65.0;
/// Highest decibel value.
pub const MAX_DB: f64 = 6.0;
/// Lowest raw device value.
pub const MIN_RAW: i64 = 0;
/// Highest raw device value.
pub const MAX_RAW: i64 = 65535;
/// Raw value corresponding to 0 dB.
pub const UNITY_RAW: f64 = 32768.0;
/// Default exponent for the fader curve.
pub const DEFAULT_CURVE_EXPONENT: f64 = 2.0;

/// Round to the nearest 0.5 dB; ties go towards positive infinity.
#[inline]
fn round_half_db(db: f64) -> f64 {
    (db * 2.0 + 0.5).floor() / 2.0
}

/// Convert a raw device value to decibels.
///
/// Raw 0 maps exactly to [`MIN_DB`] instead of negative infinity.
pub fn raw_to_db(raw: i64) -> f64 {
    let raw = raw.clamp(MIN_RAW, MAX_RAW);
    if raw == MIN_RAW {
        return MIN_DB;
    }

    let db = 20.0 * (raw as f64 / UNITY_RAW).log10();
    round_half_db(db.clamp(MIN_DB, MAX_DB))
}

/// Convert decibels to a raw device value.
///
/// [`MIN_DB`] maps exactly to raw 0. NaN is treated as silence.
pub fn db_to_raw(db: f64) -> i64 {
    if db.is_nan() {
        return MIN_RAW;
    }

    let db = round_half_db(db.clamp(MIN_DB, MAX_DB));
    if db <= MIN_DB {
        return MIN_RAW;
    }

    let raw = (UNITY_RAW * 10.0_f64.powf(db / 20.0)).round() as i64;
    raw.clamp(MIN_RAW, MAX_RAW)
}

/// Map a linear percentage (0..=100) onto the decibel range.
pub fn percentage_to_db(percentage: f64) -> f64 {
    let db = (percentage / 100.0) * (MAX_DB - MIN_DB) + MIN_DB;
    round_half_db(db.clamp(MIN_DB, MAX_DB))
}

/// Apply the fader curve to a normalized position.
///
/// The position is clamped to `[0, 1]`; a non-positive exponent falls back
/// to [`DEFAULT_CURVE_EXPONENT`].
pub fn apply_curve(position: f64, exponent: f64) -> f64 {
    position.clamp(0.0, 1.0).powf(sanitize_exponent(exponent))
}

/// Inverse of [`apply_curve`].
pub fn remove_curve(value: f64, exponent: f64) -> f64 {
    value.clamp(0.0, 1.0).powf(1.0 / sanitize_exponent(exponent))
}

fn sanitize_exponent(exponent: f64) -> f64 {
    if exponent.is_finite() && exponent > 0.0 {
        exponent
    } else {
        DEFAULT_CURVE_EXPONENT
    }
}
