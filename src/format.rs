//! Sexagesimal display of equatorial coordinates. Fields are truncated, not
//! rounded, so a display never shows 60 seconds.

fn split_sexagesimal(value: f64) -> (u32, u32, u32) {
    let whole = value.trunc();
    let minutes = (value - whole) * 60.0;
    let seconds = (minutes - minutes.trunc()) * 60.0;
    (whole as u32, minutes.trunc() as u32, seconds.trunc() as u32)
}

/// Right ascension in degrees as `HHhMMmSSs`.
pub fn format_ra_hms(ra_deg: f64) -> String {
    let (h, m, s) = split_sexagesimal(ra_deg.max(0.0) / 15.0);
    format!("{h:02}h{m:02}m{s:02}s")
}

/// Declination in degrees as `±DD°MM'SS"`.
pub fn format_dec_dms(dec_deg: f64) -> String {
    let sign = if dec_deg >= 0.0 { '+' } else { '-' };
    let (d, m, s) = split_sexagesimal(dec_deg.abs());
    format!("{sign}{d:02}°{m:02}'{s:02}\"")
}
