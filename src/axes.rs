//! CF coordinate detection, time decoding and value unpacking.

use crate::error::{ClimateError, ClimateResult};
use crate::metadata::{AttributeValue, Variable};
use chrono::{Duration, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Time,
    Latitude,
    Longitude,
}

impl AxisKind {
    pub fn name(self) -> &'static str {
        match self {
            AxisKind::Time => "time",
            AxisKind::Latitude => "latitude",
            AxisKind::Longitude => "longitude",
        }
    }
}

fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len()).is_some_and(|p| p.eq_ignore_ascii_case(prefix))
}

fn is_time_coordinate(name: &str, axis: Option<&str>, standard_name: Option<&str>, units: Option<&str>) -> bool {
    if axis.is_some_and(|a| a.eq_ignore_ascii_case("T")) {
        return true;
    }

    if standard_name.is_some_and(|sn| sn.eq_ignore_ascii_case("time")) {
        return true;
    }

    if starts_with_ignore_ascii_case(name, "time") || name.eq_ignore_ascii_case("valid_time") {
        return true;
    }

    units.is_some_and(|u| parse_time_units(u).is_ok())
}

fn is_latitude_coordinate(name: &str, standard_name: Option<&str>, units: Option<&str>) -> bool {
    standard_name.is_some_and(|sn| sn.eq_ignore_ascii_case("latitude"))
        || units.is_some_and(|u| {
            let u = u.to_ascii_lowercase();
            u.contains("degrees_north") || u.contains("degree_north")
        })
        || name.eq_ignore_ascii_case("lat")
        || name.eq_ignore_ascii_case("latitude")
}

fn is_longitude_coordinate(name: &str, standard_name: Option<&str>, units: Option<&str>) -> bool {
    standard_name.is_some_and(|sn| sn.eq_ignore_ascii_case("longitude"))
        || units.is_some_and(|u| {
            let u = u.to_ascii_lowercase();
            u.contains("degrees_east") || u.contains("degree_east")
        })
        || name.eq_ignore_ascii_case("lon")
        || name.eq_ignore_ascii_case("longitude")
}

/// Which axis a 1-D coordinate variable describes, if any.
pub fn classify_coordinate(var: &Variable) -> Option<AxisKind> {
    classify_by_name_and_attrs(
        &var.name,
        var.attr_str("axis"),
        var.attr_str("standard_name"),
        var.attr_str("units"),
    )
}

/// Classification for a dimension that has no coordinate variable.
pub fn classify_dimension_name(name: &str) -> Option<AxisKind> {
    classify_by_name_and_attrs(name, None, None, None)
}

fn classify_by_name_and_attrs(
    name: &str,
    axis: Option<&str>,
    standard_name: Option<&str>,
    units: Option<&str>,
) -> Option<AxisKind> {
    if is_latitude_coordinate(name, standard_name, units) {
        Some(AxisKind::Latitude)
    } else if is_longitude_coordinate(name, standard_name, units) {
        Some(AxisKind::Longitude)
    } else if is_time_coordinate(name, axis, standard_name, units) {
        Some(AxisKind::Time)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    Seconds,
    Minutes,
    Hours,
    Days,
}

/// Parsed `<step> since <epoch>` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub step: TimeStep,
    pub epoch: NaiveDateTime,
}

pub fn parse_time_units(units: &str) -> ClimateResult<TimeUnits> {
    let bad = || ClimateError::TimeUnits(units.to_string());

    let trimmed = units.trim();
    let lower = trimmed.to_ascii_lowercase();
    let at = lower.find(" since ").ok_or_else(bad)?;
    let (prefix, rest) = (&lower[..at], &trimmed[at + " since ".len()..]);

    let step = match prefix.trim() {
        "seconds" | "second" | "secs" | "s" => TimeStep::Seconds,
        "minutes" | "minute" | "mins" => TimeStep::Minutes,
        "hours" | "hour" | "hrs" | "h" => TimeStep::Hours,
        "days" | "day" | "d" => TimeStep::Days,
        _ => return Err(bad()),
    };

    let epoch = parse_epoch(rest.trim()).ok_or_else(bad)?;
    Ok(TimeUnits { step, epoch })
}

fn parse_epoch(text: &str) -> Option<NaiveDateTime> {
    // Drop a trailing UTC marker; offsets other than zero are not supported.
    let text = text
        .trim_end_matches(" UTC")
        .trim_end_matches(" utc")
        .trim_end_matches(['Z', 'z'])
        .trim_end_matches("+00:00")
        .trim();

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(t);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Decode numeric offsets into timestamps on the proleptic Gregorian calendar.
pub fn decode_times(values: &[f64], units: &str, calendar: Option<&str>) -> ClimateResult<Vec<NaiveDateTime>> {
    if let Some(cal) = calendar {
        let cal = cal.to_ascii_lowercase();
        if !matches!(cal.as_str(), "standard" | "gregorian" | "proleptic_gregorian") {
            return Err(ClimateError::TimeUnits(format!("{} (calendar '{}')", units, cal)));
        }
    }

    let parsed = parse_time_units(units)?;
    let seconds_per_step = match parsed.step {
        TimeStep::Seconds => 1.0,
        TimeStep::Minutes => 60.0,
        TimeStep::Hours => 3600.0,
        TimeStep::Days => 86400.0,
    };

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return Err(ClimateError::invalid_axis("time", "non-finite time value"));
            }
            let millis = (v * seconds_per_step * 1000.0).round();
            if millis.abs() > i64::MAX as f64 {
                return Err(ClimateError::invalid_axis("time", format!("offset {} out of range", v)));
            }
            parsed
                .epoch
                .checked_add_signed(Duration::milliseconds(millis as i64))
                .ok_or_else(|| ClimateError::invalid_axis("time", format!("offset {} out of range", v)))
        })
        .collect()
}

/// Index of the requested ensemble member along `dimension`.
///
/// Members are matched by coordinate value. With no request the first member
/// is used.
pub fn select_member(dimension: &str, labels: &[f64], member: Option<&str>) -> ClimateResult<usize> {
    let missing = |m: &str| ClimateError::MissingMember {
        dimension: dimension.to_string(),
        member: m.to_string(),
    };

    match member {
        None => {
            if labels.is_empty() {
                return Err(missing("<first>"));
            }
            if labels.len() > 1 {
                tracing::warn!(
                    dimension,
                    member = labels[0],
                    "no ensemble member selected, using the first of {}",
                    labels.len()
                );
            }
            Ok(0)
        }
        Some(m) => {
            let wanted: f64 = m.trim().parse().map_err(|_| missing(m))?;
            labels.iter().position(|&v| v == wanted).ok_or_else(|| missing(m))
        }
    }
}

/// Values from `_FillValue`, `missing_value` and the array fill value,
/// sorted and deduplicated. NaN fill values are omitted.
pub fn missing_values(var: &Variable) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::new();

    if let Some(v) = var.attributes.get("_FillValue") {
        push_missing_values_attr(&mut out, v);
    }

    if let Some(v) = var.attributes.get("missing_value") {
        push_missing_values_attr(&mut out, v);
    }

    if let Some(v) = &var.fill_value {
        push_missing_values_attr(&mut out, v);
    }

    out.retain(|v| v.is_finite());
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup();
    out
}

fn push_missing_values_attr(out: &mut Vec<f64>, value: &AttributeValue) {
    match value {
        AttributeValue::Array(values) => {
            for v in values {
                push_missing_values_attr(out, v);
            }
        }
        other => out.extend(other.as_f64()),
    }
}

/// Replace missing values by NaN, then apply `scale_factor` and `add_offset`.
pub fn unpack(values: &mut [f64], var: &Variable) {
    let missing = missing_values(var);
    let scale = var.attr_f64("scale_factor").unwrap_or(1.0);
    let offset = var.attr_f64("add_offset").unwrap_or(0.0);

    for v in values.iter_mut() {
        if missing.contains(v) {
            *v = f64::NAN;
        } else {
            *v = *v * scale + offset;
        }
    }
}
