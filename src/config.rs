use crate::db;
use crate::pivot::GradeBands;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_WARN_BELOW_PERCENT: i64 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupSection {
    Grading,
    Attendance,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Grading, SetupSection::Attendance];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Attendance => "attendance",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Attendance => "setup.attendance",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => {
            let bands = GradeBands::default();
            json!({
                "a": bands.a,
                "b": bands.b,
                "c": bands.c,
                "d": bands.d
            })
        }
        SetupSection::Attendance => json!({
            "warnBelowPercent": DEFAULT_WARN_BELOW_PERCENT
        }),
    }
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

/// Applies `patch` field by field, then checks cross-field rules on the
/// merged result.
pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "a" | "b" | "c" | "d" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Attendance => match k.as_str() {
                "warnBelowPercent" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 100)?));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
        }
    }
    if section == SetupSection::Grading {
        bands_from_value(current)?.validate()?;
    }
    Ok(())
}

fn bands_from_value(v: &Value) -> Result<GradeBands, String> {
    serde_json::from_value(v.clone()).map_err(|e| format!("grading: {}", e))
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            let mut merged = current.clone();
            match merge_section_patch(section, &mut merged, saved_obj) {
                Ok(()) => current = merged,
                Err(msg) => {
                    tracing::warn!(section = section.name(), "ignoring saved settings: {msg}")
                }
            }
        }
    }
    Ok(current)
}

pub fn save_section(conn: &Connection, section: SetupSection, value: &Value) -> anyhow::Result<()> {
    db::settings_set_json(conn, section.key(), value)
}

pub fn grade_bands(conn: &Connection) -> anyhow::Result<GradeBands> {
    let value = load_section(conn, SetupSection::Grading)?;
    bands_from_value(&value).map_err(anyhow::Error::msg)
}

pub fn warn_below_percent(conn: &Connection) -> anyhow::Result<u32> {
    let value = load_section(conn, SetupSection::Attendance)?;
    let pct = value
        .get("warnBelowPercent")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_WARN_BELOW_PERCENT as u64);
    Ok(pct as u32)
}
