//! Climb record model.
//! Canonical shape of a climb plus the coercion rules that turn any JSON value
//! (published files, older local slots, hand-edited exports) into that shape.
//! `normalize` never fails: anything it cannot make sense of degrades to an
//! empty/default field instead.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Folder (relative to the published data file) that holds rendered previews.
pub const IMAGES_FOLDER: &str = "climb-images";

/// One of the four hold categories a point can be annotated with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MarkType {
    #[default]
    Start,
    Mid,
    Finish,
    Foot,
}

impl MarkType {
    /// Fixed draw/storage order.
    pub const ALL: [MarkType; 4] = [MarkType::Start, MarkType::Mid, MarkType::Finish, MarkType::Foot];

    pub fn as_str(self) -> &'static str {
        match self {
            MarkType::Start => "start",
            MarkType::Mid => "mid",
            MarkType::Finish => "finish",
            MarkType::Foot => "foot",
        }
    }
}

impl fmt::Display for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(MarkType::Start),
            "mid" => Ok(MarkType::Mid),
            "finish" => Ok(MarkType::Finish),
            "foot" => Ok(MarkType::Foot),
            other => anyhow::bail!("Unknown mark type '{}' (expected start, mid, finish or foot)", other),
        }
    }
}

/// Board-relative position, both axes normally in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rounds both coordinates to 4 decimal places.
    pub fn rounded(self) -> Self {
        Self {
            x: round4(self.x),
            y: round4(self.y),
        }
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// A single element of a mark list.
///
/// Elements are not validated on load, so anything that is not an exact
/// `{x, y}` number pair is carried through verbatim as `Opaque`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarkEntry {
    Point(Point),
    Opaque(Value),
}

impl MarkEntry {
    fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Point>(value.clone()) {
            Ok(point) => MarkEntry::Point(point),
            Err(_) => MarkEntry::Opaque(value),
        }
    }

    /// Drawable position: any element carrying numeric `x` and `y`, extra keys ignored.
    pub fn as_point(&self) -> Option<Point> {
        match self {
            MarkEntry::Point(p) => Some(*p),
            MarkEntry::Opaque(value) => {
                let x = value.get("x")?.as_f64()?;
                let y = value.get("y")?.as_f64()?;
                Some(Point::new(x, y))
            }
        }
    }
}

impl From<Point> for MarkEntry {
    fn from(point: Point) -> Self {
        MarkEntry::Point(point)
    }
}

/// The unit of persistence. Field order matches the published JSON layout.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimbRecord {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub first_ascent: String,
    pub image: String,
    pub start: Vec<MarkEntry>,
    pub mid: Vec<MarkEntry>,
    pub finish: Vec<MarkEntry>,
    pub foot: Vec<MarkEntry>,
    pub created_at: i64,
    /// Fields this version does not know about, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClimbRecord {
    /// Empty record for `id`, with the default preview path.
    pub fn blank(id: impl Into<String>, created_at: i64) -> Self {
        let id = id.into();
        Self {
            image: default_image_path(&id),
            id,
            name: String::new(),
            grade: String::new(),
            first_ascent: String::new(),
            start: Vec::new(),
            mid: Vec::new(),
            finish: Vec::new(),
            foot: Vec::new(),
            created_at,
            extra: Map::new(),
        }
    }

    pub fn marks(&self, kind: MarkType) -> &[MarkEntry] {
        match kind {
            MarkType::Start => &self.start,
            MarkType::Mid => &self.mid,
            MarkType::Finish => &self.finish,
            MarkType::Foot => &self.foot,
        }
    }

    pub fn marks_mut(&mut self, kind: MarkType) -> &mut Vec<MarkEntry> {
        match kind {
            MarkType::Start => &mut self.start,
            MarkType::Mid => &mut self.mid,
            MarkType::Finish => &mut self.finish,
            MarkType::Foot => &mut self.foot,
        }
    }

    /// Total number of marks across all four lists.
    pub fn count_marks(&self) -> usize {
        MarkType::ALL.iter().map(|kind| self.marks(*kind).len()).sum()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `"climb-images/<id>.png"`
pub fn default_image_path(id: &str) -> String {
    format!("{}/{}.png", IMAGES_FOLDER, id)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Coerces an arbitrary JSON value into a `ClimbRecord`.
pub fn normalize(raw: &Value) -> ClimbRecord {
    normalize_at(raw, now_millis())
}

/// `normalize` with an explicit clock, used when `createdAt` must be defaulted.
pub fn normalize_at(raw: &Value, now: i64) -> ClimbRecord {
    let mut fields = match raw {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    let id = coerce_string(fields.remove("id"));
    let name = coerce_string(fields.remove("name"));
    let grade = coerce_string(fields.remove("grade"));
    let first_ascent = coerce_string(fields.remove("firstAscent"));

    // Truncate before the zero check so fractions in (-1, 1) also fall back to `now`.
    let created_at = match coerce_number(fields.remove("createdAt")) {
        n if n.is_finite() && n as i64 != 0 => n as i64,
        _ => now,
    };

    let start = coerce_marks(fields.remove("start"));
    let mid = coerce_marks(fields.remove("mid"));
    let finish = coerce_marks(fields.remove("finish"));
    let foot = coerce_marks(fields.remove("foot"));

    let mut image = coerce_string(fields.remove("image"));
    if image.is_empty() && !id.is_empty() {
        image = default_image_path(&id);
    }

    ClimbRecord {
        id,
        name,
        grade,
        first_ascent,
        image,
        start,
        mid,
        finish,
        foot,
        created_at,
        extra: fields,
    }
}

fn coerce_marks(value: Option<Value>) -> Vec<MarkEntry> {
    match value {
        Some(Value::Array(items)) => items.into_iter().map(MarkEntry::from_value).collect(),
        _ => Vec::new(),
    }
}

// Falsy values (missing, null, false, 0, "") become the empty string.
fn coerce_string(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::Number(n)) if n.as_f64().is_none_or(|f| f == 0.0) => String::new(),
        Some(value) => display_string(&value),
    }
}

fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_string(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn number_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) => float_string(f),
        None => n.to_string(),
    }
}

// Plain decimals for magnitudes in [1e-6, 1e21), exponent form with a signed
// exponent outside it ("1e-7", "1.5e+21").
fn float_string(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&f.abs()) {
        return f.to_string();
    }
    let text = format!("{:e}", f);
    match text.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{}e+{}", mantissa, exponent),
        _ => text,
    }
}

// NaN marks "not a number"; the caller treats it like zero.
fn coerce_number(value: Option<Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_number(&s),
        // Arrays go through their joined string form: [] is 0, [7] is 7, [1, 2] is NaN.
        Some(value @ Value::Array(_)) => parse_number(&display_string(&value)),
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            if digits.starts_with('+') {
                return f64::NAN;
            }
            return u64::from_str_radix(digits, radix).map_or(f64::NAN, |n| n as f64);
        }
    }
    let unsigned = trimmed.trim_start_matches(['+', '-']);
    match unsigned {
        _ if trimmed.len() - unsigned.len() > 1 => f64::NAN,
        "Infinity" if trimmed.starts_with('-') => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        // "inf" and "nan" spellings are not numbers here; only digits and '.' may lead.
        _ if !unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}
