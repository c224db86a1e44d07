//! The attribute bag and helpers shared by records and groups.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// Ordered mapping from attribute name to JSON value.
///
/// Insertion order is preserved, so the order in which a caller supplies keys
/// to `set` is the order their `change:<key>` events fire in.
pub type Attributes = Map<String, Value>;

/// Normalizes the argument shapes accepted by [`Record::set`](crate::Record::set).
///
/// A map or JSON object is taken as-is, a `(key, value)` pair becomes a single
/// entry. Anything that is not an object (including `null`) yields an empty
/// bag, which makes `set` a no-op.
pub trait IntoAttributes {
    fn into_attributes(self) -> Attributes;
}

impl IntoAttributes for Attributes {
    fn into_attributes(self) -> Attributes {
        self
    }
}

impl IntoAttributes for &Attributes {
    fn into_attributes(self) -> Attributes {
        self.clone()
    }
}

impl IntoAttributes for Value {
    fn into_attributes(self) -> Attributes {
        match self {
            Value::Object(map) => map,
            _ => Attributes::new(),
        }
    }
}

impl<K: Into<String>> IntoAttributes for (K, Value) {
    fn into_attributes(self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert(self.0.into(), self.1);
        attrs
    }
}

impl IntoAttributes for Option<Attributes> {
    fn into_attributes(self) -> Attributes {
        self.unwrap_or_default()
    }
}

/// Resolve a dotted attribute path (`"author.name"`, `"tags.0"`).
///
/// Array segments must be numeric indices. Returns `None` when any segment is
/// missing.
pub fn resolve_path<'a>(attrs: &'a Attributes, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = attrs.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Deep equality where `1` and `1.0` are the same number.
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => json_equal(a, b),
        _ => false,
    }
}

fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| json_equal(value, other)))
        }
        _ => a == b,
    }
}

/// Truthiness of an attribute value, as used by `Record::is`.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Ordering for derived sort keys.
///
/// Numbers, then strings, then booleans, then arrays/objects; absent and
/// `null` keys sort after everything else.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            Some(Value::Number(_)) => 0,
            Some(Value::String(_)) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 3,
            Some(Value::Null) | None => 4,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Key under which a server id is stored in identity indexes.
///
/// Strings are used verbatim and numbers by their decimal form, so `1` and
/// `"1"` address the same member. `null` and compound values are not ids.
pub fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether `attrs` contains every entry of `query` (partial match).
pub fn matches(attrs: &Attributes, query: &Attributes) -> bool {
    query
        .iter()
        .all(|(key, expected)| values_equal(attrs.get(key), Some(expected)))
}
