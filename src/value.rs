//! Runtime values for executed form source.
//!
//! Arrays and objects are shared and interior-mutable so that authored code
//! sees the reference semantics it expects (`ref.current = x`, `push`).
//! Everything here is single-threaded by construction.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDef;
use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::render::RenderNode;
use crate::scope::Scope;

pub type ObjectMap = IndexMap<String, Value>;

/// Largest length an array can have at all.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;
/// Growth limit used when no render options are in play.
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1_000_000;
/// Arrays and objects nested deeper than this are not walked by conversions.
pub const MAX_NESTING: usize = 256;

/// Identity of a shared array or object, for cycle checks.
type ContainerId = *const ();

pub type NativeImpl = dyn Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, RuntimeError>;

pub struct NativeFunction {
    pub name: String,
    func: Box<NativeImpl>,
}

impl NativeFunction {
    pub fn invoke(
        &self,
        interp: &mut Interpreter,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        (self.func)(interp, this, args)
    }
}

/// A function value defined in authored source, closed over its scope.
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: Scope,
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectMap>>),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Node(Rc<RenderNode>),
    /// Stand-in for a name that was not bound when it was read.
    Placeholder(Rc<str>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: ObjectMap) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn placeholder(name: &str) -> Self {
        Value::Placeholder(Rc::from(name))
    }

    pub fn node(node: RenderNode) -> Self {
        Value::Node(Rc::new(node))
    }

    pub fn native<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, RuntimeError> + 'static,
    {
        Value::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            func: Box::new(func),
        }))
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Native(_) | Value::Placeholder(_)
        )
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Placeholder(_))
    }

    pub fn placeholder_name(&self) -> Option<&str> {
        match self {
            Value::Placeholder(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Node(_) => "object",
            Value::Function(_) | Value::Native(_) | Value::Placeholder(_) => "function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            // Placeholders are inert stand-ins, never a reason to take a branch.
            Value::Placeholder(_) => false,
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined | Value::Placeholder(_) => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as performed by `+` concatenation and template literals.
    /// An array that contains itself contributes an empty string on the
    /// second visit.
    pub fn to_display_string(&self) -> String {
        self.display_inner(&mut Vec::new())
    }

    fn display_inner(&self, seen: &mut Vec<ContainerId>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => {
                let id = Rc::as_ptr(items) as ContainerId;
                if seen.contains(&id) || seen.len() >= MAX_NESTING {
                    return String::new();
                }
                seen.push(id);
                let text = items
                    .borrow()
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.display_inner(seen)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                seen.pop();
                text
            }
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(closure) => format!(
                "function {}() {{ [code] }}",
                closure.def.name.as_deref().unwrap_or("")
            ),
            Value::Native(native) => format!("function {}() {{ [native code] }}", native.name),
            Value::Node(node) => node.text_content(),
            Value::Placeholder(_) => String::new(),
        }
    }

    /// Property read used by member expressions and destructuring.
    pub fn get_property(&self, key: &str) -> Result<Value, RuntimeError> {
        match self {
            Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                self.to_display_string(),
                key
            ))),
            Value::Object(map) => Ok(map.borrow().get(key).cloned().unwrap_or(Value::Undefined)),
            Value::Array(items) => {
                let items = items.borrow();
                if key == "length" {
                    return Ok(Value::Number(items.len() as f64));
                }
                Ok(key
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index).cloned())
                    .unwrap_or(Value::Undefined))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                Ok(key
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| s.chars().nth(index))
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Undefined))
            }
            Value::Function(closure) if key == "name" => Ok(Value::string(
                closure.def.name.as_deref().unwrap_or_default(),
            )),
            Value::Native(native) if key == "name" => Ok(Value::string(&native.name)),
            // Member reads on a placeholder keep the original missing name.
            Value::Placeholder(name) => Ok(Value::Placeholder(name.clone())),
            _ => Ok(Value::Undefined),
        }
    }

    pub fn set_property(&self, key: &str, value: Value) -> Result<(), RuntimeError> {
        self.set_property_within(key, value, DEFAULT_MAX_ARRAY_LENGTH)
    }

    /// Property write. Arrays may not grow past `max_array_length`.
    pub fn set_property_within(
        &self,
        key: &str,
        value: Value,
        max_array_length: usize,
    ) -> Result<(), RuntimeError> {
        match self {
            Value::Object(map) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let len = checked_array_length(value.to_number(), max_array_length)?;
                    items.borrow_mut().resize(len, Value::Undefined);
                    return Ok(());
                }
                let mut items = items.borrow_mut();
                match key.parse::<usize>() {
                    Ok(index) => {
                        if index >= items.len() {
                            let len = checked_array_length(index as f64 + 1.0, max_array_length)?;
                            items.resize(len, Value::Undefined);
                        }
                        items[index] = value;
                        Ok(())
                    }
                    Err(_) => Err(RuntimeError::type_error(format!(
                        "Cannot set property '{}' on an array",
                        key
                    ))),
                }
            }
            Value::Placeholder(_) => Ok(()),
            other => Err(RuntimeError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                other.to_display_string(),
                key
            ))),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => Rc::ptr_eq(a, b),
            (Value::Placeholder(a), Value::Placeholder(b)) => a == b,
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                let (a, b) = (self.to_number(), other.to_number());
                a == b
            }
            _ => self.strict_equals(other),
        }
    }

    /// JSON projection for hosts, logs and test assertions. Functions have
    /// no JSON form and map to `null`; a container met again while it is
    /// still being written becomes the string `"[Circular]"`.
    pub fn to_json(&self) -> serde_json::Value {
        self.json_inner(&mut Vec::new(), false)
            .unwrap_or(serde_json::Value::Null)
    }

    /// JSON projection for `JSON.stringify`: cycles and runaway nesting are
    /// errors instead of markers.
    pub fn try_to_json(&self) -> Result<serde_json::Value, RuntimeError> {
        self.json_inner(&mut Vec::new(), true)
    }

    fn json_inner(
        &self,
        seen: &mut Vec<ContainerId>,
        strict: bool,
    ) -> Result<serde_json::Value, RuntimeError> {
        let container = match self {
            Value::Array(items) => Some(Rc::as_ptr(items) as ContainerId),
            Value::Object(map) => Some(Rc::as_ptr(map) as ContainerId),
            _ => None,
        };
        if let Some(id) = container {
            if seen.contains(&id) {
                if strict {
                    return Err(RuntimeError::type_error(
                        "Converting circular structure to JSON",
                    ));
                }
                return Ok(serde_json::Value::String("[Circular]".to_string()));
            }
            if seen.len() >= MAX_NESTING {
                if strict {
                    return Err(RuntimeError::range_error(format!(
                        "JSON nesting exceeds {} levels",
                        MAX_NESTING
                    )));
                }
                return Ok(serde_json::Value::Null);
            }
            seen.push(id);
        }

        let json = match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.json_inner(seen, strict))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.borrow()
                    .iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined))
                    .map(|(k, v)| Ok((k.clone(), v.json_inner(seen, strict)?)))
                    .collect::<Result<_, RuntimeError>>()?,
            ),
            Value::Node(node) => node.to_json(),
            Value::Function(_) | Value::Native(_) | Value::Placeholder(_) => {
                serde_json::Value::Null
            }
        };

        if container.is_some() {
            seen.pop();
        }
        Ok(json)
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            Value::Function(closure) => write!(
                f,
                "[Function {}]",
                closure.def.name.as_deref().unwrap_or("(anonymous)")
            ),
            Value::Native(native) => write!(f, "[Native {}]", native.name),
            Value::Node(node) => write!(f, "{:?}", node),
            Value::Placeholder(name) => write!(f, "[Placeholder {}]", name),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

/// Validate a requested array length: a whole number the host language
/// accepts, and no more than `limit`.
pub fn checked_array_length(len: f64, limit: usize) -> Result<usize, RuntimeError> {
    if !(len >= 0.0 && len.fract() == 0.0 && len <= MAX_ARRAY_LENGTH as f64) {
        return Err(RuntimeError::range_error("Invalid array length"));
    }
    let len = len as usize;
    if len > limit {
        return Err(RuntimeError::range_error(format!(
            "Array length {} exceeds the limit of {}",
            len, limit
        )));
    }
    Ok(len)
}

/// Number formatting close to the host's `Number.prototype.toString`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Positional argument with `undefined` for anything missing.
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::string("").truthy());
        assert!(Value::string("0").truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::placeholder("Missing").truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::Number(1.0).loose_equals(&Value::string("1")));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
    }

    #[test]
    fn test_placeholder_member_keeps_name() {
        let missing = Value::placeholder("Vitals");
        let member = missing.get_property("bloodPressure").unwrap();
        assert_eq!(member.placeholder_name(), Some("Vitals"));
    }

    #[test]
    fn test_json_projection_skips_undefined() {
        let mut map = ObjectMap::new();
        map.insert("a".to_string(), Value::Number(1.0));
        map.insert("b".to_string(), Value::Undefined);
        let json = Value::object(map).to_json();
        assert_eq!(json, serde_json::json!({ "a": 1.0 }));
    }

    #[test]
    fn test_array_growth_is_bounded() {
        let items = Value::array(vec![]);
        let err = items.set_property("1000000000000", Value::Number(1.0)).unwrap_err();
        assert!(matches!(err, RuntimeError::Range(ref m) if m == "Invalid array length"));

        let err = items
            .set_property("length", Value::Number(4294967296.0 * 1e6))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Range(_)));
        assert!(!err.is_fatal());

        let err = items.set_property_within("10", Value::Null, 8).unwrap_err();
        assert!(err.to_string().contains("exceeds the limit of 8"));
        items.set_property_within("7", Value::Null, 8).unwrap();
        assert_eq!(items.get_property("length").unwrap().as_number(), Some(8.0));
    }

    #[test]
    fn test_checked_array_length() {
        assert_eq!(checked_array_length(3.0, 10).unwrap(), 3);
        assert!(checked_array_length(-1.0, 10).is_err());
        assert!(checked_array_length(1.5, 10).is_err());
        assert!(checked_array_length(f64::NAN, 10).is_err());
        assert!(checked_array_length(4294967296.0, usize::MAX).is_err());
    }

    #[test]
    fn test_circular_structures_are_not_followed() {
        let map = Value::object(ObjectMap::new());
        map.set_property("self", map.clone()).unwrap();
        let err = map.try_to_json().unwrap_err();
        assert!(err.to_string().contains("Converting circular structure to JSON"));
        assert_eq!(map.to_json(), serde_json::json!({ "self": "[Circular]" }));

        let items = Value::array(vec![Value::Number(1.0)]);
        items.set_property("1", items.clone()).unwrap();
        assert_eq!(items.to_display_string(), "1,");
    }

    #[test]
    fn test_shared_values_are_not_circular() {
        let shared = Value::array(vec![Value::Number(1.0)]);
        let pair = Value::array(vec![shared.clone(), shared]);
        assert_eq!(pair.try_to_json().unwrap(), serde_json::json!([[1.0], [1.0]]));
    }
}
