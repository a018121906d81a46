//! Global constants, host stand-ins and the built-in methods of arrays,
//! strings and numbers.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{error, info, warn};

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::value::{arg, checked_array_length, format_number, ObjectMap, Value, MAX_NESTING};

type BuiltinResult = Result<Value, RuntimeError>;

/// `{ name, message }` object used for thrown and caught errors.
pub fn error_object(name: &str, message: &str) -> Value {
    let mut map = ObjectMap::new();
    map.insert("name".to_string(), Value::string(name));
    map.insert("message".to_string(), Value::string(message));
    Value::object(map)
}

fn namespace(entries: Vec<(&str, Value)>) -> Value {
    Value::object(
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

fn math_fn(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    (
        name,
        Value::native(name, move |_, _, args| Ok(Value::Number(f(arg(args, 0).to_number())))),
    )
}

fn console_line(args: &[Value]) -> String {
    args.iter()
        .map(|value| match value {
            Value::String(s) => s.to_string(),
            Value::Object(_) | Value::Array(_) => value.to_json().to_string(),
            other => other.to_display_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Built-in globals written last into every environment.
pub fn global_constants() -> IndexMap<String, Value> {
    let mut globals: IndexMap<String, Value> = IndexMap::new();

    globals.insert(
        "Math".to_string(),
        namespace(vec![
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
            math_fn("floor", f64::floor),
            math_fn("ceil", f64::ceil),
            math_fn("round", |n| (n + 0.5).floor()),
            math_fn("abs", f64::abs),
            math_fn("sqrt", f64::sqrt),
            math_fn("trunc", f64::trunc),
            math_fn("sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
            (
                "max",
                Value::native("max", |_, _, args| {
                    Ok(Value::Number(args.iter().map(Value::to_number).fold(
                        f64::NEG_INFINITY,
                        |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) },
                    )))
                }),
            ),
            (
                "min",
                Value::native("min", |_, _, args| {
                    Ok(Value::Number(args.iter().map(Value::to_number).fold(
                        f64::INFINITY,
                        |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) },
                    )))
                }),
            ),
            (
                "pow",
                Value::native("pow", |_, _, args| {
                    Ok(Value::Number(
                        arg(args, 0).to_number().powf(arg(args, 1).to_number()),
                    ))
                }),
            ),
            // Deterministic so that renders are reproducible.
            ("random", Value::native("random", |_, _, _| Ok(Value::Number(0.5)))),
        ]),
    );

    globals.insert(
        "JSON".to_string(),
        namespace(vec![
            (
                "stringify",
                Value::native("stringify", |_, _, args| {
                    let value = arg(args, 0);
                    if matches!(value, Value::Undefined) {
                        return Ok(Value::Undefined);
                    }
                    let json = value.try_to_json()?;
                    let text = if arg(args, 2).truthy() {
                        serde_json::to_string_pretty(&json)
                    } else {
                        serde_json::to_string(&json)
                    };
                    text.map(Value::from)
                        .map_err(|e| RuntimeError::type_error(e.to_string()))
                }),
            ),
            (
                "parse",
                Value::native("parse", |_, _, args| {
                    let text = arg(args, 0).to_display_string();
                    match serde_json::from_str::<serde_json::Value>(&text) {
                        Ok(json) => Ok(Value::from_json(&json)),
                        Err(e) => {
                            let message = e.to_string();
                            Err(RuntimeError::Thrown {
                                message: format!("SyntaxError: {}", message),
                                value: error_object("SyntaxError", &message),
                            })
                        }
                    }
                }),
            ),
        ]),
    );

    globals.insert(
        "Object".to_string(),
        namespace(vec![
            (
                "keys",
                Value::native("keys", |_, _, args| {
                    Ok(Value::array(
                        entries_of(&arg(args, 0)).into_iter().map(|(k, _)| Value::from(k)).collect(),
                    ))
                }),
            ),
            (
                "values",
                Value::native("values", |_, _, args| {
                    Ok(Value::array(
                        entries_of(&arg(args, 0)).into_iter().map(|(_, v)| v).collect(),
                    ))
                }),
            ),
            (
                "entries",
                Value::native("entries", |_, _, args| {
                    Ok(Value::array(
                        entries_of(&arg(args, 0))
                            .into_iter()
                            .map(|(k, v)| Value::array(vec![Value::from(k), v]))
                            .collect(),
                    ))
                }),
            ),
            (
                "assign",
                Value::native("assign", |interp, _, args| {
                    let target = arg(args, 0);
                    for source in args.iter().skip(1) {
                        for (key, value) in entries_of(source) {
                            target.set_property_within(&key, value, interp.max_array_length())?;
                        }
                    }
                    Ok(target)
                }),
            ),
            (
                "fromEntries",
                Value::native("fromEntries", |_, _, args| {
                    let mut map = ObjectMap::new();
                    if let Value::Array(items) = arg(args, 0) {
                        for pair in items.borrow().iter() {
                            let key = pair.get_property("0")?.to_display_string();
                            map.insert(key, pair.get_property("1")?);
                        }
                    }
                    Ok(Value::object(map))
                }),
            ),
            ("freeze", Value::native("freeze", |_, _, args| Ok(arg(args, 0)))),
        ]),
    );

    let array_ctor = namespace(vec![
        (
            "isArray",
            Value::native("isArray", |_, _, args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
            }),
        ),
        (
            "from",
            Value::native("from", |interp, _, args| {
                let source = arg(args, 0);
                let items = match &source {
                    Value::Array(items) => items.borrow().clone(),
                    Value::String(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
                    Value::Object(_) => {
                        let len = source.get_property("length")?.to_number();
                        let len = if len.is_nan() || len <= 0.0 { 0.0 } else { len.trunc() };
                        let len = checked_array_length(len, interp.max_array_length())?;
                        vec![Value::Undefined; len]
                    }
                    _ => Vec::new(),
                };
                let mapper = arg(args, 1);
                if mapper.is_callable() {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        out.push(interp.call_function(
                            &mapper,
                            &Value::Undefined,
                            &[item, Value::Number(i as f64)],
                        )?);
                    }
                    return Ok(Value::array(out));
                }
                Ok(Value::array(items))
            }),
        ),
        ("of", Value::native("of", |_, _, args| Ok(Value::array(args.to_vec())))),
    ]);
    globals.insert("Array".to_string(), array_ctor);

    globals.insert(
        "String".to_string(),
        Value::native("String", |_, _, args| {
            Ok(Value::from(arg(args, 0).to_display_string()))
        }),
    );
    globals.insert(
        "Number".to_string(),
        Value::native("Number", |_, _, args| {
            Ok(Value::Number(match args.first() {
                Some(value) => value.to_number(),
                None => 0.0,
            }))
        }),
    );
    globals.insert(
        "Boolean".to_string(),
        Value::native("Boolean", |_, _, args| Ok(Value::Bool(arg(args, 0).truthy()))),
    );
    globals.insert(
        "Error".to_string(),
        Value::native("Error", |_, _, args| {
            let message = match arg(args, 0) {
                Value::Undefined => String::new(),
                other => other.to_display_string(),
            };
            Ok(error_object("Error", &message))
        }),
    );
    globals.insert(
        "parseInt".to_string(),
        Value::native("parseInt", |_, _, args| {
            Ok(Value::Number(parse_int(
                &arg(args, 0).to_display_string(),
                arg(args, 1),
            )))
        }),
    );
    globals.insert(
        "parseFloat".to_string(),
        Value::native("parseFloat", |_, _, args| {
            Ok(Value::Number(parse_float(&arg(args, 0).to_display_string())))
        }),
    );
    globals.insert(
        "isNaN".to_string(),
        Value::native("isNaN", |_, _, args| {
            Ok(Value::Bool(arg(args, 0).to_number().is_nan()))
        }),
    );
    globals.insert(
        "console".to_string(),
        namespace(vec![
            (
                "log",
                Value::native("log", |_, _, args| {
                    info!(target: "form_runtime::console", "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "info",
                Value::native("info", |_, _, args| {
                    info!(target: "form_runtime::console", "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "warn",
                Value::native("warn", |_, _, args| {
                    warn!(target: "form_runtime::console", "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "error",
                Value::native("error", |_, _, args| {
                    error!(target: "form_runtime::console", "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
        ]),
    );
    globals.insert(
        "window".to_string(),
        namespace(vec![
            ("innerWidth", Value::Number(1280.0)),
            ("innerHeight", Value::Number(800.0)),
            ("location", namespace(vec![("href", Value::string("about:blank"))])),
        ]),
    );
    globals.insert(
        "document".to_string(),
        namespace(vec![("title", Value::string(""))]),
    );
    globals.insert("undefined".to_string(), Value::Undefined);
    globals.insert("NaN".to_string(), Value::Number(f64::NAN));
    globals.insert("Infinity".to_string(), Value::Number(f64::INFINITY));

    globals
}

fn entries_of(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_int(text: &str, radix: Value) -> f64 {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let mut radix = match radix {
        Value::Undefined => 10,
        other => other.to_number() as u32,
    };
    let mut digits = digits;
    if radix == 0 || radix == 16 {
        if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            digits = hex;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let valid: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    let mut result = 0.0;
    for c in valid.chars() {
        result = result * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64;
    }
    if negative {
        -result
    } else {
        result
    }
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    if text.starts_with("Infinity") || text.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if text.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    // Longest prefix that parses as a number.
    let mut best = f64::NAN;
    for (i, c) in text.char_indices() {
        if !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) {
            break;
        }
        if let Ok(n) = text[..i + c.len_utf8()].parse::<f64>() {
            best = n;
        }
    }
    best
}

// ═══════════════════════════════════════════════════════════════════════════════
// METHODS
// ═══════════════════════════════════════════════════════════════════════════════

fn index_arg(value: &Value, len: usize, default: usize) -> usize {
    match value {
        Value::Undefined => default,
        other => {
            let n = other.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                (len as f64 + n.trunc()).max(0.0) as usize
            } else {
                (n.trunc() as usize).min(len)
            }
        }
    }
}

fn flatten_into(
    items: &[Value],
    depth: usize,
    limit: usize,
    out: &mut Vec<Value>,
) -> Result<(), RuntimeError> {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => {
                flatten_into(&inner.borrow(), depth - 1, limit, out)?
            }
            other => {
                if out.len() >= limit {
                    return Err(RuntimeError::range_error("Invalid array length"));
                }
                out.push(other.clone());
            }
        }
    }
    Ok(())
}

/// Built-in array method, or `None` when `name` is not one.
pub fn call_array_method(
    interp: &mut Interpreter,
    items: &Rc<RefCell<Vec<Value>>>,
    this: &Value,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, RuntimeError> {
    let snapshot = items.borrow().clone();
    let callback = arg(args, 0);

    let each = |interp: &mut Interpreter, index: usize, item: &Value| -> BuiltinResult {
        interp.call_function(
            &callback,
            &Value::Undefined,
            &[item.clone(), Value::Number(index as f64), this.clone()],
        )
    };

    let result = match name {
        "map" => {
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.iter().enumerate() {
                out.push(each(interp, i, item)?);
            }
            Value::array(out)
        }
        "filter" => {
            let mut out = Vec::new();
            for (i, item) in snapshot.iter().enumerate() {
                if each(interp, i, item)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        "find" | "findIndex" => {
            let mut found = None;
            for (i, item) in snapshot.iter().enumerate() {
                if each(interp, i, item)?.truthy() {
                    found = Some((i, item.clone()));
                    break;
                }
            }
            match (name, found) {
                ("find", Some((_, item))) => item,
                ("find", None) => Value::Undefined,
                (_, Some((i, _))) => Value::Number(i as f64),
                (_, None) => Value::Number(-1.0),
            }
        }
        "some" => {
            let mut any = false;
            for (i, item) in snapshot.iter().enumerate() {
                if each(interp, i, item)?.truthy() {
                    any = true;
                    break;
                }
            }
            Value::Bool(any)
        }
        "every" => {
            let mut all = true;
            for (i, item) in snapshot.iter().enumerate() {
                if !each(interp, i, item)?.truthy() {
                    all = false;
                    break;
                }
            }
            Value::Bool(all)
        }
        "forEach" => {
            for (i, item) in snapshot.iter().enumerate() {
                each(interp, i, item)?;
            }
            Value::Undefined
        }
        "reduce" => {
            let mut iter = snapshot.iter().enumerate();
            let mut acc = if args.len() > 1 {
                arg(args, 1)
            } else {
                match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(RuntimeError::type_error(
                            "Reduce of empty array with no initial value",
                        ))
                    }
                }
            };
            for (i, item) in iter {
                acc = interp.call_function(
                    &callback,
                    &Value::Undefined,
                    &[acc, item.clone(), Value::Number(i as f64), this.clone()],
                )?;
            }
            acc
        }
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display_string(),
            };
            Value::from(
                snapshot
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.to_display_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(snapshot.iter().any(|item| {
                item.strict_equals(&needle)
                    || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            }))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Value::Number(
                snapshot
                    .iter()
                    .position(|item| item.strict_equals(&needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
            )
        }
        "slice" => {
            let len = snapshot.len();
            let start = index_arg(&arg(args, 0), len, 0);
            let end = index_arg(&arg(args, 1), len, len);
            Value::array(if start < end {
                snapshot[start..end].to_vec()
            } else {
                Vec::new()
            })
        }
        "concat" => {
            let mut out = snapshot.clone();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::array(out)
        }
        "push" => {
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Value::Number(items.len() as f64)
        }
        "flat" => {
            let depth = match arg(args, 0) {
                Value::Undefined => 1,
                other => (other.to_number().max(0.0) as usize).min(MAX_NESTING),
            };
            let mut out = Vec::new();
            flatten_into(&snapshot, depth, interp.max_array_length(), &mut out)?;
            Value::array(out)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            this.clone()
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Built-in string method, or `None` when `name` is not one.
pub fn call_string_method(
    text: &str,
    name: &str,
    args: &[Value],
    max_length: usize,
) -> Result<Option<Value>, RuntimeError> {
    let text_arg = |i: usize| arg(args, i).to_display_string();
    let chars: Vec<char> = text.chars().collect();

    let result = match name {
        "toUpperCase" => Value::from(text.to_uppercase()),
        "toLowerCase" => Value::from(text.to_lowercase()),
        "trim" => Value::from(text.trim()),
        "includes" => Value::Bool(text.contains(text_arg(0).as_str())),
        "startsWith" => Value::Bool(text.starts_with(text_arg(0).as_str())),
        "endsWith" => Value::Bool(text.ends_with(text_arg(0).as_str())),
        "indexOf" => Value::Number(
            text.find(text_arg(0).as_str())
                .map(|byte| text[..byte].chars().count() as f64)
                .unwrap_or(-1.0),
        ),
        "split" => match arg(args, 0) {
            Value::Undefined => Value::array(vec![Value::from(text)]),
            separator => {
                let separator = separator.to_display_string();
                let parts: Vec<Value> = if separator.is_empty() {
                    chars.iter().map(|c| Value::string(c.to_string())).collect()
                } else {
                    text.split(separator.as_str()).map(Value::from).collect()
                };
                Value::array(parts)
            }
        },
        "slice" | "substring" => {
            let len = chars.len();
            let start = index_arg(&arg(args, 0), len, 0);
            let end = index_arg(&arg(args, 1), len, len);
            if start < end {
                Value::from(chars[start..end].iter().collect::<String>())
            } else {
                Value::string("")
            }
        }
        "replace" => Value::from(text.replacen(text_arg(0).as_str(), &text_arg(1), 1)),
        "replaceAll" => Value::from(text.replace(text_arg(0).as_str(), &text_arg(1))),
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            if target > max_length as f64 {
                return Err(RuntimeError::range_error("Invalid string length"));
            }
            let target = if target > 0.0 { target as usize } else { 0 };
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_display_string(),
            };
            if chars.len() >= target || fill.is_empty() {
                Value::from(text)
            } else {
                let padding: String = fill.chars().cycle().take(target - chars.len()).collect();
                if name == "padStart" {
                    Value::from(format!("{}{}", padding, text))
                } else {
                    Value::from(format!("{}{}", text, padding))
                }
            }
        }
        "charAt" => {
            let index = arg(args, 0).to_number();
            let index = if index.is_finite() && index >= 0.0 { index as usize } else { 0 };
            Value::from(chars.get(index).map(|c| c.to_string()).unwrap_or_default())
        }
        "toString" => Value::from(text),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Built-in number method, or `None` when `name` is not one.
pub fn call_number_method(
    n: f64,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, RuntimeError> {
    let result = match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_finite() && digits > 0.0 { digits as usize } else { 0 };
            if n.is_finite() {
                Value::from(format!("{:.*}", digits, n))
            } else {
                Value::from(format_number(n))
            }
        }
        "toString" => Value::from(format_number(n)),
        _ => return Ok(None),
    };
    Ok(Some(result))
}
