use crate::{
    diagnostics::{DiagnosticKind, Result, VgError},
    runtime::Interpreter,
    scope::ScopeStack,
    value::{NativeCallback, NativeFunction, Value, ValueKind},
};

pub fn install(scopes: &mut ScopeStack) {
    for builtin in [
        native("print", NativeFunction::VARIADIC, io_print),
        native("length", 1, builtin_length),
        native("toString", 1, builtin_to_string),
        native("parseInt", 1, builtin_parse_int),
        native("parseDouble", 1, builtin_parse_double),
        native("typeOf", 1, builtin_type_of),
        native("append", 2, builtin_append),
    ] {
        if let ValueKind::Native(function) = builtin.kind() {
            scopes.define_function(function.name, builtin.clone());
        }
    }
}

fn native(name: &'static str, arity: usize, callback: NativeCallback) -> Value {
    Value::new(ValueKind::Native(NativeFunction {
        name,
        arity,
        callback,
    }))
}

fn type_error(name: &str, expected: &str, found: &Value) -> VgError {
    VgError::new(
        DiagnosticKind::TypeError,
        format!("`{name}` expected {expected} but found {}", found.type_name()),
    )
}

fn expect_string<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    match value.kind() {
        ValueKind::String(s) => Ok(s.as_str()),
        _ => Err(type_error(name, "String", value)),
    }
}

fn io_print(interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    interp.output().println(&line);
    Ok(Value::null())
}

fn builtin_length(_: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let len = match args[0].kind() {
        ValueKind::Array(values) => values.borrow().len(),
        ValueKind::String(text) => text.chars().count(),
        _ => return Err(type_error("length", "Array or String", &args[0])),
    };
    Ok(Value::integer(len as i64))
}

fn builtin_to_string(_: &mut Interpreter, args: &[Value]) -> Result<Value> {
    Ok(Value::string(args[0].to_string()))
}

fn builtin_parse_int(_: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let text = expect_string(&args[0], "parseInt")?;
    text.trim().parse::<i64>().map(Value::integer).map_err(|_| {
        VgError::new(
            DiagnosticKind::TypeError,
            format!("cannot parse `{text}` as an Integer"),
        )
    })
}

fn builtin_parse_double(_: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let text = expect_string(&args[0], "parseDouble")?;
    text.trim().parse::<f64>().map(Value::double).map_err(|_| {
        VgError::new(
            DiagnosticKind::TypeError,
            format!("cannot parse `{text}` as a Double"),
        )
    })
}

fn builtin_type_of(_: &mut Interpreter, args: &[Value]) -> Result<Value> {
    Ok(Value::string(args[0].type_name()))
}

/// Pushes in place; every holder of the array sees the new element.
fn builtin_append(_: &mut Interpreter, args: &[Value]) -> Result<Value> {
    match args[0].kind() {
        ValueKind::Array(values) => {
            values.borrow_mut().push(args[1].clone());
            Ok(args[0].clone())
        }
        _ => Err(type_error("append", "Array", &args[0])),
    }
}
