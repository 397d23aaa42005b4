use crate::{
    JSError,
    core::{Value, new_js_object_data, object_set_key_value, value_to_string},
};

#[derive(Debug)]
pub enum EvalError {
    Js(JSError),
    /// A script value thrown out of a frame or a handler and not caught there.
    Throw(Value),
}

impl From<JSError> for EvalError {
    fn from(e: JSError) -> Self {
        EvalError::Js(e)
    }
}

impl From<EvalError> for JSError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::Js(j) => j,
            EvalError::Throw(value) => JSError::Throw { value },
        }
    }
}

impl EvalError {
    #[allow(dead_code)]
    pub fn message(&self) -> String {
        match self {
            EvalError::Js(e) => e.message(),
            EvalError::Throw(v) => value_to_string(v),
        }
    }

    /// The thrown script value, if this error carries one.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            EvalError::Throw(v) => Some(v),
            EvalError::Js(JSError::Throw { value }) => Some(value),
            EvalError::Js(_) => None,
        }
    }
}

/// Create a new Error object with the given constructor name and message.
pub fn create_error(name: &str, message: &str) -> Value {
    let error_obj = new_js_object_data();
    error_obj.borrow_mut().is_error = true;
    object_set_key_value(&error_obj, "name", Value::String(name.to_string()));
    object_set_key_value(&error_obj, "message", Value::String(message.to_string()));
    object_set_key_value(&error_obj, "stack", Value::String(format!("{name}: {message}")));
    Value::Object(error_obj)
}

/// Check if a value is an Error object.
pub fn is_error(val: &Value) -> bool {
    if let Value::Object(obj) = val
        && let Ok(borrowed) = obj.try_borrow()
    {
        return borrowed.is_error;
    }
    false
}

/// Name of an error object (`TypeError`, `AggregateError`, ...).
pub fn error_name(val: &Value) -> Option<String> {
    if !is_error(val) {
        return None;
    }
    crate::core::get_property(val, "name").map(|n| value_to_string(&n))
}

/// Convert an engine error into the script value that a promise is rejected
/// with or that a caller observes as the thrown exception.
pub fn js_error_to_value(err: &JSError) -> Value {
    match err {
        JSError::Throw { value } => value.clone(),
        other => create_error(other.error_name(), &other.message()),
    }
}

pub fn eval_error_to_value(err: EvalError) -> Value {
    match err {
        EvalError::Throw(v) => v,
        EvalError::Js(j) => js_error_to_value(&j),
    }
}
