use crate::core::{Completion, EvalError, SharedPtr, SuspendableFrame, new_shared_ptr};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

static UNIQUE_ID_SEED: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(1);

pub fn generate_unique_id() -> usize {
    UNIQUE_ID_SEED.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
}

pub type JSObjectDataPtr = SharedPtr<JSObjectData>;
pub type PromisePtr = SharedPtr<JSPromise>;
pub type GeneratorPtr = SharedPtr<JSGenerator>;
pub type AsyncGeneratorPtr = SharedPtr<JSAsyncGenerator>;

#[inline]
pub fn new_js_object_data() -> JSObjectDataPtr {
    new_shared_ptr(JSObjectData::default())
}

/// Minimal property bag. Iterator results, arrays, settlement records and
/// error objects are all plain objects with ordered own properties.
#[derive(Clone, Default)]
pub struct JSObjectData {
    pub properties: IndexMap<String, Value>,
    pub is_array: bool,
    pub is_error: bool,
}

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError>;

/// A host-provided callable. Promise handlers and resolving functions are
/// always represented this way; script closures live in the interpreter.
#[derive(Clone)]
pub struct JSFunction {
    name: Rc<str>,
    func: Rc<NativeFn>,
}

impl JSFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        JSFunction {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    /// Single-argument callable that runs its body at most once. Later calls
    /// return `undefined` without side effects.
    pub fn once<F>(name: &str, func: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, EvalError> + 'static,
    {
        let slot = RefCell::new(Some(func));
        JSFunction::new(name, move |args| {
            let func = slot.borrow_mut().take();
            match func {
                Some(func) => func(args.first().cloned().unwrap_or(Value::Undefined)),
                None => Ok(Value::Undefined),
            }
        })
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.func)(args)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ptr_eq(&self, other: &JSFunction) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(JSObjectDataPtr),
    Function(JSFunction),
    Promise(PromisePtr),
    Generator(GeneratorPtr),
    AsyncGenerator(AsyncGeneratorPtr),
}

impl Value {
    pub fn as_function(&self) -> Option<&JSFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            (Value::AsyncGenerator(a), Value::AsyncGenerator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
            Value::Promise(p) => match p.try_borrow() {
                Ok(promise) => write!(f, "{:?}", &*promise),
                Err(_) => write!(f, "[object Promise]"),
            },
            Value::Generator(_) => write!(f, "[object Generator]"),
            Value::AsyncGenerator(_) => write!(f, "[object AsyncGenerator]"),
            other => write!(f, "{}", value_to_string(other)),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<PromisePtr> for Value {
    fn from(p: PromisePtr) -> Self {
        Value::Promise(p)
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_nan() {
                "NaN".to_string()
            } else if n.is_infinite() {
                if *n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
            } else if *n == 0.0 {
                "0".to_string()
            } else if n.fract() == 0.0 && n.abs() < 1e21 {
                format!("{n:.0}")
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let obj = obj.borrow();
            if obj.is_array {
                let items: Vec<String> = obj
                    .properties
                    .iter()
                    .filter(|(k, _)| k.as_str() != "length")
                    .map(|(_, v)| match v {
                        Value::Undefined | Value::Null => String::new(),
                        other => value_to_string(other),
                    })
                    .collect();
                items.join(",")
            } else if obj.is_error {
                let name = obj.properties.get("name").map(value_to_string).unwrap_or_else(|| "Error".to_string());
                let message = obj.properties.get("message").map(value_to_string).unwrap_or_default();
                if message.is_empty() { name } else { format!("{name}: {message}") }
            } else {
                "[object Object]".to_string()
            }
        }
        Value::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
        Value::Promise(_) => "[object Promise]".to_string(),
        Value::Generator(_) => "[object Generator]".to_string(),
        Value::AsyncGenerator(_) => "[object AsyncGenerator]".to_string(),
    }
}

pub fn object_get_key_value(obj: &JSObjectDataPtr, key: &str) -> Option<Value> {
    obj.borrow().properties.get(key).cloned()
}

pub fn object_set_key_value(obj: &JSObjectDataPtr, key: &str, value: Value) {
    obj.borrow_mut().properties.insert(key.to_string(), value);
}

/// Read `key` from an object value; any other value kind yields `None`.
pub fn get_property(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(obj) => object_get_key_value(obj, key),
        _ => None,
    }
}

/// Create an iterator result object {value: value, done: done}
pub fn create_iterator_result(value: Value, done: bool) -> Value {
    let obj = new_js_object_data();
    object_set_key_value(&obj, "value", value);
    object_set_key_value(&obj, "done", Value::Boolean(done));
    Value::Object(obj)
}

/// Split an iterator result object back into `(value, done)`.
pub fn iterator_result_parts(result: &Value) -> Option<(Value, bool)> {
    let Value::Object(obj) = result else {
        return None;
    };
    let obj = obj.borrow();
    let done = matches!(obj.properties.get("done"), Some(Value::Boolean(true)));
    let value = obj.properties.get("value").cloned().unwrap_or(Value::Undefined);
    Some((value, done))
}

pub fn create_array(items: Vec<Value>) -> Value {
    let obj = new_js_object_data();
    {
        let mut data = obj.borrow_mut();
        data.is_array = true;
        let len = items.len();
        for (i, item) in items.into_iter().enumerate() {
            data.properties.insert(i.to_string(), item);
        }
        data.properties.insert("length".to_string(), Value::Number(len as f64));
    }
    Value::Object(obj)
}

pub fn array_to_vec(value: &Value) -> Option<Vec<Value>> {
    let Value::Object(obj) = value else {
        return None;
    };
    let obj = obj.borrow();
    if !obj.is_array {
        return None;
    }
    let len = match obj.properties.get("length") {
        Some(Value::Number(n)) => *n as usize,
        _ => 0,
    };
    Some(
        (0..len)
            .map(|i| obj.properties.get(&i.to_string()).cloned().unwrap_or(Value::Undefined))
            .collect(),
    )
}

#[derive(Clone, Debug)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionKind {
    Fulfill,
    Reject,
}

/// Continuation attached to a promise. `handler: None` passes the settled
/// value through; `capability: None` discards the handler's result.
#[derive(Clone)]
pub struct PromiseReaction {
    pub kind: ReactionKind,
    pub handler: Option<JSFunction>,
    pub capability: Option<PromisePtr>,
}

pub struct JSPromise {
    pub id: usize,
    pub state: PromiseState,
    pub on_fulfilled: Vec<PromiseReaction>,
    pub on_rejected: Vec<PromiseReaction>,
    /// Set once a resolving function has locked the promise in, either by
    /// settling it or by adopting another promise.
    pub already_resolved: bool,
    /// Whether a reaction was ever attached. Used to avoid reporting
    /// unhandled rejections after the promise has been handled.
    pub handled: bool,
    /// Promise whose settlement this one is currently adopting.
    pub following: Option<PromisePtr>,
}

impl JSPromise {
    pub fn new() -> Self {
        Self {
            id: generate_unique_id(),
            state: PromiseState::Pending,
            on_fulfilled: Vec::new(),
            on_rejected: Vec::new(),
            already_resolved: false,
            handled: false,
            following: None,
        }
    }
}

impl Default for JSPromise {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JSPromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "JSPromise {{ id: {}, state: {:?}, on_fulfilled: {}, on_rejected: {} }}",
            self.id,
            self.state,
            self.on_fulfilled.len(),
            self.on_rejected.len()
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

pub struct JSGenerator {
    pub id: usize,
    pub state: GeneratorState,
    // Taken out while the frame runs so a reentrant call observes
    // `Executing` instead of a live borrow.
    pub frame: Option<Box<dyn SuspendableFrame>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsyncGeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    AwaitingReturn,
    Completed,
}

impl AsyncGeneratorState {
    /// A step of the underlying frame (or a return await) is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, AsyncGeneratorState::Executing | AsyncGeneratorState::AwaitingReturn)
    }
}

#[derive(Clone)]
pub struct AsyncGeneratorRequest {
    pub completion: Completion,
    pub capability: PromisePtr,
}

pub struct JSAsyncGenerator {
    pub id: usize,
    pub generator: GeneratorPtr,
    pub queue: VecDeque<AsyncGeneratorRequest>,
    pub state: AsyncGeneratorState,
}
