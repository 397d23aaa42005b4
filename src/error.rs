#[derive(thiserror::Error, Debug)]
pub enum JSError {
    #[error("{method} called on incompatible receiver (expected {expected})")]
    InvalidReceiver { expected: &'static str, method: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Evaluation failed at {method} {file}:{line}: {message}")]
    EvaluationError {
        message: String,
        file: String,
        line: usize,
        method: String,
    },

    #[error("Infinite loop detected (executed {iterations} iterations)")]
    InfiniteLoopError { iterations: usize },

    #[error("Type error: {message}")]
    TypeError { message: String },

    #[error("Runtime error: {message}")]
    RuntimeError { message: String },

    #[error("Thrown value: {value:?}")]
    Throw { value: crate::core::Value },
}

impl JSError {
    pub fn message(&self) -> String {
        match self {
            JSError::InvalidState { message } | JSError::TypeError { message } | JSError::RuntimeError { message } => message.clone(),
            JSError::EvaluationError { message, .. } => message.clone(),
            JSError::Throw { value } => crate::core::value_to_string(value),
            other => other.to_string(),
        }
    }

    /// Name of the script-visible error constructor this error maps onto.
    pub fn error_name(&self) -> &'static str {
        match self {
            JSError::InvalidReceiver { .. } | JSError::InvalidState { .. } | JSError::TypeError { .. } => "TypeError",
            JSError::InfiniteLoopError { .. } => "RangeError",
            _ => "Error",
        }
    }
}

// Macro that constructs a TypeError with the provided message.
#[macro_export]
macro_rules! raise_type_error {
    ($msg:expr) => {
        $crate::JSError::TypeError { message: $msg.to_string() }
    };
}

#[macro_export]
macro_rules! raise_invalid_state {
    ($msg:expr) => {
        $crate::JSError::InvalidState { message: $msg.to_string() }
    };
}

// Macro that constructs an EvaluationError using the compile-time caller
// location and the provided message. Using a macro (rather than a
// function) ensures `file!()` and `line!()` expand to the site where the
// macro is invoked.
#[macro_export]
macro_rules! raise_eval_error {
    ($msg:expr) => {
        $crate::JSError::EvaluationError {
            message: $msg.to_string(),
            file: file!().to_string(),
            line: line!() as usize,
            method: $crate::function_name!().to_string(),
        }
    };
}

#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        // remove the trailing "::f"
        &name[..name.len() - 3]
    }};
}
