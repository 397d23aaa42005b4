use crate::core::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionType {
    Normal,
    Throw,
    Return,
}

/// The unit of information exchanged across a suspension boundary.
#[derive(Clone, Debug)]
pub struct Completion {
    kind: CompletionType,
    value: Value,
}

impl Completion {
    pub fn new(kind: CompletionType, value: Value) -> Self {
        Completion { kind, value }
    }

    pub fn normal(value: Value) -> Self {
        Self::new(CompletionType::Normal, value)
    }

    pub fn throw(value: Value) -> Self {
        Self::new(CompletionType::Throw, value)
    }

    pub fn return_(value: Value) -> Self {
        Self::new(CompletionType::Return, value)
    }

    pub fn kind(&self) -> CompletionType {
        self.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn is_abrupt(&self) -> bool {
        self.kind != CompletionType::Normal
    }
}

/// What a frame reports back after being resumed.
#[derive(Clone, Debug)]
pub enum FrameOutcome {
    /// Suspended at a `yield`; the frame can be resumed again.
    Yielded(Value),
    /// Suspended at an `await` inside an async body. Only the async drivers
    /// accept this; a synchronous generator treats it as a type error.
    Awaiting(Value),
    /// Finished with a return value.
    Returned(Value),
    /// Finished with an exception nothing inside the frame caught.
    Threw(Value),
}

impl FrameOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, FrameOutcome::Returned(_) | FrameOutcome::Threw(_))
    }
}

/// Boundary with the interpreter: a paused computation that can be resumed
/// with a completion. Implementations own their resume point and locals.
/// The engine guarantees at most one `resume` call in flight per frame.
pub trait SuspendableFrame {
    fn resume(&mut self, completion: Completion) -> FrameOutcome;
}

impl<F> SuspendableFrame for F
where
    F: FnMut(Completion) -> FrameOutcome,
{
    fn resume(&mut self, completion: Completion) -> FrameOutcome {
        self(completion)
    }
}
