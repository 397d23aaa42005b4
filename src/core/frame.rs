use crate::core::{Completion, CompletionType, FrameOutcome, SuspendableFrame, Value};
use std::collections::VecDeque;

/// Frame over a fixed list of values: yields each in order, then returns
/// `undefined`. Abrupt completions terminate it immediately.
pub struct ValuesFrame {
    values: VecDeque<Value>,
}

impl ValuesFrame {
    pub fn new(values: Vec<Value>) -> Self {
        ValuesFrame { values: values.into() }
    }
}

impl SuspendableFrame for ValuesFrame {
    fn resume(&mut self, completion: Completion) -> FrameOutcome {
        match completion.kind() {
            CompletionType::Normal => match self.values.pop_front() {
                Some(v) => FrameOutcome::Yielded(v),
                None => FrameOutcome::Returned(Value::Undefined),
            },
            CompletionType::Throw => {
                self.values.clear();
                FrameOutcome::Threw(completion.into_value())
            }
            CompletionType::Return => {
                self.values.clear();
                FrameOutcome::Returned(completion.into_value())
            }
        }
    }
}

/// One step of a [`ScriptFrame`] program. Jump targets are instruction indices.
#[derive(Clone, Debug)]
pub enum Instruction {
    Yield(Value),
    /// Yield the value received by the most recent resume.
    YieldSent,
    Await(Value),
    /// Await the value received by the most recent resume.
    AwaitSent,
    /// Enter a region whose exceptions transfer control to the target.
    TryCatch(usize),
    /// Enter a region whose exit (normal or abrupt) runs the block at the target.
    TryFinally(usize),
    /// Leave the innermost try region normally.
    PopHandler,
    /// End of a finally block: resumes any completion that was interrupted.
    EndFinally,
    Jump(usize),
    Return(Value),
    /// Return the value received by the most recent resume.
    ReturnSent,
    Throw(Value),
}

#[derive(Clone, Copy, Debug)]
enum Handler {
    Catch(usize),
    Finally(usize),
}

/// Restartable frame: a flat instruction list, a saved program counter, a
/// handler stack and the completions parked while finally blocks run.
///
/// A normal exit from a `TryFinally` region falls through from `PopHandler`
/// into the finally block, so the target must be the instruction right after
/// the `PopHandler`. A catch region needs an explicit `Jump` over its handler.
pub struct ScriptFrame {
    code: Vec<Instruction>,
    pc: usize,
    handlers: Vec<Handler>,
    pending: Vec<Option<Completion>>,
    sent: Value,
    started: bool,
    finished: bool,
}

impl ScriptFrame {
    pub fn new(code: Vec<Instruction>) -> Self {
        ScriptFrame {
            code,
            pc: 0,
            handlers: Vec::new(),
            pending: Vec::new(),
            sent: Value::Undefined,
            started: false,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self, outcome: FrameOutcome) -> FrameOutcome {
        self.finished = true;
        self.handlers.clear();
        self.pending.clear();
        outcome
    }

    // Transfer control for an abrupt completion. Returns the final outcome if
    // no handler in the frame intercepts it.
    fn unwind(&mut self, completion: Completion) -> Option<FrameOutcome> {
        while let Some(handler) = self.handlers.pop() {
            match (handler, completion.kind()) {
                (Handler::Catch(target), CompletionType::Throw) => {
                    self.sent = completion.into_value();
                    self.pc = target;
                    return None;
                }
                (Handler::Catch(_), _) => continue,
                (Handler::Finally(target), _) => {
                    self.pending.push(Some(completion));
                    self.pc = target;
                    return None;
                }
            }
        }
        let outcome = match completion.kind() {
            CompletionType::Throw => FrameOutcome::Threw(completion.into_value()),
            _ => FrameOutcome::Returned(completion.into_value()),
        };
        Some(self.finish(outcome))
    }

    fn run(&mut self) -> FrameOutcome {
        while self.pc < self.code.len() {
            let instruction = self.code[self.pc].clone();
            log::trace!("ScriptFrame: pc={} {:?}", self.pc, instruction);
            self.pc += 1;
            match instruction {
                Instruction::Yield(v) => return FrameOutcome::Yielded(v),
                Instruction::YieldSent => return FrameOutcome::Yielded(self.sent.clone()),
                Instruction::Await(v) => return FrameOutcome::Awaiting(v),
                Instruction::AwaitSent => return FrameOutcome::Awaiting(self.sent.clone()),
                Instruction::TryCatch(target) => self.handlers.push(Handler::Catch(target)),
                Instruction::TryFinally(target) => self.handlers.push(Handler::Finally(target)),
                Instruction::PopHandler => {
                    if let Some(Handler::Finally(_)) = self.handlers.pop() {
                        self.pending.push(None);
                    }
                }
                Instruction::EndFinally => {
                    if let Some(Some(completion)) = self.pending.pop()
                        && let Some(outcome) = self.unwind(completion)
                    {
                        return outcome;
                    }
                }
                Instruction::Jump(target) => self.pc = target,
                Instruction::Return(v) => {
                    if let Some(outcome) = self.unwind(Completion::return_(v)) {
                        return outcome;
                    }
                }
                Instruction::ReturnSent => {
                    let v = self.sent.clone();
                    if let Some(outcome) = self.unwind(Completion::return_(v)) {
                        return outcome;
                    }
                }
                Instruction::Throw(v) => {
                    if let Some(outcome) = self.unwind(Completion::throw(v)) {
                        return outcome;
                    }
                }
            }
        }
        self.finish(FrameOutcome::Returned(Value::Undefined))
    }
}

impl SuspendableFrame for ScriptFrame {
    fn resume(&mut self, completion: Completion) -> FrameOutcome {
        if self.finished {
            return match completion.kind() {
                CompletionType::Normal => FrameOutcome::Returned(Value::Undefined),
                CompletionType::Throw => FrameOutcome::Threw(completion.into_value()),
                CompletionType::Return => FrameOutcome::Returned(completion.into_value()),
            };
        }
        if !self.started {
            self.started = true;
            if !completion.is_abrupt() {
                return self.run();
            }
        }
        match completion.kind() {
            CompletionType::Normal => {
                self.sent = completion.into_value();
                self.run()
            }
            _ => match self.unwind(completion) {
                Some(outcome) => outcome,
                None => self.run(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_values_frame_yields_then_returns() {
        let mut frame = ValuesFrame::new(vec![num(1.0), num(2.0)]);
        assert!(matches!(frame.resume(Completion::normal(Value::Undefined)), FrameOutcome::Yielded(Value::Number(n)) if n == 1.0));
        assert!(matches!(frame.resume(Completion::normal(Value::Undefined)), FrameOutcome::Yielded(Value::Number(n)) if n == 2.0));
        assert!(matches!(frame.resume(Completion::normal(Value::Undefined)), FrameOutcome::Returned(Value::Undefined)));
    }

    #[test]
    fn test_script_frame_sent_value_roundtrip() {
        let mut frame = ScriptFrame::new(vec![Instruction::Yield(num(1.0)), Instruction::ReturnSent]);
        assert!(matches!(frame.resume(Completion::normal(Value::Undefined)), FrameOutcome::Yielded(_)));
        let out = frame.resume(Completion::normal(num(7.0)));
        assert!(matches!(out, FrameOutcome::Returned(Value::Number(n)) if n == 7.0));
        assert!(frame.is_finished());
    }

    #[test]
    fn test_script_frame_catch_intercepts_throw() {
        // try { yield 1 } catch (e) { yield e } ; return 5
        let mut frame = ScriptFrame::new(vec![
            Instruction::TryCatch(4),
            Instruction::Yield(num(1.0)),
            Instruction::PopHandler,
            Instruction::Jump(5),
            Instruction::YieldSent,
            Instruction::Return(num(5.0)),
        ]);
        frame.resume(Completion::normal(Value::Undefined));
        let out = frame.resume(Completion::throw(Value::from("boom")));
        assert!(matches!(out, FrameOutcome::Yielded(Value::String(ref s)) if s == "boom"));
        let out = frame.resume(Completion::normal(Value::Undefined));
        assert!(matches!(out, FrameOutcome::Returned(Value::Number(n)) if n == 5.0));
    }

    #[test]
    fn test_script_frame_return_skips_catch_runs_finally() {
        // try { try { yield 1 } catch { yield 99 } } finally { yield 2 }
        let mut frame = ScriptFrame::new(vec![
            Instruction::TryFinally(6),
            Instruction::TryCatch(4),
            Instruction::Yield(num(1.0)),
            Instruction::PopHandler,
            Instruction::Yield(num(99.0)),
            Instruction::PopHandler,
            Instruction::Yield(num(2.0)),
            Instruction::EndFinally,
        ]);
        frame.resume(Completion::normal(Value::Undefined));
        let out = frame.resume(Completion::return_(num(42.0)));
        assert!(matches!(out, FrameOutcome::Yielded(Value::Number(n)) if n == 2.0));
        let out = frame.resume(Completion::normal(Value::Undefined));
        assert!(matches!(out, FrameOutcome::Returned(Value::Number(n)) if n == 42.0));
    }

    #[test]
    fn test_script_frame_uncaught_throw_finishes() {
        let mut frame = ScriptFrame::new(vec![Instruction::Throw(Value::from("bad")), Instruction::Yield(num(1.0))]);
        let out = frame.resume(Completion::normal(Value::Undefined));
        assert!(matches!(out, FrameOutcome::Threw(Value::String(ref s)) if s == "bad"));
        assert!(matches!(frame.resume(Completion::normal(Value::Undefined)), FrameOutcome::Returned(Value::Undefined)));
    }
}
