use crate::core::{
    Completion, CompletionType, EvalError, FrameOutcome, GeneratorPtr, GeneratorState, JSGenerator, SuspendableFrame, Value, ValuesFrame,
    create_iterator_result, generate_unique_id, new_shared_ptr,
};
use crate::error::JSError;

/// Create a generator object in `SuspendedStart` owning `frame`.
pub fn new_generator(frame: Box<dyn SuspendableFrame>) -> GeneratorPtr {
    new_shared_ptr(JSGenerator {
        id: generate_unique_id(),
        state: GeneratorState::SuspendedStart,
        frame: Some(frame),
    })
}

/// Generator that yields each of `values` and then completes.
pub fn generator_from_values(values: Vec<Value>) -> GeneratorPtr {
    new_generator(Box::new(ValuesFrame::new(values)))
}

pub fn generator_state(generator: &GeneratorPtr) -> GeneratorState {
    generator.borrow().state
}

/// Resume the generator's frame with `completion` and report the raw frame
/// outcome. This is the single step shared by `next`/`return`/`throw` and by
/// the async drivers.
///
/// - `Executing`: reentrant call, fails with `InvalidState`.
/// - `Completed`: the frame is gone; every completion yields a done result.
/// - `SuspendedStart` with an abrupt completion: the frame is discarded
///   without ever running.
pub fn generator_resume(generator: &GeneratorPtr, completion: Completion) -> Result<FrameOutcome, JSError> {
    let mut frame = {
        let mut gen_obj = generator.borrow_mut();
        let state = gen_obj.state;
        match state {
            GeneratorState::Executing => return Err(raise_invalid_state!("Generator is already running")),
            GeneratorState::Completed => {
                // Terminal state is sticky: a done result, never an error.
                return Ok(match completion.kind() {
                    CompletionType::Return => FrameOutcome::Returned(completion.into_value()),
                    CompletionType::Normal | CompletionType::Throw => FrameOutcome::Returned(Value::Undefined),
                });
            }
            GeneratorState::SuspendedStart if completion.is_abrupt() => {
                gen_obj.state = GeneratorState::Completed;
                gen_obj.frame = None;
                log::trace!("generator {}: abrupt completion before start", gen_obj.id);
                return Ok(match completion.kind() {
                    CompletionType::Throw => FrameOutcome::Threw(completion.into_value()),
                    _ => FrameOutcome::Returned(completion.into_value()),
                });
            }
            GeneratorState::SuspendedStart | GeneratorState::SuspendedYield => {}
        }
        let Some(frame) = gen_obj.frame.take() else {
            gen_obj.state = GeneratorState::Completed;
            return Err(raise_eval_error!("Generator has no frame to resume"));
        };
        gen_obj.state = GeneratorState::Executing;
        frame
    };

    // No borrow is held while the frame runs.
    let outcome = frame.resume(completion);

    let mut gen_obj = generator.borrow_mut();
    if outcome.is_finished() {
        gen_obj.state = GeneratorState::Completed;
    } else {
        gen_obj.state = GeneratorState::SuspendedYield;
        gen_obj.frame = Some(frame);
    }
    log::trace!("generator {}: {:?} -> {:?}", gen_obj.id, outcome, gen_obj.state);
    Ok(outcome)
}

/// Finish the generator without resuming its frame. The frame is dropped, so
/// no cleanup code inside it runs.
pub fn generator_close(generator: &GeneratorPtr) {
    let mut gen_obj = generator.borrow_mut();
    log::trace!("generator {}: closed from {:?}", gen_obj.id, gen_obj.state);
    gen_obj.state = GeneratorState::Completed;
    gen_obj.frame = None;
}

fn outcome_to_iterator_result(generator: &GeneratorPtr, outcome: FrameOutcome) -> Result<Value, EvalError> {
    match outcome {
        FrameOutcome::Yielded(v) => Ok(create_iterator_result(v, false)),
        FrameOutcome::Returned(v) => Ok(create_iterator_result(v, true)),
        FrameOutcome::Threw(e) => Err(EvalError::Throw(e)),
        FrameOutcome::Awaiting(_) => {
            generator_close(generator);
            Err(raise_type_error!("await is only valid in async generators and async functions").into())
        }
    }
}

/// Execute generator.next(value)
pub fn generator_next(generator: &GeneratorPtr, send_value: Value) -> Result<Value, EvalError> {
    let outcome = generator_resume(generator, Completion::normal(send_value))?;
    outcome_to_iterator_result(generator, outcome)
}

/// Execute generator.return(value)
pub fn generator_return(generator: &GeneratorPtr, return_value: Value) -> Result<Value, EvalError> {
    let outcome = generator_resume(generator, Completion::return_(return_value))?;
    outcome_to_iterator_result(generator, outcome)
}

/// Execute generator.throw(exception)
pub fn generator_throw(generator: &GeneratorPtr, throw_value: Value) -> Result<Value, EvalError> {
    let outcome = generator_resume(generator, Completion::throw(throw_value))?;
    outcome_to_iterator_result(generator, outcome)
}

pub fn handle_generator_instance_method(this: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let Value::Generator(generator) = this else {
        return Err(JSError::InvalidReceiver {
            expected: "Generator",
            method: format!("Generator.prototype.{method}"),
        }
        .into());
    };
    // Get optional value to send to the generator
    let arg = args.first().cloned().unwrap_or(Value::Undefined);
    match method {
        "next" => generator_next(generator, arg),
        "return" => generator_return(generator, arg),
        "throw" => generator_throw(generator, arg),
        _ => Err(raise_type_error!(format!("Generator.prototype.{method} is not a function")).into()),
    }
}
