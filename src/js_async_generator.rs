//! Async generator objects.
//!
//! Every `next` / `return` / `throw` call returns a promise immediately and
//! appends a request to the generator's queue. Requests are served strictly
//! in order: the underlying generator is only stepped while the async
//! generator is not `Executing` / `AwaitingReturn`, so two logically
//! concurrent calls never resume the same frame twice.

use crate::core::{
    AsyncGeneratorPtr, AsyncGeneratorRequest, AsyncGeneratorState, Completion, CompletionType, FrameOutcome, GeneratorPtr,
    JSAsyncGenerator, PromisePtr, SuspendableFrame, Value, ValuesFrame, create_iterator_result, generate_unique_id, js_error_to_value,
    new_shared_ptr,
};
use crate::error::JSError;
use crate::js_generator::{generator_close, generator_resume, new_generator};
use crate::js_promise::{await_value, new_promise, reject_promise, resolve_promise};
use std::collections::VecDeque;

/// Create an async generator instance in `SuspendedStart` over `frame`.
pub fn new_async_generator(frame: Box<dyn SuspendableFrame>) -> AsyncGeneratorPtr {
    new_shared_ptr(JSAsyncGenerator {
        id: generate_unique_id(),
        generator: new_generator(frame),
        queue: VecDeque::new(),
        state: AsyncGeneratorState::SuspendedStart,
    })
}

/// Async generator yielding each of `values`. Promise values are awaited
/// like any other yielded promise.
pub fn async_generator_from_values(values: Vec<Value>) -> AsyncGeneratorPtr {
    new_async_generator(Box::new(ValuesFrame::new(values)))
}

/// Async generator driven by a closure frame.
pub fn async_generator_from_fn<F>(frame: F) -> AsyncGeneratorPtr
where
    F: FnMut(Completion) -> FrameOutcome + 'static,
{
    new_async_generator(Box::new(frame))
}

pub fn async_generator_state(generator: &AsyncGeneratorPtr) -> AsyncGeneratorState {
    generator.borrow().state
}

/// Number of requests waiting behind the one in flight.
pub fn async_generator_queue_len(generator: &AsyncGeneratorPtr) -> usize {
    generator.borrow().queue.len()
}

fn set_state(generator: &AsyncGeneratorPtr, state: AsyncGeneratorState) {
    let mut gen_obj = generator.borrow_mut();
    log::trace!("async generator {}: {:?} -> {:?}", gen_obj.id, gen_obj.state, state);
    gen_obj.state = state;
}

/// Queue a request and start draining if the generator is idle. Returns the
/// request's promise whether or not it was served synchronously.
pub fn async_generator_enqueue(generator: &AsyncGeneratorPtr, completion: Completion) -> PromisePtr {
    let capability = new_promise();
    let idle = {
        let mut gen_obj = generator.borrow_mut();
        log::debug!(
            "async generator {}: enqueue {:?} (state={:?}, queued={})",
            gen_obj.id,
            completion.kind(),
            gen_obj.state,
            gen_obj.queue.len()
        );
        gen_obj.queue.push_back(AsyncGeneratorRequest {
            completion,
            capability: capability.clone(),
        });
        !gen_obj.state.is_busy()
    };
    if idle {
        async_generator_drain(generator);
    }
    capability
}

pub fn async_generator_next(generator: &AsyncGeneratorPtr, value: Value) -> PromisePtr {
    async_generator_enqueue(generator, Completion::normal(value))
}

pub fn async_generator_return(generator: &AsyncGeneratorPtr, value: Value) -> PromisePtr {
    async_generator_enqueue(generator, Completion::return_(value))
}

pub fn async_generator_throw(generator: &AsyncGeneratorPtr, exception: Value) -> PromisePtr {
    async_generator_enqueue(generator, Completion::throw(exception))
}

/// Serve queued requests until the queue is empty or a step is left waiting
/// on an inner promise. Awaits resume draining from their reaction job.
fn async_generator_drain(generator: &AsyncGeneratorPtr) {
    loop {
        let (request, state, inner) = {
            let mut gen_obj = generator.borrow_mut();
            if gen_obj.state.is_busy() {
                return;
            }
            let Some(request) = gen_obj.queue.pop_front() else {
                return;
            };
            (request, gen_obj.state, gen_obj.generator.clone())
        };

        match (state, request.completion.kind()) {
            (AsyncGeneratorState::Completed, _) => {
                // Terminal state is sticky: every later request is done.
                resolve_promise(&request.capability, create_iterator_result(Value::Undefined, true));
            }
            (AsyncGeneratorState::SuspendedStart, CompletionType::Throw) => {
                // Never enters the frame; the generator is finished.
                generator_close(&inner);
                set_state(generator, AsyncGeneratorState::Completed);
                reject_promise(&request.capability, request.completion.into_value());
            }
            (AsyncGeneratorState::SuspendedStart, CompletionType::Return) => {
                generator_close(&inner);
                set_state(generator, AsyncGeneratorState::AwaitingReturn);
                let value = request.completion.value().clone();
                await_return(generator, request, value);
            }
            _ => {
                set_state(generator, AsyncGeneratorState::Executing);
                let completion = request.completion.clone();
                resume_request(generator, &inner, request, completion);
            }
        }
    }
}

// Step the underlying generator on behalf of `request`.
fn resume_request(generator: &AsyncGeneratorPtr, inner: &GeneratorPtr, request: AsyncGeneratorRequest, completion: Completion) {
    let outcome = generator_resume(inner, completion);
    handle_outcome(generator, inner, request, outcome);
}

fn handle_outcome(
    generator: &AsyncGeneratorPtr,
    inner: &GeneratorPtr,
    request: AsyncGeneratorRequest,
    outcome: Result<FrameOutcome, JSError>,
) {
    match outcome {
        Ok(FrameOutcome::Yielded(Value::Promise(awaited))) => {
            // `yield <promise>` awaits the operand; a rejection is thrown back
            // into the frame at the same yield point.
            let (g1, r1) = (generator.clone(), request.clone());
            let (g2, i2) = (generator.clone(), inner.clone());
            await_value(
                Value::Promise(awaited),
                move |v| {
                    settle_yield(&g1, r1, v);
                    async_generator_drain(&g1);
                },
                move |e| {
                    resume_request(&g2, &i2, request, Completion::throw(e));
                    async_generator_drain(&g2);
                },
            );
        }
        Ok(FrameOutcome::Yielded(v)) => settle_yield(generator, request, v),
        Ok(FrameOutcome::Awaiting(v)) => {
            let (g1, i1, r1) = (generator.clone(), inner.clone(), request.clone());
            let (g2, i2) = (generator.clone(), inner.clone());
            await_value(
                v,
                move |x| {
                    resume_request(&g1, &i1, r1, Completion::normal(x));
                    async_generator_drain(&g1);
                },
                move |e| {
                    resume_request(&g2, &i2, request, Completion::throw(e));
                    async_generator_drain(&g2);
                },
            );
        }
        Ok(FrameOutcome::Returned(Value::Promise(awaited))) => {
            set_state(generator, AsyncGeneratorState::AwaitingReturn);
            await_return(generator, request, Value::Promise(awaited));
        }
        Ok(FrameOutcome::Returned(v)) => {
            set_state(generator, AsyncGeneratorState::Completed);
            resolve_promise(&request.capability, create_iterator_result(v, true));
        }
        Ok(FrameOutcome::Threw(e)) => {
            set_state(generator, AsyncGeneratorState::Completed);
            reject_promise(&request.capability, e);
        }
        Err(err) => {
            log::debug!("async generator step failed: {}", err);
            set_state(generator, AsyncGeneratorState::Completed);
            reject_promise(&request.capability, js_error_to_value(&err));
        }
    }
}

fn settle_yield(generator: &AsyncGeneratorPtr, request: AsyncGeneratorRequest, value: Value) {
    set_state(generator, AsyncGeneratorState::SuspendedYield);
    resolve_promise(&request.capability, create_iterator_result(value, false));
}

// Await a return value, then complete the generator with it.
fn await_return(generator: &AsyncGeneratorPtr, request: AsyncGeneratorRequest, value: Value) {
    let (g1, r1) = (generator.clone(), request.clone());
    let g2 = generator.clone();
    await_value(
        value,
        move |v| {
            set_state(&g1, AsyncGeneratorState::Completed);
            resolve_promise(&r1.capability, create_iterator_result(v, true));
            async_generator_drain(&g1);
        },
        move |e| {
            set_state(&g2, AsyncGeneratorState::Completed);
            reject_promise(&request.capability, e);
            async_generator_drain(&g2);
        },
    );
}

/// Dispatch `AsyncGenerator.prototype.<method>` after checking the receiver.
pub fn handle_async_generator_instance_method(this: &Value, method: &str, args: &[Value]) -> Result<Value, JSError> {
    let Value::AsyncGenerator(generator) = this else {
        return Err(JSError::InvalidReceiver {
            expected: "AsyncGenerator",
            method: format!("AsyncGenerator.prototype.{method}"),
        });
    };
    let arg = args.first().cloned().unwrap_or(Value::Undefined);
    let promise = match method {
        "next" => async_generator_next(generator, arg),
        "return" => async_generator_return(generator, arg),
        "throw" => async_generator_throw(generator, arg),
        _ => return Err(raise_type_error!(format!("AsyncGenerator.prototype.{method} is not a function"))),
    };
    Ok(Value::Promise(promise))
}
