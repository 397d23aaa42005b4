use crate::core::{Completion, FrameOutcome, GeneratorPtr, PromisePtr, SuspendableFrame, Value, js_error_to_value};
use crate::js_generator::{generator_resume, new_generator};
use crate::js_promise::{await_value, new_promise, reject_promise, resolve_promise};

/// Start an async function body. The body runs synchronously up to its first
/// `await`; the returned promise settles with its eventual return value or
/// exception. Later steps are driven by promise reaction jobs.
pub fn async_function_start(frame: Box<dyn SuspendableFrame>) -> PromisePtr {
    let promise = new_promise();
    let generator = new_generator(frame);
    step(&generator, &promise, Completion::normal(Value::Undefined));
    promise
}

pub fn async_function_from_fn<F>(frame: F) -> PromisePtr
where
    F: FnMut(Completion) -> FrameOutcome + 'static,
{
    async_function_start(Box::new(frame))
}

fn step(generator: &GeneratorPtr, promise: &PromisePtr, completion: Completion) {
    match generator_resume(generator, completion) {
        // A plain async function has no yield; both suspend kinds await.
        Ok(FrameOutcome::Awaiting(v)) | Ok(FrameOutcome::Yielded(v)) => {
            let (g1, p1) = (generator.clone(), promise.clone());
            let (g2, p2) = (generator.clone(), promise.clone());
            await_value(
                v,
                move |x| step(&g1, &p1, Completion::normal(x)),
                move |e| step(&g2, &p2, Completion::throw(e)),
            );
        }
        Ok(FrameOutcome::Returned(v)) => resolve_promise(promise, v),
        Ok(FrameOutcome::Threw(e)) => reject_promise(promise, e),
        Err(e) => {
            log::debug!("async function step failed: {}", e);
            reject_promise(promise, js_error_to_value(&e));
        }
    }
}
