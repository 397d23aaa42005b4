#[macro_use]
pub(crate) mod error;

pub(crate) mod core;
pub mod job_queue;
pub(crate) mod js_async;
pub(crate) mod js_async_generator;
pub(crate) mod js_generator;
pub(crate) mod js_promise;

pub use crate::core::{
    AsyncGeneratorPtr, AsyncGeneratorState, Completion, CompletionType, EvalError, FrameOutcome, GeneratorPtr, GeneratorState, Instruction,
    JSFunction, PromisePtr, PromiseState, ScriptFrame, SuspendableFrame, Value, ValuesFrame, array_to_vec, create_array, create_error,
    create_iterator_result, error_name, eval_error_to_value, get_property, is_error, iterator_result_parts, js_error_to_value,
    new_js_object_data, object_get_key_value, object_set_key_value, value_to_string,
};
pub use error::JSError;
pub use job_queue::{Job, JobQueue, clear_job_queue, pending_job_count, queue_job, run_jobs, set_max_jobs_per_drain};
pub use js_async::{async_function_from_fn, async_function_start};
pub use js_async_generator::{
    async_generator_enqueue, async_generator_from_fn, async_generator_from_values, async_generator_next, async_generator_queue_len,
    async_generator_return, async_generator_state, async_generator_throw, handle_async_generator_instance_method, new_async_generator,
};
pub use js_generator::{
    generator_close, generator_from_values, generator_next, generator_resume, generator_return, generator_state, generator_throw,
    handle_generator_instance_method, new_generator,
};
pub use js_promise::{
    UnhandledRejectionPolicy, await_value, create_promise_capability, create_resolving_functions, fulfill_promise,
    handle_promise_prototype_method, handle_promise_static_method, new_promise, new_promise_with_executor,
    perform_promise_then, promise_all, promise_all_settled, promise_any, promise_catch, promise_finally,
    promise_race, promise_reject, promise_resolve, promise_state, promise_then, reject_promise, reset_global_state, resolve_promise,
    set_unhandled_rejection_policy, take_unhandled_rejections, unhandled_rejection_policy,
};
