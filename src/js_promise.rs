//! # Promise Implementation
//!
//! This module implements promise functionality in Rust, including:
//! - Promise lifecycle (pending → fulfilled/rejected, exactly once)
//! - Reactions: then(), catch(), finally()
//! - Static methods: resolve(), reject(), all(), race(), allSettled(), any()
//! - Unhandled rejection tracking
//!
//! ## Architecture Overview
//!
//! 1. **JSPromise**: state plus ordered fulfill/reject reaction lists
//! 2. **Reactions**: `(handler, capability)` records; settling a promise turns
//!    every registered reaction into a job on the job queue
//! 3. **Adoption**: resolving a promise with another promise queues a
//!    resolve-thenable job; adoption chains are walked to reject cycles
//! 4. **Unhandled rejections**: rejected promises with no reactions are
//!    recorded and reported once the outermost job drain is quiescent

use crate::core::{
    EvalError, JSFunction, PromisePtr, PromiseReaction, PromiseState, ReactionKind, Value, array_to_vec, create_array, create_error,
    eval_error_to_value, new_js_object_data, new_shared_ptr, object_set_key_value,
};
use crate::core::JSPromise;
use crate::error::JSError;
use crate::job_queue::{Job, queue_job};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Host policy applied to rejected promises that never got a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UnhandledRejectionPolicy {
    /// Drop the record silently.
    Ignore,
    /// Log with `log::warn!` and keep the record.
    Warn,
    /// Keep the record for [`take_unhandled_rejections`] (logged at debug level).
    #[default]
    Collect,
}

thread_local! {
    static UNHANDLED_POLICY: Cell<UnhandledRejectionPolicy> = const { Cell::new(UnhandledRejectionPolicy::Collect) };
    // Rejected promises without handlers, waiting for the end of the drain.
    static PENDING_UNHANDLED: RefCell<Vec<PromisePtr>> = const { RefCell::new(Vec::new()) };
    // Rejection reasons that stayed unhandled through a full drain.
    static REPORTED_UNHANDLED: RefCell<Vec<Value>> = const { RefCell::new(Vec::new()) };
}

pub fn set_unhandled_rejection_policy(policy: UnhandledRejectionPolicy) {
    UNHANDLED_POLICY.with(|p| p.set(policy));
}

pub fn unhandled_rejection_policy() -> UnhandledRejectionPolicy {
    UNHANDLED_POLICY.with(|p| p.get())
}

/// Reset thread-level runtime state: job queue, unhandled rejection records
/// and configuration knobs.
pub fn reset_global_state() {
    crate::job_queue::clear_job_queue();
    crate::job_queue::set_max_jobs_per_drain(None);
    PENDING_UNHANDLED.with(|p| p.borrow_mut().clear());
    REPORTED_UNHANDLED.with(|r| r.borrow_mut().clear());
    set_unhandled_rejection_policy(UnhandledRejectionPolicy::default());
}

pub fn new_promise() -> PromisePtr {
    new_shared_ptr(JSPromise::new())
}

pub fn promise_state(promise: &PromisePtr) -> PromiseState {
    promise.borrow().state.clone()
}

/// Take every rejection reason reported as unhandled so far.
pub fn take_unhandled_rejections() -> Vec<Value> {
    REPORTED_UNHANDLED.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

fn track_unhandled(promise: &PromisePtr) {
    log::trace!("track_unhandled: promise={}", promise.borrow().id);
    PENDING_UNHANDLED.with(|p| p.borrow_mut().push(promise.clone()));
}

fn untrack_unhandled(id: usize) {
    PENDING_UNHANDLED.with(|p| p.borrow_mut().retain(|promise| promise.borrow().id != id));
}

/// Report every tracked rejection that is still unhandled. Called by the job
/// queue once the outermost drain reaches quiescence.
pub fn process_pending_unhandled() {
    let pending = PENDING_UNHANDLED.with(|p| std::mem::take(&mut *p.borrow_mut()));
    let policy = unhandled_rejection_policy();
    for promise in pending {
        let (id, handled, reason) = {
            let p = promise.borrow();
            let reason = match &p.state {
                PromiseState::Rejected(r) => r.clone(),
                _ => continue,
            };
            (p.id, p.handled, reason)
        };
        if handled {
            continue;
        }
        match policy {
            UnhandledRejectionPolicy::Ignore => {}
            UnhandledRejectionPolicy::Warn => {
                log::warn!("Unhandled promise rejection (promise {}): {:?}", id, reason);
                REPORTED_UNHANDLED.with(|r| r.borrow_mut().push(reason));
            }
            UnhandledRejectionPolicy::Collect => {
                log::debug!("Unhandled promise rejection (promise {}): {:?}", id, reason);
                REPORTED_UNHANDLED.with(|r| r.borrow_mut().push(reason));
            }
        }
    }
}

fn trigger_reactions(reactions: Vec<PromiseReaction>, argument: Value) {
    for reaction in reactions {
        queue_job(Job::PromiseReaction {
            reaction,
            argument: argument.clone(),
        });
    }
}

fn fulfill_internal(promise: &PromisePtr, value: Value) {
    let reactions = {
        let mut p = promise.borrow_mut();
        if !matches!(p.state, PromiseState::Pending) {
            return;
        }
        p.state = PromiseState::Fulfilled(value.clone());
        p.following = None;
        p.on_rejected.clear();
        std::mem::take(&mut p.on_fulfilled)
    };
    log::trace!("fulfill: promise={} reactions={}", promise.borrow().id, reactions.len());
    trigger_reactions(reactions, value);
}

fn reject_internal(promise: &PromisePtr, reason: Value) {
    let (reactions, handled) = {
        let mut p = promise.borrow_mut();
        if !matches!(p.state, PromiseState::Pending) {
            return;
        }
        p.state = PromiseState::Rejected(reason.clone());
        p.following = None;
        p.on_fulfilled.clear();
        (std::mem::take(&mut p.on_rejected), p.handled)
    };
    log::trace!("reject: promise={} reactions={}", promise.borrow().id, reactions.len());
    if !handled {
        track_unhandled(promise);
    }
    trigger_reactions(reactions, reason);
}

// Walk the adoption chain starting at `candidate`; reaching `target` means
// adopting `candidate` would make `target` wait on itself.
fn adoption_creates_cycle(target: &PromisePtr, candidate: &PromisePtr) -> bool {
    let mut cursor = Some(candidate.clone());
    while let Some(current) = cursor {
        if Rc::ptr_eq(&current, target) {
            return true;
        }
        cursor = current.borrow().following.clone();
    }
    false
}

fn resolve_internal(promise: &PromisePtr, value: Value) {
    match value {
        Value::Promise(thenable) => {
            if adoption_creates_cycle(promise, &thenable) {
                log::debug!("resolve: chaining cycle detected for promise {}", promise.borrow().id);
                reject_internal(promise, create_error("TypeError", "Chaining cycle detected for promise"));
                return;
            }
            promise.borrow_mut().following = Some(thenable.clone());
            queue_job(Job::ResolveThenable {
                promise: promise.clone(),
                thenable,
            });
        }
        other => fulfill_internal(promise, other),
    }
}

fn lock_in(promise: &PromisePtr) -> bool {
    let mut p = promise.borrow_mut();
    if p.already_resolved {
        log::trace!("promise {} already resolved; ignoring", p.id);
        return false;
    }
    p.already_resolved = true;
    true
}

/// Resolve `promise` with `value`: a promise value is adopted, anything else
/// fulfills. No-op once the promise has been resolved or settled.
pub fn resolve_promise(promise: &PromisePtr, value: Value) {
    if lock_in(promise) {
        resolve_internal(promise, value);
    }
}

/// Fulfill `promise` with `value` as-is, without adopting promise values.
pub fn fulfill_promise(promise: &PromisePtr, value: Value) {
    if lock_in(promise) {
        fulfill_internal(promise, value);
    }
}

pub fn reject_promise(promise: &PromisePtr, reason: Value) {
    if lock_in(promise) {
        reject_internal(promise, reason);
    }
}

/// Build the `resolve` / `reject` functions handed to an executor.
pub fn create_resolving_functions(promise: &PromisePtr) -> (JSFunction, JSFunction) {
    let p = promise.clone();
    let resolve = JSFunction::new("resolve", move |args| {
        resolve_promise(&p, args.first().cloned().unwrap_or(Value::Undefined));
        Ok(Value::Undefined)
    });
    let p = promise.clone();
    let reject = JSFunction::new("reject", move |args| {
        reject_promise(&p, args.first().cloned().unwrap_or(Value::Undefined));
        Ok(Value::Undefined)
    });
    (resolve, reject)
}

/// Return a fresh promise together with its resolving functions.
pub fn create_promise_capability() -> (PromisePtr, JSFunction, JSFunction) {
    let promise = new_promise();
    let (resolve, reject) = create_resolving_functions(&promise);
    (promise, resolve, reject)
}

/// `new Promise(executor)`: the executor runs synchronously; if it throws,
/// the promise is rejected with the thrown value.
pub fn new_promise_with_executor(executor: &JSFunction) -> PromisePtr {
    let (promise, resolve, reject) = create_promise_capability();
    if let Err(e) = executor.call(&[Value::Function(resolve), Value::Function(reject)]) {
        reject_promise(&promise, eval_error_to_value(e));
    }
    promise
}

/// Attach reactions to `promise`. Reactions for an already settled promise
/// are queued immediately; they never run synchronously.
pub fn perform_promise_then(
    promise: &PromisePtr,
    on_fulfilled: Option<JSFunction>,
    on_rejected: Option<JSFunction>,
    capability: Option<PromisePtr>,
) {
    let fulfill_reaction = PromiseReaction {
        kind: ReactionKind::Fulfill,
        handler: on_fulfilled,
        capability: capability.clone(),
    };
    let reject_reaction = PromiseReaction {
        kind: ReactionKind::Reject,
        handler: on_rejected,
        capability,
    };
    let (state, id, was_handled) = {
        let mut p = promise.borrow_mut();
        let was_handled = p.handled;
        p.handled = true;
        if matches!(p.state, PromiseState::Pending) {
            p.on_fulfilled.push(fulfill_reaction);
            p.on_rejected.push(reject_reaction);
            return;
        }
        (p.state.clone(), p.id, was_handled)
    };
    match state {
        PromiseState::Fulfilled(v) => queue_job(Job::PromiseReaction {
            reaction: fulfill_reaction,
            argument: v,
        }),
        PromiseState::Rejected(r) => {
            if !was_handled {
                untrack_unhandled(id);
            }
            queue_job(Job::PromiseReaction {
                reaction: reject_reaction,
                argument: r,
            })
        }
        PromiseState::Pending => {}
    }
}

/// Execute one promise reaction: run the handler (or pass the value through)
/// and settle the reaction's capability with the outcome.
pub fn run_promise_reaction_job(reaction: PromiseReaction, argument: Value) {
    let result: Result<Value, Value> = match (&reaction.handler, reaction.kind) {
        (Some(handler), _) => handler.call(&[argument]).map_err(eval_error_to_value),
        (None, ReactionKind::Fulfill) => Ok(argument),
        (None, ReactionKind::Reject) => Err(argument),
    };
    match (reaction.capability, result) {
        (Some(capability), Ok(v)) => resolve_promise(&capability, v),
        (Some(capability), Err(e)) => reject_promise(&capability, e),
        (None, Err(e)) => log::debug!("run_promise_reaction_job: handler failed without capability: {:?}", e),
        (None, Ok(_)) => {}
    }
}

/// Make `promise` follow `thenable`'s eventual settlement.
pub fn run_resolve_thenable_job(promise: &PromisePtr, thenable: &PromisePtr) {
    let p = promise.clone();
    let on_fulfilled = JSFunction::once("resolve", move |v| {
        resolve_internal(&p, v);
        Ok(Value::Undefined)
    });
    let p = promise.clone();
    let on_rejected = JSFunction::once("reject", move |r| {
        reject_internal(&p, r);
        Ok(Value::Undefined)
    });
    perform_promise_then(thenable, Some(on_fulfilled), Some(on_rejected), None);
}

/// `promise.then(onFulfilled, onRejected)`
pub fn promise_then(promise: &PromisePtr, on_fulfilled: Option<JSFunction>, on_rejected: Option<JSFunction>) -> PromisePtr {
    let capability = new_promise();
    perform_promise_then(promise, on_fulfilled, on_rejected, Some(capability.clone()));
    capability
}

/// `promise.catch(onRejected)`
pub fn promise_catch(promise: &PromisePtr, on_rejected: Option<JSFunction>) -> PromisePtr {
    promise_then(promise, None, on_rejected)
}

/// `promise.finally(onFinally)`: runs the callback on either outcome, waits
/// for whatever it returns, then passes the original outcome through. A
/// callback that throws (or returns a rejected promise) overrides it.
pub fn promise_finally(promise: &PromisePtr, on_finally: Option<JSFunction>) -> PromisePtr {
    let Some(on_finally) = on_finally else {
        return promise_then(promise, None, None);
    };
    let callback = on_finally.clone();
    let then_finally = JSFunction::new("thenFinally", move |args| {
        let value = args.first().cloned().unwrap_or(Value::Undefined);
        let result = callback.call(&[])?;
        let waited = promise_resolve(result);
        let value_thunk = JSFunction::new("valueThunk", move |_| Ok(value.clone()));
        Ok(Value::Promise(promise_then(&waited, Some(value_thunk), None)))
    });
    let callback = on_finally;
    let catch_finally = JSFunction::new("catchFinally", move |args| {
        let reason = args.first().cloned().unwrap_or(Value::Undefined);
        let result = callback.call(&[])?;
        let waited = promise_resolve(result);
        let thrower = JSFunction::new("thrower", move |_| Err(EvalError::Throw(reason.clone())));
        Ok(Value::Promise(promise_then(&waited, Some(thrower), None)))
    });
    promise_then(promise, Some(then_finally), Some(catch_finally))
}

/// `Promise.resolve(value)`: promises are returned unchanged.
pub fn promise_resolve(value: Value) -> PromisePtr {
    if let Value::Promise(p) = value {
        return p;
    }
    let promise = new_promise();
    resolve_promise(&promise, value);
    promise
}

/// `Promise.reject(reason)`
pub fn promise_reject(reason: Value) -> PromisePtr {
    let promise = new_promise();
    reject_promise(&promise, reason);
    promise
}

/// Wait for `value` (a promise or a plain value) and hand its outcome to one
/// of two callbacks, from a job. Used by the async drivers for `await`.
pub fn await_value<F, R>(value: Value, on_fulfilled: F, on_rejected: R)
where
    F: FnOnce(Value) + 'static,
    R: FnOnce(Value) + 'static,
{
    let promise = promise_resolve(value);
    let on_fulfilled = JSFunction::once("awaitFulfilled", move |v| {
        on_fulfilled(v);
        Ok(Value::Undefined)
    });
    let on_rejected = JSFunction::once("awaitRejected", move |r| {
        on_rejected(r);
        Ok(Value::Undefined)
    });
    perform_promise_then(&promise, Some(on_fulfilled), Some(on_rejected), None);
}

struct CombinatorState {
    values: Vec<Value>,
    remaining: usize,
}

fn new_combinator_state(len: usize) -> Rc<RefCell<CombinatorState>> {
    Rc::new(RefCell::new(CombinatorState {
        values: vec![Value::Undefined; len],
        remaining: 1,
    }))
}

// Decrement the outstanding-element counter; returns the collected values
// when it reaches zero.
fn combinator_element_done(state: &Rc<RefCell<CombinatorState>>) -> Option<Vec<Value>> {
    let mut s = state.borrow_mut();
    s.remaining -= 1;
    if s.remaining == 0 { Some(std::mem::take(&mut s.values)) } else { None }
}

fn settlement_record(status: &str, key: &str, value: Value) -> Value {
    let obj = new_js_object_data();
    object_set_key_value(&obj, "status", Value::String(status.to_string()));
    object_set_key_value(&obj, key, value);
    Value::Object(obj)
}

/// `Promise.all(values)`
pub fn promise_all(values: &[Value]) -> PromisePtr {
    let result = new_promise();
    let state = new_combinator_state(values.len());
    for (index, value) in values.iter().enumerate() {
        state.borrow_mut().remaining += 1;
        let s = state.clone();
        let r = result.clone();
        let on_fulfilled = JSFunction::once("Promise.all resolve element", move |v| {
            s.borrow_mut().values[index] = v;
            if let Some(values) = combinator_element_done(&s) {
                resolve_promise(&r, create_array(values));
            }
            Ok(Value::Undefined)
        });
        let r = result.clone();
        let on_rejected = JSFunction::new("Promise.all reject", move |args| {
            reject_promise(&r, args.first().cloned().unwrap_or(Value::Undefined));
            Ok(Value::Undefined)
        });
        perform_promise_then(&promise_resolve(value.clone()), Some(on_fulfilled), Some(on_rejected), None);
    }
    if let Some(values) = combinator_element_done(&state) {
        resolve_promise(&result, create_array(values));
    }
    result
}

/// `Promise.allSettled(values)`
pub fn promise_all_settled(values: &[Value]) -> PromisePtr {
    let result = new_promise();
    let state = new_combinator_state(values.len());
    for (index, value) in values.iter().enumerate() {
        state.borrow_mut().remaining += 1;
        // One flag per element shared by both callbacks.
        let called = Rc::new(Cell::new(false));
        let make_callback = |status: &'static str, key: &'static str| {
            let s = state.clone();
            let r = result.clone();
            let called = called.clone();
            JSFunction::new("Promise.allSettled element", move |args| {
                if called.replace(true) {
                    return Ok(Value::Undefined);
                }
                let v = args.first().cloned().unwrap_or(Value::Undefined);
                s.borrow_mut().values[index] = settlement_record(status, key, v);
                if let Some(values) = combinator_element_done(&s) {
                    resolve_promise(&r, create_array(values));
                }
                Ok(Value::Undefined)
            })
        };
        let on_fulfilled = make_callback("fulfilled", "value");
        let on_rejected = make_callback("rejected", "reason");
        perform_promise_then(&promise_resolve(value.clone()), Some(on_fulfilled), Some(on_rejected), None);
    }
    if let Some(values) = combinator_element_done(&state) {
        resolve_promise(&result, create_array(values));
    }
    result
}

/// `Promise.race(values)`: an empty input stays pending forever.
pub fn promise_race(values: &[Value]) -> PromisePtr {
    let result = new_promise();
    let (resolve, reject) = create_resolving_functions(&result);
    for value in values {
        perform_promise_then(&promise_resolve(value.clone()), Some(resolve.clone()), Some(reject.clone()), None);
    }
    result
}

fn aggregate_error(errors: Vec<Value>) -> Value {
    let err = create_error("AggregateError", "All promises were rejected");
    if let Value::Object(obj) = &err {
        object_set_key_value(obj, "errors", create_array(errors));
    }
    err
}

/// `Promise.any(values)`: first fulfillment wins; if every input rejects the
/// result rejects with an AggregateError carrying the reasons in input order.
pub fn promise_any(values: &[Value]) -> PromisePtr {
    let result = new_promise();
    let state = new_combinator_state(values.len());
    for (index, value) in values.iter().enumerate() {
        state.borrow_mut().remaining += 1;
        let r = result.clone();
        let on_fulfilled = JSFunction::new("Promise.any resolve", move |args| {
            resolve_promise(&r, args.first().cloned().unwrap_or(Value::Undefined));
            Ok(Value::Undefined)
        });
        let s = state.clone();
        let r = result.clone();
        let on_rejected = JSFunction::once("Promise.any reject element", move |reason| {
            s.borrow_mut().values[index] = reason;
            if let Some(errors) = combinator_element_done(&s) {
                reject_promise(&r, aggregate_error(errors));
            }
            Ok(Value::Undefined)
        });
        perform_promise_then(&promise_resolve(value.clone()), Some(on_fulfilled), Some(on_rejected), None);
    }
    if let Some(errors) = combinator_element_done(&state) {
        reject_promise(&result, aggregate_error(errors));
    }
    result
}

fn callable_arg(args: &[Value], index: usize) -> Option<JSFunction> {
    args.get(index).and_then(|v| v.as_function()).cloned()
}

/// Dispatch `Promise.prototype.<method>` after checking the receiver.
pub fn handle_promise_prototype_method(this: &Value, method: &str, args: &[Value]) -> Result<Value, JSError> {
    let Value::Promise(promise) = this else {
        return Err(JSError::InvalidReceiver {
            expected: "Promise",
            method: format!("Promise.prototype.{method}"),
        });
    };
    let result = match method {
        "then" => promise_then(promise, callable_arg(args, 0), callable_arg(args, 1)),
        "catch" => promise_catch(promise, callable_arg(args, 0)),
        "finally" => promise_finally(promise, callable_arg(args, 0)),
        _ => return Err(raise_type_error!(format!("Promise.prototype.{method} is not a function"))),
    };
    Ok(Value::Promise(result))
}

/// Dispatch `Promise.<method>`. Combinators take an array as their argument.
pub fn handle_promise_static_method(method: &str, args: &[Value]) -> Result<Value, JSError> {
    let first = args.first().cloned().unwrap_or(Value::Undefined);
    let iterable = || array_to_vec(&first).ok_or_else(|| raise_type_error!(format!("Promise.{method} expects an array")));
    let result = match method {
        "resolve" => promise_resolve(first.clone()),
        "reject" => promise_reject(first.clone()),
        "all" => promise_all(&iterable()?),
        "allSettled" => promise_all_settled(&iterable()?),
        "race" => promise_race(&iterable()?),
        "any" => promise_any(&iterable()?),
        _ => return Err(raise_type_error!(format!("Promise.{method} is not a function"))),
    };
    Ok(Value::Promise(result))
}
