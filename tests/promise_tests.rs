use jscoro::{
    EvalError, JSError, JSFunction, PromisePtr, PromiseState, UnhandledRejectionPolicy, Value, array_to_vec, error_name, fulfill_promise,
    get_property, handle_promise_prototype_method, handle_promise_static_method, new_promise, new_promise_with_executor, pending_job_count,
    promise_all, promise_all_settled, promise_any, promise_catch, promise_finally, promise_race, promise_reject, promise_resolve,
    promise_state, promise_then, reject_promise, reset_global_state, resolve_promise, run_jobs, set_unhandled_rejection_policy,
    take_unhandled_rejections,
};
use std::cell::RefCell;
use std::rc::Rc;

#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[cfg(test)]
mod promise_tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn fulfilled_value(promise: &PromisePtr) -> Value {
        match promise_state(promise) {
            PromiseState::Fulfilled(v) => v,
            other => panic!("expected fulfilled promise, got {other:?}"),
        }
    }

    fn rejected_reason(promise: &PromisePtr) -> Value {
        match promise_state(promise) {
            PromiseState::Rejected(r) => r,
            other => panic!("expected rejected promise, got {other:?}"),
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &str) -> JSFunction {
        let log = log.clone();
        let tag = tag.to_string();
        JSFunction::new(&tag.clone(), move |args| {
            let v = args.first().cloned().unwrap_or(Value::Undefined);
            log.borrow_mut().push(format!("{tag}:{}", jscoro::value_to_string(&v)));
            Ok(v)
        })
    }

    #[test]
    fn test_settlement_is_idempotent() {
        reset_global_state();
        let promise = new_promise();
        resolve_promise(&promise, num(1.0));
        resolve_promise(&promise, num(2.0));
        reject_promise(&promise, Value::from("late"));
        assert_eq!(fulfilled_value(&promise), num(1.0));

        let rejected = new_promise();
        reject_promise(&rejected, Value::from("first"));
        resolve_promise(&rejected, num(3.0));
        assert_eq!(rejected_reason(&rejected), Value::from("first"));
        promise_catch(&rejected, None);
        run_jobs().unwrap();
    }

    #[test]
    fn test_fulfill_keeps_promise_values_as_is() {
        reset_global_state();
        let other = new_promise();
        let promise = new_promise();
        fulfill_promise(&promise, Value::Promise(other.clone()));
        fulfill_promise(&promise, num(1.0));
        reject_promise(&promise, Value::from("late"));
        assert_eq!(fulfilled_value(&promise), Value::Promise(other.clone()));

        resolve_promise(&other, num(2.0));
        run_jobs().unwrap();
        assert_eq!(fulfilled_value(&promise), Value::Promise(other));
    }

    #[test]
    fn test_reactions_are_deferred_and_ordered() {
        reset_global_state();
        let log = Rc::new(RefCell::new(Vec::new()));
        let promise = new_promise();
        promise_then(&promise, Some(recorder(&log, "a")), None);
        promise_then(&promise, Some(recorder(&log, "b")), None);
        resolve_promise(&promise, num(1.0));
        promise_then(&promise, Some(recorder(&log, "c")), None);

        assert!(log.borrow().is_empty(), "reactions must not run synchronously");
        assert_eq!(pending_job_count(), 3);
        assert_eq!(run_jobs().unwrap(), 3);
        assert_eq!(*log.borrow(), vec!["a:1", "b:1", "c:1"]);

        // Each reaction ran exactly once.
        run_jobs().unwrap();
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn test_then_chain_transforms_values() {
        reset_global_state();
        let promise = promise_resolve(num(10.0));
        let double = JSFunction::new("double", |args| match args.first() {
            Some(Value::Number(n)) => Ok(Value::Number(n * 2.0)),
            _ => Ok(Value::Undefined),
        });
        let add_five = JSFunction::new("addFive", |args| match args.first() {
            Some(Value::Number(n)) => Ok(Value::Number(n + 5.0)),
            _ => Ok(Value::Undefined),
        });
        let chained = promise_then(&promise_then(&promise, Some(double), None), Some(add_five), None);
        run_jobs().unwrap();
        assert_eq!(fulfilled_value(&chained), num(25.0));
    }

    #[test]
    fn test_handler_throw_rejects_derived_promise() {
        reset_global_state();
        let thrower = JSFunction::new("thrower", |_| Err(EvalError::Throw(Value::from("oops"))));
        let derived = promise_then(&promise_resolve(num(1.0)), Some(thrower), None);
        let recovered = promise_catch(
            &derived,
            Some(JSFunction::new("recover", |args| Ok(args.first().cloned().unwrap_or(Value::Undefined)))),
        );
        run_jobs().unwrap();
        assert_eq!(rejected_reason(&derived), Value::from("oops"));
        assert_eq!(fulfilled_value(&recovered), Value::from("oops"));
    }

    #[test]
    fn test_resolve_adopts_pending_promise() {
        reset_global_state();
        let inner = new_promise();
        let outer = new_promise();
        resolve_promise(&outer, Value::Promise(inner.clone()));
        run_jobs().unwrap();
        assert!(matches!(promise_state(&outer), PromiseState::Pending));

        resolve_promise(&inner, Value::from("adopted"));
        run_jobs().unwrap();
        assert_eq!(fulfilled_value(&outer), Value::from("adopted"));
    }

    #[test]
    fn test_self_resolution_rejects_with_type_error() {
        reset_global_state();
        let promise = new_promise();
        promise_catch(&promise, None);
        resolve_promise(&promise, Value::Promise(promise.clone()));
        let reason = rejected_reason(&promise);
        assert_eq!(error_name(&reason).as_deref(), Some("TypeError"));
        run_jobs().unwrap();
    }

    #[test]
    fn test_adoption_cycle_is_detected() {
        reset_global_state();
        let a = new_promise();
        let b = new_promise();
        promise_catch(&a, None);
        promise_catch(&b, None);
        resolve_promise(&a, Value::Promise(b.clone()));
        resolve_promise(&b, Value::Promise(a.clone()));
        assert_eq!(error_name(&rejected_reason(&b)).as_deref(), Some("TypeError"));
        run_jobs().unwrap();
        assert_eq!(error_name(&rejected_reason(&a)).as_deref(), Some("TypeError"));
    }

    #[test]
    fn test_finally_passes_outcome_through() {
        reset_global_state();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let on_finally = JSFunction::new("onFinally", move |_| {
            *counter.borrow_mut() += 1;
            Ok(Value::from("ignored"))
        });
        let ok = promise_finally(&promise_resolve(num(5.0)), Some(on_finally.clone()));
        let failed = promise_finally(&promise_reject(Value::from("nope")), Some(on_finally));
        promise_catch(&failed, None);
        run_jobs().unwrap();
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(fulfilled_value(&ok), num(5.0));
        assert_eq!(rejected_reason(&failed), Value::from("nope"));
    }

    #[test]
    fn test_executor_runs_synchronously_and_throw_rejects() {
        reset_global_state();
        let executor = JSFunction::new("executor", |args| {
            if let Some(Value::Function(resolve)) = args.first() {
                resolve.call(&[Value::from("now")])?;
            }
            Ok(Value::Undefined)
        });
        let promise = new_promise_with_executor(&executor);
        assert_eq!(fulfilled_value(&promise), Value::from("now"));

        let failing = JSFunction::new("failing", |_| Err(EvalError::Throw(Value::from("executor failed"))));
        let rejected = new_promise_with_executor(&failing);
        promise_catch(&rejected, None);
        assert_eq!(rejected_reason(&rejected), Value::from("executor failed"));
        run_jobs().unwrap();
    }

    #[test]
    fn test_all_collects_in_input_order() {
        reset_global_state();
        let late = new_promise();
        let all = promise_all(&[num(1.0), Value::Promise(promise_resolve(num(2.0))), Value::Promise(late.clone())]);
        run_jobs().unwrap();
        assert!(matches!(promise_state(&all), PromiseState::Pending));
        resolve_promise(&late, num(3.0));
        run_jobs().unwrap();
        let values = array_to_vec(&fulfilled_value(&all)).unwrap();
        assert_eq!(values, vec![num(1.0), num(2.0), num(3.0)]);

        let empty = promise_all(&[]);
        assert_eq!(array_to_vec(&fulfilled_value(&empty)).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn test_all_rejects_on_first_rejection() {
        reset_global_state();
        let all = promise_all(&[Value::Promise(new_promise()), Value::Promise(promise_reject(Value::from("bad")))]);
        promise_catch(&all, None);
        run_jobs().unwrap();
        assert_eq!(rejected_reason(&all), Value::from("bad"));
    }

    #[test]
    fn test_all_settled_records_every_outcome() {
        reset_global_state();
        let settled = promise_all_settled(&[num(1.0), Value::Promise(promise_reject(num(2.0)))]);
        run_jobs().unwrap();
        let records = array_to_vec(&fulfilled_value(&settled)).unwrap();
        assert_eq!(get_property(&records[0], "status"), Some(Value::from("fulfilled")));
        assert_eq!(get_property(&records[0], "value"), Some(num(1.0)));
        assert_eq!(get_property(&records[1], "status"), Some(Value::from("rejected")));
        assert_eq!(get_property(&records[1], "reason"), Some(num(2.0)));
    }

    #[test]
    fn test_race_settles_with_first() {
        reset_global_state();
        let slow = new_promise();
        let race = promise_race(&[Value::Promise(slow.clone()), Value::Promise(promise_resolve(Value::from("fast")))]);
        run_jobs().unwrap();
        assert_eq!(fulfilled_value(&race), Value::from("fast"));
        resolve_promise(&slow, Value::from("slow"));
        run_jobs().unwrap();
        assert_eq!(fulfilled_value(&race), Value::from("fast"));
    }

    #[test]
    fn test_any_aggregates_rejections() {
        reset_global_state();
        let any = promise_any(&[Value::Promise(promise_reject(num(1.0))), Value::Promise(promise_reject(num(2.0)))]);
        promise_catch(&any, None);
        run_jobs().unwrap();
        let reason = rejected_reason(&any);
        assert_eq!(error_name(&reason).as_deref(), Some("AggregateError"));
        let errors = get_property(&reason, "errors").and_then(|e| array_to_vec(&e)).unwrap();
        assert_eq!(errors, vec![num(1.0), num(2.0)]);

        let winner = promise_any(&[Value::Promise(promise_reject(num(1.0))), num(7.0)]);
        run_jobs().unwrap();
        assert_eq!(fulfilled_value(&winner), num(7.0));
    }

    #[test]
    fn test_unhandled_rejection_is_collected() {
        reset_global_state();
        promise_reject(Value::from("lost"));
        let handled_late = promise_reject(Value::from("handled"));
        promise_catch(&handled_late, Some(JSFunction::new("swallow", |_| Ok(Value::Undefined))));
        run_jobs().unwrap();
        assert_eq!(take_unhandled_rejections(), vec![Value::from("lost")]);
        assert!(take_unhandled_rejections().is_empty());
    }

    #[test]
    fn test_unhandled_rejection_policy_ignore() {
        reset_global_state();
        set_unhandled_rejection_policy(UnhandledRejectionPolicy::Ignore);
        promise_reject(Value::from("quiet"));
        run_jobs().unwrap();
        assert!(take_unhandled_rejections().is_empty());
        reset_global_state();
    }

    #[test]
    fn test_method_surface() {
        reset_global_state();
        let promise = handle_promise_static_method("resolve", &[num(3.0)]).unwrap();
        let chained = handle_promise_prototype_method(&promise, "then", &[]).unwrap();
        run_jobs().unwrap();
        match &chained {
            Value::Promise(p) => assert_eq!(fulfilled_value(p), num(3.0)),
            other => panic!("expected promise, got {other:?}"),
        }

        match handle_promise_prototype_method(&num(1.0), "then", &[]) {
            Err(JSError::InvalidReceiver { expected, .. }) => assert_eq!(expected, "Promise"),
            other => panic!("expected InvalidReceiver, got {other:?}"),
        }
        assert!(matches!(handle_promise_static_method("all", &[num(1.0)]), Err(JSError::TypeError { .. })));
    }
}
