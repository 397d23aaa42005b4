use clap::{Parser, ValueEnum};
use jscoro::{
    JSError, PromisePtr, PromiseState, UnhandledRejectionPolicy, Value, async_generator_from_values, async_generator_next,
    async_generator_return, async_generator_throw, iterator_result_parts, promise_resolve, promise_state, run_jobs,
    set_max_jobs_per_drain, set_unhandled_rejection_policy, take_unhandled_rejections, value_to_string,
};

/// Drive an async generator over the given values and print every request
/// settlement in order.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Values yielded by the generator. Numeric strings become numbers.
    values: Vec<String>,

    /// Number of requests to issue before draining (default: one past the values).
    #[arg(short = 'n', long)]
    requests: Option<usize>,

    /// Yield each value wrapped in an already resolved promise.
    #[arg(long, default_value_t = false)]
    promised: bool,

    /// Issue `throw("injected")` as the request with this index.
    #[arg(long)]
    throw_at: Option<usize>,

    /// Issue `return("early")` as the request with this index.
    #[arg(long)]
    return_at: Option<usize>,

    /// Abort a drain that runs more than this many jobs.
    #[arg(long)]
    max_jobs: Option<usize>,

    /// What to do with rejections nobody handled.
    #[arg(long, value_enum, default_value_t = Policy::Collect)]
    unhandled: Policy,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    Ignore,
    Warn,
    Collect,
}

impl From<Policy> for UnhandledRejectionPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Ignore => UnhandledRejectionPolicy::Ignore,
            Policy::Warn => UnhandledRejectionPolicy::Warn,
            Policy::Collect => UnhandledRejectionPolicy::Collect,
        }
    }
}

fn parse_value(raw: &str) -> Value {
    match raw.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(raw.to_string()),
    }
}

fn describe(promise: &PromisePtr) -> String {
    match promise_state(promise) {
        PromiseState::Pending => "pending".to_string(),
        PromiseState::Fulfilled(result) => match iterator_result_parts(&result) {
            Some((value, done)) => format!("{{ value: {}, done: {} }}", value_to_string(&value), done),
            None => format!("fulfilled {}", value_to_string(&result)),
        },
        PromiseState::Rejected(reason) => format!("rejected {}", value_to_string(&reason)),
    }
}

fn main() -> Result<(), JSError> {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("{:?}", cli);

    set_unhandled_rejection_policy(cli.unhandled.into());
    set_max_jobs_per_drain(cli.max_jobs);

    let values: Vec<Value> = cli
        .values
        .iter()
        .map(|raw| parse_value(raw))
        .map(|v| if cli.promised { Value::Promise(promise_resolve(v)) } else { v })
        .collect();
    let requests = cli.requests.unwrap_or(values.len() + 1);
    let generator = async_generator_from_values(values);

    let mut issued = Vec::with_capacity(requests);
    for index in 0..requests {
        let (label, promise) = if cli.throw_at == Some(index) {
            ("throw", async_generator_throw(&generator, Value::from("injected")))
        } else if cli.return_at == Some(index) {
            ("return", async_generator_return(&generator, Value::from("early")))
        } else {
            ("next", async_generator_next(&generator, Value::Undefined))
        };
        issued.push((label, promise));
    }

    let executed = run_jobs()?;
    log::info!("drained {} jobs", executed);

    for (index, (label, promise)) in issued.iter().enumerate() {
        println!("#{index} {label} -> {}", describe(promise));
    }
    for reason in take_unhandled_rejections() {
        println!("unhandled rejection: {}", value_to_string(&reason));
    }
    Ok(())
}
