//! In-process JavaScript evaluation with the Boa interpreter.
//!
//! Every call builds a fresh `Context` on its own OS thread, so nothing
//! survives from one snippet to the next. The interpreter cannot be
//! interrupted from outside: when the runner's timer wins the race the thread
//! is abandoned and keeps running until the snippet ends on its own or hits
//! one of the configured [`EngineLimits`]. Its console calls start throwing
//! as soon as the run is cancelled, so an orphaned snippet never writes into
//! a finished result.
//!
//! `setTimeout`/`setInterval` and their `clear*` counterparts are backed by a
//! queue that the worker drains in due order once the microtask queue is
//! empty, sleeping until each timer is due. Draining stops as soon as the
//! snippet settles or the run is cancelled.

use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use boa_engine::builtins::promise::PromiseState;
use boa_engine::job::SimpleJobQueue;
use boa_engine::object::builtins::JsPromise;
use boa_engine::object::{FunctionObjectBuilder, JsObject, ObjectInitializer};
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction,
    Source,
};
use boa_gc::{Finalize, Gc, GcRefCell, Trace};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{never_settles, CodeExecutor, ConsoleLevel, OutputSink};
use crate::errors::ExecutionError;

const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;
/// Longest uninterrupted sleep while waiting for a timer, so cancellation is
/// noticed promptly.
const TIMER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bounds applied to the interpreter of every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_loop_iterations: Option<u64>,
    pub recursion_limit: Option<usize>,
}

pub struct BoaCodeExecutor {
    limits: EngineLimits,
    stack_size: usize,
}

impl BoaCodeExecutor {
    pub fn new() -> Self {
        Self::with_limits(EngineLimits::default())
    }

    pub fn with_limits(limits: EngineLimits) -> Self {
        Self {
            limits,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }
}

impl Default for BoaCodeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

enum Settlement {
    Completed(Option<String>),
    Pending,
}

#[async_trait]
impl CodeExecutor for BoaCodeExecutor {
    fn name(&self) -> &'static str {
        "boa"
    }

    async fn execute_code(
        &self,
        source: &str,
        sink: &Arc<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Result<Option<String>, ExecutionError> {
        let (tx, rx) = oneshot::channel();
        let source = source.to_string();
        let sink = Arc::clone(sink);
        let worker_cancel = cancel.clone();
        let limits = self.limits;

        thread::Builder::new()
            .name("codepad-boa".to_string())
            .stack_size(self.stack_size)
            .spawn(move || {
                let outcome = evaluate(&source, sink, worker_cancel, limits);
                let _ = tx.send(outcome);
            })
            .map_err(|e| {
                ExecutionError::Unknown(format!("failed to spawn evaluation thread: {}", e))
            })?;

        match rx.await {
            Ok(Ok(Settlement::Completed(value))) => Ok(value),
            Ok(Ok(Settlement::Pending)) => {
                log::debug!("Snippet left a pending promise, waiting for the time budget");
                never_settles(&cancel).await
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExecutionError::Unknown(
                "evaluation thread stopped before reporting a result".to_string(),
            )),
        }
    }
}

/// Wraps the snippet so plain statements and `await` are handled the same way.
fn wrap_source(source: &str) -> String {
    format!("(async function () {{\n{}\n}})();", source)
}

fn evaluate(
    source: &str,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
    limits: EngineLimits,
) -> Result<Settlement, ExecutionError> {
    let mut context = Context::builder()
        .job_queue(Rc::new(SimpleJobQueue::new()))
        .build()
        .map_err(|e| {
            ExecutionError::Unknown(format!("failed to create interpreter context: {}", e))
        })?;

    if let Some(limit) = limits.max_loop_iterations {
        context.runtime_limits_mut().set_loop_iteration_limit(limit);
    }
    if let Some(limit) = limits.recursion_limit {
        context.runtime_limits_mut().set_recursion_limit(limit);
    }

    let stringify = json_stringify(&mut context)
        .map_err(|e| ExecutionError::Unknown(format!("JSON.stringify is unavailable: {}", e)))?;
    install_console(&mut context, sink, cancel.clone(), stringify.clone())
        .map_err(|e| ExecutionError::Unknown(format!("failed to install console: {}", e)))?;
    let timers = Gc::new(GcRefCell::new(TimerQueue::default()));
    install_timers(&mut context, &timers)
        .map_err(|e| ExecutionError::Unknown(format!("failed to install timers: {}", e)))?;

    let value = context
        .eval(Source::from_bytes(&wrap_source(source)))
        .map_err(|e| ExecutionError::Runtime(thrown_message(&e, &mut context)))?;
    context.run_jobs();

    let Some(object) = value.as_object() else {
        return Ok(Settlement::Completed(completion(&value, &stringify, &mut context)));
    };
    let promise = JsPromise::from_object(object.clone())
        .map_err(|e| ExecutionError::Unknown(format!("wrapper did not return a promise: {}", e)))?;

    loop {
        match promise.state() {
            PromiseState::Fulfilled(value) => {
                return Ok(Settlement::Completed(completion(
                    &value,
                    &stringify,
                    &mut context,
                )));
            }
            PromiseState::Rejected(reason) => {
                return Err(ExecutionError::Runtime(thrown_message(
                    &JsError::from_opaque(reason),
                    &mut context,
                )));
            }
            PromiseState::Pending => {}
        }

        let Some(timer) = TimerQueue::take_next(&timers) else {
            return Ok(Settlement::Pending);
        };
        if !wait_until(timer.due, &cancel) {
            return Ok(Settlement::Pending);
        }
        if let Some(period) = timer.period {
            timers.borrow_mut().schedule(
                timer.id,
                Instant::now() + period,
                Some(period),
                timer.callback.clone(),
                timer.args.clone(),
            );
        }

        timer
            .callback
            .call(&JsValue::undefined(), &timer.args, &mut context)
            .map_err(|e| ExecutionError::Runtime(thrown_message(&e, &mut context)))?;
        context.run_jobs();
    }
}

/// The realm's own `JSON.stringify`, captured before the snippet can replace it.
fn json_stringify(context: &mut Context) -> JsResult<JsObject> {
    let json = context.global_object().get(js_string!("JSON"), context)?;
    let stringify = match json.as_object() {
        Some(json) => json.get(js_string!("stringify"), context)?,
        None => JsValue::undefined(),
    };
    stringify
        .as_callable()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("JSON.stringify is not callable").into())
}

#[derive(Trace, Finalize)]
struct Timer {
    id: u32,
    seq: u64,
    #[unsafe_ignore_trace]
    due: Instant,
    #[unsafe_ignore_trace]
    period: Option<Duration>,
    callback: JsObject,
    args: Vec<JsValue>,
}

#[derive(Default, Trace, Finalize)]
struct TimerQueue {
    next_id: u32,
    next_seq: u64,
    timers: Vec<Timer>,
}

impl TimerQueue {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn schedule(
        &mut self,
        id: u32,
        due: Instant,
        period: Option<Duration>,
        callback: JsObject,
        args: Vec<JsValue>,
    ) {
        self.next_seq += 1;
        self.timers.push(Timer {
            id,
            seq: self.next_seq,
            due,
            period,
            callback,
            args,
        });
    }

    fn clear(&mut self, id: u32) {
        self.timers.retain(|timer| timer.id != id);
    }

    /// Removes the timer that is due first; equal deadlines fire in the order
    /// they were scheduled.
    fn take_next(queue: &Gc<GcRefCell<Self>>) -> Option<Timer> {
        let mut queue = queue.borrow_mut();
        let index = queue
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(index, _)| index)?;
        Some(queue.timers.remove(index))
    }
}

/// Sleeps until `due`. Returns `false` if the run was cancelled first.
fn wait_until(due: Instant, cancel: &CancellationToken) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= due {
            return true;
        }
        thread::sleep((due - now).min(TIMER_POLL_INTERVAL));
    }
}

#[derive(Clone, Trace, Finalize)]
struct TimerBinding {
    queue: Gc<GcRefCell<TimerQueue>>,
    repeat: bool,
}

fn install_timers(context: &mut Context, queue: &Gc<GcRefCell<TimerQueue>>) -> JsResult<()> {
    for (name, repeat) in [("setTimeout", false), ("setInterval", true)] {
        let binding = TimerBinding {
            queue: queue.clone(),
            repeat,
        };
        let function = FunctionObjectBuilder::new(
            context.realm(),
            NativeFunction::from_copy_closure_with_captures(set_timer, binding),
        )
        .name(JsString::from(name))
        .length(2)
        .constructor(false)
        .build();
        context.register_global_property(JsString::from(name), function, Attribute::all())?;
    }

    for name in ["clearTimeout", "clearInterval"] {
        let binding = TimerBinding {
            queue: queue.clone(),
            repeat: false,
        };
        let function = FunctionObjectBuilder::new(
            context.realm(),
            NativeFunction::from_copy_closure_with_captures(clear_timer, binding),
        )
        .name(JsString::from(name))
        .length(1)
        .constructor(false)
        .build();
        context.register_global_property(JsString::from(name), function, Attribute::all())?;
    }
    Ok(())
}

fn set_timer(
    _this: &JsValue,
    args: &[JsValue],
    binding: &TimerBinding,
    context: &mut Context,
) -> JsResult<JsValue> {
    let callback = args
        .first()
        .and_then(JsValue::as_callable)
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("Timer callback must be a function"))?;

    let delay = match args.get(1) {
        Some(value) => value.to_number(context)?,
        None => 0.0,
    };
    let delay = if delay.is_finite() && delay > 0.0 {
        Duration::from_secs_f64(delay / 1000.0)
    } else {
        Duration::ZERO
    };
    let extra = args.get(2..).unwrap_or_default().to_vec();

    let mut queue = binding.queue.borrow_mut();
    let id = queue.allocate_id();
    let period = binding.repeat.then_some(delay);
    queue.schedule(id, Instant::now() + delay, period, callback, extra);
    Ok(JsValue::from(id))
}

fn clear_timer(
    _this: &JsValue,
    args: &[JsValue],
    binding: &TimerBinding,
    context: &mut Context,
) -> JsResult<JsValue> {
    if let Some(value) = args.first() {
        let id = value.to_number(context)?;
        if id.is_finite() && id >= 1.0 && id <= f64::from(u32::MAX) {
            binding.queue.borrow_mut().clear(id as u32);
        }
    }
    Ok(JsValue::undefined())
}

#[derive(Clone, Trace, Finalize)]
struct ConsoleBridge {
    #[unsafe_ignore_trace]
    sink: Arc<dyn OutputSink>,
    #[unsafe_ignore_trace]
    cancel: CancellationToken,
    #[unsafe_ignore_trace]
    level: ConsoleLevel,
    stringify: JsObject,
}

fn install_console(
    context: &mut Context,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
    stringify: JsObject,
) -> JsResult<()> {
    let mut initializer = ObjectInitializer::new(context);
    for level in ConsoleLevel::ALL {
        let bridge = ConsoleBridge {
            sink: Arc::clone(&sink),
            cancel: cancel.clone(),
            level,
            stringify: stringify.clone(),
        };
        initializer.function(
            NativeFunction::from_copy_closure_with_captures(console_method, bridge),
            JsString::from(level.method_name()),
            0,
        );
    }
    let console = initializer.build();

    context.register_global_property(js_string!("console"), console, Attribute::all())?;
    Ok(())
}

fn console_method(
    _this: &JsValue,
    args: &[JsValue],
    bridge: &ConsoleBridge,
    context: &mut Context,
) -> JsResult<JsValue> {
    if bridge.cancel.is_cancelled() {
        return Err(JsNativeError::error()
            .with_message("Execution cancelled")
            .into());
    }

    let line = args
        .iter()
        .map(|arg| format_value(arg, &bridge.stringify, context))
        .collect::<Vec<_>>()
        .join(" ");
    bridge.sink.record(bridge.level, &line);
    Ok(JsValue::undefined())
}

fn completion(value: &JsValue, stringify: &JsObject, context: &mut Context) -> Option<String> {
    if value.is_undefined() {
        None
    } else {
        Some(format_value(value, stringify, context))
    }
}

/// Strings verbatim, objects and arrays through `JSON.stringify(value, null, 2)`,
/// everything else (and objects JSON cannot represent, such as cycles) through
/// `String(value)`.
fn format_value(value: &JsValue, stringify: &JsObject, context: &mut Context) -> String {
    if let Some(string) = value.as_string() {
        return string.to_std_string_escaped();
    }

    if value.is_object() && !value.is_callable() {
        let pretty = stringify.call(
            &JsValue::undefined(),
            &[value.clone(), JsValue::null(), JsValue::from(2)],
            context,
        );
        if let Ok(pretty) = pretty {
            if let Some(pretty) = pretty.as_string() {
                return pretty.to_std_string_escaped();
            }
        }
    }

    coerce_string(value, context)
}

fn coerce_string(value: &JsValue, context: &mut Context) -> String {
    value
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| value.display().to_string())
}

fn thrown_message(error: &JsError, context: &mut Context) -> String {
    if let Some(value) = error.as_opaque() {
        if let Some(object) = value.as_object() {
            if let Ok(message) = object.get(js_string!("message"), context) {
                if !message.is_undefined() {
                    return coerce_string(&message, context);
                }
            }
        }
        return coerce_string(value, context);
    }

    match error.try_native(context) {
        Ok(native) => native.message().to_string(),
        Err(_) => error.to_string(),
    }
}
