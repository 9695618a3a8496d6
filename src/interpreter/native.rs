use std::time::{SystemTime, UNIX_EPOCH};

use super::{NativeFunction, RuntimeErrorKind, Value};

/// Functions defined in the global scope of every interpreter.
pub const NATIVES: &[NativeFunction] = &[CLOCK];

pub const CLOCK: NativeFunction = NativeFunction {
    name: "clock",
    arity: 0,
    function: clock,
};

/// Seconds since the Unix epoch.
fn clock(_: &[Value]) -> Result<Value, RuntimeErrorKind> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| Value::Number(elapsed.as_secs_f64()))
        .map_err(|e| RuntimeErrorKind::NativeFailure {
            name: CLOCK.name,
            reason: e.to_string(),
        })
}
