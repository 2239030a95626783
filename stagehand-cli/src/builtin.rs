//! Implementations every `stagehand` workspace can name without writing code.
//!
//! - `stagehand.builtin.Echo` answers any task with the task name, the
//!   object's reference and the keyword arguments.
//! - `stagehand.builtin.Noop` answers any task with `null`.

use serde_json::{json, Value};
use stagehand_core::{Implementation, Implementations};

pub const ECHO: &str = "stagehand.builtin.Echo";
pub const NOOP: &str = "stagehand.builtin.Noop";

pub fn implementations() -> Implementations {
    Implementations::new()
        .with(Implementation::new(ECHO).fallback(|call| {
            Ok(json!({
                "task": call.task,
                "obj": call.object.ref_string(),
                "args": call.args,
            }))
        }))
        .with(Implementation::new(NOOP).fallback(|_| Ok(Value::Null)))
}
