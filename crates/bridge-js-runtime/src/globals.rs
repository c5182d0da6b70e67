//! Script Global Objects
//!
//! Registers the `console` global. Output is routed into `tracing` under the
//! `bridge.js.console` target, tagged with the owning context's id, instead of
//! stdout.

use rquickjs::function::Rest;
use rquickjs::{Coerced, Ctx, Function, Object, Result as JsResult};
use tracing::Level;

const CONSOLE_TARGET: &str = "bridge.js.console";

/// Console methods and the level each one logs at.
const CONSOLE_LEVELS: [(&str, Level); 6] = [
    ("log", Level::INFO),
    ("info", Level::INFO),
    ("warn", Level::WARN),
    ("error", Level::ERROR),
    ("debug", Level::DEBUG),
    ("trace", Level::TRACE),
];

fn join(args: Vec<Coerced<String>>) -> String {
    args.into_iter()
        .map(|arg| arg.0)
        .collect::<Vec<_>>()
        .join(" ")
}

fn emit(level: Level, context: u64, message: &str) {
    if level == Level::ERROR {
        tracing::error!(target: CONSOLE_TARGET, context, "{}", message);
    } else if level == Level::WARN {
        tracing::warn!(target: CONSOLE_TARGET, context, "{}", message);
    } else if level == Level::INFO {
        tracing::info!(target: CONSOLE_TARGET, context, "{}", message);
    } else if level == Level::DEBUG {
        tracing::debug!(target: CONSOLE_TARGET, context, "{}", message);
    } else {
        tracing::trace!(target: CONSOLE_TARGET, context, "{}", message);
    }
}

/// Register the console object for the context with id `context`. An
/// existing `console` global is left alone.
pub(crate) fn register_console(ctx: &Ctx<'_>, context: u64) -> JsResult<()> {
    let globals = ctx.globals();
    if globals.get::<_, Object>("console").is_ok() {
        return Ok(());
    }

    let console = Object::new(ctx.clone())?;
    for (name, level) in CONSOLE_LEVELS {
        let method = Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            emit(level, context, &join(args.0));
        })?;
        console.set(name, method)?;
    }

    // console.assert(condition, ...message)
    let assert = Function::new(ctx.clone(), move |condition: Coerced<bool>, args: Rest<Coerced<String>>| {
        if !condition.0 {
            let detail = join(args.0);
            let message = if detail.is_empty() {
                "Assertion failed".to_string()
            } else {
                format!("Assertion failed: {detail}")
            };
            emit(Level::ERROR, context, &message);
        }
    })?;
    console.set("assert", assert)?;

    globals.set("console", console)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_register_console() {
        let runtime = Runtime::new().unwrap();
        let ctx = Context::full(&runtime).unwrap();

        ctx.with(|ctx| {
            register_console(&ctx, 1).unwrap();

            let console: Object = ctx.globals().get("console").unwrap();
            for (name, _) in CONSOLE_LEVELS {
                let _method: Function = console.get(name).unwrap();
            }
            let _assert: Function = console.get("assert").unwrap();
        });
    }

    #[test]
    fn test_console_accepts_non_strings() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let runtime = Runtime::new().unwrap();
        let ctx = Context::full(&runtime).unwrap();

        ctx.with(|ctx| {
            register_console(&ctx, 1).unwrap();

            let _: () = ctx.eval("console.log('value', 42, { a: 1 }, null)").unwrap();
            let _: () = ctx.eval("console.assert(false, 'count', 3)").unwrap();
            let _: () = ctx.eval("console.assert(1 === 1)").unwrap();
        });
    }

    #[test]
    fn test_existing_console_is_kept() {
        let runtime = Runtime::new().unwrap();
        let ctx = Context::full(&runtime).unwrap();

        ctx.with(|ctx| {
            let _: () = ctx.eval("globalThis.console = { marker: true };").unwrap();
            register_console(&ctx, 1).unwrap();

            let marker: bool = ctx.eval("console.marker").unwrap();
            assert!(marker);
        });
    }
}
