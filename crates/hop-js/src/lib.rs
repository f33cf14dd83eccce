//! Script execution for documents swapped in by the navigator.

use boa_engine::Context;
use boa_engine::Source;
use hop_core::HopError;
use hop_core::HopResult;
use hop_dom::Document;
use std::cell::RefCell;

const BOOTSTRAP_ENV: &str = r##"
globalThis.window = globalThis;
globalThis.self = globalThis;
globalThis.console = {
  log: function () {},
  warn: function () {},
  error: function () {}
};
globalThis.__hop_timer_queue = [];
globalThis.__hop_timer_cancelled = {};
globalThis.__hop_next_timer_id = 1;
globalThis.setTimeout = function (callback, _delay) {
  var cb = callback;
  if (typeof cb !== "function") {
    var src = String(callback);
    cb = function () { (0, eval)(src); };
  }
  var id = globalThis.__hop_next_timer_id++;
  globalThis.__hop_timer_queue.push({ id: id, cb: cb });
  return id;
};
globalThis.clearTimeout = function (id) {
  globalThis.__hop_timer_cancelled[String(id)] = true;
};
globalThis.setInterval = globalThis.setTimeout;
globalThis.clearInterval = globalThis.clearTimeout;
globalThis.requestAnimationFrame = function (callback) {
  return globalThis.setTimeout(function () { callback(Date.now()); }, 16);
};
globalThis.queueMicrotask = function (callback) {
  return globalThis.setTimeout(callback, 0);
};
globalThis.__hop_flush_timers = function (limit) {
  var runs = 0;
  while (globalThis.__hop_timer_queue.length > 0 && runs < limit) {
    var task = globalThis.__hop_timer_queue.shift();
    var key = String(task.id);
    var cancelled = !!globalThis.__hop_timer_cancelled[key];
    delete globalThis.__hop_timer_cancelled[key];
    if (!cancelled) {
      task.cb();
    }
    runs++;
  }
  return runs;
};
globalThis.__hop_elements = {};
globalThis.location = {
  href: "",
  toString: function () { return this.href; }
};
globalThis.document = {
  title: "",
  readyState: "complete",
  location: globalThis.location,
  getElementById: function (id) {
    if (id == null) {
      return null;
    }
    var node = globalThis.__hop_elements[String(id)];
    if (!node) {
      return null;
    }
    return {
      id: node.id,
      tagName: node.tagName,
      textContent: node.textContent,
      getAttribute: function (name) {
        var key = String(name);
        return Object.prototype.hasOwnProperty.call(node.attributes, key)
          ? node.attributes[key]
          : null;
      }
    };
  },
  querySelector: function (selector) {
    if (typeof selector === "string" && selector.startsWith("#")) {
      return this.getElementById(selector.slice(1));
    }
    return null;
  }
};
globalThis.__hop_sync = function (href, title, elements) {
  globalThis.location.href = href;
  globalThis.document.URL = href;
  globalThis.document.title = title;
  globalThis.__hop_elements = elements;
};
"##;

const READ_TITLE: &[u8] =
    b"(typeof document === 'object' && document !== null) ? String(document.title) : ''";

/// Script payload to execute. `origin` names the script in diagnostics:
/// its resolved `src` or `inline:<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub origin: String,
    pub source: String,
}

/// Executes one re-inserted script against the live document.
pub trait ScriptRunner {
    fn run(
        &self,
        script: &ScriptSource,
        document: &mut Document,
        location: &str,
    ) -> HopResult<()>;
}

/// Runtime hardening knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsRuntimeConfig {
    pub max_script_bytes: usize,
    pub recursion_limit: usize,
    pub stack_size_limit: usize,
    pub loop_iteration_limit: u64,
    /// Queued timer callbacks run after each script, up to this many.
    pub timer_flush_limit: usize,
}

impl Default for JsRuntimeConfig {
    fn default() -> Self {
        Self {
            max_script_bytes: 2 * 1024 * 1024,
            recursion_limit: 64,
            stack_size_limit: 1024,
            loop_iteration_limit: 100_000,
            timer_flush_limit: 128,
        }
    }
}

/// Boa-backed [`ScriptRunner`].
///
/// One realm lives as long as the runtime, so globals defined by one page's
/// scripts are visible to the next page's, as they would be in a window
/// that is never reloaded.
pub struct JsRuntime {
    config: JsRuntimeConfig,
    context: RefCell<Option<Context>>,
}

impl std::fmt::Debug for JsRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsRuntime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for JsRuntime {
    fn default() -> Self {
        Self::new(JsRuntimeConfig::default())
    }
}

impl JsRuntime {
    pub fn new(config: JsRuntimeConfig) -> Self {
        Self {
            config,
            context: RefCell::new(None),
        }
    }

    fn create_context(&self) -> HopResult<Context> {
        let mut context = Context::default();
        let limits = context.runtime_limits_mut();
        limits.set_recursion_limit(self.config.recursion_limit);
        limits.set_stack_size_limit(self.config.stack_size_limit);
        limits.set_loop_iteration_limit(self.config.loop_iteration_limit);

        context
            .eval(Source::from_bytes(BOOTSTRAP_ENV.as_bytes()))
            .map_err(|error| {
                HopError::new(
                    "js.bootstrap_failed",
                    format!("failed to install host environment: {error}"),
                )
            })?;
        Ok(context)
    }
}

impl ScriptRunner for JsRuntime {
    fn run(
        &self,
        script: &ScriptSource,
        document: &mut Document,
        location: &str,
    ) -> HopResult<()> {
        if script.source.len() > self.config.max_script_bytes {
            return Err(HopError::new(
                "js.script_too_large",
                format!(
                    "`{}` is {} bytes, limit is {}",
                    script.origin,
                    script.source.len(),
                    self.config.max_script_bytes
                ),
            ));
        }

        let mut slot = self.context.borrow_mut();
        let context = match slot.take() {
            Some(context) => context,
            None => self.create_context()?,
        };
        let context = slot.insert(context);

        let title_before = document.title().unwrap_or_default();
        let sync = format!(
            "__hop_sync({}, {}, {});",
            js_string_literal(location),
            js_string_literal(&title_before),
            elements_by_id_object(document)
        );
        context
            .eval(Source::from_bytes(sync.as_bytes()))
            .map_err(|error| {
                HopError::new(
                    "js.host_sync_failed",
                    format!("failed to expose document to scripts: {error}"),
                )
            })?;

        context
            .eval(Source::from_bytes(script.source.as_bytes()))
            .map_err(|error| {
                HopError::new(
                    "js.script_failed",
                    format!("`{}` threw: {error}", script.origin),
                )
            })?;

        let flush = format!("__hop_flush_timers({});", self.config.timer_flush_limit);
        if let Err(error) = context.eval(Source::from_bytes(flush.as_bytes())) {
            tracing::warn!(origin = %script.origin, %error, "timer callback failed");
        }

        if let Some(title) = read_string(context, READ_TITLE)
            && title != title_before
        {
            document.set_title(&title);
        }

        Ok(())
    }
}

fn read_string(context: &mut Context, expression: &[u8]) -> Option<String> {
    let value = context.eval(Source::from_bytes(expression)).ok()?;
    let js_string = value.to_string(context).ok()?;
    Some(js_string.to_std_string_escaped())
}

fn elements_by_id_object(document: &Document) -> String {
    let mut out = String::from("{");
    let with_ids = document
        .body
        .descendants()
        .into_iter()
        .filter_map(|element| element.attr("id").map(|id| (id.trim(), element)))
        .filter(|(id, _)| !id.is_empty());

    for (index, (id, element)) in with_ids.enumerate() {
        if index > 0 {
            out.push(',');
        }
        let key = js_string_literal(id);
        let attributes = element
            .attrs
            .iter()
            .map(|(name, value)| {
                format!("{}:{}", js_string_literal(name), js_string_literal(value))
            })
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!(
            "{key}:{{id:{key},tagName:{},textContent:{},attributes:{{{attributes}}}}}",
            js_string_literal(&element.tag.to_ascii_uppercase()),
            js_string_literal(&element.text_content()),
        ));
    }
    out.push('}');
    out
}

fn js_string_literal(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' | '\u{2029}' => out.push_str(&format!("\\u{:04x}", u32::from(ch))),
            ch if ch.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(ch))),
            ch => out.push(ch),
        }
    }
    out.push('"');
    out
}
