//! Access checks and resource limits consulted while rendering.
//!
//! Every render asks the [`Policy`] of its [`Engine`][`crate::Engine`]
//! before dispatching a filter or function, accessing an attribute, calling
//! a method, entering a macro, iterating a loop and writing output. A denied
//! check aborts the render with an [`ErrorKind::Security`][`crate::ErrorKind::Security`]
//! error.
use crate::{
    log::{error_security, Error},
    render::Value,
};
use std::{collections::HashSet, time::Duration};

/// Stack left when a nested statement or expression moves to a new segment.
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment.
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// Run `f`, moving to a new stack segment first if little stack is left.
///
/// Templates nest statements and expressions as deep as their text does,
/// so the recursive steps of the parser and renderer go through here.
pub(crate) fn grow_stack<R, F>(f: F) -> R
where
    F: FnOnce() -> R,
{
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, f)
}

/// Largest string, in bytes, or list, in items, that repetition and
/// padding may build, whatever the [`Policy`].
pub const MAX_SIZE: usize = 10_000_000;

/// Return `size` if it is within [`MAX_SIZE`].
///
/// Sizes are computed with saturating arithmetic, so an overflow shows up
/// here as `usize::MAX`.
pub(crate) fn check_size(size: usize) -> Result<usize, Error> {
    match size {
        size if size <= MAX_SIZE => Ok(size),
        usize::MAX => Err(error_security(format!(
            "result is larger than the limit of {MAX_SIZE}"
        ))),
        size => Err(error_security(format!(
            "result of {size} is larger than the limit of {MAX_SIZE}"
        ))),
    }
}

/// Describes the checks made while rendering.
///
/// Every method allows the operation by default.
pub trait Policy: Send + Sync {
    /// Return true if the named filter may be applied.
    fn filter_allowed(&self, _name: &str) -> bool {
        true
    }

    /// Return true if the named function may be called.
    fn function_allowed(&self, _name: &str) -> bool {
        true
    }

    /// Return true if the attribute of the value may be read.
    fn attribute_allowed(&self, _value: &Value, _attr: &str) -> bool {
        true
    }

    /// Return true if the method of the value may be called.
    fn method_call_allowed(&self, _value: &Value, _method: &str) -> bool {
        true
    }

    /// Return true if a call may go `depth` levels deep.
    fn recursion_ok(&self, _depth: usize) -> bool {
        true
    }

    /// Return true if a loop over `items` items may run, or a repetition
    /// may build a list of `items` items or a string of `items` bytes.
    fn memory_ok(&self, _items: usize) -> bool {
        true
    }

    /// Return true if a render may have written `written` bytes.
    fn output_ok(&self, _written: usize) -> bool {
        true
    }

    /// Return true if a render may continue after running for `elapsed`.
    fn time_ok(&self, _elapsed: Duration) -> bool {
        true
    }
}

/// A [`Policy`] that allows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Policy for AllowAll {}

/// A [`Policy`] for rendering templates that are not trusted.
///
/// Attributes and methods whose names start with `_` are always denied.
/// Everything else is allowed until a deny list or limit says otherwise.
///
/// # Examples
///
/// ```
/// use kiln::{security::Sandbox, Engine, ErrorKind, Store};
///
/// let engine = Engine::default().with_policy(Sandbox::new().with_max_output(8));
/// let template = engine.compile("{{ 'x' * 100 }}").unwrap();
/// let error = engine.render(&template, &Store::new()).unwrap_err();
///
/// assert_eq!(error.kind(), ErrorKind::Security);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Sandbox {
    denied_filters: HashSet<String>,
    denied_functions: HashSet<String>,
    max_output: Option<usize>,
    max_recursion: Option<usize>,
    max_items: Option<usize>,
    max_time: Option<Duration>,
}

impl Sandbox {
    /// Create a new [`Sandbox`] with no deny lists or limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny a filter by name.
    pub fn deny_filter<T>(mut self, name: T) -> Self
    where
        T: Into<String>,
    {
        self.denied_filters.insert(name.into());
        self
    }

    /// Deny a function by name.
    pub fn deny_function<T>(mut self, name: T) -> Self
    where
        T: Into<String>,
    {
        self.denied_functions.insert(name.into());
        self
    }

    /// Limit the number of bytes a render may write.
    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = Some(bytes);
        self
    }

    /// Limit how deep macro calls, includes and recursive loops may nest.
    pub fn with_max_recursion(mut self, depth: usize) -> Self {
        self.max_recursion = Some(depth);
        self
    }

    /// Limit the number of items a single loop may iterate over, and the
    /// size of lists and strings built by repetition.
    pub fn with_max_items(mut self, items: usize) -> Self {
        self.max_items = Some(items);
        self
    }

    /// Limit how long a render may run.
    pub fn with_max_time(mut self, time: Duration) -> Self {
        self.max_time = Some(time);
        self
    }
}

fn within<T: PartialOrd>(limit: Option<T>, value: T) -> bool {
    limit.map_or(true, |limit| value <= limit)
}

impl Policy for Sandbox {
    fn filter_allowed(&self, name: &str) -> bool {
        !self.denied_filters.contains(name)
    }

    fn function_allowed(&self, name: &str) -> bool {
        !self.denied_functions.contains(name)
    }

    fn attribute_allowed(&self, _value: &Value, attr: &str) -> bool {
        !attr.starts_with('_')
    }

    fn method_call_allowed(&self, _value: &Value, method: &str) -> bool {
        !method.starts_with('_')
    }

    fn recursion_ok(&self, depth: usize) -> bool {
        within(self.max_recursion, depth)
    }

    fn memory_ok(&self, items: usize) -> bool {
        within(self.max_items, items)
    }

    fn output_ok(&self, written: usize) -> bool {
        within(self.max_output, written)
    }

    fn time_ok(&self, elapsed: Duration) -> bool {
        within(self.max_time, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::{check_size, AllowAll, Policy, Sandbox, MAX_SIZE};
    use crate::log::ErrorKind;
    use crate::render::Value;
    use std::time::Duration;

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.attribute_allowed(&Value::None, "__class__"));
        assert!(AllowAll.output_ok(usize::MAX));
    }

    #[test]
    fn test_sandbox() {
        let sandbox = Sandbox::new()
            .deny_filter("pprint")
            .deny_function("lipsum")
            .with_max_items(10)
            .with_max_time(Duration::from_secs(1));

        assert!(!sandbox.filter_allowed("pprint"));
        assert!(sandbox.filter_allowed("upper"));
        assert!(!sandbox.function_allowed("lipsum"));
        assert!(!sandbox.attribute_allowed(&Value::None, "_private"));
        assert!(!sandbox.method_call_allowed(&Value::None, "__init__"));
        assert!(sandbox.memory_ok(10));
        assert!(!sandbox.memory_ok(11));
        assert!(!sandbox.time_ok(Duration::from_secs(2)));
        assert!(sandbox.recursion_ok(1000));
    }

    #[test]
    fn test_check_size() {
        assert_eq!(check_size(MAX_SIZE).unwrap(), MAX_SIZE);
        assert_eq!(
            check_size(MAX_SIZE + 1).unwrap_err().kind(),
            ErrorKind::Security
        );
        let error = check_size(3usize.saturating_mul(usize::MAX)).unwrap_err();
        assert!(!error.reason().contains(&usize::MAX.to_string()));
    }
}
