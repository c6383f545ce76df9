//! The frame stack that names are resolved against while rendering.
use crate::render::Value;
use indexmap::IndexMap;

/// Describes how a [`Frame`] takes part in name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Top level names of a template. Lookup ends here.
    Root,
    /// A nested scope, such as a loop iteration. Lookup continues outward.
    Scope,
    /// A macro call or unscoped block. Lookup skips to the given root frame.
    Barrier { root: usize },
}

/// One level of variable bindings.
#[derive(Debug, Clone)]
pub struct Frame {
    pub vars: IndexMap<String, Value>,
    pub kind: FrameKind,
}

impl Frame {
    /// Create a new [`Frame`] of the given kind.
    pub fn new(kind: FrameKind) -> Self {
        Self {
            vars: IndexMap::new(),
            kind,
        }
    }

    /// Create a new [`Frame`] holding the given variables.
    pub fn with_vars(kind: FrameKind, vars: IndexMap<String, Value>) -> Self {
        Self { vars, kind }
    }
}

/// A stack of [`Frame`] instances.
///
/// Lookup walks outward from the innermost frame. A barrier frame jumps
/// straight to the root it names, which is how macros and unscoped blocks
/// stop seeing the locals of their caller.
#[derive(Debug, Clone)]
pub struct Context {
    frames: Vec<Frame>,
}

impl Context {
    /// Create a new [`Context`] with a root frame holding the given variables.
    pub fn new(vars: IndexMap<String, Value>) -> Self {
        Self {
            frames: vec![Frame::with_vars(FrameKind::Root, vars)],
        }
    }

    /// Push a new frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Return the number of frames on the stack.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Truncate the stack to the given depth, used to unwind after an error.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    /// Resolve a name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut index = self.frames.len();
        while index > 0 {
            index -= 1;
            let frame = &self.frames[index];
            if let Some(value) = frame.vars.get(name) {
                return Some(value);
            }
            match frame.kind {
                FrameKind::Root => return None,
                FrameKind::Scope => continue,
                FrameKind::Barrier { root } => {
                    return self.frames[self.clamp_root(root, index)].vars.get(name)
                }
            }
        }

        None
    }

    /// Bind a name in the innermost frame.
    pub fn set<T>(&mut self, name: T, value: Value)
    where
        T: Into<String>,
    {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.into(), value);
        }
    }

    /// Return the variables of the innermost frame.
    pub fn innermost(&self) -> &IndexMap<String, Value> {
        &self.frames[self.frames.len() - 1].vars
    }

    /// Return the index of the root frame that lookups from the innermost
    /// frame fall back to.
    pub fn current_root(&self) -> usize {
        for (index, frame) in self.frames.iter().enumerate().rev() {
            match frame.kind {
                FrameKind::Root => return index,
                FrameKind::Barrier { root } => return self.clamp_root(root, index),
                FrameKind::Scope => continue,
            }
        }

        0
    }

    /// Collect the names visible from the innermost frame, excluding those
    /// of the root frame.
    ///
    /// Inner bindings shadow outer ones.
    pub fn locals(&self) -> IndexMap<String, Value> {
        let mut locals = IndexMap::new();
        for frame in self.frames.iter().rev() {
            if frame.kind == FrameKind::Root {
                break;
            }
            for (name, value) in &frame.vars {
                if !locals.contains_key(name) {
                    locals.insert(name.clone(), value.clone());
                }
            }
            if matches!(frame.kind, FrameKind::Barrier { .. }) {
                break;
            }
        }

        locals
    }

    /// Collect every name visible from the innermost frame, including
    /// those of the root frame.
    pub fn flatten(&self) -> IndexMap<String, Value> {
        let mut vars = self.frames[self.current_root()].vars.clone();
        for (name, value) in self.locals() {
            vars.insert(name, value);
        }

        vars
    }

    /// Return a root index that exists and is a root frame, falling back
    /// to the outermost frame.
    fn clamp_root(&self, root: usize, below: usize) -> usize {
        match self.frames.get(root) {
            Some(frame) if root < below && frame.kind == FrameKind::Root => root,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Context, Frame, FrameKind};
    use crate::render::Value;
    use indexmap::IndexMap;

    #[test]
    fn test_lookup_walks_scopes() {
        let mut context = root(&[("a", 1)]);
        context.push(Frame::new(FrameKind::Scope));
        context.set("b", Value::Int(2));

        assert_eq!(context.get("a"), Some(&Value::Int(1)));
        assert_eq!(context.get("b"), Some(&Value::Int(2)));
        context.truncate(1);
        assert_eq!(context.get("b"), None);
    }

    #[test]
    fn test_barrier_skips_locals() {
        let mut context = root(&[("a", 1)]);
        context.push(Frame::new(FrameKind::Scope));
        context.set("hidden", Value::Int(2));
        context.push(Frame::new(FrameKind::Barrier { root: 0 }));

        assert_eq!(context.get("a"), Some(&Value::Int(1)));
        assert_eq!(context.get("hidden"), None);
    }

    #[test]
    fn test_stale_root_is_clamped() {
        let mut context = root(&[("a", 1)]);
        context.push(Frame::new(FrameKind::Barrier { root: 7 }));

        assert_eq!(context.get("a"), Some(&Value::Int(1)));
        assert_eq!(context.current_root(), 0);
    }

    #[test]
    fn test_nested_root() {
        let mut context = root(&[("a", 1)]);
        let mut module = IndexMap::new();
        module.insert("m".to_string(), Value::Int(3));
        context.push(Frame::with_vars(FrameKind::Root, module));
        context.push(Frame::new(FrameKind::Barrier { root: 1 }));

        assert_eq!(context.get("m"), Some(&Value::Int(3)));
        assert_eq!(context.get("a"), None);
        assert_eq!(context.current_root(), 1);
    }

    #[test]
    fn test_locals_and_flatten() {
        let mut context = root(&[("a", 1), ("b", 1)]);
        context.push(Frame::new(FrameKind::Scope));
        context.set("b", Value::Int(2));
        context.push(Frame::new(FrameKind::Scope));
        context.set("c", Value::Int(3));

        let locals = context.locals();
        assert_eq!(locals.len(), 2);
        assert_eq!(locals.get("b"), Some(&Value::Int(2)));

        let all = context.flatten();
        assert_eq!(all.get("a"), Some(&Value::Int(1)));
        assert_eq!(all.get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_root_is_never_truncated() {
        let mut context = root(&[]);
        context.truncate(0);
        assert_eq!(context.depth(), 1);
    }

    fn root(vars: &[(&str, i64)]) -> Context {
        Context::new(
            vars.iter()
                .map(|(k, v)| (k.to_string(), Value::Int(*v)))
                .collect(),
        )
    }
}
