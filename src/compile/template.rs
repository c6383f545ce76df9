use crate::compile::tree::{self, Block};
use std::{sync::Arc, time::SystemTime};

/// A compiled [`Template`] that can be rendered with a `Store`.
///
/// Templates are immutable once compiled, and are shared between renders
/// behind an [`Arc`].
#[derive(Debug)]
pub struct Template {
    /// The name of the [`Template`].
    name: Option<String>,
    /// Source text the [`Template`] was compiled from.
    source: String,
    /// The tree generated during compilation.
    root: tree::Template,
    /// Output is escaped unless marked safe.
    autoescape: bool,
    /// Modification time reported by the loader when it was compiled.
    modified: Option<SystemTime>,
}

impl Template {
    pub(crate) fn new(
        name: Option<String>,
        source: String,
        root: tree::Template,
        autoescape: bool,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            name,
            source,
            root,
            autoescape,
            modified,
        }
    }

    /// Return the name of the template, if it has one.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the source text of the template.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Return the tree of the template.
    #[inline]
    pub fn root(&self) -> &tree::Template {
        &self.root
    }

    /// Return true if output is escaped by default.
    #[inline]
    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    #[inline]
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Return the name of the parent template, if the template extends one.
    pub fn extends(&self) -> Option<&str> {
        self.root.extends.as_ref().map(|(name, _)| name.as_str())
    }

    /// Return the names of every block defined in the template.
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.root.blocks.keys().map(String::as_str)
    }
}

/// Every definition of one block along an inheritance chain, paired with
/// the template that defines it.
///
/// The most derived definition comes first, so `super()` inside of the
/// definition at index `n` renders the one at `n + 1`.
#[derive(Debug, Clone, Default)]
pub struct BlockChain(Vec<(Arc<Template>, Arc<Block>)>);

impl BlockChain {
    /// Add a less derived definition.
    pub fn push(&mut self, template: Arc<Template>, block: Arc<Block>) {
        self.0.push((template, block));
    }

    /// Return the definition at the given index.
    pub fn get(&self, index: usize) -> Option<&(Arc<Template>, Arc<Block>)> {
        self.0.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
