//! Message translation for `{% trans %}` and the gettext family of globals.
//!
//! An [`Engine`][`crate::Engine`] uses [`Identity`] unless another
//! [`Translator`] is given with
//! [`set_translator`][`crate::Engine::set_translator()`].
use std::collections::HashMap;

/// Describes a type that can look up translated messages.
///
/// Only `gettext` and `ngettext` are required. The context aware variants
/// ignore the context unless overridden.
pub trait Translator: Send + Sync {
    /// Return the translation of a message.
    fn gettext(&self, message: &str) -> String;

    /// Return the translation of a message that has a plural form, chosen
    /// by `n`.
    fn ngettext(&self, singular: &str, plural: &str, n: i64) -> String;

    /// Return the translation of a message within a context.
    fn pgettext(&self, _context: &str, message: &str) -> String {
        self.gettext(message)
    }

    /// Return the translation of a message with a plural form within a
    /// context.
    fn npgettext(&self, _context: &str, singular: &str, plural: &str, n: i64) -> String {
        self.ngettext(singular, plural, n)
    }
}

/// A [`Translator`] that returns every message unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Translator for Identity {
    fn gettext(&self, message: &str) -> String {
        message.to_string()
    }

    fn ngettext(&self, singular: &str, plural: &str, n: i64) -> String {
        match n == 1 {
            true => singular.to_string(),
            false => plural.to_string(),
        }
    }
}

/// Key of a message in a [`Catalog`], with an optional context.
type MessageKey = (Option<String>, String);

/// An in memory [`Translator`].
///
/// Messages without a translation fall back to the behavior of [`Identity`].
///
/// # Examples
///
/// ```
/// use kiln::i18n::{Catalog, Translator};
///
/// let catalog = Catalog::new()
///     .with_message("Hello", "Hallo")
///     .with_plural("apple", ["Apfel", "Äpfel"]);
///
/// assert_eq!(catalog.gettext("Hello"), "Hallo");
/// assert_eq!(catalog.ngettext("apple", "apples", 3), "Äpfel");
/// ```
pub struct Catalog {
    messages: HashMap<MessageKey, Vec<String>>,
    /// Return the index of the plural form to use for `n`.
    plural: fn(i64) -> usize,
}

impl Catalog {
    /// Create a new, empty [`Catalog`] using the plural rule of English.
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
            plural: |n| (n != 1) as usize,
        }
    }

    /// Set the function that selects a plural form for a count.
    pub fn with_plural_rule(mut self, rule: fn(i64) -> usize) -> Self {
        self.plural = rule;
        self
    }

    /// Add the translation of a message.
    pub fn with_message<S, T>(mut self, message: S, translation: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.add(None, message.into(), vec![translation.into()]);
        self
    }

    /// Add the translation of a message within a context.
    pub fn with_context_message<C, S, T>(mut self, context: C, message: S, translation: T) -> Self
    where
        C: Into<String>,
        S: Into<String>,
        T: Into<String>,
    {
        self.add(Some(context.into()), message.into(), vec![translation.into()]);
        self
    }

    /// Add the plural forms of a message, keyed by its singular form.
    pub fn with_plural<S, I, T>(mut self, singular: S, forms: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let forms = forms.into_iter().map(Into::into).collect();
        self.add(None, singular.into(), forms);
        self
    }

    fn add(&mut self, context: Option<String>, message: String, forms: Vec<String>) {
        self.messages.insert((context, message), forms);
    }

    fn lookup(&self, context: Option<&str>, message: &str, index: usize) -> Option<&str> {
        let key = (context.map(str::to_string), message.to_string());
        self.messages
            .get(&key)
            .and_then(|forms| forms.get(index).or_else(|| forms.last()))
            .map(String::as_str)
    }

    fn plural_form(
        &self,
        context: Option<&str>,
        singular: &str,
        plural: &str,
        n: i64,
    ) -> String {
        let index = (self.plural)(n);
        match self.lookup(context, singular, index) {
            Some(translation) => translation.to_string(),
            None => Identity.ngettext(singular, plural, n),
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator for Catalog {
    fn gettext(&self, message: &str) -> String {
        self.lookup(None, message, 0).unwrap_or(message).to_string()
    }

    fn ngettext(&self, singular: &str, plural: &str, n: i64) -> String {
        self.plural_form(None, singular, plural, n)
    }

    fn pgettext(&self, context: &str, message: &str) -> String {
        self.lookup(Some(context), message, 0)
            .unwrap_or(message)
            .to_string()
    }

    fn npgettext(&self, context: &str, singular: &str, plural: &str, n: i64) -> String {
        self.plural_form(Some(context), singular, plural, n)
    }
}
