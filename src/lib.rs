//! Kiln - Template Engine
//!
//! Kiln compiles Jinja-style templates into a tree of nodes, and renders
//! them against a [`Store`] of data.
//!
//! ```
//! use kiln::{Engine, Store};
//!
//! let mut engine = Engine::default();
//! engine
//!     .add_template("base", "<{% block body %}{% endblock %}>")
//!     .unwrap();
//! engine
//!     .add_template(
//!         "page",
//!         "{% extends 'base' %}{% block body %}hello, {{ name|title }}!{% endblock %}",
//!     )
//!     .unwrap();
//!
//! let store = Store::new().with_must("name", "taylor");
//! assert_eq!(engine.render_named("page", &store).unwrap(), "<hello, Taylor!>");
//! ```
//!
//! Templates are loaded by name through a [`Loader`][`loader::Loader`],
//! escaped according to an [`Autoescape`] policy, and rendered under a
//! [`Policy`][`security::Policy`] which may deny filters, functions and
//! attributes or bound the resources a render may use.
mod compile;
mod engine;
mod log;
mod region;
mod render;
mod store;

pub mod filter;
pub mod function;
pub mod i18n;
pub mod loader;
pub mod security;
pub mod syntax;
pub mod test;

pub use crate::{
    compile::{compile, Template},
    engine::{Autoescape, Engine, Expression, UndefinedBehavior},
    log::{Error, ErrorKind},
    region::{Position, Region},
    render::{render, value::Object, Value},
    store::Store,
    syntax::{Builder, Marker, Syntax},
};
