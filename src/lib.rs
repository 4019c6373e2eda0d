//! Quarry – two small, extensible dialects over keyed JSON datasets.
//!
//! * The **query** dialect selects entry ids from a [`dataset::Dataset`] with
//!   flag terms (categorical name matches supplied by the embedding) and
//!   feature comparisons (arithmetic over dotted field paths), combined with
//!   `,` (intersection), `|` (union) and `-(...)` (complement).
//! * The **template** dialect substitutes `{...}` directives in literal text
//!   with values drawn from a record, including `join` over a list whose
//!   iteration dimension is inferred from the fields the directive reads.
//!
//! Neither grammar is fixed. Each dialect owns a skeleton with named slots;
//! an embedding fills them with its own vocabulary and picks a capability
//! profile, and the [`grammar::GrammarComposer`] assembles and validates the
//! result once when the engine is built.
//!
//! ## Modules
//! * [`path`] – dotted field paths, index assignments, requirement sets.
//! * [`grammar`] – skeletons, capability profiles and composition.
//! * [`parse`] – the parser back-end seam and its pest VM implementation.
//! * [`query`] – the [`query::QueryEngine`].
//! * [`template`] – the [`template::TemplateEngine`].
//! * [`feature`] – feature expressions evaluated by comparisons.
//! * [`vocabulary`] – a reference embedding for a tagged story archive.
//! * [`diagnostics`] – where degraded lookups are reported.
//! * [`settings`] – configuration and logging setup.
//!
//! ## Quick Start
//! ```
//! use serde_json::json;
//! use quarry::dataset::Dataset;
//! use quarry::query::QueryEngine;
//! use quarry::template::{PlainDirectives, TemplateEngine};
//! use quarry::vocabulary::{StoryVocabulary, TagIndex};
//!
//! let dataset = Dataset::from_json(json!({
//!     "1": {"title": "Foo", "num_likes": 3, "tags": [{"id": 5, "name": "Comedy", "type": "Genre"}]},
//!     "2": {"title": "Bar", "num_likes": 9, "tags": []}
//! })).unwrap();
//! let index = TagIndex::build(&dataset);
//! let engine = QueryEngine::new(&dataset, StoryVocabulary::new(index)).unwrap();
//! assert_eq!(engine.evaluate("genre:com").unwrap().len(), 1);
//! assert_eq!(engine.evaluate(".likes > 5").unwrap().len(), 1);
//!
//! let templates = TemplateEngine::new(PlainDirectives).unwrap();
//! assert_eq!(templates.render_entry("Title: {.title}", &dataset, "1").unwrap(), "Title: Foo");
//! ```

use std::hash::BuildHasherDefault;

use seahash::SeaHasher;

pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod feature;
pub mod grammar;
pub mod parse;
pub mod path;
pub mod query;
pub mod settings;
pub mod template;
pub mod vocabulary;

pub use error::{QuarryError, Result};

pub type IdHasher = BuildHasherDefault<SeaHasher>;
