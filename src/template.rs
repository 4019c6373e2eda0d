//! The templating dialect.
//!
//! Literal text is copied through; every `{...}` directive is replaced by
//! the value it computes:
//!
//! ```text
//! Title: {.title}
//! Chapters: {join .chapters.title with ", "}
//! Rule: {"-" * 20}
//! ```
//!
//! Directives are concatenations of quoted literals, repeated literals and
//! dotted field references. `join <data> with <separator>` is the only way
//! to iterate: the list to walk is inferred from the field paths `data`
//! references, and exactly one list boundary must be found.
//!
//! A `{` that does not start a valid directive is emitted as-is and
//! scanning resumes right after it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::{kind, Dataset};
use crate::error::{QuarryError, Result};
use crate::grammar::{Capabilities, Capability, ComposedGrammar, Gate, GrammarComposer, GrammarFragments, Piece, Skeleton};
use crate::parse::{ParseNode, ParserBackend, PestBackend};
use crate::path::{prefix_closure, render_value, FieldPath, IndexAssignment, RequirementSet};
use crate::query::unescape;
use crate::settings::TemplateSettings;

/// Slot for rule definitions (`custom_field`, `custom_directive` and helpers).
pub const VOCABULARY_SLOT: &str = "vocabulary";

/// Largest text a repeated literal may expand to.
pub const MAX_REPEATED_BYTES: usize = 1 << 20;

pub static DIRECTIVE_SKELETON: Skeleton = Skeleton {
    name: "directive",
    start: "directive",
    pieces: &[
        Piece::Text(
            r#"
WHITESPACE = _{ " " }

directive = { "{" ~ embed ~ "}" ~ remainder? ~ EOI }
remainder = @{ ANY+ }
embed = _{ join "#,
        ),
        Piece::Slot("embed_alternatives"),
        Piece::Text(
            r#" | data }
join = { "join" ~ data ~ "with" ~ data }
data = { atom+ }
atom = _{ "#,
        ),
        Piece::Slot("atom_head"),
        Piece::Text(
            r#" repeated | literal | field }
repeated = { literal ~ "*" ~ count }
literal = ${ "\"" ~ literal_body ~ "\"" }
literal_body = @{ ("\\" ~ ANY | !("\"" | "\\") ~ ANY)* }
field = @{ ("." ~ field_name)+ }
field_name = _{ (ASCII_ALPHA | "_") ~ (ASCII_ALPHANUMERIC | "_")* }
count = @{ ASCII_DIGIT+ }
"#,
        ),
        Piece::Slot(VOCABULARY_SLOT),
    ],
    gates: &[
        Gate { slot: "embed_alternatives", capability: Capability::CustomDirectives, text: "| custom_directive" },
        Gate { slot: "atom_head", capability: Capability::CustomFields, text: "custom_field |" },
    ],
    requires_any: &[],
    contracts: &[
        (Capability::CustomFields, "custom_field"),
        (Capability::CustomDirectives, "custom_directive"),
    ],
};

lazy_static! {
    // typographic quotes replaced when consistent quotes are requested
    static ref DOUBLE_QUOTES: Regex = Regex::new("[\u{201C}\u{201D}\u{201E}]").expect("valid double quote class");
    static ref SINGLE_QUOTES: Regex = Regex::new("[\u{2018}\u{2019}]").expect("valid single quote class");
}

/// Produces text for a directive piece that the built-in generators cannot
/// express, such as content fetched from outside the record.
pub trait CustomGenerator: fmt::Debug {
    fn generate(&self, record: &Value, indexes: &IndexAssignment) -> Result<String>;
}

/// A generator is re-run once per iteration step, each time under a
/// different [`IndexAssignment`].
#[derive(Debug, Clone)]
pub enum Generator {
    Constant(String),
    Field(FieldPath),
    Concat(Vec<Generator>),
    Custom(Arc<dyn CustomGenerator>),
}

impl Generator {
    pub fn generate(&self, record: &Value, indexes: &IndexAssignment) -> Result<String> {
        match self {
            Generator::Constant(text) => Ok(text.clone()),
            Generator::Field(path) => Ok(render_value(path.resolve(record, indexes)?)),
            Generator::Concat(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&part.generate(record, indexes)?);
                }
                Ok(text)
            }
            Generator::Custom(custom) => custom.generate(record, indexes),
        }
    }
}

/// A generator together with the field paths it reads.
#[derive(Debug, Clone)]
pub struct Generated {
    pub generator: Generator,
    pub requirements: RequirementSet,
}

impl Generated {
    pub fn constant(text: impl Into<String>) -> Self {
        Self {
            generator: Generator::Constant(text.into()),
            requirements: RequirementSet::new(),
        }
    }
    pub fn field(path: FieldPath) -> Self {
        let mut requirements = RequirementSet::new();
        requirements.insert(path.clone());
        Self {
            generator: Generator::Field(path),
            requirements,
        }
    }
    pub fn concat(parts: Vec<Generated>) -> Self {
        let mut requirements = RequirementSet::new();
        let mut generators = Vec::with_capacity(parts.len());
        for part in parts {
            requirements.extend(part.requirements);
            generators.push(part.generator);
        }
        let generator = match generators.len() {
            1 => generators.remove(0),
            _ => Generator::Concat(generators),
        };
        Self { generator, requirements }
    }
}

/// What an embedding contributes to the directive dialect.
pub trait TemplateVocabulary {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }
    fn fragments(&self) -> GrammarFragments {
        GrammarFragments::new()
    }
    /// Builds the generator for a `custom_field` node. The requirements it
    /// returns take part in list-boundary discovery like any field path.
    fn custom_field(&self, node: &ParseNode, _record: &Value) -> Result<Generated> {
        Err(QuarryError::Vocabulary(format!("custom field '{}' is not supported", node.text)))
    }
    fn custom_directive(&self, node: &ParseNode, _record: &Value) -> Result<Generated> {
        Err(QuarryError::Vocabulary(format!("custom directive '{}' is not supported", node.text)))
    }
}

/// The directive dialect with no additions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainDirectives;

impl TemplateVocabulary for PlainDirectives {}

pub struct TemplateEngine<V: TemplateVocabulary> {
    vocabulary: V,
    parser: Box<dyn ParserBackend>,
    consistent_quotes: bool,
}

impl<V: TemplateVocabulary> TemplateEngine<V> {
    pub fn new(vocabulary: V) -> Result<Self> {
        let capabilities = vocabulary.capabilities();
        Self::with_capabilities(vocabulary, capabilities)
    }
    pub fn with_capabilities(vocabulary: V, capabilities: Capabilities) -> Result<Self> {
        let grammar = Self::grammar(&vocabulary, capabilities)?;
        Ok(Self::from_parts(vocabulary, Box::new(PestBackend::new(grammar))))
    }
    pub fn with_settings(vocabulary: V, settings: &TemplateSettings) -> Result<Self> {
        let requested = Capabilities::none()
            .with(Capability::CustomFields, settings.custom_fields)
            .with(Capability::CustomDirectives, settings.custom_directives);
        Ok(Self::with_capabilities(vocabulary, requested)?.consistent_quotes(settings.consistent_quotes))
    }
    pub fn grammar(vocabulary: &V, capabilities: Capabilities) -> Result<ComposedGrammar> {
        let capabilities = capabilities.intersect(vocabulary.capabilities());
        GrammarComposer::new(&DIRECTIVE_SKELETON, capabilities)
            .fragments(vocabulary.fragments())
            .compose()
    }
    pub fn from_parts(vocabulary: V, parser: Box<dyn ParserBackend>) -> Self {
        info!("template engine ready");
        Self {
            vocabulary,
            parser,
            consistent_quotes: false,
        }
    }
    /// Replaces typographic quotes in rendered output with plain ones.
    pub fn consistent_quotes(mut self, enabled: bool) -> Self {
        self.consistent_quotes = enabled;
        self
    }
    pub fn vocabulary(&self) -> &V {
        &self.vocabulary
    }

    pub fn render(&self, template: &str, record: &Value) -> Result<String> {
        let mut output = String::with_capacity(template.len());
        let mut cursor = 0;
        while cursor < template.len() {
            let Some(offset) = template[cursor..].find('{') else {
                output.push_str(&template[cursor..]);
                break;
            };
            let start = cursor + offset;
            output.push_str(&template[cursor..start]);
            match self.directive(&template[start..], record)? {
                Some((text, consumed)) => {
                    output.push_str(&text);
                    cursor = start + consumed;
                }
                None => {
                    output.push('{');
                    cursor = start + 1;
                }
            }
        }
        if self.consistent_quotes {
            let output = DOUBLE_QUOTES.replace_all(&output, "\"");
            return Ok(SINGLE_QUOTES.replace_all(&output, "'").into_owned());
        }
        Ok(output)
    }

    /// Renders a template against one entry of a dataset.
    pub fn render_entry(&self, template: &str, dataset: &Dataset, id: &str) -> Result<String> {
        let record = dataset.get(id).ok_or_else(|| QuarryError::Field {
            path: String::from("."),
            message: format!("no entry with id {}", id),
        })?;
        self.render(template, record)
    }

    /// Tries to read one directive at the start of `input`. Returns the
    /// rendered text and the number of bytes the directive spans, or
    /// `None` when `input` does not start with a valid directive.
    fn directive(&self, input: &str, record: &Value) -> Result<Option<(String, usize)>> {
        let nodes = match self.parser.parse(input) {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!(error = %e, "not a directive, emitting literal brace");
                return Ok(None);
            }
        };
        let Some(root) = nodes.iter().find(|n| n.is("directive")) else {
            return Ok(None);
        };
        let end = root.child("remainder").map_or(input.len(), |rest| rest.start);
        let Some(close) = input[..end].rfind('}') else {
            return Ok(None);
        };
        let Some(body) = root.children.iter().find(|c| !c.is("remainder") && !c.is("EOI")) else {
            return Ok(None);
        };
        let generated = match self.generated(body, record) {
            Ok(generated) => generated,
            Err(QuarryError::Parse { message, .. }) => {
                debug!(%message, "directive rejected, emitting literal brace");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let text = generated.generator.generate(record, &IndexAssignment::new())?;
        Ok(Some((text, close + 1)))
    }

    fn generated(&self, node: &ParseNode, record: &Value) -> Result<Generated> {
        match node.rule.as_str() {
            "join" => match node.children.as_slice() {
                [data, separator] => join(self.generated(data, record)?, self.generated(separator, record)?, record),
                _ => Err(malformed("join", &node.text)),
            },
            "data" => {
                let parts = node
                    .children
                    .iter()
                    .map(|atom| self.generated(atom, record))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Generated::concat(parts))
            }
            "literal" => Ok(Generated::constant(unescape(&node.text)?)),
            "repeated" => match node.children.as_slice() {
                [literal, count] => {
                    let times = count
                        .text
                        .parse::<usize>()
                        .map_err(|e| malformed("count", &format!("{}: {}", count.text, e)))?;
                    let text = unescape(&literal.text)?;
                    match text.len().checked_mul(times) {
                        Some(total) if total <= MAX_REPEATED_BYTES => Ok(Generated::constant(text.repeat(times))),
                        _ => Err(malformed("count", &format!("{} repetitions of {} bytes", times, text.len()))),
                    }
                }
                _ => Err(malformed("repeated", &node.text)),
            },
            "field" => Ok(Generated::field(FieldPath::parse(&node.text)?)),
            "custom_field" => self.vocabulary.custom_field(node, record),
            "custom_directive" => self.vocabulary.custom_directive(node, record),
            other => Err(malformed(other, &node.text)),
        }
    }
}

/// Renders `data` once per element of the single list boundary its
/// requirements reach, joined by one rendering of `separator`.
fn join(data: Generated, separator: Generated, record: &Value) -> Result<Generated> {
    let mut requirements = data.requirements.clone();
    requirements.extend(separator.requirements.iter().cloned());
    let boundary = single_boundary(record, &requirements)?;
    if let Some(path) = separator
        .requirements
        .iter()
        .find(|path| path.prefixes().any(|prefix| prefix == boundary))
    {
        return Err(QuarryError::Iteration {
            message: format!("join separator reads {} which varies along {}", path, boundary),
        });
    }
    let count = match boundary.resolve(record, &IndexAssignment::new())? {
        Value::Array(items) => items.len(),
        other => {
            return Err(QuarryError::Iteration {
                message: format!("{} is {}, not a list", boundary, kind(other)),
            });
        }
    };
    let glue = separator.generator.generate(record, &IndexAssignment::new())?;
    let pieces = (0..count)
        .map(|index| data.generator.generate(record, &IndexAssignment::pinned(boundary.clone(), index)))
        .collect::<Result<Vec<_>>>()?;
    debug!(%boundary, count, "join rendered");
    Ok(Generated::constant(pieces.join(&glue)))
}

/// Walks the record along the prefixes of the required paths and collects
/// every list it reaches. Elements of a list are searched too, under the
/// list's own path.
pub fn discover_boundaries(record: &Value, requirements: &RequirementSet) -> BTreeSet<FieldPath> {
    let reachable = prefix_closure(requirements);
    let mut boundaries = BTreeSet::new();
    let mut pending: Vec<(FieldPath, &Value)> = vec![(FieldPath::root(), record)];
    while let Some((path, value)) = pending.pop() {
        match value {
            Value::Array(items) if !path.is_root() => {
                boundaries.insert(path.clone());
                pending.extend(items.iter().map(|item| (path.clone(), item)));
            }
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = path.child(key);
                    if reachable.contains(&child_path) {
                        pending.push((child_path, child));
                    }
                }
            }
            _ => (),
        }
    }
    boundaries
}

fn single_boundary(record: &Value, requirements: &RequirementSet) -> Result<FieldPath> {
    let mut boundaries = discover_boundaries(record, requirements).into_iter();
    match (boundaries.next(), boundaries.next()) {
        (Some(boundary), None) => Ok(boundary),
        (None, _) => Err(QuarryError::Iteration {
            message: format!("join reaches no list through {}", listing(requirements)),
        }),
        (Some(first), Some(second)) => {
            let mut found = vec![first.to_string(), second.to_string()];
            found.extend(boundaries.map(|b| b.to_string()));
            Err(QuarryError::Iteration {
                message: format!("join reaches several lists: {}", found.join(", ")),
            })
        }
    }
}

fn listing(requirements: &RequirementSet) -> String {
    if requirements.is_empty() {
        return String::from("no fields");
    }
    requirements.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn malformed(rule: &str, detail: &str) -> QuarryError {
    QuarryError::Parse {
        message: format!("unexpected '{}' node: {}", rule, detail),
        line: None,
        col: None,
    }
}
