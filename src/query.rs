//! The set-query dialect.
//!
//! A query filters the ids of a [`Dataset`]:
//!
//! ```text
//! genre:comedy, -(warning:sad) | .likes > 2 * .dislikes
//! ```
//!
//! `,` intersects, `|` unites (both chain left to right at the same level),
//! `-(...)` takes the complement against every id the engine was built
//! over. Flag terms are resolved by the embedding's [`QueryVocabulary`];
//! comparisons evaluate two feature expressions against each record.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use roaring::RoaringBitmap;
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{QuarryError, Result};
use crate::feature::{Comparator, Feature, Operator};
use crate::grammar::{Capabilities, Capability, ComposedGrammar, Gate, GrammarComposer, GrammarFragments, Piece, Skeleton};
use crate::parse::{ParseNode, ParserBackend, PestBackend};
use crate::path::FieldPath;
use crate::settings::QuerySettings;
use crate::IdHasher;

/// Slot for rule definitions (the `flag` rule and anything it needs).
pub const VOCABULARY_SLOT: &str = "vocabulary";
/// Slot for extra feature alternatives, each written as `rule |`.
pub const FEATURE_ATOMS_SLOT: &str = "feature_atoms";

pub static QUERY_SKELETON: Skeleton = Skeleton {
    name: "query",
    start: "query",
    pieces: &[
        Piece::Text(
            r#"
WHITESPACE = _{ " " | "\t" | "\r" | "\n" }

query = { SOI ~ set_expr ~ EOI }
set_expr = { operand ~ (set_op ~ operand)* }
set_op = { "," | "|" }
operand = _{ "#,
        ),
        Piece::Slot("operand_head"),
        Piece::Text(" negation | grouped "),
        Piece::Slot("operand_tail"),
        Piece::Text(
            r#" }
negation = { "-" ~ (grouped "#,
        ),
        Piece::Slot("negation_tail"),
        Piece::Text(
            r#") }
grouped = _{ "(" ~ set_expr ~ ")" }

comparison = { feature_sum ~ comparator ~ feature_sum }
comparator = @{ "<=" | ">=" | "==" | "<" | ">" | "=" }
feature_sum = { feature_product ~ (shift_op ~ feature_product)* }
shift_op = @{ "+" | "-" }
feature_product = { feature_power ~ (scale_op ~ feature_power)* }
scale_op = @{ "*" | "/" }
feature_power = { feature_atom ~ (power_op ~ feature_atom)* }
power_op = @{ "^" }
feature_atom = _{ "#,
        ),
        Piece::Slot(FEATURE_ATOMS_SLOT),
        Piece::Text(
            r#" extremum | field | "(" ~ feature_sum ~ ")" | number | string }
extremum = { extremum_name ~ "(" ~ feature_sum ~ ("," ~ feature_sum)* ~ ")" }
extremum_name = @{ "max" | "min" }
field = @{ ("." ~ field_name)+ }
field_name = _{ (ASCII_ALPHA | "_") ~ (ASCII_ALPHANUMERIC | "_")* }
number = @{ "-"? ~ ASCII_DIGIT+ ~ ("." ~ ASCII_DIGIT+)? ~ (^"e" ~ ("+" | "-")? ~ ASCII_DIGIT+)? }
string = ${ "\"" ~ string_body ~ "\"" }
string_body = @{ ("\\" ~ ANY | !("\"" | "\\") ~ ANY)* }
"#,
        ),
        Piece::Slot(VOCABULARY_SLOT),
    ],
    gates: &[
        Gate { slot: "operand_head", capability: Capability::Features, text: "comparison |" },
        Gate { slot: "operand_tail", capability: Capability::Flags, text: "| flag" },
        Gate { slot: "negation_tail", capability: Capability::Flags, text: "| flag" },
    ],
    requires_any: &[Capability::Flags, Capability::Features],
    contracts: &[(Capability::Flags, "flag")],
};

/// What an embedding contributes to the query dialect.
pub trait QueryVocabulary {
    /// Which of flags and features this vocabulary can serve.
    fn capabilities(&self) -> Capabilities;
    fn fragments(&self) -> GrammarFragments;
    /// Resolves a `flag` node into entry ids. Lookups that find nothing
    /// report to `diagnostics` and return no ids rather than failing.
    fn resolve_flag(&self, flag: &ParseNode, _diagnostics: &dyn Diagnostics) -> Result<Vec<String>> {
        Err(QuarryError::Vocabulary(format!("flag '{}' is not supported", flag.text)))
    }
    /// Translates a node produced by one of the vocabulary's own feature
    /// rules. `None` means the rule is not one of ours.
    fn feature(&self, _node: &ParseNode) -> Result<Option<Feature>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Negation(Box<QueryExpr>),
    Intersection(Box<QueryExpr>, Box<QueryExpr>),
    Union(Box<QueryExpr>, Box<QueryExpr>),
    Flag(ParseNode),
    Comparison {
        left: Feature,
        comparator: Comparator,
        right: Feature,
    },
}

pub struct QueryEngine<'d, V: QueryVocabulary> {
    dataset: &'d Dataset,
    vocabulary: V,
    parser: Box<dyn ParserBackend>,
    diagnostics: Arc<dyn Diagnostics>,
    ids: Vec<String>,
    positions: HashMap<String, u32, IdHasher>,
    universe: RoaringBitmap,
}

impl<'d, V: QueryVocabulary> QueryEngine<'d, V> {
    /// Builds an engine offering everything the vocabulary declares.
    pub fn new(dataset: &'d Dataset, vocabulary: V) -> Result<Self> {
        let capabilities = vocabulary.capabilities();
        Self::with_capabilities(dataset, vocabulary, capabilities)
    }
    /// Builds an engine with a narrower profile than the vocabulary offers.
    pub fn with_capabilities(dataset: &'d Dataset, vocabulary: V, capabilities: Capabilities) -> Result<Self> {
        let grammar = Self::grammar(&vocabulary, capabilities)?;
        let parser = Box::new(PestBackend::new(grammar));
        Self::from_parts(dataset, vocabulary, parser)
    }
    pub fn with_settings(dataset: &'d Dataset, vocabulary: V, settings: &QuerySettings) -> Result<Self> {
        let requested = Capabilities::none()
            .with(Capability::Flags, settings.flags)
            .with(Capability::Features, settings.features);
        Self::with_capabilities(dataset, vocabulary, requested)
    }
    /// Composes the query grammar for a vocabulary, for callers that want to
    /// run it on their own [`ParserBackend`].
    pub fn grammar(vocabulary: &V, capabilities: Capabilities) -> Result<ComposedGrammar> {
        let capabilities = capabilities.intersect(vocabulary.capabilities());
        GrammarComposer::new(&QUERY_SKELETON, capabilities)
            .fragments(vocabulary.fragments())
            .compose()
    }
    pub fn from_parts(dataset: &'d Dataset, vocabulary: V, parser: Box<dyn ParserBackend>) -> Result<Self> {
        let count = u32::try_from(dataset.len()).map_err(|_| QuarryError::Config(format!(
            "dataset of {} records exceeds the supported size",
            dataset.len()
        )))?;
        let ids: Vec<String> = dataset.ids().map(str::to_owned).collect();
        let mut positions = HashMap::with_capacity_and_hasher(ids.len(), IdHasher::default());
        for (position, id) in (0u32..).zip(ids.iter()) {
            positions.insert(id.clone(), position);
        }
        let mut universe = RoaringBitmap::new();
        universe.insert_range(0..count);
        info!(records = count, "query engine ready");
        Ok(Self {
            dataset,
            vocabulary,
            parser,
            diagnostics: Arc::new(TracingDiagnostics),
            ids,
            positions,
            universe,
        })
    }
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
    pub fn vocabulary(&self) -> &V {
        &self.vocabulary
    }
    /// Every id the engine was built over.
    pub fn all_ids(&self) -> BTreeSet<String> {
        self.ids.iter().cloned().collect()
    }

    /// Parses a query into its expression tree.
    pub fn parse(&self, query: &str) -> Result<QueryExpr> {
        let nodes = self.parser.parse(query)?;
        let root = nodes
            .iter()
            .find(|n| n.is("query"))
            .ok_or_else(|| malformed("query", "no query node"))?;
        let body = root.child("set_expr").ok_or_else(|| malformed("query", "empty query"))?;
        self.set_expression(body)
    }

    /// Returns the ids of every entry the query selects.
    pub fn evaluate(&self, query: &str) -> Result<BTreeSet<String>> {
        let expression = self.parse(query)?;
        let matches = self.evaluate_expr(&expression)?;
        debug!(%query, matches = matches.len(), "query evaluated");
        Ok(matches.iter().map(|position| self.ids[position as usize].clone()).collect())
    }

    pub fn evaluate_expr(&self, expression: &QueryExpr) -> Result<RoaringBitmap> {
        match expression {
            QueryExpr::Negation(inner) => Ok(&self.universe - &self.evaluate_expr(inner)?),
            QueryExpr::Intersection(left, right) => {
                let mut result = self.evaluate_expr(left)?;
                result &= self.evaluate_expr(right)?;
                Ok(result)
            }
            QueryExpr::Union(left, right) => {
                let mut result = self.evaluate_expr(left)?;
                result |= self.evaluate_expr(right)?;
                Ok(result)
            }
            QueryExpr::Flag(flag) => {
                let ids = self.vocabulary.resolve_flag(flag, self.diagnostics.as_ref())?;
                let mut result = RoaringBitmap::new();
                for id in ids {
                    match self.positions.get(&id) {
                        Some(position) => {
                            result.insert(*position);
                        }
                        None => debug!(%id, flag = %flag.text, "flag resolved to an id outside the dataset"),
                    }
                }
                Ok(result)
            }
            QueryExpr::Comparison { left, comparator, right } => {
                let mut result = RoaringBitmap::new();
                for (position, (id, record)) in (0u32..).zip(self.dataset.iter()) {
                    if compare(left, *comparator, right, record).map_err(|e| QuarryError::Evaluation {
                        id: id.to_owned(),
                        message: e.to_string(),
                    })? {
                        result.insert(position);
                    }
                }
                Ok(result)
            }
        }
    }

    fn set_expression(&self, node: &ParseNode) -> Result<QueryExpr> {
        let mut children = node.children.iter();
        let first = children.next().ok_or_else(|| malformed("set_expr", "no operand"))?;
        let mut expression = self.operand(first)?;
        while let Some(op) = children.next() {
            let operand = children.next().ok_or_else(|| malformed("set_expr", "dangling set operator"))?;
            let right = Box::new(self.operand(operand)?);
            expression = match op.text.as_str() {
                "," => QueryExpr::Intersection(Box::new(expression), right),
                "|" => QueryExpr::Union(Box::new(expression), right),
                other => return Err(malformed("set_op", other)),
            };
        }
        Ok(expression)
    }

    fn operand(&self, node: &ParseNode) -> Result<QueryExpr> {
        match node.rule.as_str() {
            "set_expr" => self.set_expression(node),
            "negation" => Ok(QueryExpr::Negation(Box::new(self.operand(node.only_child()?)?))),
            "flag" => Ok(QueryExpr::Flag(node.clone())),
            "comparison" => match node.children.as_slice() {
                [left, comparator, right] => Ok(QueryExpr::Comparison {
                    left: self.feature(left)?,
                    comparator: Comparator::from_symbol(&comparator.text)
                        .ok_or_else(|| malformed("comparator", &comparator.text))?,
                    right: self.feature(right)?,
                }),
                _ => Err(malformed("comparison", &node.text)),
            },
            other => Err(malformed(other, &node.text)),
        }
    }

    fn feature(&self, node: &ParseNode) -> Result<Feature> {
        match node.rule.as_str() {
            "feature_sum" | "feature_product" | "feature_power" => {
                let mut children = node.children.iter();
                let first = children.next().ok_or_else(|| malformed(&node.rule, "no operand"))?;
                let mut feature = self.feature(first)?;
                while let Some(op) = children.next() {
                    let operand = children.next().ok_or_else(|| malformed(&node.rule, "dangling operator"))?;
                    let op = Operator::from_symbol(&op.text).ok_or_else(|| malformed("operator", &op.text))?;
                    feature = Feature::binary(op, feature, self.feature(operand)?);
                }
                Ok(feature)
            }
            "extremum" => {
                let (name, arguments) = node
                    .children
                    .split_first()
                    .ok_or_else(|| malformed("extremum", &node.text))?;
                let arguments = arguments.iter().map(|a| self.feature(a)).collect::<Result<Vec<_>>>()?;
                match name.text.as_str() {
                    "max" => Ok(Feature::Max(arguments)),
                    "min" => Ok(Feature::Min(arguments)),
                    other => Err(malformed("extremum_name", other)),
                }
            }
            "field" => Ok(Feature::Field(FieldPath::parse(&node.text)?)),
            "number" => node
                .text
                .parse::<f64>()
                .map(Feature::Number)
                .map_err(|e| malformed("number", &format!("{}: {}", node.text, e))),
            "string" => Ok(Feature::Text(unescape(&node.text)?)),
            _ => self
                .vocabulary
                .feature(node)?
                .ok_or_else(|| malformed(&node.rule, "unknown feature rule")),
        }
    }
}

fn compare(left: &Feature, comparator: Comparator, right: &Feature, record: &Value) -> Result<bool> {
    comparator.holds(&left.evaluate(record)?, &right.evaluate(record)?)
}

/// Decodes a double-quoted literal with JSON escapes.
pub fn unescape(quoted: &str) -> Result<String> {
    serde_json::from_str::<String>(quoted).map_err(|e| QuarryError::Parse {
        message: format!("invalid string literal {}: {}", quoted, e),
        line: None,
        col: None,
    })
}

fn malformed(rule: &str, detail: &str) -> QuarryError {
    QuarryError::Parse {
        message: format!("unexpected '{}' node: {}", rule, detail),
        line: None,
        col: None,
    }
}
