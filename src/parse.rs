//! Parser back ends.
//!
//! Engines only ever see [`ParseNode`] trees, so the parsing strategy stays
//! swappable behind [`ParserBackend`]. The provided back end runs a composed
//! grammar on the pest VM.

use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::Pair;
use pest_vm::Vm;
use tracing::trace;

use crate::error::{QuarryError, Result};
use crate::grammar::ComposedGrammar;

/// An owned, back-end neutral parse tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNode {
    pub rule: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    pub fn is(&self, rule: &str) -> bool {
        self.rule == rule
    }
    pub fn child(&self, rule: &str) -> Option<&ParseNode> {
        self.children.iter().find(|c| c.rule == rule)
    }
    /// The single child of a wrapper node.
    pub fn only_child(&self) -> Result<&ParseNode> {
        match self.children.as_slice() {
            [child] => Ok(child),
            _ => Err(QuarryError::Parse {
                message: format!("'{}' should wrap exactly one node, found {}", self.rule, self.children.len()),
                line: None,
                col: None,
            }),
        }
    }
}

pub trait ParserBackend {
    /// Parses `input` from the grammar's start rule and returns the
    /// top-level nodes it produced.
    fn parse(&self, input: &str) -> Result<Vec<ParseNode>>;
}

pub struct PestBackend {
    name: &'static str,
    start: &'static str,
    vm: Vm,
}

impl PestBackend {
    pub fn new(grammar: ComposedGrammar) -> Self {
        Self {
            name: grammar.name,
            start: grammar.start,
            vm: Vm::new(grammar.rules),
        }
    }
}

impl ParserBackend for PestBackend {
    fn parse(&self, input: &str) -> Result<Vec<ParseNode>> {
        let pairs = self.vm.parse(self.start, input).map_err(|e| parse_error(&e))?;
        let nodes: Vec<ParseNode> = pairs.map(into_node).collect();
        trace!(grammar = self.name, nodes = nodes.len(), "parsed");
        Ok(nodes)
    }
}

fn into_node(pair: Pair<&str>) -> ParseNode {
    let span = pair.as_span();
    ParseNode {
        rule: pair.as_rule().to_owned(),
        text: pair.as_str().to_owned(),
        start: span.start(),
        end: span.end(),
        children: pair.into_inner().map(into_node).collect(),
    }
}

fn parse_error<R: pest::RuleType>(e: &PestError<R>) -> QuarryError {
    let (line, col) = match e.line_col {
        LineColLocation::Pos((line, col)) => (line, col),
        LineColLocation::Span((line, col), _) => (line, col),
    };
    QuarryError::Parse {
        message: e.to_string(),
        line: Some(line),
        col: Some(col),
    }
}
