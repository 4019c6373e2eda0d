//! Runtime grammar composition.
//!
//! Each dialect ships a fixed [`Skeleton`]: literal grammar text interleaved
//! with named slots. An embedding fills the slots with [`GrammarFragments`]
//! (its flag syntax, feature vocabulary, custom directives) and selects a
//! [`Capabilities`] profile. The skeleton's gates add the alternatives that
//! hook those fragments into the fixed rules, so a disabled capability never
//! references a rule the embedding did not define.
//!
//! Composition happens once per engine. The composed text is validated as a
//! whole by `pest_meta`; fragments are never checked in isolation.

use std::collections::BTreeMap;
use std::fmt;

use pest_meta::optimizer::OptimizedRule;
use tracing::debug;

use crate::error::{QuarryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Flags,
    Features,
    CustomFields,
    CustomDirectives,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Capability::Flags => "flags",
            Capability::Features => "features",
            Capability::CustomFields => "custom fields",
            Capability::CustomDirectives => "custom directives",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub flags: bool,
    pub features: bool,
    pub custom_fields: bool,
    pub custom_directives: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }
    pub fn all() -> Self {
        Self {
            flags: true,
            features: true,
            custom_fields: true,
            custom_directives: true,
        }
    }
    pub fn with(mut self, capability: Capability, enabled: bool) -> Self {
        match capability {
            Capability::Flags => self.flags = enabled,
            Capability::Features => self.features = enabled,
            Capability::CustomFields => self.custom_fields = enabled,
            Capability::CustomDirectives => self.custom_directives = enabled,
        }
        self
    }
    pub fn enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::Flags => self.flags,
            Capability::Features => self.features,
            Capability::CustomFields => self.custom_fields,
            Capability::CustomDirectives => self.custom_directives,
        }
    }
    /// Only what both profiles enable.
    pub fn intersect(self, other: Capabilities) -> Self {
        Self {
            flags: self.flags && other.flags,
            features: self.features && other.features,
            custom_fields: self.custom_fields && other.custom_fields,
            custom_directives: self.custom_directives && other.custom_directives,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Piece {
    Text(&'static str),
    Slot(&'static str),
}

/// Text emitted into `slot` only while `capability` is enabled.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub slot: &'static str,
    pub capability: Capability,
    pub text: &'static str,
}

#[derive(Debug)]
pub struct Skeleton {
    pub name: &'static str,
    pub start: &'static str,
    pub pieces: &'static [Piece],
    pub gates: &'static [Gate],
    /// At least one of these must be enabled; empty means always usable.
    pub requires_any: &'static [Capability],
    /// Rules the embedding has to define once a capability is enabled.
    pub contracts: &'static [(Capability, &'static str)],
}

impl Skeleton {
    fn has_slot(&self, name: &str) -> bool {
        self.pieces.iter().any(|piece| matches!(piece, Piece::Slot(slot) if *slot == name))
    }
}

/// Embedding-supplied grammar text, registered per slot in insertion order.
#[derive(Debug, Clone, Default)]
pub struct GrammarFragments {
    slots: BTreeMap<String, Vec<String>>,
}

impl GrammarFragments {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, slot: &str, text: &str) -> Self {
        self.insert(slot, text);
        self
    }
    pub fn insert(&mut self, slot: &str, text: &str) {
        self.slots.entry(slot.to_owned()).or_default().push(text.to_owned());
    }
    pub fn get(&self, slot: &str) -> &[String] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }
    fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

pub struct GrammarComposer {
    skeleton: &'static Skeleton,
    capabilities: Capabilities,
    fragments: GrammarFragments,
}

impl GrammarComposer {
    pub fn new(skeleton: &'static Skeleton, capabilities: Capabilities) -> Self {
        Self {
            skeleton,
            capabilities,
            fragments: GrammarFragments::new(),
        }
    }
    pub fn fragments(mut self, fragments: GrammarFragments) -> Self {
        self.fragments = fragments;
        self
    }
    pub fn compose(&self) -> Result<ComposedGrammar> {
        let skeleton = self.skeleton;
        if !skeleton.requires_any.is_empty()
            && !skeleton.requires_any.iter().any(|c| self.capabilities.enabled(*c))
        {
            let wanted: Vec<String> = skeleton.requires_any.iter().map(ToString::to_string).collect();
            return Err(QuarryError::Grammar {
                message: format!("{} grammar needs at least one of: {}", skeleton.name, wanted.join(", ")),
            });
        }
        if let Some(unknown) = self.fragments.slot_names().find(|slot| !skeleton.has_slot(slot)) {
            return Err(QuarryError::Grammar {
                message: format!("{} grammar has no slot named '{}'", skeleton.name, unknown),
            });
        }

        let mut source = String::new();
        for piece in skeleton.pieces {
            match piece {
                Piece::Text(text) => source.push_str(text),
                Piece::Slot(slot) => {
                    for gate in skeleton.gates.iter().filter(|g| g.slot == *slot) {
                        if self.capabilities.enabled(gate.capability) {
                            source.push_str(gate.text);
                        }
                    }
                    for fragment in self.fragments.get(slot) {
                        source.push('\n');
                        source.push_str(fragment);
                        source.push('\n');
                    }
                }
            }
        }

        let (_, rules) = pest_meta::parse_and_optimize(&source).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            QuarryError::Grammar {
                message: format!("composed {} grammar is invalid:\n{}", skeleton.name, messages.join("\n")),
            }
        })?;

        let defines = |name: &str| rules.iter().any(|rule| rule.name == name);
        if !defines(skeleton.start) {
            return Err(QuarryError::Grammar {
                message: format!("{} grammar lacks its start rule '{}'", skeleton.name, skeleton.start),
            });
        }
        for (capability, rule) in skeleton.contracts {
            if self.capabilities.enabled(*capability) && !defines(rule) {
                return Err(QuarryError::Grammar {
                    message: format!("{} enabled but the {} grammar does not define '{}'", capability, skeleton.name, rule),
                });
            }
        }
        debug!(grammar = skeleton.name, rules = rules.len(), "composed grammar");
        Ok(ComposedGrammar {
            name: skeleton.name,
            start: skeleton.start,
            capabilities: self.capabilities,
            source,
            rules,
        })
    }
}

/// A validated grammar ready to be handed to a parser back end.
#[derive(Debug)]
pub struct ComposedGrammar {
    pub name: &'static str,
    pub start: &'static str,
    pub capabilities: Capabilities,
    pub source: String,
    pub rules: Vec<OptimizedRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    static TINY: Skeleton = Skeleton {
        name: "tiny",
        start: "start",
        pieces: &[
            Piece::Text("start = { SOI ~ (word"),
            Piece::Slot("alternative"),
            Piece::Text(") ~ EOI }\nword = @{ ASCII_ALPHA+ }\n"),
            Piece::Slot("vocabulary"),
        ],
        gates: &[Gate { slot: "alternative", capability: Capability::Flags, text: " | flag" }],
        requires_any: &[Capability::Flags, Capability::Features],
        contracts: &[(Capability::Flags, "flag")],
    };

    #[test]
    fn gate_follows_capability() {
        let fragments = GrammarFragments::new().with("vocabulary", "flag = @{ \"#\" ~ ASCII_DIGIT+ }");
        let grammar = GrammarComposer::new(&TINY, Capabilities::none().with(Capability::Flags, true))
            .fragments(fragments)
            .compose()
            .unwrap();
        assert!(grammar.source.contains("| flag"));

        let grammar = GrammarComposer::new(&TINY, Capabilities::none().with(Capability::Features, true))
            .compose()
            .unwrap();
        assert!(!grammar.source.contains("| flag"));
    }

    #[test]
    fn nothing_enabled_is_rejected() {
        assert!(GrammarComposer::new(&TINY, Capabilities::none()).compose().is_err());
    }

    #[test]
    fn missing_contract_rule_is_rejected() {
        // the gate references `flag`, which no fragment defines
        let result = GrammarComposer::new(&TINY, Capabilities::all()).compose();
        assert!(matches!(result, Err(QuarryError::Grammar { .. })));
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let fragments = GrammarFragments::new().with("nowhere", "x = { \"x\" }");
        let result = GrammarComposer::new(&TINY, Capabilities::all()).fragments(fragments).compose();
        assert!(result.is_err());
    }
}
