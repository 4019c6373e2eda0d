//! A reference embedding for an archive of tagged stories.
//!
//! Story records look like
//!
//! ```text
//! {"id": 17, "title": "...", "num_likes": 40, "num_dislikes": 2, "num_words": 5200,
//!  "completion_status": "complete",
//!  "tags": [{"id": 5, "name": "Comedy", "type": "Genre"}],
//!  "chapters": [{"title": "..."}]}
//! ```
//!
//! Flags are tag-name patterns, optionally restricted to a tag type:
//! `comedy`, `genre:com`, `character:"Twilight Sparkle"`. A pattern matches
//! every tag whose lowercased name contains it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::dataset::Dataset;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{QuarryError, Result};
use crate::feature::{Feature, Operator};
use crate::grammar::{Capabilities, GrammarFragments};
use crate::parse::ParseNode;
use crate::path::{render_value, FieldPath, IndexAssignment, RequirementSet};
use crate::query::{self, QueryVocabulary};
use crate::template::{self, CustomGenerator, Generated, Generator, TemplateVocabulary};
use crate::IdHasher;

pub const CATEGORIES: [&str; 5] = ["character", "genre", "series", "content", "warning"];

const FLAG_RULES: &str = r#"
flag = { category ~ ":" ~ pattern | pattern }
category = @{ ^"character" | ^"genre" | ^"series" | ^"content" | ^"warning" }
pattern = _{ quoted_pattern | bare_pattern }
bare_pattern = @{ (ALPHABETIC | NUMBER | "_") ~ (ALPHABETIC | NUMBER | "_" | " ")* }
quoted_pattern = ${ "\"" ~ quoted_body ~ "\"" }
quoted_body = @{ ("\\" ~ ANY | !("\"" | "\\") ~ ANY)* }
"#;

const STORY_FEATURE_RULES: &str = r#"
story_feature = @{ (".ratio" | ".status" | ".likes" | ".dislikes" | ".wordcount") ~ !(ASCII_ALPHANUMERIC | "_" | ".") }
"#;

const CHAPTER_TEXT_RULES: &str = r#"
custom_field = { chapter_text }
chapter_text = @{ "chapter_text" ~ !(ASCII_ALPHANUMERIC | "_") }
"#;

type TagId = String;

/// Tag lookups built from the `tags` lists of a story dataset.
#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    // tag type -> tag id -> lowercased name
    by_type: BTreeMap<String, BTreeMap<TagId, String>>,
    // lowercased name -> tag ids
    by_name: BTreeMap<String, BTreeSet<TagId>>,
    entries_by_tag: HashMap<TagId, BTreeSet<String>, IdHasher>,
    tags: BTreeMap<TagId, Value>,
}

impl TagIndex {
    pub fn build(stories: &Dataset) -> Self {
        let mut index = Self::default();
        for (story_id, story) in stories.iter() {
            let Some(Value::Array(tags)) = story.get("tags") else {
                continue;
            };
            for tag in tags {
                let (Some(id), Some(Value::String(name)), Some(Value::String(kind))) =
                    (tag.get("id"), tag.get("name"), tag.get("type"))
                else {
                    debug!(%story_id, %tag, "skipping malformed tag");
                    continue;
                };
                let tag_id = render_value(id);
                let name = name.to_lowercase();
                index
                    .by_type
                    .entry(kind.to_lowercase())
                    .or_default()
                    .insert(tag_id.clone(), name.clone());
                index.by_name.entry(name).or_default().insert(tag_id.clone());
                index
                    .entries_by_tag
                    .entry(tag_id.clone())
                    .or_default()
                    .insert(story_id.to_owned());
                index.tags.insert(tag_id, tag.clone());
            }
        }
        debug!(tags = index.tags.len(), types = index.by_type.len(), "tag index built");
        index
    }
    /// Tag types seen in the data, lowercased.
    pub fn categories(&self) -> Vec<String> {
        self.by_type.keys().cloned().collect()
    }
    /// A dataset of the tags themselves, keyed by tag id.
    pub fn tag_dataset(&self) -> Dataset {
        Dataset::from_records(self.tags.iter().map(|(id, tag)| (id.clone(), tag.clone())))
    }
    pub fn entries_with(&self, tag: &str) -> impl Iterator<Item = &String> {
        self.entries_by_tag.get(tag).into_iter().flatten()
    }

    /// Resolves a `flag` node to tag ids, reporting unknown categories and
    /// patterns that match no tag name.
    fn flag_tags(&self, flag: &ParseNode, diagnostics: &dyn Diagnostics) -> Result<BTreeSet<TagId>> {
        let (category, pattern) = match flag.children.as_slice() {
            [category, pattern] => (Some(category.text.to_lowercase()), pattern_text(pattern)?),
            [pattern] => (None, pattern_text(pattern)?),
            _ => {
                return Err(QuarryError::Vocabulary(format!("malformed flag '{}'", flag.text)));
            }
        };
        let pattern = pattern.to_lowercase();
        let Some(category) = category else {
            let found: BTreeSet<TagId> = self
                .by_name
                .iter()
                .filter(|(name, _)| name.contains(&pattern))
                .flat_map(|(_, ids)| ids.iter().cloned())
                .collect();
            if found.is_empty() {
                diagnostics.report(Diagnostic::UnmatchedPattern { term: pattern });
            }
            return Ok(found);
        };
        let Some(bucket) = self.by_type.get(&category) else {
            diagnostics.report(Diagnostic::UnknownCategory {
                category,
                known: self.categories(),
            });
            return Ok(BTreeSet::new());
        };
        let found: BTreeSet<TagId> = bucket
            .iter()
            .filter(|(_, name)| name.contains(&pattern))
            .map(|(id, _)| id.clone())
            .collect();
        if found.is_empty() {
            diagnostics.report(Diagnostic::UnmatchedPattern {
                term: format!("{}:{}", category, pattern),
            });
        }
        Ok(found)
    }
}

fn pattern_text(node: &ParseNode) -> Result<String> {
    match node.rule.as_str() {
        "bare_pattern" => Ok(node.text.trim().to_owned()),
        "quoted_pattern" => query::unescape(&node.text),
        other => Err(QuarryError::Vocabulary(format!("unexpected pattern node '{}'", other))),
    }
}

fn flag_fragments() -> GrammarFragments {
    GrammarFragments::new().with(query::VOCABULARY_SLOT, FLAG_RULES)
}

fn both() -> Capabilities {
    Capabilities {
        flags: true,
        features: true,
        ..Capabilities::none()
    }
}

/// Queries over stories: flags select stories carrying a matching tag.
#[derive(Debug, Clone)]
pub struct StoryVocabulary {
    index: TagIndex,
}

impl StoryVocabulary {
    pub fn new(index: TagIndex) -> Self {
        Self { index }
    }
    pub fn index(&self) -> &TagIndex {
        &self.index
    }
}

impl QueryVocabulary for StoryVocabulary {
    fn capabilities(&self) -> Capabilities {
        both()
    }
    fn fragments(&self) -> GrammarFragments {
        flag_fragments()
            .with(query::VOCABULARY_SLOT, STORY_FEATURE_RULES)
            .with(query::FEATURE_ATOMS_SLOT, "story_feature |")
    }
    fn resolve_flag(&self, flag: &ParseNode, diagnostics: &dyn Diagnostics) -> Result<Vec<String>> {
        let tags = self.index.flag_tags(flag, diagnostics)?;
        let stories: BTreeSet<&String> = tags.iter().flat_map(|tag| self.index.entries_with(tag)).collect();
        Ok(stories.into_iter().cloned().collect())
    }
    fn feature(&self, node: &ParseNode) -> Result<Option<Feature>> {
        if !node.is("story_feature") {
            return Ok(None);
        }
        let feature = match node.text.as_str() {
            ".ratio" => {
                let floor = |path: &str| -> Result<Feature> {
                    Ok(Feature::Max(vec![Feature::field(path)?, Feature::Number(0.5)]))
                };
                Feature::binary(Operator::Divide, floor(".num_likes")?, floor(".num_dislikes")?)
            }
            ".status" => Feature::field(".completion_status")?,
            ".likes" => Feature::field(".num_likes")?,
            ".dislikes" => Feature::field(".num_dislikes")?,
            ".wordcount" => Feature::field(".num_words")?,
            other => return Err(QuarryError::Vocabulary(format!("unknown story feature '{}'", other))),
        };
        Ok(Some(feature))
    }
}

/// Queries over the tags themselves: flags select tag ids.
#[derive(Debug, Clone)]
pub struct TagVocabulary {
    index: TagIndex,
}

impl TagVocabulary {
    pub fn new(index: TagIndex) -> Self {
        Self { index }
    }
}

impl QueryVocabulary for TagVocabulary {
    fn capabilities(&self) -> Capabilities {
        both()
    }
    fn fragments(&self) -> GrammarFragments {
        flag_fragments()
    }
    fn resolve_flag(&self, flag: &ParseNode, diagnostics: &dyn Diagnostics) -> Result<Vec<String>> {
        Ok(self.index.flag_tags(flag, diagnostics)?.into_iter().collect())
    }
}

/// Source of chapter text, indexed by story id and chapter position.
pub trait ChapterSource {
    fn chapter(&self, story_id: &str, index: usize) -> Result<String>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryChapters {
    stories: HashMap<String, Vec<String>, IdHasher>,
}

impl InMemoryChapters {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, story_id: impl Into<String>, chapters: Vec<String>) {
        self.stories.insert(story_id.into(), chapters);
    }
}

impl ChapterSource for InMemoryChapters {
    fn chapter(&self, story_id: &str, index: usize) -> Result<String> {
        self.stories
            .get(story_id)
            .and_then(|chapters| chapters.get(index))
            .cloned()
            .ok_or_else(|| QuarryError::Vocabulary(format!("no text for chapter {} of story {}", index, story_id)))
    }
}

/// Adds `chapter_text` to directives: inside a join over `.chapters` it
/// yields the text of the current chapter.
#[derive(Clone)]
pub struct StoryTemplateVocabulary {
    chapters: Arc<dyn ChapterSource>,
}

impl StoryTemplateVocabulary {
    pub fn new(chapters: Arc<dyn ChapterSource>) -> Self {
        Self { chapters }
    }
}

impl TemplateVocabulary for StoryTemplateVocabulary {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            custom_fields: true,
            ..Capabilities::none()
        }
    }
    fn fragments(&self) -> GrammarFragments {
        GrammarFragments::new().with(template::VOCABULARY_SLOT, CHAPTER_TEXT_RULES)
    }
    fn custom_field(&self, node: &ParseNode, record: &Value) -> Result<Generated> {
        let field = node.only_child()?;
        if !field.is("chapter_text") {
            return Err(QuarryError::Vocabulary(format!("unknown custom field '{}'", field.text)));
        }
        let story_id = render_value(FieldPath::parse(".id")?.resolve(record, &IndexAssignment::new())?);
        let mut requirements = RequirementSet::new();
        requirements.insert(FieldPath::parse(".chapters.text")?);
        Ok(Generated {
            generator: Generator::Custom(Arc::new(ChapterText {
                chapters: Arc::clone(&self.chapters),
                story_id,
                boundary: FieldPath::parse(".chapters")?,
            })),
            requirements,
        })
    }
}

struct ChapterText {
    chapters: Arc<dyn ChapterSource>,
    story_id: String,
    boundary: FieldPath,
}

impl fmt::Debug for ChapterText {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ChapterText({}{})", self.story_id, self.boundary)
    }
}

impl CustomGenerator for ChapterText {
    fn generate(&self, _record: &Value, indexes: &IndexAssignment) -> Result<String> {
        let index = indexes.get(self.boundary.segments()).ok_or_else(|| QuarryError::Iteration {
            message: format!("chapter_text is only available inside a join over {}", self.boundary),
        })?;
        self.chapters.chapter(&self.story_id, index)
    }
}
