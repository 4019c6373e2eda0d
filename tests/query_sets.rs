mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use quarry::dataset::Dataset;
use quarry::diagnostics::{CollectedDiagnostics, Diagnostic};
use quarry::query::QueryEngine;
use quarry::vocabulary::{StoryVocabulary, TagIndex, TagVocabulary};
use quarry::QuarryError;

use common::{ids, stories};

fn setup(dataset: &Dataset) -> (QueryEngine<'_, StoryVocabulary>, Arc<CollectedDiagnostics>) {
    let sink = Arc::new(CollectedDiagnostics::new());
    let engine = QueryEngine::new(dataset, StoryVocabulary::new(TagIndex::build(dataset)))
        .expect("engine builds")
        .with_diagnostics(sink.clone());
    (engine, sink)
}

#[test]
fn category_pattern_from_single_record() {
    let dataset = Dataset::from_json(json!({"1": {"tags": [{"id": 5, "name": "comedy", "type": "genre"}]}})).unwrap();
    let (engine, sink) = setup(&dataset);
    assert_eq!(engine.evaluate("genre:com").expect("query ok"), ids(&["1"]));
    assert!(sink.is_empty());
}

#[test]
fn bare_and_quoted_patterns() {
    let dataset = stories();
    let (engine, _) = setup(&dataset);
    assert_eq!(engine.evaluate("comedy").unwrap(), ids(&["1", "3"]));
    assert_eq!(engine.evaluate("COMEDY").unwrap(), ids(&["1", "3"]));
    assert_eq!(engine.evaluate("twilight spark").unwrap(), ids(&["1", "2"]));
    assert_eq!(engine.evaluate("character:\"Twilight Sparkle\"").unwrap(), ids(&["1", "2"]));
    assert_eq!(engine.evaluate("Genre:rom").unwrap(), ids(&["3"]));
}

#[test]
fn negation_is_complement_of_universe() {
    let dataset = stories();
    let (engine, _) = setup(&dataset);
    let queries = ["comedy", "sad", "comedy | sad", "genre:com, twilight", ".likes > 10", "-(romance)"];
    for query in queries {
        let selected = engine.evaluate(query).expect("query ok");
        let negated = engine.evaluate(&format!("-({})", query)).expect("negation ok");
        let expected: BTreeSet<String> = engine.all_ids().difference(&selected).cloned().collect();
        assert_eq!(negated, expected, "negation of {query}");
    }
}

#[test]
fn negation_shorthand_on_flags() {
    let dataset = stories();
    let (engine, _) = setup(&dataset);
    assert_eq!(engine.evaluate("-comedy").unwrap(), ids(&["2", "4"]));
    assert_eq!(engine.evaluate("-comedy").unwrap(), engine.evaluate("-(comedy)").unwrap());
}

#[test]
fn intersection_and_union_follow_set_algebra() {
    let dataset = stories();
    let (engine, _) = setup(&dataset);
    let terms = ["comedy", "sad", "twilight", ".wordcount > 1000"];
    for a in terms {
        let left = engine.evaluate(a).unwrap();
        for b in terms {
            let right = engine.evaluate(b).unwrap();
            let both = engine.evaluate(&format!("{a}, {b}")).unwrap();
            let either = engine.evaluate(&format!("{a} | {b}")).unwrap();
            let intersection: BTreeSet<String> = left.intersection(&right).cloned().collect();
            let union: BTreeSet<String> = left.union(&right).cloned().collect();
            assert_eq!(both, intersection, "{a} , {b}");
            assert_eq!(either, union, "{a} | {b}");
            assert_eq!(both, engine.evaluate(&format!("{b}, {a}")).unwrap());
            assert_eq!(either, engine.evaluate(&format!("{b} | {a}")).unwrap());
        }
    }
    assert_eq!(
        engine.evaluate("(comedy, twilight), romance").unwrap(),
        engine.evaluate("comedy, (twilight, romance)").unwrap()
    );
    assert_eq!(
        engine.evaluate("(comedy | sad) | romance").unwrap(),
        engine.evaluate("comedy | (sad | romance)").unwrap()
    );
}

#[test]
fn mixed_operators_chain_left_to_right() {
    let dataset = stories();
    let (engine, _) = setup(&dataset);
    assert_eq!(engine.evaluate("comedy | sad, twilight").unwrap(), ids(&["1", "2"]));
    assert_eq!(engine.evaluate("comedy | (sad, twilight)").unwrap(), ids(&["1", "2", "3"]));
}

#[test]
fn unmatched_pattern_warns_once_and_selects_nothing() {
    let dataset = stories();
    let (engine, sink) = setup(&dataset);
    assert!(engine.evaluate("nonexistent").expect("never raises").is_empty());
    assert_eq!(sink.take(), vec![Diagnostic::UnmatchedPattern { term: "nonexistent".into() }]);

    assert!(engine.evaluate("genre:twilight").unwrap().is_empty());
    assert_eq!(sink.take(), vec![Diagnostic::UnmatchedPattern { term: "genre:twilight".into() }]);
}

#[test]
fn unknown_category_warns_and_degrades() {
    let dataset = stories();
    let (engine, sink) = setup(&dataset);
    // "series" is part of the syntax but no story carries a series tag
    assert_eq!(engine.evaluate("series:foo | sad").unwrap(), ids(&["2"]));
    let diagnostics = sink.take();
    assert_eq!(diagnostics.len(), 1);
    match &diagnostics[0] {
        Diagnostic::UnknownCategory { category, known } => {
            assert_eq!(category, "series");
            assert_eq!(known, &vec!["character".to_string(), "genre".to_string()]);
        }
        other => panic!("unexpected diagnostic {other:?}"),
    }
}

#[test]
fn malformed_query_is_a_parse_error() {
    let dataset = stories();
    let (engine, _) = setup(&dataset);
    for query in ["comedy,,", "(comedy", "-", "", "bogus:thing"] {
        let err = engine.evaluate(query).unwrap_err();
        assert!(matches!(err, QuarryError::Parse { .. }), "{query} gave {err}");
    }
}

#[test]
fn universe_is_fixed_at_construction() {
    let mut dataset = stories();
    let (engine, _) = setup(&dataset);
    assert_eq!(engine.evaluate("-(comedy)").unwrap(), ids(&["2", "4"]));
    drop(engine);
    dataset.insert("5", json!({"tags": []}));
    let (engine, _) = setup(&dataset);
    assert_eq!(engine.evaluate("-(comedy)").unwrap(), ids(&["2", "4", "5"]));
}

#[test]
fn tag_queries_select_tag_ids() {
    let dataset = stories();
    let index = TagIndex::build(&dataset);
    let tags = index.tag_dataset();
    let engine = QueryEngine::new(&tags, TagVocabulary::new(index.clone())).expect("engine builds");
    assert_eq!(engine.evaluate("genre:a").unwrap(), ids(&["6", "8"]));
    assert_eq!(engine.evaluate(".name = \"Comedy\"").unwrap(), ids(&["5"]));
    assert_eq!(engine.evaluate("-(genre:a)").unwrap(), ids(&["5", "7"]));
}

#[test]
fn non_ascii_patterns_match_tag_names() {
    let dataset = Dataset::from_json(json!({
        "1": {"tags": [{"id": 1, "name": "Pok\u{e9}mon", "type": "Series"}]},
        "2": {"tags": [{"id": 2, "name": "Digimon", "type": "Series"}]}
    }))
    .unwrap();
    let (engine, sink) = setup(&dataset);
    assert_eq!(engine.evaluate("series:pok\u{e9}mon").expect("query ok"), ids(&["1"]));
    assert_eq!(engine.evaluate("\u{e9}mon").expect("query ok"), ids(&["1"]));
    assert_eq!(engine.evaluate("POK\u{c9}MON | digi").expect("query ok"), ids(&["1", "2"]));
    assert!(sink.is_empty());

    assert!(engine.evaluate("\u{fc}ber").expect("query ok").is_empty());
    assert_eq!(sink.take(), vec![Diagnostic::UnmatchedPattern { term: "\u{fc}ber".into() }]);
}
