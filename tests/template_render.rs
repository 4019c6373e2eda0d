use serde_json::json;
use quarry::dataset::Dataset;
use quarry::template::{PlainDirectives, TemplateEngine};
use quarry::QuarryError;

fn setup() -> TemplateEngine<PlainDirectives> {
    TemplateEngine::new(PlainDirectives).expect("engine builds")
}

#[test]
fn text_without_braces_is_unchanged() {
    let engine = setup();
    let record = json!({"title": "Foo"});
    for template in ["", "plain text", "no } directives ) here", "multi\nline\ttext"] {
        assert_eq!(engine.render(template, &record).expect("render ok"), template);
    }
}

#[test]
fn field_substitution() {
    let engine = setup();
    let record = json!({"title": "Foo", "author": {"name": "Ann"}, "likes": 3, "score": 2.5, "note": null, "done": true});
    assert_eq!(engine.render("Title: {.title}", &record).unwrap(), "Title: Foo");
    assert_eq!(engine.render("{ .title }", &record).unwrap(), "Foo");
    assert_eq!(engine.render("by {.author.name}", &record).unwrap(), "by Ann");
    assert_eq!(engine.render("{.likes} likes, {.score}", &record).unwrap(), "3 likes, 2.5");
    assert_eq!(engine.render("[{.note}]", &record).unwrap(), "[]");
    assert_eq!(engine.render("{.done}", &record).unwrap(), "true");
}

#[test]
fn literals_repeat_and_concatenate() {
    let engine = setup();
    let record = json!({"title": "Foo"});
    assert_eq!(engine.render("{\"ab\" * 3}", &record).unwrap(), "ababab");
    assert_eq!(engine.render("{\"-\" * 0}|", &record).unwrap(), "|");
    assert_eq!(engine.render("{\"<\" .title \">\"}", &record).unwrap(), "<Foo>");
    assert_eq!(engine.render("{\"=\" * 2 .title \"=\" * 2}", &record).unwrap(), "==Foo==");
    assert_eq!(engine.render("{\"tab\\there\"}", &record).unwrap(), "tab\there");
    assert_eq!(engine.render("{\"\"}x", &record).unwrap(), "x");
}

#[test]
fn invalid_directives_stay_literal() {
    let engine = setup();
    let record = json!({"title": "Foo"});
    assert_eq!(engine.render("{unclosed", &record).unwrap(), "{unclosed");
    assert_eq!(engine.render("a {b} c", &record).unwrap(), "a {b} c");
    assert_eq!(engine.render("{}", &record).unwrap(), "{}");
    assert_eq!(engine.render("{.title", &record).unwrap(), "{.title");
    assert_eq!(engine.render("trailing {", &record).unwrap(), "trailing {");
    assert_eq!(engine.render("{{.title}}", &record).unwrap(), "{Foo}");
    assert_eq!(engine.render("{x} then {.title}", &record).unwrap(), "{x} then Foo");
}

#[test]
fn closing_brace_inside_a_literal() {
    let engine = setup();
    let record = json!({"title": "Foo"});
    assert_eq!(engine.render("{\"}\"}", &record).unwrap(), "}");
    assert_eq!(engine.render("{\"a\"} \"}\"", &record).unwrap(), "a \"}\"");
    assert_eq!(engine.render("{\"x\"}   ", &record).unwrap(), "x   ");
}

#[test]
fn missing_field_is_fatal() {
    let engine = setup();
    let record = json!({"title": "Foo"});
    match engine.render("Hi {.missing}", &record) {
        Err(QuarryError::Field { path, .. }) => assert_eq!(path, ".missing"),
        other => panic!("expected a field error, got {other:?}"),
    }
    assert!(matches!(
        engine.render("{.title.more}", &record),
        Err(QuarryError::Field { .. })
    ));
}

#[test]
fn render_entry_reads_from_a_dataset() {
    let engine = setup();
    let dataset = Dataset::from_json(json!({"1": {"title": "Foo"}, "2": {"title": "Bar"}})).unwrap();
    assert_eq!(engine.render_entry("Title: {.title}", &dataset, "2").unwrap(), "Title: Bar");
    assert!(matches!(
        engine.render_entry("{.title}", &dataset, "3"),
        Err(QuarryError::Field { .. })
    ));
}

#[test]
fn consistent_quotes_normalizes_output() {
    let record = json!({"title": "\u{201C}Hi\u{201D} it\u{2019}s"});
    let plain = setup();
    assert_eq!(plain.render("{.title}", &record).unwrap(), "\u{201C}Hi\u{201D} it\u{2019}s");
    let engine = setup().consistent_quotes(true);
    assert_eq!(engine.render("{.title}", &record).unwrap(), "\"Hi\" it's");
    assert_eq!(engine.render("\u{2018}{.title}\u{2019}", &record).unwrap(), "'\"Hi\" it's'");
}

#[test]
fn oversized_repetition_stays_literal() {
    let engine = setup();
    let record = json!({"title": "Foo"});
    for template in ["{\"ab\" * 18446744073709551615}", "{\"ab\" * 1000000000000}", "{\"x\" * 99999999999999999999999}"] {
        assert_eq!(engine.render(template, &record).expect("render ok"), template);
    }
    assert_eq!(engine.render("{\"\" * 18446744073709551615}|", &record).unwrap(), "|");
    assert_eq!(engine.render("{\"ab\" * 4} {.title}", &record).unwrap(), "abababab Foo");
}

#[test]
fn unicode_escapes_in_literals() {
    let engine = setup();
    let record = json!({});
    assert_eq!(engine.render("{\"caf\\u00e9\"}", &record).unwrap(), "caf\u{e9}");
}
