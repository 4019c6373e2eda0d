use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use quarry::dataset::Dataset;
use quarry::query::QueryEngine;
use quarry::template::{PlainDirectives, TemplateEngine};
use quarry::vocabulary::{StoryVocabulary, TagIndex};

const GENRES: [&str; 6] = ["Comedy", "Sad", "Romance", "Adventure", "Horror", "Slice of Life"];

fn story(n: u64) -> Value {
    let genre = GENRES[(n % GENRES.len() as u64) as usize];
    let chapters: Vec<Value> = (0..(n % 7)).map(|c| json!({"title": format!("Chapter {}", c + 1)})).collect();
    json!({
        "id": n,
        "title": format!("Story {}", n),
        "num_likes": n % 113,
        "num_dislikes": n % 17,
        "num_words": (n * 7919) % 250_000,
        "completion_status": if n % 3 == 0 { "complete" } else { "incomplete" },
        "tags": [
            {"id": n % GENRES.len() as u64, "name": genre, "type": "Genre"},
            {"id": 100 + n % 40, "name": format!("Character {}", n % 40), "type": "Character"}
        ],
        "chapters": chapters
    })
}

fn stories(count: u64) -> Dataset {
    Dataset::from_records((0..count).map(|n| (n.to_string(), story(n))))
}

pub fn criterion_benchmark(c: &mut Criterion) {
    for count in [1_000u64, 100_000] {
        let dataset = stories(count);
        let engine = QueryEngine::new(&dataset, StoryVocabulary::new(TagIndex::build(&dataset))).unwrap();
        c.bench_function(&format!("flags {}", count), |b| {
            b.iter(|| engine.evaluate(black_box("genre:com | sad, -(character 3)")).unwrap())
        });
        c.bench_function(&format!("features {}", count), |b| {
            b.iter(|| engine.evaluate(black_box(".ratio > 2, .wordcount >= 1000")).unwrap())
        });
    }

    let templates = TemplateEngine::new(PlainDirectives).unwrap();
    let record = story(6);
    c.bench_function("render fields", |b| {
        b.iter(|| templates.render(black_box("Title: {.title} ({.num_likes} likes) {\"-\" * 10}"), &record).unwrap())
    });
    c.bench_function("render join", |b| {
        b.iter(|| templates.render(black_box("{join \"* \" .chapters.title with \"\\n\"}"), &record).unwrap())
    });
    c.bench_function("render literal braces", |b| {
        b.iter(|| templates.render(black_box("{ not {a directive} {{ at all"), &record).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
