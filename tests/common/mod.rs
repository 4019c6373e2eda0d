#![allow(dead_code)]

use serde_json::json;
use quarry::dataset::Dataset;

pub fn stories() -> Dataset {
    Dataset::from_json(json!({
        "1": {
            "id": 1, "title": "Alpha", "num_likes": 40, "num_dislikes": 2,
            "num_words": 5200, "completion_status": "complete",
            "tags": [
                {"id": 5, "name": "Comedy", "type": "Genre"},
                {"id": 7, "name": "Twilight Sparkle", "type": "Character"}
            ]
        },
        "2": {
            "id": 2, "title": "Beta", "num_likes": 3, "num_dislikes": 9,
            "num_words": 800, "completion_status": "incomplete",
            "tags": [
                {"id": 6, "name": "Sad", "type": "Genre"},
                {"id": 7, "name": "Twilight Sparkle", "type": "Character"}
            ]
        },
        "3": {
            "id": 3, "title": "Gamma", "num_likes": 12, "num_dislikes": 0,
            "num_words": 15000, "completion_status": "complete",
            "tags": [
                {"id": 5, "name": "Comedy", "type": "Genre"},
                {"id": 8, "name": "Romance", "type": "Genre"}
            ]
        },
        "4": {
            "id": 4, "title": "Delta", "num_likes": 0, "num_dislikes": 0,
            "num_words": 100, "completion_status": "hiatus",
            "tags": []
        }
    }))
    .unwrap()
}

pub fn ids(list: &[&str]) -> std::collections::BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}
