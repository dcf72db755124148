use serde::Deserialize;
use serde_json::Value;

use crate::utils::slug;

/// Seed file as published by the content team. Documents stay untyped until their
/// ids are filled in, the bookmaker does the real validation.
#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub predictions: Vec<Value>,

    #[serde(default)]
    pub quizzes: Vec<Value>,
}

impl Catalog {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        let mut catalog: Catalog = serde_json::from_str(raw)?;

        for prediction in &mut catalog.predictions {
            fill_id(prediction, &["raceWeekend", "eventName"]);
        }
        for quiz in &mut catalog.quizzes {
            fill_id(quiz, &["title"]);
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.predictions.len() + self.quizzes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Missing or blank ids are derived from the named fields.
fn fill_id(document: &mut Value, fields: &[&str]) {
    let Some(object) = document.as_object_mut() else {
        return;
    };

    let has_id = object
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());

    if has_id {
        return;
    }

    let name = fields
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    let id = slug(&name);
    if !id.is_empty() {
        object.insert("id".to_string(), Value::String(id));
    }
}
