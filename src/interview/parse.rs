use serde_json::Value;

use super::{Interview, Question, DEFAULT_TIME_LIMIT_SECS};
use crate::error::{AppError, AppResult};

/// Maps a backend interviews response into an [`Interview`].
///
/// The endpoint may return either a bare object or an array of rows (first
/// row wins). Question entries may be plain strings or `{ text, timeLimit }`
/// objects; per-question limits resolve `time_limits[i]`, then
/// `timeLimits[i]`, then the question's own `timeLimit`, then the default.
pub fn interview_from_rows(endpoint: &str, value: Value) -> AppResult<Interview> {
    let item = match value {
        Value::Array(rows) => rows.into_iter().next(),
        v @ Value::Object(_) => Some(v),
        _ => None,
    }
    .ok_or_else(|| AppError::validation(endpoint, "interview not found"))?;

    let interview_id = scalar_string(&item["id"])
        .ok_or_else(|| AppError::validation(endpoint, "interview row has no id"))?;

    let title = item["title"]
        .as_str()
        .filter(|t| !t.is_empty())
        .unwrap_or("Interview")
        .to_string();

    let snake_limits = item["time_limits"].clone();
    let camel_limits = item["timeLimits"].clone();

    let questions = item["questions"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            let text = match &q {
                Value::String(s) => s.clone(),
                other => other["text"].as_str().unwrap_or_default().to_string(),
            };
            let time_limit = limit_at(&snake_limits, i)
                .or_else(|| limit_at(&camel_limits, i))
                .or_else(|| q["timeLimit"].as_u64().map(|v| v as u32))
                .unwrap_or(DEFAULT_TIME_LIMIT_SECS);
            Question {
                id: format!("q{}", i + 1),
                text,
                time_limit,
            }
        })
        .collect();

    Ok(Interview {
        interview_id,
        title,
        questions,
    })
}

fn limit_at(limits: &Value, i: usize) -> Option<u32> {
    limits.as_array()?.get(i)?.as_u64().map(|v| v as u32)
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
