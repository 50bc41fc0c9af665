//! Raw scraper items to typed upserts.
//!
//! Actor output is loosely typed: ids may be numbers or strings, timestamps
//! ISO-8601 strings or epoch seconds, and `replies` either a count or the
//! reply objects themselves.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use canvass_common::types::{CommentUpsert, MediaType, PostUpsert};

pub fn map_post(item: &Value, candidate_id: Uuid, run_id: Uuid) -> PostUpsert {
    PostUpsert {
        candidate_id,
        scraping_run_id: run_id,
        instagram_id: id_string(item.get("id")),
        url: str_field(item, "url")
            .or_else(|| str_field(item, "postUrl"))
            .unwrap_or_default(),
        shortcode: str_field(item, "shortCode"),
        caption: str_field(item, "caption"),
        like_count: int_field(item, "likesCount"),
        comment_count: int_field(item, "commentsCount"),
        media_type: item
            .get("type")
            .and_then(Value::as_str)
            .map(MediaType::from_str_loose)
            .unwrap_or(MediaType::Unknown),
        is_sponsored: item.get("isSponsored").and_then(Value::as_bool).unwrap_or(false),
        video_view_count: item.get("videoViewCount").and_then(as_i64),
        posted_at: item.get("timestamp").and_then(parse_timestamp),
        raw_data: item.clone(),
    }
}

pub fn map_comment(item: &Value, post_id: Uuid, run_id: Uuid) -> CommentUpsert {
    let reply_count = match item.get("replies") {
        Some(Value::Array(replies)) => replies.len() as i64,
        Some(other) => as_i64(other).unwrap_or(0),
        None => 0,
    };

    CommentUpsert {
        post_id,
        scraping_run_id: run_id,
        instagram_id: id_string(item.get("id")),
        text: str_field(item, "text").unwrap_or_default(),
        author_username: str_field(item, "ownerUsername"),
        like_count: int_field(item, "likesCount"),
        reply_count,
        commented_at: item.get("timestamp").and_then(parse_timestamp),
        raw_data: item.clone(),
    }
}

/// ISO-8601 (with or without offset, assumed UTC when absent) or epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) if !s.is_empty() => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if secs == 0.0 {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            DateTime::from_timestamp(whole, nanos)
        }
        _ => None,
    }
}

fn str_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_field(item: &Value, key: &str) -> i64 {
    item.get(key).and_then(as_i64).unwrap_or(0)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
