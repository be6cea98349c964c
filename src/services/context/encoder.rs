// Context feature encoding.
//
// Fixed layout, 22 features:
//   [0..5)   one-hot mood          (happy, sad, excited, relaxed, neutral)
//   [5..10)  one-hot weather       (sunny, rainy, cloudy, snowy, clear)
//   [10..14) one-hot time of day   (morning, afternoon, evening, night)
//   [14..21) one-hot day of week   (Monday..Sunday)
//   [21]     normalized age
//
// Learned mode prepends the base score, giving 23 regression inputs.

use crate::models::ContextData;

pub const MOODS: [&str; 5] = ["happy", "sad", "excited", "relaxed", "neutral"];
pub const WEATHERS: [&str; 5] = ["sunny", "rainy", "cloudy", "snowy", "clear"];
pub const TIMES_OF_DAY: [&str; 4] = ["morning", "afternoon", "evening", "night"];
pub const DAYS_OF_WEEK: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub const CONTEXT_FEATURES: usize =
    MOODS.len() + WEATHERS.len() + TIMES_OF_DAY.len() + DAYS_OF_WEEK.len() + 1;

const MIN_AGE: f32 = 5.0;
const MAX_AGE: f32 = 100.0;

/// Encode a context record into the fixed feature vector.
/// Missing mood defaults to neutral, missing weather to clear; missing
/// time/day encode as all zeros, missing age as mid-range.
pub fn encode_context(context: &ContextData) -> Vec<f32> {
    let mut features = Vec::with_capacity(CONTEXT_FEATURES);

    one_hot(
        &mut features,
        &MOODS,
        context.mood.as_deref(),
        Some("neutral"),
    );
    one_hot(
        &mut features,
        &WEATHERS,
        context.weather.as_deref(),
        Some("clear"),
    );
    one_hot(&mut features, &TIMES_OF_DAY, context.time_of_day.as_deref(), None);
    one_hot(&mut features, &DAYS_OF_WEEK, context.day_of_week.as_deref(), None);
    features.push(normalize_age(context.age));

    features
}

/// Normalize age to [0,1] over the 5..100 range; unknown age reads as 0.5.
pub fn normalize_age(age: Option<u8>) -> f32 {
    match age {
        Some(age) => ((age as f32 - MIN_AGE) / (MAX_AGE - MIN_AGE)).clamp(0.0, 1.0),
        None => 0.5,
    }
}

fn one_hot(out: &mut Vec<f32>, domain: &[&str], value: Option<&str>, default: Option<&str>) {
    let value = match value {
        Some(v) if domain.iter().any(|d| d.eq_ignore_ascii_case(v)) => Some(v),
        _ => default,
    };
    for entry in domain {
        let hit = value.is_some_and(|v| entry.eq_ignore_ascii_case(v));
        out.push(if hit { 1.0 } else { 0.0 });
    }
}
