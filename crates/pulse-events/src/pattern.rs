//! AMQP topic-exchange pattern matching.
//!
//! Routing keys are dot-separated words. In a binding pattern `*` matches
//! exactly one word and `#` matches zero or more words.

use crate::EventBusError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    Star,
    Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutingPattern {
    pub fn parse(pattern: &str) -> Result<Self, EventBusError> {
        if pattern.is_empty() {
            return Err(EventBusError::InvalidPattern(pattern.to_string()));
        }

        let mut segments = Vec::new();
        for word in pattern.split('.') {
            let segment = match word {
                "" => return Err(EventBusError::InvalidPattern(pattern.to_string())),
                "*" => Segment::Star,
                "#" => Segment::Hash,
                other => Segment::Word(other.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = routing_key.split('.').collect();
        match_segments(&self.segments, &words)
    }
}

fn match_segments(segments: &[Segment], words: &[&str]) -> bool {
    match segments.split_first() {
        None => words.is_empty(),
        Some((Segment::Hash, rest)) => {
            (0..=words.len()).any(|skip| match_segments(rest, &words[skip..]))
        }
        Some((Segment::Star, rest)) => !words.is_empty() && match_segments(rest, &words[1..]),
        Some((Segment::Word(expected), rest)) => match words.split_first() {
            Some((word, remaining)) => word == expected && match_segments(rest, remaining),
            None => false,
        },
    }
}
