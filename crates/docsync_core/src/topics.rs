use crate::ValidationError;

pub const MAX_TOPICS: usize = 20;
pub const MAX_TOPIC_LEN: usize = 50;

/// Lowercase and validate a topic list.
///
/// Entries are trimmed and lowercased, repeated entries collapse onto their first
/// occurrence, and the first entry violating the count, length, or character rules
/// is reported.
pub fn normalize_topics<I, S>(topics: I) -> Result<Vec<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for raw in topics {
        let topic = raw.as_ref().trim().to_lowercase();
        validate_topic(&topic)?;
        if !normalized.contains(&topic) {
            normalized.push(topic);
        }
    }
    if normalized.len() > MAX_TOPICS {
        return Err(ValidationError::TooManyTopics {
            count: normalized.len(),
            max: MAX_TOPICS,
        });
    }
    Ok(normalized)
}

/// Lenient conversion of a free-form keyword string (e.g. a `<meta name="keywords">`
/// value) into topics. Inner whitespace becomes `-`, entries that still fail
/// validation are dropped, and the result is capped at [`MAX_TOPICS`].
pub fn topics_from_keywords(raw: &str) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for keyword in raw.split(&[',', ';'][..]) {
        let candidate = keyword
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();
        if validate_topic(&candidate).is_ok() && !topics.contains(&candidate) {
            topics.push(candidate);
        }
        if topics.len() == MAX_TOPICS {
            break;
        }
    }
    topics
}

fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    if topic.chars().count() > MAX_TOPIC_LEN {
        return Err(ValidationError::TopicTooLong {
            topic: topic.to_string(),
            max: MAX_TOPIC_LEN,
        });
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_';
    if !topic.chars().all(allowed) {
        return Err(ValidationError::InvalidTopicCharacters(topic.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_topic;

    #[test]
    fn topic_at_length_limit_is_valid() {
        assert!(validate_topic(&"a".repeat(50)).is_ok());
        assert!(validate_topic(&"a".repeat(51)).is_err());
    }

    #[test]
    fn uppercase_is_rejected_before_normalization() {
        assert!(validate_topic("Rust").is_err());
        assert!(validate_topic("rust_2021-ed").is_ok());
    }
}
