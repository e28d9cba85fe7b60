use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("document id {0} is not a version 4 UUID")]
    InvalidId(Uuid),
    #[error("document field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("empty topic")]
    EmptyTopic,
    #[error("too many topics: {count} (max {max})")]
    TooManyTopics { count: usize, max: usize },
    #[error("topic `{topic}` is longer than {max} characters")]
    TopicTooLong { topic: String, max: usize },
    #[error("topic `{0}` may only contain a-z, 0-9, '-' and '_'")]
    InvalidTopicCharacters(String),
    #[error("duplicate document id {0}")]
    DuplicateId(Uuid),
    #[error("a document for {provider} {url} already exists")]
    DuplicateUrl { provider: String, url: String },
    #[error("local path {0} is already used by another document")]
    DuplicateLocalPath(String),
    #[error("no document with id {0}")]
    UnknownId(Uuid),
}
