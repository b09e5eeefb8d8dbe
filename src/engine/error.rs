/// Why a start time / duration pair could not be placed on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unrecognized(String),
    InvalidDuration(i64),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Unrecognized(text) => write!(f, "unrecognized time: {text:?}"),
            ParseError::InvalidDuration(minutes) => {
                write!(f, "invalid duration: {minutes} minutes")
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    UnknownCategory(String),
    DuplicateCategory(String),
    InvalidQuantity(u32),
    Parse(ParseError),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnknownCategory(id) => write!(f, "unknown category: {id}"),
            EngineError::DuplicateCategory(id) => write!(f, "duplicate category: {id}"),
            EngineError::InvalidQuantity(q) => write!(f, "invalid quantity: {q}"),
            EngineError::Parse(e) => write!(f, "parse error: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        EngineError::Parse(e)
    }
}
