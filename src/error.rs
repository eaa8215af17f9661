use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaybotError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub use crate::Result;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_taxonomy_prefix() {
        let err = DaybotError::Parse("bad HH:MM".to_string());
        assert!(format!("{err}").contains("parse error"));
        let err = DaybotError::Storage("disk".to_string());
        assert!(format!("{err}").contains("storage error"));
    }
}
