use serde::{Deserialize, Serialize};

/// A single analyzed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The term text after normalization.
    pub text: String,
    /// Sequential position of the token within its field.
    pub position: u32,
    /// Byte offset of the token start in the normalized text.
    pub start_offset: usize,
    /// Byte offset one past the token end in the normalized text.
    pub end_offset: usize,
}

impl Token {
    pub fn new<S: Into<String>>(text: S, position: u32, start_offset: usize, end_offset: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }
}
