pub mod error;
pub mod openai;
pub mod util;

pub use error::{AiError, Result};
pub use openai::{ChatSettings, OpenAi};
pub use util::{clip_to_bytes, json_payload};
