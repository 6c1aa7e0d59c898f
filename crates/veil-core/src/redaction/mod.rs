//! Email redaction
//!
//! Email addresses are swapped for `EMAIL_<hex>` tokens before any text
//! leaves the process, and swapped back when results come home:
//!
//! - `RedactionStore` holds the token to email table
//! - `RedactionCodec` performs both directions over text and nested content

mod codec;
mod store;
pub mod token;

pub use codec::RedactionCodec;
pub use store::RedactionStore;
