//! Pipeline stages for résumé-to-profile extraction.
//!
//! Each submodule implements exactly one step and is tested on its own;
//! [`crate::process::ProfilePipeline`] chains them.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ extract ──▶ language ──▶ llm ──▶ parse
//! (HTTP)    (lopdf,     (whatlang)   (chat)  (lenient JSON)
//!            docx-rs)
//! ```
//!
//! 1. [`fetch`]    — stream the document body from the document store
//! 2. [`extract`]  — sniff the format and pull out plain text; runs on the
//!    [`workers`] pool because PDF and DOCX parsing is CPU-bound
//! 3. [`language`] — best-guess language code with a default fallback
//! 4. [`llm`]      — prompt construction and the chat call with retry/backoff;
//!    the only stage that retries
//! 5. [`parse`]    — model answer to [`crate::output::ParsedProfile`]

pub mod extract;
pub mod fetch;
pub mod language;
pub mod llm;
pub mod parse;
pub mod workers;
