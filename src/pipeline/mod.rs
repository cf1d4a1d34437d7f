//! Pipeline stages for one analyze action.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ interpret
//! (path/URL) (pdfium)  (base64)  (VLM)   (tags → blocks)
//! ```
//!
//! 1. [`input`]: validate the upload by extension and magic bytes
//! 2. [`render`]: rasterise PDF page 1 in `spawn_blocking`, or decode the
//!    photo; cap the longest edge
//! 3. [`encode`]: JPEG-encode and base64-wrap the image
//! 4. [`llm`]: the only stage with network I/O; one attempt, bounded time
//! 5. [`interpret`]: pure text processing of the model's answer

pub mod encode;
pub mod input;
pub mod interpret;
pub mod llm;
pub mod render;
