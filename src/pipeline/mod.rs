//! Pipeline stages for HTML-image-to-PDF processing.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. an in-memory fetcher in tests) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ coordinator ──▶ assemble
//! (HTML)    (<img src>)  (fetch+persist)  (lopdf)
//! ```
//!
//! 1. [`input`]   — read the user-supplied file, stdin or page URL into HTML
//!    text and pick its base URL (CLI only)
//! 2. [`extract`] — regex scan for image sources, resolved and deduplicated
//! 3. [`coordinator`] — one task per reference through [`fetch`] and
//!    [`persist`]; a single owner loop fills the table in discovery order
//! 4. [`assemble`] — decode, scale, center and draw one image per page; runs
//!    in `spawn_blocking` because decoding and compression are CPU-bound

pub mod assemble;
pub mod coordinator;
pub mod extract;
pub mod fetch;
pub mod input;
pub mod persist;
