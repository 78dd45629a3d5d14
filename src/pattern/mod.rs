//! # Pattern Module
//!
//! Compiles path templates into an ordered segment program and matches
//! request paths against it.
//!
//! ## Template grammar
//!
//! A template is a `/`-separated list of segments:
//!
//! - `<name>` - **required** variable, consumes exactly one non-empty segment
//! - `[name]` - **optional** variable, consumes one segment if present
//! - `[name=default]` - optional variable bound to `default` when absent
//! - anything else - literal text, compared case-sensitively
//!
//! ## Examples
//!
//! | Template | Path | Result |
//! |---|---|---|
//! | `user/<username>` | `user/alice` | `{username: alice}` |
//! | `user/<username>` | `user/` | no match |
//! | `news/[page=0]` | `news` | `{page: 0}` |
//! | `user/<username>/posts/[page]` | `user/alice/posts` | `{username: alice}` |
//!
//! ## Matching
//!
//! Matching is positional and left-to-right with no backtracking. The
//! compiled segment order is fixed at construction. A successful match
//! always yields [`Captures`] (possibly empty); a failed match yields `None`,
//! so "matched with zero variables" and "did not match" never collide.
//!
//! ```rust
//! use brrtdispatch::pattern::CompiledPattern;
//!
//! let pattern = CompiledPattern::compile("news/[page=0]").unwrap();
//! assert_eq!(pattern.matches("news").unwrap().get("page"), Some("0"));
//! assert_eq!(pattern.matches("news/5").unwrap().get("page"), Some("5"));
//! assert!(pattern.matches("news/5/6").is_none());
//! ```

mod core;
#[cfg(test)]
mod tests;

pub use core::{Captures, CompiledPattern, Segment, MAX_INLINE_CAPTURES};
