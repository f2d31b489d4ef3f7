//! Core value types for the persistence layer.
//!
//! - [`StorableObject`] - A versioned, tenant-owned object with routing flags
//! - [`Pager`] - Pagination and cursor state threaded through page reads
//!
//! # Examples
//!
//! ```
//! use stratus_persistence::types::{Pager, StorableObject};
//! use serde_json::json;
//!
//! let obj = StorableObject::new("post", "p1")
//!     .with_tenant("acme")
//!     .with_attribute("title", json!("Hello"));
//! assert_eq!(obj.id(), "p1");
//!
//! let pager = Pager::with_limit(50).with_desc(false);
//! assert_eq!(pager.limit(), 50);
//! ```

mod object;
mod pager;

pub use object::{
    DEFAULT_TYPE, RESERVED_ATTRIBUTES, StorableObject, VERSION_CONFLICT, now_millis,
};
pub use pager::{DEFAULT_LIMIT, DEFAULT_SORT_BY, MAX_LIMIT, Pager};
