//! Hash collection aliases.
//!
//! All non-concurrent maps in the workspace use FxHash — keys are small
//! value types and the maps are hot.

pub use rustc_hash::{FxHashMap, FxHashSet};
