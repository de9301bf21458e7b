mod core;
mod ops;
mod plugin;
mod sanitize;
mod serde_value;
mod spoiler;

pub use crate::core::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::sanitize::*;
pub use crate::serde_value::*;
pub use crate::spoiler::*;
