//! Back-end contract surface. `contract::Emitter` is the trait a real
//! code-generator implements; this crate ships only test doubles
//! (`crate::backend`) against it, since lowering to any particular target
//! is out of scope here.

pub mod contract;
