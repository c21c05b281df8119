//! SSA middle-end for a small optimizing C-subset compiler.
//!
//! The crate is organized the way the data flows:
//! - [`common`]: the type system and the diagnostic sideband used during
//!   lowering.
//! - [`ir`]: the SSA value graph, the module/builder that constructs it,
//!   the textual printer, read-only analyses, and the IR verifier.
//! - [`passes`]: the pass manager and the registered analysis/transform
//!   passes (loop normalization, strength reduction, LICM, constant
//!   folding, dead code elimination).
//! - [`back`]: the code-generator visitor contract consumed by backends.
//!
//! The front end (parser, type checker) and the target code generators are
//! external collaborators: the front end drives [`ir::Module`]'s builder
//! API, and backends implement [`back::CodeGen`].

// Analysis-threading helpers pass the loop, dominance, and parent context
// separately; bundling them into a struct would not make the call sites
// clearer.
#![allow(clippy::too_many_arguments)]

pub mod back;
pub mod common;
pub mod ir;
pub mod passes;
