pub mod analysis;
pub mod dump;
pub mod module;
pub mod value;
pub mod verify;

pub use module::Module;
pub use value::{AccessKind, BinaryOp, InstKind, Linkage, UnaryOp, Use, UseId, Value, ValueKind};
