//! Method body re-emission.
//!
//! Bodies are lowered to symbolic code first ([`lower`]), which needs no
//! slots and no rows. Slot allocation and row allocation follow, and the
//! symbolic code is encoded last ([`CodeBuilder::finish`]).

mod builder;
mod format;
mod lower;

pub use builder::{CodeBuilder, EncodedBody, Label, SequencePoint, TokenRef, VarRef};
pub use format::{append_body, ExceptionRegion, MethodBody, IL_HEADER_SIZE};
pub use lower::{
    lower_method, lower_missing_method, lower_template_constructor, lower_template_getter, LoweredBody,
};
