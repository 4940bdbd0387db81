pub mod array;
pub mod attribs;
pub mod counters;
pub mod last_result;
pub mod slots;
pub mod value;

pub use array::ArrayObject;
pub use slots::{SlotValue, VarAddr, VarRef, VarSlot};
pub use attribs::{VarAttribs, VarScope};
pub use counters::HeapCounters;
pub use last_result::LastResultFifo;
pub use value::{Value, ValueKind};
