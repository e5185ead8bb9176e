//! Heap dump section: GC roots and object sub-records.

mod encoder;
mod roots;

pub use encoder::ObjectEncoder;
pub use roots::HeapRoot;
