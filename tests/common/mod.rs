mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from sheetcount for tests
#[allow(unused_imports)]
pub use sheetcount::{
    ImageArray, LineSegment, SheetCountError, SheetCounter, SheetCounterConfig, SheetEstimate,
};
