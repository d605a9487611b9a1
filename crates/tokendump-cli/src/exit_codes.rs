//! Process exit codes.
//! Backend errors use `DumpError::exit_code`, which starts at 2.

pub const SUCCESS: i32 = 0;
pub const RUN_ABORTED: i32 = 1; // Collection stopped early; partial payload handled
pub const CONFIG_ERROR: i32 = 2;
