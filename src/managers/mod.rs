pub mod diagnostics;
pub mod ssh;
