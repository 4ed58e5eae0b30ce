//! Integration tests for the minorseq tools.
//!
//! These tests run the built binary end to end on small generated inputs.

mod helpers;
mod test_cleric_command;
mod test_fuse_command;
mod test_juliet_command;
mod test_tool_runs;
