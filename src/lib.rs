// This is a required file for rust libraries which declares what files are
// part of the library and what interfaces are public from the library.

// Console output is part of the observable behavior (message sequencing is
// covered by end-to-end tests), so its namespace is public.
pub mod console;

// Declare other .rs file/module exists, but make them private.
mod archive;
mod install;
mod logging;
mod network;
mod time;
mod updater;

// Take all public items from the updater namespace and make them public.
pub use self::updater::*;

// The merge copy takes an injectable exclusion predicate, so callers may
// want it directly as well as through the update pipeline.
pub use self::install::{copy_tree, IgnoreFn};

#[cfg(test)]
extern crate tempdir;
