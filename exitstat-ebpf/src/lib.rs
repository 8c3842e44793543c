#![no_std]

// This file exists to enable the library target, which the user-space
// crate's build script depends on for rebuild tracking.
