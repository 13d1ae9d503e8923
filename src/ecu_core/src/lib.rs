#![doc = include_str!("./lib.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)] // Link `std` only when building a test or `std` is requested
#![forbid(unsafe_code)]
pub mod assert;
pub mod dlist;
