//! Core numeric building blocks.

pub mod arithmetic;
