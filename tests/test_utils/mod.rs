#![allow(dead_code)]

pub mod catalog;
pub mod fixtures;
pub mod helpers;
