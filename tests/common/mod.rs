#![allow(dead_code)] // Not every test binary uses every helper

pub mod helpers;
