#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod arithmetic;
pub mod curve;
pub mod field;
pub mod sm2;
