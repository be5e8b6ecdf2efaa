//! # Engine Module
//!
//! Storage engine internals.
//!
//! This module contains the building blocks of a world:
//! - Entity allocation and identifiers
//! - The component registry
//! - Tables, columns and sparse sets
//! - Archetypes and bundle transitions
//! - Resources and change detection
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod identifier;
pub mod entity;
pub mod change_detection;
pub mod component;
pub mod storage;
pub mod table;
pub mod sparse_set;
pub mod resource;
pub mod bundle;
pub mod archetype;
pub mod removal;
pub mod entity_ref;
pub mod config;
pub mod world;
