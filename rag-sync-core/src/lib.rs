#![doc = "rag-sync-core: incremental document sync into a RAG ingestion profile."]

//! This crate contains the reconciliation engine, its collaborator interfaces,
//! the status ledger stores and the local folder source. HTTP transport to the
//! RAG platform lives in the CLI crate.
//!
//! # Usage
//! Build a [`config::RunContext`], wire the collaborators into a
//! [`synchronise::Collaborators`] and call [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod metadata;
pub mod reconcile;
pub mod synchronise;
