//! Offline report drafts for Konnekt My City.
//!
//! Reports filed without connectivity are kept in a local [`db::DraftStore`].
//! When the device is back online, [`sync::SyncCoordinator`] submits each one
//! to the hosted backend and removes it locally once the remote create has
//! succeeded.

pub mod compress;
pub mod config;
pub mod connectivity;
pub mod dataurl;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod restore;
pub mod sync;
