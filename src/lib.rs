//! Partial downloads of BitTorrent content.
//!
//! A caller asks for byte ranges of files inside a torrent, e.g. the head of
//! a movie, and gets back exactly those bytes without downloading the whole
//! torrent:
//!
//! 1. describe the torrent with an [`Info`](metainfo::Info),
//! 2. request ranges on a [`DownloadPlan`](plan::DownloadPlan),
//! 3. hand the plan to a [`Downloader`](download::Downloader), which returns
//!    a live [`PieceRegistry`](registry::PieceRegistry),
//! 4. wait for ranges on the registry's completion channel and reassemble
//!    each with a [`BundlePlan`](bundle::BundlePlan).
//!
//! Pieces are held in memory only until every range needing them was read.
pub mod bundle;
pub mod conf;
pub mod download;
pub mod error;
pub mod media;
pub mod metainfo;
pub mod piece;
pub mod piece_range;
pub mod plan;
pub mod preview;
pub mod registry;
pub mod storage;

mod define;
pub use define::*;
