//! spindle-core
//!
//! Core building blocks for a single-account media publishing agent.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, table, record, outcome, errors）
//! - **ports**: 抽象化レイヤー（RecordStore, AssetSource, SocialClient, Clock）
//! - **app**: アプリケーションロジック（queue builder, publish pipeline, relationships, scheduler）
//! - **impls**: 実装（SQLite, ローカルディレクトリ, dry-run, in-memory）
//! - **config**: figment による設定の読み込みと検証
//! - **retry**: Outcome 駆動の有限リトライとバックオフ

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod retry;

#[cfg(test)]
mod testing;

pub use error::SpindleError;
