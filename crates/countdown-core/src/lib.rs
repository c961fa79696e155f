//! countdown-core
//!
//! Core building blocks for the launch countdown service.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, launch record, 遷移表, event, job, errors）
//! - **ports**: 抽象化レイヤー（LaunchStore, JobStore, EventSource, DeadLetterSink, Clock, IdGenerator）
//! - **app**: launch lifecycle（state machine, consumer, report）
//! - **scheduler**: job の schedule / dispatch / retry
//! - **impls**: 開発・テスト用の in-memory 実装
//! - **config**: 環境変数からの設定
//! - **observability**: job 件数の集計

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod scheduler;
