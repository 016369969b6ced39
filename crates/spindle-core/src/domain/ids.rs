//! Domain identifiers (strongly-typed IDs and keys).
//!
//! # Phantom Type パターン
//! `Id<T>` と `Key<T>` はジェネリック型で共通実装を提供しつつ、
//! `T` は実行時には使わないマーカー型としてコンパイル時の型安全性を提供します。
//!
//! - `Id<T>`: ULID ベース。コンポーネントの 1 回の実行（run）を識別する
//! - `Key<T>`: 外部システムが決める文字列キー（asset key, peer id）
//!
//! `AssetKey` と `PeerId` はどちらも中身は `String` ですが、型が異なるので混同できません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"run-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ULID ベースのジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 現在時刻ベースの新しい ID
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// KeyMarker は文字列キーのマーカー trait
///
/// `kind()` はログやエラーメッセージに使う名前です。
pub trait KeyMarker: Send + Sync + 'static {
    fn kind() -> &'static str;
}

/// 外部システムが決める文字列キー
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key<T: KeyMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: KeyMarker> Key<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl<T: KeyMarker> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: KeyMarker> From<&str> for Key<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: KeyMarker> From<String> for Key<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Run のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Asset のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Asset {}

impl KeyMarker for Asset {
    fn kind() -> &'static str {
        "asset"
    }
}

/// Peer のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Peer {}

impl KeyMarker for Peer {
    fn kind() -> &'static str {
        "peer"
    }
}

// ========================================
// Type Alias（使いやすさのため）
// ========================================

/// Identifier of one component invocation (queue build, publish cycle, follow-back run, ...).
pub type RunId = Id<Run>;

/// Key of an asset in blob storage (e.g. `memes/cat.png`).
pub type AssetKey = Key<Asset>;

/// Platform-side identifier of a peer account.
pub type PeerId = Key<Peer>;
