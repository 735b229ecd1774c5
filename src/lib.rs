//! File Allocator.
//!
//! `filealloc`は、単一のファイル(ないしそれに準ずる永続化領域)の内部を、
//! 可変長のブロック単位で割り当てるためのアロケータ.
//!
//! # 特徴
//!
//! - 管理情報(フリーリストのディレクトリおよび統計情報)は、全て同じファイルの先頭512バイトに置かれる
//! - ページのサイズクラス([rank])は30段階で、`512`バイトから`12MiB`まで`x1.5`と`x4/3`倍を交互に繰り返す
//! - 要求ランクに空きがなければ、より大きな空きページを[分割][allocator]して割り当てる
//! - 解放されたページは結合されず、その時点のサイズのまま再利用される
//! - 依存関係のある書き込みの間には同期が挟まれるため、クラッシュ時にも同じ領域が二重に割り当てられることはない
//!   (最悪でも、到達不能な空き領域が残るだけとなる)
//! - スレッド安全性は提供しない
//!
//! # モジュールの依存関係
//!
//! ```text
//! allocator => region, page => rank
//!           => nvm
//! ```
//!
//! - [allocator]モジュール:
//!   - 主に[Allocator]構造体を提供
//!   - `filealloc`の利用者が直接触るのはこの構造体
//! - [region]および[page]モジュール:
//!   - ファイル先頭の管理領域と、各ページのヘッダのエンコーディングを提供
//! - [nvm]モジュール:
//!   - 主に[NonVolatileMemory]トレイトとその実装である[FileNvm]を提供
//!   - [allocator]に対して永続化層を提供するのが目的
//!
//! # Examples
//!
//! ```
//! # extern crate filealloc;
//! # extern crate trackable;
//! use filealloc::allocator::{Allocation, Allocator};
//! use filealloc::nvm::MemoryNvm;
//!
//! # fn main() -> trackable::result::TopLevelResult {
//! let mut allocator = Allocator::open(MemoryNvm::default())?;
//! assert_eq!(allocator.file_size(), 512);
//!
//! let offset = allocator.alloc(100, false)?;
//! assert_eq!(offset, Allocation::Allocated(528));
//! assert_eq!(allocator.usable_size(528)?, 496);
//!
//! allocator.free(528)?;
//! assert_eq!(allocator.approx_free_space(), 496);
//! # Ok(())
//! # }
//! ```
//!
//! [rank]: ./rank/index.html
//! [allocator]: ./allocator/index.html
//! [Allocator]: ./allocator/struct.Allocator.html
//! [region]: ./region/index.html
//! [page]: ./page/index.html
//! [nvm]: ./nvm/index.html
//! [NonVolatileMemory]: ./nvm/trait.NonVolatileMemory.html
//! [FileNvm]: ./nvm/struct.FileNvm.html
#![warn(missing_docs)]
extern crate byteorder;
extern crate libc;
extern crate prometrics;
#[cfg(test)]
extern crate tempdir;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod allocator;
pub mod block;
pub mod metrics;
pub mod nvm;
pub mod page;
pub mod rank;
pub mod region;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
