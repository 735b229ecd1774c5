//! 不揮発性メモリのインターフェース定義と実装群.
//!
//! このモジュールは[Allocator](../allocator/struct.Allocator.html)が
//! ページやディレクトリの読み書きに使用する永続化領域を提供する.
pub use self::file::{FileNvm, FileNvmBuilder};
pub use self::memory::MemoryNvm;
pub use self::shared_memory::SharedMemoryNvm;

use crate::Result;

mod file;
mod memory;
mod shared_memory;

/// 不揮発性メモリを表すトレイト.
///
/// "不揮発性メモリ"は「永続化可能かつランダムアクセス可能なバイト列」を意味する.
///
/// アロケータはこのトレイトが提供する操作(位置指定の読み書き、同期、サイズ取得)のみを用いて、
/// ページ群および管理情報を保存する. インスタンスのオープンやクローズは利用者の責務となる.
pub trait NonVolatileMemory {
    /// `offset`の位置から`buf`の長さ分のバイト列を読み込む.
    ///
    /// 現在のサイズを超えた部分は、ゼロで埋められる.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// `offset`の位置に`buf`の内容を書き込む.
    ///
    /// 現在のサイズを超える位置への書き込みが行われた場合には、その分だけサイズが拡張される.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    /// メモリの内容を、物理デバイスに同期する.
    ///
    /// この呼び出しが成功するまでは、それ以前の書き込みが永続化されている保証はない.
    ///
    /// 内部的にバッファ管理等を行っておらず、常に内容が同期されている場合には、
    /// このメソッド内で特に何かを行う必要はない。
    fn sync(&mut self) -> Result<()>;

    /// メモリの現在のサイズ(バイト単位)を返す.
    fn size(&self) -> Result<u64>;
}
impl<'a, N: NonVolatileMemory> NonVolatileMemory for &'a mut N {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        (**self).read_at(buf, offset)
    }
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        (**self).write_at(buf, offset)
    }
    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
    fn size(&self) -> Result<u64> {
        (**self).size()
    }
}
